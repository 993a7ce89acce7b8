//! Error types for path assembly and program building.

use thiserror::Error;
use weldpath_slicer::SlicerError;

/// Errors that can occur while assembling a path or building a program.
#[derive(Error, Debug)]
pub enum ProgramError {
    /// Invalid motion or assembly settings.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// A weld element without points.
    #[error("empty weld element in layer {layer}, contour {contour}")]
    EmptyElement {
        /// Layer index.
        layer: usize,
        /// Contour index.
        contour: usize,
    },

    /// Bead settings rejected.
    #[error(transparent)]
    Slicer(#[from] SlicerError),
}

/// Result type for program operations.
pub type Result<T> = std::result::Result<T, ProgramError>;
