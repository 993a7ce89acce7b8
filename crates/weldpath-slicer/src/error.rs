//! Error types for the slicer.

use thiserror::Error;
use weldpath_math::RemapError;

/// Errors that can occur while building layers or slicing.
#[derive(Error, Debug)]
pub enum SlicerError {
    /// Mesh has no triangles.
    #[error("mesh is empty")]
    EmptyMesh,

    /// Mesh has degenerate geometry.
    #[error("mesh has degenerate geometry: {0}")]
    DegenerateMesh(String),

    /// A contour or point set is too small or has no area.
    #[error("degenerate geometry: {0}")]
    GeometryDegenerate(String),

    /// Invalid slice or surface settings.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// Slicing operation failed.
    #[error("slicing failed: {0}")]
    SliceFailed(String),

    /// Mapping into or out of the planning frame failed.
    #[error(transparent)]
    Remap(#[from] RemapError),
}

/// Result type for slicer operations.
pub type Result<T> = std::result::Result<T, SlicerError>;
