//! Error types for strategy generation and selection.

use thiserror::Error;
use weldpath_slicer::SlicerError;

use crate::fill::StrategyKind;

/// Errors that can occur while generating or selecting fill strategies.
#[derive(Error, Debug)]
pub enum StrategyError {
    /// A generator produced no usable weld line.
    #[error("{kind} infeasible: {1}", kind = .0.name())]
    Infeasible(StrategyKind, String),

    /// Raster angle outside `[0, 180)`.
    #[error("raster angle {0} outside [0, 180)")]
    InvalidAngle(f64),

    /// A contour is too small or has no area.
    #[error("degenerate geometry: {0}")]
    GeometryDegenerate(String),

    /// Invalid selection policy.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// The run was cancelled between contours.
    #[error("planning cancelled")]
    Cancelled,

    /// Slicer-level failure.
    #[error(transparent)]
    Slicer(#[from] SlicerError),
}

/// Result type for strategy operations.
pub type Result<T> = std::result::Result<T, StrategyError>;
