//! Error type for the end-to-end planner.

use thiserror::Error;
use weldpath_math::RemapError;
use weldpath_program::ProgramError;
use weldpath_slicer::SlicerError;
use weldpath_strategy::StrategyError;

/// Errors returned by [`plan_repair`](crate::plan_repair) and the settings loader.
#[derive(Error, Debug)]
pub enum PlanError {
    /// Settings rejected before any work started.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// Slicing or surface offsetting failed.
    #[error(transparent)]
    Slicer(#[from] SlicerError),

    /// Strategy selection failed or was cancelled.
    #[error(transparent)]
    Strategy(#[from] StrategyError),

    /// Path assembly failed.
    #[error(transparent)]
    Program(#[from] ProgramError),

    /// Mapping between the part frame and the planning frame failed.
    #[error(transparent)]
    Remap(#[from] RemapError),

    /// Settings file could not be parsed.
    #[error("TOML error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Settings could not be written.
    #[error("TOML error: {0}")]
    TomlWrite(#[from] toml::ser::Error),
}

/// Result type for planner operations.
pub type Result<T> = std::result::Result<T, PlanError>;
