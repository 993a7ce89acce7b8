#![warn(missing_docs)]

//! Path assembly and weld program construction.
//!
//! Takes the per-contour selections from `weldpath-strategy`, orders their
//! weld lines into one continuous path with lifted transits between distant
//! beads, thins dense polylines into robot-friendly motion points and emits
//! an abstract command list (arc on/off, linear, circular and travel moves).
//!
//! # Example
//!
//! ```ignore
//! use weldpath_program::{assemble, build_program, AssemblyOptions, MotionPolicy};
//!
//! let motion = MotionPolicy::default();
//! let path = assemble(&plans, AssemblyOptions { bead: &bead, motion: Some(&motion) })?;
//! let program = build_program(&path, motion.curve_speed_factor);
//! ```

pub mod assembler;
pub mod command;
pub mod error;
pub mod motion;

pub use assembler::{
    assemble, AssembledPath, AssemblyOptions, ElementKind, PathContour, PathElement, PathLayer,
    PathPoint, WeldState,
};
pub use command::{build_program, ProgramState, WeldCommand};
pub use error::{ProgramError, Result};
pub use motion::{classify, MotionKind, MotionPlan, MotionPoint, MotionPolicy, MotionTier};
