#![warn(missing_docs)]

//! Weld repair toolpath planning.
//!
//! Turns a scanned damage mesh into a layered weld path: the damage is
//! sliced into contour layers, each contour gets the best of five fill
//! strategies (split in two when none covers it well enough), and the
//! resulting beads are joined into one path with lifted transits and an
//! abstract robot program.
//!
//! # Example
//!
//! ```ignore
//! use weldpath::{plan_repair, PlannerSettings};
//!
//! let settings = PlannerSettings::from_toml_str(&std::fs::read_to_string("repair.toml")?)?;
//! let plan = plan_repair(&mesh, &settings, &[], None)?;
//! for (layer, contour, failure) in plan.unprocessed() {
//!     eprintln!("layer {layer} contour {contour}: {failure}");
//! }
//! println!("{} commands", plan.program.len());
//! ```

pub mod error;
pub mod pipeline;
pub mod settings;

pub use error::{PlanError, Result};
pub use pipeline::{build_surface_layers, plan_repair, RepairPlan};
pub use settings::{PartSettings, PlannerSettings};

pub use weldpath_math as math;
pub use weldpath_program as program;
pub use weldpath_slicer as slicer;
pub use weldpath_strategy as strategy;
