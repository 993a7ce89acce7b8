#![warn(missing_docs)]

//! Fill strategies and strategy selection for weld repair planning.
//!
//! Given the contour layers produced by `weldpath-slicer`, this crate
//! generates the five candidate fills per contour (three raster variants,
//! closed offset rings and an offset spiral), scores them by coverage,
//! excess material and bead count, and splits contours that no single
//! strategy covers well enough.
//!
//! # Example
//!
//! ```ignore
//! use weldpath_strategy::{plan_layers, PlanContext, SelectionPolicy};
//!
//! let ctx = PlanContext::new(bead, SelectionPolicy::default());
//! let plans = plan_layers(&layers, &ctx)?;
//! for layer in &plans {
//!     for plan in layer.planned() {
//!         println!("{}: {}", plan.contour, plan.regions[0].selection.kind);
//!     }
//! }
//! ```

pub mod concavity;
pub mod error;
pub mod evaluator;
pub mod fill;
pub mod metrics;
pub mod offset;
pub mod partition;
pub mod raster;
pub mod settings;

pub use concavity::{axis_points, concave_vertices, points_concaves};
pub use error::{Result, StrategyError};
pub use evaluator::{
    best_angle, contour_region, evaluate_region, plan_contour, plan_layers, select_strategy,
    CancelToken, Claim, ContourFailure, ContourOutcome, ContourPlan, ExclusionSet, LayerPlan,
    PartitionAttempt, PlanContext, RegionPlan, RegionSelection, Selection, StrategyRecord,
};
pub use fill::{generate, FillInput, FillPath, HeightField, StrategyKind, WeldLine};
pub use metrics::StrategyMetrics;
pub use offset::{offset_rings, OffsetRing};
pub use partition::{cut_coefficient, filter_lines, gen_subplot, partition, split_by_chord, CutLine, RankedCut};
pub use raster::{adapted_step_over, scan_chords, RasterStitch};
pub use settings::SelectionPolicy;
