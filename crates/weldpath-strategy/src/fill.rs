//! Fill strategies and their shared types.
//!
//! Every strategy turns one polygon into an ordered list of [`WeldLine`]s.
//! Dispatch is a single `match` over [`StrategyKind`].

use rstar::primitives::GeomWithData;
use rstar::RTree;
use serde::{Deserialize, Serialize};
use weldpath_math::{Point2, Point3};
use weldpath_slicer::{BeadSettings, Polygon};

use crate::error::Result;
use crate::offset;
use crate::raster::{self, RasterStitch};
use crate::settings::SelectionPolicy;

/// The five fill strategies.
///
/// Declaration order breaks score ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Parallel chords, tool lifted between rows.
    RasterDiscrete,
    /// Parallel chords joined end to start in one direction.
    RasterContinuous,
    /// Parallel chords joined as a serpentine.
    RasterZigzag,
    /// Closed offset rings, tool lifted between rings.
    ContourDiscrete,
    /// Offset rings joined into a spiral.
    ContourSpiral,
}

impl StrategyKind {
    /// Every strategy in declaration order.
    pub const ALL: [StrategyKind; 5] = [
        StrategyKind::RasterDiscrete,
        StrategyKind::RasterContinuous,
        StrategyKind::RasterZigzag,
        StrategyKind::ContourDiscrete,
        StrategyKind::ContourSpiral,
    ];

    /// Stable display name.
    pub fn name(self) -> &'static str {
        match self {
            StrategyKind::RasterDiscrete => "raster_discrete",
            StrategyKind::RasterContinuous => "raster_continuous",
            StrategyKind::RasterZigzag => "raster_zigzag",
            StrategyKind::ContourDiscrete => "contour_discrete",
            StrategyKind::ContourSpiral => "contour_spiral",
        }
    }

    /// True for the three raster variants.
    pub fn is_raster(self) -> bool {
        matches!(
            self,
            StrategyKind::RasterDiscrete | StrategyKind::RasterContinuous | StrategyKind::RasterZigzag
        )
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One continuous weld bead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeldLine {
    /// Bead centre line.
    pub points: Vec<Point3>,
    /// Strategy that produced the line.
    pub kind: StrategyKind,
    /// Index of the originating region within its contour plan.
    pub region: usize,
}

impl WeldLine {
    /// New line for region 0.
    pub fn new(points: Vec<Point3>, kind: StrategyKind) -> Self {
        Self {
            points,
            kind,
            region: 0,
        }
    }

    /// Polyline length.
    pub fn length(&self) -> f64 {
        self.points.windows(2).map(|w| (w[1] - w[0]).norm()).sum()
    }

    /// First point.
    pub fn start(&self) -> Option<&Point3> {
        self.points.first()
    }

    /// Last point.
    pub fn end(&self) -> Option<&Point3> {
        self.points.last()
    }

    /// Points projected onto the slicing plane.
    pub fn xy(&self) -> Vec<Point2> {
        self.points.iter().map(|p| Point2::new(p.x, p.y)).collect()
    }
}

/// Output of one strategy on one polygon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillPath {
    /// Generating strategy.
    pub kind: StrategyKind,
    /// Raster angle in degrees (ignored by contour strategies).
    pub angle: f64,
    /// Beads in weld order.
    pub lines: Vec<WeldLine>,
    /// Step-over actually used after adaptation.
    pub step_over_used: f64,
}

impl FillPath {
    /// Number of separate beads.
    pub fn elements(&self) -> usize {
        self.lines.len()
    }

    /// Total bead length.
    pub fn length(&self) -> f64 {
        self.lines.iter().map(WeldLine::length).sum()
    }

    /// Last welded point.
    pub fn end_point(&self) -> Option<Point3> {
        self.lines.iter().rev().find_map(|l| l.end().copied())
    }

    /// Tag every line with `region`.
    pub fn set_region(&mut self, region: usize) {
        for line in &mut self.lines {
            line.region = region;
        }
    }
}

/// Nearest-sample height lookup over the contour's 3D samples.
#[derive(Debug, Clone)]
pub struct HeightField {
    tree: RTree<GeomWithData<[f64; 2], f64>>,
    fallback: f64,
}

impl HeightField {
    /// Index the samples.
    pub fn new(samples: &[Point3]) -> Self {
        let fallback = if samples.is_empty() {
            0.0
        } else {
            samples.iter().map(|p| p.z).sum::<f64>() / samples.len() as f64
        };
        Self {
            tree: RTree::bulk_load(
                samples
                    .iter()
                    .map(|p| GeomWithData::new([p.x, p.y], p.z))
                    .collect(),
            ),
            fallback,
        }
    }

    /// Constant height field.
    pub fn flat(z: f64) -> Self {
        Self {
            tree: RTree::new(),
            fallback: z,
        }
    }

    /// Height of the sample nearest to `p`.
    pub fn z_at(&self, p: &Point2) -> f64 {
        self.tree
            .nearest_neighbor(&[p.x, p.y])
            .map(|n| n.data)
            .unwrap_or(self.fallback)
    }

    /// Lift a planar point onto the field.
    pub fn lift(&self, p: &Point2) -> Point3 {
        Point3::new(p.x, p.y, self.z_at(p))
    }
}

/// Everything a generator needs for one polygon.
#[derive(Debug, Clone, Copy)]
pub struct FillInput<'a> {
    /// Region to fill, counter-clockwise.
    pub polygon: &'a Polygon,
    /// Height lookup for generated points.
    pub heights: &'a HeightField,
    /// Bead geometry.
    pub bead: &'a BeadSettings,
    /// Selection policy (adaptive step-over thresholds).
    pub policy: &'a SelectionPolicy,
}

/// Run one strategy.
///
/// `angle` is in degrees and only used by raster strategies. `entry` is the
/// end of the previous path, used by contour strategies to place seams.
pub fn generate(
    kind: StrategyKind,
    input: &FillInput<'_>,
    angle: f64,
    entry: Option<&Point3>,
) -> Result<FillPath> {
    match kind {
        StrategyKind::RasterDiscrete => raster::generate(input, angle, RasterStitch::Discrete),
        StrategyKind::RasterContinuous => raster::generate(input, angle, RasterStitch::Continuous),
        StrategyKind::RasterZigzag => raster::generate(input, angle, RasterStitch::Zigzag),
        StrategyKind::ContourDiscrete => offset::generate_closed(input, entry),
        StrategyKind::ContourSpiral => offset::generate_spiral(input, entry),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_order_and_names() {
        assert!(StrategyKind::RasterDiscrete < StrategyKind::ContourSpiral);
        assert_eq!(StrategyKind::ContourSpiral.name(), "contour_spiral");
        assert!(StrategyKind::RasterZigzag.is_raster());
        assert!(!StrategyKind::ContourDiscrete.is_raster());
    }

    #[test]
    fn test_height_field_nearest() {
        let field = HeightField::new(&[Point3::new(0.0, 0.0, 1.0), Point3::new(10.0, 0.0, 3.0)]);
        assert_eq!(field.z_at(&Point2::new(1.0, 0.0)), 1.0);
        assert_eq!(field.z_at(&Point2::new(9.0, 1.0)), 3.0);
        assert_eq!(HeightField::flat(2.5).z_at(&Point2::origin()), 2.5);
    }

    #[test]
    fn test_weld_line_length() {
        let line = WeldLine::new(
            vec![Point3::origin(), Point3::new(3.0, 4.0, 0.0)],
            StrategyKind::RasterDiscrete,
        );
        assert!((line.length() - 5.0).abs() < 1e-12);
    }
}
