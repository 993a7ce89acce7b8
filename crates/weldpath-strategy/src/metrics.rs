//! Coverage metrics and scoring of a fill path.
//!
//! Every bead is dilated into a capsule footprint of half the bead width. The
//! union of all footprints is compared against the contour polygon.

use geo::{Area, BooleanOps, Coord, LineString, MultiPolygon};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use weldpath_math::{Point2, Vec2};
use weldpath_slicer::{BeadSettings, Polygon};

use crate::fill::{FillPath, WeldLine};
use crate::raster::CHORD_POINTS;
use crate::settings::SelectionPolicy;

/// Segments used for each semicircular end cap.
const CAP_SEGMENTS: usize = 8;

/// Quality figures of one strategy on one polygon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyMetrics {
    /// Polygon area covered by the dilated beads, in percent.
    pub area_covered_pct: f64,
    /// Polygon volume left uncovered, in percent.
    pub volume_not_covered_pct: f64,
    /// Bead area deposited outside the polygon, in percent of the polygon.
    pub material_outside_pct: f64,
    /// Deposit inside the polygon beyond the covered area, in percent.
    pub overlap_excess_pct: f64,
    /// Number of separate beads.
    pub elements: usize,
    /// Total bead length in mm.
    pub length_mm: f64,
    /// Arc-on time in minutes.
    pub time_min: f64,
    /// Deposited mass in grams.
    pub mass_g: f64,
    /// Weighted score, higher is better.
    pub score: f64,
}

/// Dilated footprint of one polyline.
pub fn line_footprint(points: &[Point2], radius: f64) -> MultiPolygon<f64> {
    let points = merge_collinear(points);
    let capsules: Vec<MultiPolygon<f64>> = match points.as_slice() {
        [] => Vec::new(),
        [p] => vec![MultiPolygon::new(vec![capsule(p, p, radius)])],
        _ => points
            .windows(2)
            .map(|w| MultiPolygon::new(vec![capsule(&w[0], &w[1], radius)]))
            .collect(),
    };
    union_all(capsules)
}

/// Union of the footprints of every line in `path`.
pub fn path_footprint(path: &FillPath, radius: f64) -> MultiPolygon<f64> {
    union_all(line_footprints(&path.lines, radius))
}

fn line_footprints(lines: &[WeldLine], radius: f64) -> Vec<MultiPolygon<f64>> {
    lines
        .par_iter()
        .map(|line| line_footprint(&line.xy(), radius))
        .collect()
}

/// Pairwise tree union.
fn union_all(mut parts: Vec<MultiPolygon<f64>>) -> MultiPolygon<f64> {
    while parts.len() > 1 {
        parts = parts
            .par_chunks(2)
            .map(|pair| {
                pair[1..]
                    .iter()
                    .fold(pair[0].clone(), |acc, next| acc.union(next))
            })
            .collect();
    }
    parts.pop().unwrap_or_else(|| MultiPolygon::new(Vec::new()))
}

/// Drop interior points that continue straight on.
fn merge_collinear(points: &[Point2]) -> Vec<Point2> {
    let mut out: Vec<Point2> = Vec::with_capacity(points.len());
    for p in points {
        if out.last().is_some_and(|last| (p - last).norm() < 1e-9) {
            continue;
        }
        if let [.., a, b] = out.as_slice() {
            let u = b - a;
            let v = p - b;
            if (u.x * v.y - u.y * v.x).abs() < 1e-9 * u.norm() * v.norm() && u.dot(&v) > 0.0 {
                out.pop();
            }
        }
        out.push(*p);
    }
    out
}

/// Stadium around the segment `a`-`b`, counter-clockwise.
fn capsule(a: &Point2, b: &Point2, radius: f64) -> geo::Polygon<f64> {
    let d = b - a;
    let len = d.norm();
    let u = if len > 1e-12 { d / len } else { Vec2::x() };
    let n = Vec2::new(-u.y, u.x);
    let base = n.y.atan2(n.x);

    let mut coords: Vec<Coord<f64>> = Vec::with_capacity(2 * CAP_SEGMENTS + 3);
    // Cap around b sweeps from -n through +u to +n.
    for k in 0..=CAP_SEGMENTS {
        let t = base - std::f64::consts::PI + std::f64::consts::PI * k as f64 / CAP_SEGMENTS as f64;
        coords.push(Coord {
            x: b.x + radius * t.cos(),
            y: b.y + radius * t.sin(),
        });
    }
    // Cap around a sweeps from +n through -u to -n.
    for k in 0..=CAP_SEGMENTS {
        let t = base + std::f64::consts::PI * k as f64 / CAP_SEGMENTS as f64;
        coords.push(Coord {
            x: a.x + radius * t.cos(),
            y: a.y + radius * t.sin(),
        });
    }
    if let Some(first) = coords.first().copied() {
        coords.push(first);
    }
    geo::Polygon::new(LineString::from(coords), Vec::new())
}

/// Score `path` on `polygon`.
pub fn evaluate(
    polygon: &Polygon,
    path: &FillPath,
    bead: &BeadSettings,
    policy: &SelectionPolicy,
) -> StrategyMetrics {
    let area = polygon.area();
    let region = MultiPolygon::new(vec![polygon.to_geo()]);
    let radius = bead.width / 2.0;

    let union = path_footprint(path, radius);
    let covered = union.intersection(&region).unsigned_area();
    let outside = union.difference(&region).unsigned_area();

    let deposited = if path.kind.is_raster() {
        chord_deposit(path, &region, radius)
    } else {
        bead.width * length_inside(polygon, path)
    };

    let pct = |v: f64| if area > 0.0 { v / area * 100.0 } else { 0.0 };
    let area_covered_pct = pct(covered);
    let material_outside_pct = pct(outside);
    let overlap_excess_pct = if covered > 0.0 {
        ((deposited - covered) / covered * 100.0).max(0.0)
    } else {
        0.0
    };

    let elements = path.elements();
    let length_mm = path.length();
    let time_min = if bead.weld_speed > 0.0 {
        length_mm / 1000.0 / bead.weld_speed
    } else {
        0.0
    };
    let mass_g = (2.0 / 3.0) * bead.height * bead.width * length_mm * bead.material_density / 1000.0;

    let score = (policy.weight_area * area_covered_pct
        - policy.weight_elements * elements as f64
        - policy.weight_outside * material_outside_pct
        - policy.weight_overlap * overlap_excess_pct)
        / policy.total_weight();

    StrategyMetrics {
        area_covered_pct,
        volume_not_covered_pct: (100.0 - area_covered_pct).max(0.0),
        material_outside_pct,
        overlap_excess_pct,
        elements,
        length_mm,
        time_min,
        mass_g,
        score,
    }
}

/// Sum over every raster chord of its footprint inside `region`.
///
/// Connectors of stitched rasters are not counted, so a row set scores the
/// same whichever way it is stitched.
fn chord_deposit(path: &FillPath, region: &MultiPolygon<f64>, radius: f64) -> f64 {
    let chords: Vec<Vec<Point2>> = path
        .lines
        .iter()
        .flat_map(|line| {
            let xy = line.xy();
            if xy.len() >= CHORD_POINTS && xy.len() % CHORD_POINTS == 0 {
                xy.chunks_exact(CHORD_POINTS).map(<[Point2]>::to_vec).collect()
            } else {
                vec![xy]
            }
        })
        .collect();
    chords
        .par_iter()
        .map(|chord| line_footprint(chord, radius).intersection(region).unsigned_area())
        .sum()
}

/// Bead length whose segment midpoints lie inside `polygon`.
fn length_inside(polygon: &Polygon, path: &FillPath) -> f64 {
    path.lines
        .iter()
        .flat_map(|line| line.points.windows(2))
        .filter_map(|w| {
            let a = Point2::new(w[0].x, w[0].y);
            let b = Point2::new(w[1].x, w[1].y);
            let mid = Point2::from((a.coords + b.coords) / 2.0);
            polygon.contains(&mid).then(|| (b - a).norm())
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fill::StrategyKind;
    use approx::assert_relative_eq;
    use weldpath_math::Point3;

    fn square(size: f64) -> Polygon {
        Polygon::rectangle(Point2::origin(), Point2::new(size, size))
    }

    fn path(kind: StrategyKind, lines: Vec<Vec<(f64, f64)>>) -> FillPath {
        FillPath {
            kind,
            angle: 0.0,
            lines: lines
                .into_iter()
                .map(|pts| {
                    WeldLine::new(
                        pts.into_iter().map(|(x, y)| Point3::new(x, y, 0.0)).collect(),
                        kind,
                    )
                })
                .collect(),
            step_over_used: 3.5,
        }
    }

    #[test]
    fn test_capsule_area() {
        let cap = capsule(&Point2::origin(), &Point2::new(10.0, 0.0), 1.0);
        // Rectangle plus an inscribed 16-gon.
        let polygon16 = 8.0 * (std::f64::consts::PI / 8.0).sin();
        assert_relative_eq!(cap.unsigned_area(), 20.0 + polygon16, epsilon = 1e-9);
    }

    #[test]
    fn test_merge_collinear() {
        let pts = [
            Point2::origin(),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(2.0, 0.0),
            Point2::new(2.0, 1.0),
        ];
        assert_eq!(merge_collinear(&pts).len(), 3);
    }

    #[test]
    fn test_full_cover() {
        let bead = BeadSettings::default();
        let policy = SelectionPolicy::default();
        let p = path(StrategyKind::RasterDiscrete, vec![vec![(-5.0, 2.0), (15.0, 2.0)]]);
        let m = evaluate(&square(4.0), &p, &bead, &policy);
        assert_relative_eq!(m.area_covered_pct, 100.0, epsilon = 1e-6);
        assert_eq!(m.volume_not_covered_pct, 0.0);
        assert!(m.material_outside_pct > 0.0);
        assert_eq!(m.overlap_excess_pct, 0.0);
    }

    #[test]
    fn test_overlap_counts_discrete_rows() {
        let bead = BeadSettings::default();
        let policy = SelectionPolicy::default();
        // Two rows one millimetre apart nearly double-deposit.
        let p = path(
            StrategyKind::RasterDiscrete,
            vec![vec![(2.5, 10.0), (17.5, 10.0)], vec![(2.5, 11.0), (17.5, 11.0)]],
        );
        let m = evaluate(&square(20.0), &p, &bead, &policy);
        assert!(m.overlap_excess_pct > 50.0);
        assert_eq!(m.elements, 2);
    }

    #[test]
    fn test_stitched_rasters_keep_row_overlap() {
        use crate::fill::{FillInput, HeightField};
        use crate::raster::{generate, RasterStitch};

        let bead = BeadSettings::default();
        let policy = SelectionPolicy::default();
        let heights = HeightField::flat(0.0);
        let poly = square(20.0);
        let input = FillInput {
            polygon: &poly,
            heights: &heights,
            bead: &bead,
            policy: &policy,
        };
        let overlap = |stitch| {
            let fill = generate(&input, 0.0, stitch).unwrap();
            evaluate(&poly, &fill, &bead, &policy).overlap_excess_pct
        };

        let discrete = overlap(RasterStitch::Discrete);
        assert!(discrete > 10.0);
        for stitch in [RasterStitch::Continuous, RasterStitch::Zigzag] {
            let stitched = overlap(stitch);
            // Connectors only add to the union, never to the row deposit.
            assert!(stitched > 0.0, "{stitch:?} reports no overlap");
            assert!((stitched - discrete).abs() < 0.5 + discrete * 0.02, "{stitch:?}: {stitched} vs {discrete}");
        }
    }

    #[test]
    fn test_time_and_mass() {
        let bead = BeadSettings::default();
        let policy = SelectionPolicy::default();
        let p = path(StrategyKind::ContourDiscrete, vec![vec![(0.0, 5.0), (100.0, 5.0)]]);
        let m = evaluate(&square(10.0), &p, &bead, &policy);
        assert_relative_eq!(m.length_mm, 100.0);
        assert_relative_eq!(m.time_min, 100.0 / 1000.0 / bead.weld_speed);
        assert_relative_eq!(
            m.mass_g,
            (2.0 / 3.0) * bead.height * bead.width * 100.0 * bead.material_density / 1000.0
        );
    }

    #[test]
    fn test_score_penalises_elements() {
        let bead = BeadSettings::default();
        let policy = SelectionPolicy::default();
        let one = path(StrategyKind::RasterDiscrete, vec![vec![(-5.0, 2.0), (15.0, 2.0)]]);
        let two = path(
            StrategyKind::RasterDiscrete,
            vec![vec![(-5.0, 2.0), (5.0, 2.0)], vec![(5.0, 2.0), (15.0, 2.0)]],
        );
        let a = evaluate(&square(4.0), &one, &bead, &policy);
        let b = evaluate(&square(4.0), &two, &bead, &policy);
        assert!(a.score > b.score);
    }
}
