//! Raster fills: parallel scan lines clipped to the polygon.
//!
//! The polygon is rotated about its centroid so the scan direction becomes
//! +X, scanned row by row, and the chords are rotated back. Rows start one
//! inset from the bounding box and step by the (possibly adapted) step-over.

use weldpath_math::{Point2, Point3};
use weldpath_slicer::{rotate_point, segments_cross, BeadSettings, Polygon, DEFAULT_STEP_RATIO};

use crate::error::{Result, StrategyError};
use crate::fill::{FillInput, FillPath, StrategyKind, WeldLine};
use crate::settings::SelectionPolicy;

/// How consecutive chords are joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterStitch {
    /// Every chord is its own bead.
    Discrete,
    /// All chords run the same way, joined end to start.
    Continuous,
    /// Chords alternate direction (serpentine).
    Zigzag,
}

impl RasterStitch {
    fn kind(self) -> StrategyKind {
        match self {
            RasterStitch::Discrete => StrategyKind::RasterDiscrete,
            RasterStitch::Continuous => StrategyKind::RasterContinuous,
            RasterStitch::Zigzag => StrategyKind::RasterZigzag,
        }
    }
}

/// Points per chord in a generated raster line.
pub const CHORD_POINTS: usize = 3;

/// Slack on the inset ring so rows placed exactly one inset from the
/// bounding box still cut it.
const INSET_SLACK: f64 = 1e-6;

/// A clipped scan chord: start, midpoint and end.
pub type Chord = [Point2; CHORD_POINTS];

/// Chords of one raster grouped by row, bottom row first.
#[derive(Debug, Clone)]
pub struct RasterChords {
    /// Rows of chords, each ordered along the scan direction.
    pub rows: Vec<Vec<Chord>>,
    /// Step-over used between rows.
    pub step_over: f64,
}

impl RasterChords {
    /// Total number of chords.
    pub fn len(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }

    /// True when no chord fits.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Step-over to use for a raster spanning `span` across its rows.
///
/// Near-convex polygons at 0 and 90 degrees search step-overs from `p` down
/// to two thirds of the bead width in 0.01 steps, keeping the one whose whole
/// number of rows spans the most of the inset width.
pub fn adapted_step_over(
    polygon: &Polygon,
    span: f64,
    angle_deg: f64,
    bead: &BeadSettings,
    policy: &SelectionPolicy,
) -> f64 {
    let p = bead.step_over;
    let index = (polygon.convexity_index() * 100.0).round() / 100.0;
    let applies = (angle_deg.abs() < 1e-9 && index > policy.adaptive_convexity_0)
        || ((angle_deg - 90.0).abs() < 1e-9 && index > policy.adaptive_convexity_90);
    let width = span - 2.0 * bead.inset;
    if !applies || width <= 0.0 {
        return p;
    }

    let p_min = (p / DEFAULT_STEP_RATIO) * (2.0 / 3.0);
    let mut best = p;
    let mut best_cover = 0.0;
    let mut k = 0usize;
    loop {
        let candidate = p - k as f64 * 0.01;
        if candidate < p_min - 1e-12 || candidate <= 0.0 {
            break;
        }
        let rows = (width / candidate + 1e-9).floor();
        let cover = rows * candidate;
        if cover > best_cover + 1e-12 {
            best_cover = cover;
            best = candidate;
        }
        k += 1;
    }
    best
}

/// Scan the polygon at `angle_deg` and clip chords to it.
pub fn scan_chords(
    polygon: &Polygon,
    angle_deg: f64,
    bead: &BeadSettings,
    policy: &SelectionPolicy,
) -> Result<RasterChords> {
    if !angle_deg.is_finite() || !(0.0..180.0).contains(&angle_deg) {
        return Err(StrategyError::InvalidAngle(angle_deg));
    }
    if polygon.len() < 3 || polygon.area() < 1e-9 {
        return Err(StrategyError::GeometryDegenerate(
            "raster polygon has no area".into(),
        ));
    }

    let center = polygon.centroid();
    let theta = angle_deg.to_radians();
    let local = polygon.rotated(-theta, &center);
    let Some((min, max)) = local.bounds() else {
        return Err(StrategyError::GeometryDegenerate("empty polygon".into()));
    };

    let o = bead.inset;
    let p = adapted_step_over(polygon, max.y - min.y, angle_deg, bead, policy);
    let first = min.y + o;
    let last = max.y - o;

    let mut ys = Vec::new();
    let mut k = 0usize;
    loop {
        let y = first + k as f64 * p;
        if y > last + 1e-9 {
            break;
        }
        ys.push(y);
        k += 1;
    }
    if let Some(&top) = ys.last() {
        if last - top > p / 4.0 {
            ys.push(last);
        }
    }

    // Off-axis rows are clipped against the inset ring itself; pulling the
    // chord ends back along the row only insets walls normal to it.
    let clip: Option<Vec<Polygon>> = (angle_deg != 0.0).then(|| {
        polygon
            .offset(o - INSET_SLACK)
            .iter()
            .map(|ring| ring.rotated(-theta, &center))
            .collect()
    });

    let rows = ys
        .iter()
        .map(|&y| {
            row_chords(&local, clip.as_deref(), y, o)
                .into_iter()
                .map(|chord| chord.map(|q| rotate_point(&q, theta, &center)))
                .collect::<Vec<Chord>>()
        })
        .filter(|row| !row.is_empty())
        .collect();

    Ok(RasterChords { rows, step_over: p })
}

/// Chords of the horizontal line at `y`.
///
/// Without `clip` the chords of `polygon` are shrunk by `inset` at both
/// ends; with it the line is cut by the clip rings as they are. Either way
/// a chord must stay inside `polygon`.
fn row_chords(polygon: &Polygon, clip: Option<&[Polygon]>, y: f64, inset: f64) -> Vec<Chord> {
    let (rings, inset) = match clip {
        Some(rings) => (rings, 0.0),
        None => (std::slice::from_ref(polygon), inset),
    };
    let mut xs: Vec<f64> = rings
        .iter()
        .flat_map(Polygon::edges)
        .filter(|(a, b)| (a.y > y) != (b.y > y))
        .map(|(a, b)| a.x + (y - a.y) * (b.x - a.x) / (b.y - a.y))
        .collect();
    xs.sort_by(f64::total_cmp);

    xs.chunks_exact(2)
        .filter_map(|pair| {
            let start = Point2::new(pair[0] + inset, y);
            let end = Point2::new(pair[1] - inset, y);
            if end.x - start.x <= 1e-9 {
                return None;
            }
            let mid = Point2::new((start.x + end.x) / 2.0, y);
            if !polygon.contains(&mid) || crosses_boundary(polygon, &start, &end) {
                return None;
            }
            Some([start, mid, end])
        })
        .collect()
}

fn crosses_boundary(polygon: &Polygon, a: &Point2, b: &Point2) -> bool {
    polygon.edges().any(|(e0, e1)| segments_cross(a, b, &e0, &e1))
}

/// A connector stays inside when it crosses no edge and its midpoint is inside.
pub(crate) fn connector_inside(polygon: &Polygon, a: &Point2, b: &Point2) -> bool {
    let mid = Point2::from((a.coords + b.coords) / 2.0);
    polygon.contains(&mid) && !crosses_boundary(polygon, a, b)
}

/// Generate a raster fill.
pub fn generate(input: &FillInput<'_>, angle_deg: f64, stitch: RasterStitch) -> Result<FillPath> {
    let kind = stitch.kind();
    let chords = scan_chords(input.polygon, angle_deg, input.bead, input.policy)?;
    if chords.is_empty() {
        return Err(StrategyError::Infeasible(
            kind,
            format!("no chord fits at {angle_deg} degrees"),
        ));
    }

    let ordered: Vec<Chord> = chords
        .rows
        .iter()
        .enumerate()
        .flat_map(|(r, row)| {
            let flip = stitch == RasterStitch::Zigzag && r % 2 == 1;
            let row: Vec<Chord> = if flip {
                row.iter()
                    .rev()
                    .map(|&[a, m, b]| [b, m, a])
                    .collect()
            } else {
                row.clone()
            };
            row
        })
        .collect();

    let lift = |chord: &Chord| -> Vec<Point3> {
        let start = input.heights.lift(&chord[0]);
        let end = input.heights.lift(&chord[2]);
        let mid = Point3::new(chord[1].x, chord[1].y, (start.z + end.z) / 2.0);
        vec![start, mid, end]
    };

    let mut lines: Vec<WeldLine> = Vec::new();
    let mut previous: Option<Point2> = None;
    for chord in &ordered {
        let points = lift(chord);
        let joined = stitch != RasterStitch::Discrete
            && previous.is_some_and(|end| connector_inside(input.polygon, &end, &chord[0]));
        match lines.last_mut() {
            Some(line) if joined => line.points.extend(points),
            _ => lines.push(WeldLine::new(points, kind)),
        }
        previous = Some(chord[2]);
    }

    Ok(FillPath {
        kind,
        angle: angle_deg,
        lines,
        step_over_used: chords.step_over,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fill::HeightField;

    fn square(size: f64) -> Polygon {
        Polygon::rectangle(Point2::origin(), Point2::new(size, size))
    }

    fn u_shape() -> Polygon {
        Polygon::new(vec![
            Point2::new(0.0, 0.0),
            Point2::new(30.0, 0.0),
            Point2::new(30.0, 30.0),
            Point2::new(20.0, 30.0),
            Point2::new(20.0, 10.0),
            Point2::new(10.0, 10.0),
            Point2::new(10.0, 30.0),
            Point2::new(0.0, 30.0),
        ])
    }

    fn run(polygon: &Polygon, bead: &BeadSettings, angle: f64, stitch: RasterStitch) -> Result<FillPath> {
        let heights = HeightField::flat(0.0);
        let policy = SelectionPolicy::default();
        let input = FillInput {
            polygon,
            heights: &heights,
            bead,
            policy: &policy,
        };
        generate(&input, angle, stitch)
    }

    #[test]
    fn test_square_rows_inside() {
        let bead = BeadSettings {
            step_over: 3.5,
            ..Default::default()
        };
        let poly = square(20.0);
        let path = run(&poly, &bead, 0.0, RasterStitch::Discrete).unwrap();
        let expected = ((20.0 - 2.0 * bead.inset) / 3.5).floor() as usize;
        assert!(path.elements() >= expected);
        for line in &path.lines {
            assert_eq!(line.points.len(), 3);
            for p in &line.points {
                assert!(poly.contains(&Point2::new(p.x, p.y)));
            }
        }
    }

    #[test]
    fn test_adapted_step_over_fills_width() {
        let bead = BeadSettings::default();
        let poly = square(20.0);
        let p = adapted_step_over(&poly, 20.0, 0.0, &bead, &SelectionPolicy::default());
        assert!((p - 3.4).abs() < 1e-6);
        // Not adapted at other angles.
        let p45 = adapted_step_over(&poly, 20.0, 45.0, &bead, &SelectionPolicy::default());
        assert_eq!(p45, bead.step_over);
    }

    #[test]
    fn test_slanted_chords_keep_inset() {
        let bead = BeadSettings::default();
        let triangle = Polygon::new(vec![
            Point2::new(0.0, 0.0),
            Point2::new(40.0, 0.0),
            Point2::new(0.0, 40.0),
        ]);
        for angle in [30.0, 45.0, 120.0] {
            let path = run(&triangle, &bead, angle, RasterStitch::Discrete).unwrap();
            assert!(path.elements() > 3);
            for line in &path.lines {
                for p in [line.points[0], line.points[2]] {
                    let d = triangle.boundary_distance(&Point2::new(p.x, p.y));
                    assert!(d >= bead.inset - 1e-4, "{angle}: end {p:?} only {d} from the wall");
                }
            }
        }
    }

    #[test]
    fn test_vertical_raster() {
        let bead = BeadSettings::default();
        let path = run(&square(20.0), &bead, 90.0, RasterStitch::Discrete).unwrap();
        for line in &path.lines {
            let (a, b) = (line.points[0], line.points[2]);
            assert!((a.x - b.x).abs() < 1e-9);
        }
    }

    #[test]
    fn test_invalid_angle() {
        let bead = BeadSettings::default();
        let err = run(&square(20.0), &bead, 180.0, RasterStitch::Discrete).unwrap_err();
        assert!(matches!(err, StrategyError::InvalidAngle(_)));
        assert!(run(&square(20.0), &bead, -5.0, RasterStitch::Discrete).is_err());
    }

    #[test]
    fn test_inset_wider_than_polygon() {
        let bead = BeadSettings::default();
        let err = run(&square(2.5), &bead, 0.0, RasterStitch::Discrete).unwrap_err();
        assert!(matches!(
            err,
            StrategyError::Infeasible(StrategyKind::RasterDiscrete, _)
        ));
    }

    #[test]
    fn test_continuous_and_zigzag_single_bead_on_square() {
        let bead = BeadSettings::default();
        let poly = square(20.0);
        let cont = run(&poly, &bead, 0.0, RasterStitch::Continuous).unwrap();
        let zig = run(&poly, &bead, 0.0, RasterStitch::Zigzag).unwrap();
        assert_eq!(cont.elements(), 1);
        assert_eq!(zig.elements(), 1);

        // Continuous rows all run +X; zigzag rows alternate.
        let pts = &cont.lines[0].points;
        assert!(pts[2].x > pts[0].x && pts[5].x > pts[3].x);
        let pts = &zig.lines[0].points;
        assert!(pts[2].x > pts[0].x && pts[5].x < pts[3].x);
    }

    #[test]
    fn test_connector_leaving_polygon_breaks_bead() {
        let bead = BeadSettings::default();
        let path = run(&u_shape(), &bead, 0.0, RasterStitch::Zigzag).unwrap();
        assert!(path.elements() > 1);
        for line in &path.lines {
            for w in line.points.windows(2) {
                let a = Point2::new(w[0].x, w[0].y);
                let b = Point2::new(w[1].x, w[1].y);
                assert!(connector_inside(&u_shape(), &a, &b));
            }
        }
    }
}
