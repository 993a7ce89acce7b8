//! Splitting a contour into sub-polygons along interior cut lines.
//!
//! Candidate endpoints come from [`points_concaves`]. Every pair forms a
//! candidate line, lines that leave the polygon are dropped, and the rest are
//! ranked by how convex and balanced the two resulting pieces are.

use serde::{Deserialize, Serialize};
use tracing::debug;
use weldpath_math::Point2;
use weldpath_slicer::{segments_cross, Polygon};

use crate::concavity::points_concaves;

/// Length trimmed from each end of a candidate before the inside test.
pub const CUT_TRIM: f64 = 0.95;

/// Distance under which a cut endpoint counts as lying on the boundary.
const ON_BOUNDARY: f64 = 1e-6;

/// A straight cut between two boundary points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CutLine {
    /// First endpoint.
    pub a: Point2,
    /// Second endpoint.
    pub b: Point2,
}

impl CutLine {
    /// Cut from `a` to `b`.
    pub fn new(a: Point2, b: Point2) -> Self {
        Self { a, b }
    }

    /// Segment length.
    pub fn length(&self) -> f64 {
        (self.b - self.a).norm()
    }

    /// Same segment regardless of direction.
    pub fn coincides(&self, other: &CutLine) -> bool {
        let eq = |p: &Point2, q: &Point2| (p - q).norm() < 1e-9;
        (eq(&self.a, &other.a) && eq(&self.b, &other.b))
            || (eq(&self.a, &other.b) && eq(&self.b, &other.a))
    }
}

/// A candidate cut with its convexity coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankedCut {
    /// The cut.
    pub line: CutLine,
    /// Coefficient of the smaller piece.
    pub ci_small: f64,
    /// Coefficient of the larger piece.
    pub ci_large: f64,
    /// Mean coefficient rounded to two decimals.
    pub score: f64,
}

/// Pairwise cut candidates that stay strictly inside `polygon`.
pub fn filter_lines(points: &[Point2], polygon: &Polygon) -> Vec<CutLine> {
    let mut lines: Vec<CutLine> = Vec::new();
    for (i, a) in points.iter().enumerate() {
        for b in &points[i + 1..] {
            let line = CutLine::new(*a, *b);
            if line.length() <= 2.0 * CUT_TRIM || !trimmed_inside(&line, polygon) {
                continue;
            }
            if !lines.iter().any(|l| l.coincides(&line)) {
                lines.push(line);
            }
        }
    }
    lines
}

fn trimmed_inside(line: &CutLine, polygon: &Polygon) -> bool {
    let dir = (line.b - line.a) / line.length();
    let a = line.a + dir * CUT_TRIM;
    let b = line.b - dir * CUT_TRIM;
    let mid = Point2::from((a.coords + b.coords) / 2.0);
    polygon.contains(&a)
        && polygon.contains(&b)
        && polygon.contains(&mid)
        && !polygon.edges().any(|(p, q)| segments_cross(&a, &b, &p, &q))
}

/// Rank `lines` by the convexity of the pieces they produce and keep the best `n`.
///
/// `Ci = area² / (piece_hull_area · whole_hull_area)`, averaged over the
/// smaller and larger piece. When every candidate ties, the smaller piece's
/// coefficient decides.
pub fn cut_coefficient(polygon: &Polygon, lines: &[CutLine], n: usize) -> Vec<RankedCut> {
    let whole_hull = polygon.hull_area();
    if whole_hull <= 0.0 {
        return Vec::new();
    }
    let ci = |piece: &Polygon| {
        let hull = piece.hull_area();
        if hull <= 0.0 {
            0.0
        } else {
            piece.area() * piece.area() / (hull * whole_hull)
        }
    };

    let mut ranked: Vec<RankedCut> = lines
        .iter()
        .filter_map(|line| {
            let (first, second) = split_by_chord(polygon, line)?;
            let (small, large) = if first.area() <= second.area() {
                (first, second)
            } else {
                (second, first)
            };
            let ci_small = ci(&small);
            let ci_large = ci(&large);
            Some(RankedCut {
                line: *line,
                ci_small,
                ci_large,
                score: round2((ci_small + ci_large) / 2.0),
            })
        })
        .collect();

    let all_tied = ranked.windows(2).all(|w| w[0].score == w[1].score);
    if all_tied {
        ranked.sort_by(|a, b| b.ci_small.total_cmp(&a.ci_small));
    } else {
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    }
    ranked.truncate(n);
    ranked
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Position of `q` along the ring as `edge + t`, if it lies on the boundary.
fn ring_position(points: &[Point2], q: &Point2) -> Option<f64> {
    let n = points.len();
    let mut best: Option<(f64, f64)> = None;
    for i in 0..n {
        let a = points[i];
        let b = points[(i + 1) % n];
        let ab = b - a;
        let len2 = ab.norm_squared();
        let t = if len2 > 0.0 {
            ((q - a).dot(&ab) / len2).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let d = (q - (a + ab * t)).norm();
        if best.map_or(true, |(bd, _)| d < bd) {
            let key = if t > 1.0 - 1e-9 {
                ((i + 1) % n) as f64
            } else {
                i as f64 + t
            };
            best = Some((d, key));
        }
    }
    best.filter(|(d, _)| *d < ON_BOUNDARY).map(|(_, key)| key)
}

/// Split `polygon` along a chord whose endpoints lie on its boundary.
///
/// Returns `None` when an endpoint is off the boundary or either piece is
/// degenerate.
pub fn split_by_chord(polygon: &Polygon, line: &CutLine) -> Option<(Polygon, Polygon)> {
    let ka = ring_position(&polygon.points, &line.a)?;
    let kb = ring_position(&polygon.points, &line.b)?;
    if (ka - kb).abs() < 1e-9 {
        return None;
    }

    let mut ring: Vec<(f64, Point2)> = polygon
        .points
        .iter()
        .enumerate()
        .map(|(i, p)| (i as f64, *p))
        .collect();
    for (key, point) in [(ka, line.a), (kb, line.b)] {
        if !ring.iter().any(|(k, _)| (k - key).abs() < 1e-9) {
            ring.push((key, point));
        }
    }
    ring.sort_by(|x, y| x.0.total_cmp(&y.0));

    let index_of = |key: f64| ring.iter().position(|(k, _)| (k - key).abs() < 1e-9);
    let (ia, ib) = (index_of(ka)?, index_of(kb)?);
    let (lo, hi) = (ia.min(ib), ia.max(ib));

    let first = Polygon::new(ring[lo..=hi].iter().map(|(_, p)| *p).collect());
    let second = Polygon::new(
        ring[hi..]
            .iter()
            .chain(&ring[..=lo])
            .map(|(_, p)| *p)
            .collect(),
    );
    if first.len() < 3 || second.len() < 3 || first.area() < 1e-9 || second.area() < 1e-9 {
        return None;
    }
    Some((first.to_ccw(), second.to_ccw()))
}

/// Apply `lines` in order and return the resulting pieces.
///
/// Each line splits whichever current piece contains its midpoint. Pieces
/// whose centroid falls outside `polygon` are discarded.
pub fn gen_subplot(lines: &[CutLine], polygon: &Polygon) -> Vec<Polygon> {
    let mut pieces = vec![polygon.to_ccw()];
    for line in lines {
        let mid = Point2::from((line.a.coords + line.b.coords) / 2.0);
        let Some(i) = pieces.iter().position(|p| p.contains(&mid)) else {
            continue;
        };
        if let Some((first, second)) = split_by_chord(&pieces[i], line) {
            pieces.swap_remove(i);
            pieces.push(first);
            pieces.push(second);
        }
    }
    pieces.retain(|p| polygon.contains(&p.centroid()));
    pieces
}

/// Split `polygon` with its best `cuts` lines.
///
/// Returns an empty list when no interior cut exists.
pub fn partition(polygon: &Polygon, cuts: usize) -> Vec<Polygon> {
    let ring = polygon.to_ccw();
    let points = points_concaves(&ring);
    let lines = filter_lines(&points, &ring);
    let ranked = cut_coefficient(&ring, &lines, cuts);
    debug!(
        candidates = points.len(),
        lines = lines.len(),
        chosen = ranked.len(),
        "partition"
    );
    if ranked.is_empty() {
        return Vec::new();
    }
    let chosen: Vec<CutLine> = ranked.iter().map(|r| r.line).collect();
    gen_subplot(&chosen, &ring)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn l_shape() -> Polygon {
        Polygon::new(vec![
            Point2::new(0.0, 0.0),
            Point2::new(40.0, 0.0),
            Point2::new(40.0, 15.0),
            Point2::new(15.0, 15.0),
            Point2::new(15.0, 40.0),
            Point2::new(0.0, 40.0),
        ])
    }

    fn square(size: f64) -> Polygon {
        Polygon::rectangle(Point2::origin(), Point2::new(size, size))
    }

    #[test]
    fn test_split_square_diagonal() {
        let sq = square(10.0);
        let line = CutLine::new(Point2::origin(), Point2::new(10.0, 10.0));
        let (a, b) = split_by_chord(&sq, &line).unwrap();
        assert!((a.area() - 50.0).abs() < 1e-9);
        assert!((b.area() - 50.0).abs() < 1e-9);
        assert!(a.is_ccw() && b.is_ccw());
    }

    #[test]
    fn test_split_inserts_edge_points() {
        let sq = square(10.0);
        let line = CutLine::new(Point2::new(4.0, 0.0), Point2::new(4.0, 10.0));
        let (a, b) = split_by_chord(&sq, &line).unwrap();
        let mut areas = [a.area(), b.area()];
        areas.sort_by(f64::total_cmp);
        assert!((areas[0] - 40.0).abs() < 1e-9);
        assert!((areas[1] - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_split_rejects_interior_endpoint() {
        let line = CutLine::new(Point2::new(5.0, 5.0), Point2::new(10.0, 10.0));
        assert!(split_by_chord(&square(10.0), &line).is_none());
    }

    #[test]
    fn test_filter_rejects_outside_and_boundary_lines() {
        let l = l_shape();
        let points = [
            Point2::new(40.0, 15.0),
            Point2::new(15.0, 40.0),
            Point2::new(15.0, 15.0),
            Point2::new(0.0, 15.0),
        ];
        let lines = filter_lines(&points, &l);
        // (40,15)-(15,40) leaves the L; (40,15)-(15,15) runs along an edge.
        assert!(lines
            .iter()
            .all(|l| !l.coincides(&CutLine::new(points[0], points[1]))));
        assert!(lines
            .iter()
            .all(|l| !l.coincides(&CutLine::new(points[0], points[2]))));
        assert!(lines
            .iter()
            .any(|l| l.coincides(&CutLine::new(points[2], points[3]))));
    }

    #[test]
    fn test_filter_dedups() {
        let sq = square(10.0);
        let points = [Point2::origin(), Point2::new(10.0, 10.0), Point2::origin()];
        assert_eq!(filter_lines(&points, &sq).len(), 1);
    }

    #[test]
    fn test_coefficient_prefers_balanced_convex_cut() {
        let l = l_shape();
        let clean = CutLine::new(Point2::new(15.0, 15.0), Point2::new(0.0, 15.0));
        let corner = CutLine::new(Point2::new(0.0, 20.0), Point2::new(20.0, 0.0));
        let ranked = cut_coefficient(&l, &[corner, clean], 1);
        assert_eq!(ranked.len(), 1);
        assert!(ranked[0].line.coincides(&clean));
    }

    #[test]
    fn test_partition_l_shape_preserves_area() {
        let l = l_shape();
        let pieces = partition(&l, 1);
        assert_eq!(pieces.len(), 2);
        let total: f64 = pieces.iter().map(Polygon::area).sum();
        assert!((total - l.area()).abs() / l.area() < 1e-3);
        assert!(pieces.iter().all(|p| p.area() < l.area()));
    }

    #[test]
    fn test_gen_subplot_two_cuts() {
        let sq = square(30.0);
        let lines = [
            CutLine::new(Point2::new(10.0, 0.0), Point2::new(10.0, 30.0)),
            CutLine::new(Point2::new(20.0, 0.0), Point2::new(20.0, 30.0)),
        ];
        let pieces = gen_subplot(&lines, &sq);
        assert_eq!(pieces.len(), 3);
        for p in &pieces {
            assert!((p.area() - 300.0).abs() < 1e-9);
        }
    }
}
