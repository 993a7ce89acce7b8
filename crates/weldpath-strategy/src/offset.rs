//! Contour-offset fills.
//!
//! Rings are produced by insetting the polygon by the bead inset and then by
//! the step-over, ring after ring, until a ring gets shorter than a quarter
//! bead width. When an inset splits a ring into several islands each island
//! is followed on its own. Rings are welded from the outside in.

use weldpath_math::{Point2, Point3};
use weldpath_slicer::{segments_cross, BeadSettings, Polygon};

use crate::error::{Result, StrategyError};
use crate::fill::{FillInput, FillPath, HeightField, StrategyKind, WeldLine};
use crate::raster::connector_inside;

/// Start points closer than this (xy) to the previous end are moved along the ring.
pub const SEAM_TOLERANCE: f64 = 1.0;

const MAX_RINGS: usize = 10_000;

/// One inset ring.
#[derive(Debug, Clone, PartialEq)]
pub struct OffsetRing {
    /// Ring geometry, counter-clockwise.
    pub polygon: Polygon,
    /// Number of insets applied after the first.
    pub depth: usize,
    /// Island label; a split starts new labels.
    pub island: usize,
    /// Ring this one was inset from.
    pub parent: Option<usize>,
}

/// All inset rings of `polygon`, parents before children.
pub fn offset_rings(polygon: &Polygon, bead: &BeadSettings) -> Vec<OffsetRing> {
    let min_length = bead.width / 4.0;
    let keep = |p: &Polygon| p.perimeter() >= min_length;

    let mut rings: Vec<OffsetRing> = Vec::new();
    let mut islands = 0usize;
    for first in polygon.offset(bead.inset).into_iter().filter(keep) {
        rings.push(OffsetRing {
            polygon: first,
            depth: 0,
            island: islands,
            parent: None,
        });
        islands += 1;
    }

    let mut cursor = 0;
    while cursor < rings.len() && rings.len() < MAX_RINGS {
        let next: Vec<Polygon> = rings[cursor]
            .polygon
            .offset(bead.step_over)
            .into_iter()
            .filter(keep)
            .collect();
        let split = next.len() > 1;
        for polygon in next {
            let island = if split {
                islands += 1;
                islands - 1
            } else {
                rings[cursor].island
            };
            rings.push(OffsetRing {
                polygon,
                depth: rings[cursor].depth + 1,
                island,
                parent: Some(cursor),
            });
        }
        cursor += 1;
    }
    rings
}

/// Ring indices grouped per island, outer ring first, islands in weld order.
///
/// An island becomes available once its parent island is done; among the
/// available ones the closest to the current position goes next.
pub fn ring_chains(rings: &[OffsetRing], start: Option<&Point2>) -> Vec<Vec<usize>> {
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); rings.len()];
    for (i, ring) in rings.iter().enumerate() {
        if let Some(parent) = ring.parent {
            children[parent].push(i);
        }
    }

    let chain_from = |head: usize| -> (Vec<usize>, Vec<usize>) {
        let mut chain = vec![head];
        let mut current = head;
        while children[current].len() == 1 {
            current = children[current][0];
            chain.push(current);
        }
        (chain, children[current].clone())
    };

    let mut pending: Vec<usize> = (0..rings.len())
        .filter(|&i| rings[i].parent.is_none())
        .collect();
    let mut position = start.copied();
    let mut chains = Vec::new();
    while !pending.is_empty() {
        let pick = match position {
            Some(pos) => pending
                .iter()
                .enumerate()
                .min_by(|a, b| {
                    let da = rings[*a.1].polygon.boundary_distance(&pos);
                    let db = rings[*b.1].polygon.boundary_distance(&pos);
                    da.total_cmp(&db)
                })
                .map(|(k, _)| k)
                .unwrap_or(0),
            None => 0,
        };
        let head = pending.remove(pick);
        let (chain, next) = chain_from(head);
        if let Some(&last) = chain.last() {
            position = rings[last].polygon.points.first().copied();
        }
        pending.extend(next);
        chains.push(chain);
    }
    chains
}

/// Closed ring walked along its vertices, with cumulative arc lengths.
struct RingWalk<'a> {
    points: &'a [Point2],
    start: usize,
    cumulative: Vec<f64>,
}

impl<'a> RingWalk<'a> {
    /// Walk starting at vertex `start`, covering the ring twice.
    fn new(points: &'a [Point2], start: usize) -> Self {
        let n = points.len();
        let mut cumulative = Vec::with_capacity(2 * n + 1);
        cumulative.push(0.0);
        for k in 0..2 * n {
            let a = points[(start + k) % n];
            let b = points[(start + k + 1) % n];
            cumulative.push(cumulative[k] + (b - a).norm());
        }
        Self {
            points,
            start,
            cumulative,
        }
    }

    fn perimeter(&self) -> f64 {
        self.cumulative[self.points.len()]
    }

    fn vertex(&self, k: usize) -> Point2 {
        self.points[(self.start + k) % self.points.len()]
    }

    fn point_at(&self, s: f64) -> Point2 {
        let last = self.cumulative.len() - 1;
        let k = self
            .cumulative
            .partition_point(|&c| c <= s)
            .clamp(1, last);
        let (c0, c1) = (self.cumulative[k - 1], self.cumulative[k]);
        let t = if c1 - c0 > 1e-12 { (s - c0) / (c1 - c0) } else { 0.0 };
        let a = self.vertex(k - 1);
        let b = self.vertex(k);
        a + (b - a) * t.clamp(0.0, 1.0)
    }

    /// Points from arc position `from` over `length`.
    fn section(&self, from: f64, length: f64) -> Vec<Point2> {
        let perimeter = self.perimeter();
        if perimeter <= 0.0 {
            return Vec::new();
        }
        let s0 = from.rem_euclid(perimeter);
        let s1 = s0 + length.clamp(0.0, perimeter);
        let mut out = vec![self.point_at(s0)];
        for (k, &c) in self.cumulative.iter().enumerate() {
            if c > s0 + 1e-9 && c < s1 - 1e-9 {
                out.push(self.vertex(k));
            }
        }
        out.push(self.point_at(s1));
        out
    }
}

fn nearest_vertex(points: &[Point2], to: &Point2) -> usize {
    points
        .iter()
        .enumerate()
        .min_by(|a, b| (a.1 - to).norm_squared().total_cmp(&(b.1 - to).norm_squared()))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Start vertex and arc offset for a ring entered from `cursor`.
fn seam_start(points: &[Point2], cursor: Option<&Point2>, shift: f64) -> (usize, f64) {
    match cursor {
        Some(c) => {
            let i = nearest_vertex(points, c);
            let from = if (points[i] - c).norm() < SEAM_TOLERANCE {
                shift
            } else {
                0.0
            };
            (i, from)
        }
        None => (0, 0.0),
    }
}

fn lift_all(heights: &HeightField, points: &[Point2]) -> Vec<Point3> {
    points.iter().map(|p| heights.lift(p)).collect()
}

fn xy(p: &Point3) -> Point2 {
    Point2::new(p.x, p.y)
}

/// Closed-contour offset: every ring is its own closed bead.
pub fn generate_closed(input: &FillInput<'_>, entry: Option<&Point3>) -> Result<FillPath> {
    let kind = StrategyKind::ContourDiscrete;
    let rings = offset_rings(input.polygon, input.bead);
    if rings.is_empty() {
        return Err(StrategyError::Infeasible(
            kind,
            "inset collapses the polygon".into(),
        ));
    }

    let mut cursor = entry.map(xy);
    let chains = ring_chains(&rings, cursor.as_ref());
    let mut lines = Vec::new();
    for index in chains.into_iter().flatten() {
        let points = &rings[index].polygon.points;
        let (start, from) = seam_start(points, cursor.as_ref(), input.bead.width);
        let walk = RingWalk::new(points, start);
        let ring = walk.section(from, walk.perimeter());
        cursor = ring.last().copied();
        lines.push(WeldLine::new(lift_all(input.heights, &ring), kind));
    }

    Ok(FillPath {
        kind,
        angle: 0.0,
        lines,
        step_over_used: input.bead.step_over,
    })
}

/// Two points across the longer bounding-box midline of a tiny ring.
fn collapse_ring(polygon: &Polygon) -> Vec<Point2> {
    let Some((min, max)) = polygon.bounds() else {
        return Vec::new();
    };
    let mid = Point2::from((min.coords + max.coords) / 2.0);
    if max.x - min.x >= max.y - min.y {
        vec![Point2::new(min.x, mid.y), Point2::new(max.x, mid.y)]
    } else {
        vec![Point2::new(mid.x, min.y), Point2::new(mid.x, max.y)]
    }
}

fn crosses_any(placed: &[Point2], a: &Point2, b: &Point2) -> bool {
    // The last placed segment ends at `a` and cannot be crossed properly.
    placed
        .windows(2)
        .any(|w| segments_cross(a, b, &w[0], &w[1]))
}

/// Spiral offset: rings of one island are trimmed and joined into one bead.
pub fn generate_spiral(input: &FillInput<'_>, entry: Option<&Point3>) -> Result<FillPath> {
    let kind = StrategyKind::ContourSpiral;
    let bead = input.bead;
    let (w, p) = (bead.width, bead.step_over);
    let loop_area = w * w * std::f64::consts::PI / 4.0;

    let rings = offset_rings(input.polygon, bead);
    if rings.is_empty() {
        return Err(StrategyError::Infeasible(
            kind,
            "inset collapses the polygon".into(),
        ));
    }

    let mut cursor = entry.map(xy);
    let chains = ring_chains(&rings, cursor.as_ref());
    let mut lines: Vec<WeldLine> = Vec::new();

    for chain in chains {
        let mut placed: Vec<Point2> = Vec::new();
        let mut segments: Vec<Vec<Point2>> = Vec::new();

        for (k, &index) in chain.iter().enumerate() {
            let polygon = &rings[index].polygon;
            let is_last = k + 1 == chain.len();

            let section = if polygon.area() < loop_area {
                collapse_ring(polygon)
            } else {
                let points = &polygon.points;
                let (start, from) = if placed.is_empty() {
                    seam_start(points, cursor.as_ref(), w)
                } else {
                    let advance = if is_last { p / 14.0 } else { p / 6.0 };
                    let end = placed.last().copied().unwrap_or(points[0]);
                    (nearest_vertex(points, &end), advance)
                };
                let walk = RingWalk::new(points, start);
                let perimeter = walk.perimeter();
                let trim = if is_last {
                    w / 8.0
                } else if perimeter < p {
                    w / 10.0
                } else {
                    w / 3.0
                };
                walk.section(from, (perimeter - trim).max(0.0))
            };
            let Some(first) = section.first().copied() else {
                continue;
            };

            let joined = placed.last().is_some_and(|end| {
                connector_inside(input.polygon, end, &first) && !crosses_any(&placed, end, &first)
            });
            placed.extend(section.iter().copied());
            match segments.last_mut() {
                Some(current) if joined => current.extend(section),
                _ => segments.push(section),
            }
        }

        cursor = placed.last().copied().or(cursor);
        lines.extend(
            segments
                .into_iter()
                .filter(|s| s.len() >= 2)
                .map(|s| WeldLine::new(lift_all(input.heights, &s), kind)),
        );
    }

    if lines.is_empty() {
        return Err(StrategyError::Infeasible(kind, "no ring survived trimming".into()));
    }
    Ok(FillPath {
        kind,
        angle: 0.0,
        lines,
        step_over_used: p,
    })
}
