//! Planar polygon type shared by the slicer and the fill strategies.

use std::panic::{self, AssertUnwindSafe};

use cavalier_contours::polyline::{PlineSource, PlineSourceMut, PlineVertex, Polyline};
use geo::{Area, ConvexHull, Coord, LineString};
use serde::{Deserialize, Serialize};
use tracing::warn;
use weldpath_math::{Point2, Vec2};

/// Angular step used when flattening offset arcs.
const ARC_STEP: f64 = std::f64::consts::PI / 16.0;

/// A 2D polygon (closed path, no repeated closing vertex).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    /// Vertices of the polygon in order.
    pub points: Vec<Point2>,
}

impl Polygon {
    /// Create a new polygon from points.
    ///
    /// A trailing vertex equal to the first one is dropped.
    pub fn new(mut points: Vec<Point2>) -> Self {
        if points.len() > 1 && (points[0] - points[points.len() - 1]).norm() < 1e-12 {
            points.pop();
        }
        Self { points }
    }

    /// Axis-aligned rectangle with corners `min` and `max`, counter-clockwise.
    pub fn rectangle(min: Point2, max: Point2) -> Self {
        Self::new(vec![
            min,
            Point2::new(max.x, min.y),
            max,
            Point2::new(min.x, max.y),
        ])
    }

    /// Check if the polygon is empty.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of vertices.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Signed area of the polygon.
    /// Positive for counter-clockwise, negative for clockwise.
    pub fn signed_area(&self) -> f64 {
        let n = self.points.len();
        if n < 3 {
            return 0.0;
        }
        let mut area = 0.0;
        for i in 0..n {
            let j = (i + 1) % n;
            area += self.points[i].x * self.points[j].y;
            area -= self.points[j].x * self.points[i].y;
        }
        area / 2.0
    }

    /// Unsigned area.
    pub fn area(&self) -> f64 {
        self.signed_area().abs()
    }

    /// Is the polygon counter-clockwise?
    pub fn is_ccw(&self) -> bool {
        self.signed_area() > 0.0
    }

    /// Reverse the winding order.
    pub fn reverse(&mut self) {
        self.points.reverse();
    }

    /// Ensure counter-clockwise winding.
    pub fn ensure_ccw(&mut self) {
        if !self.is_ccw() {
            self.reverse();
        }
    }

    /// Ensure clockwise winding.
    pub fn ensure_cw(&mut self) {
        if self.is_ccw() {
            self.reverse();
        }
    }

    /// Counter-clockwise copy.
    pub fn to_ccw(&self) -> Self {
        let mut p = self.clone();
        p.ensure_ccw();
        p
    }

    /// Perimeter length.
    pub fn perimeter(&self) -> f64 {
        let n = self.points.len();
        if n < 2 {
            return 0.0;
        }
        let mut length = 0.0;
        for i in 0..n {
            let j = (i + 1) % n;
            length += (self.points[j] - self.points[i]).norm();
        }
        length
    }

    /// Area centroid. Falls back to the vertex mean for degenerate polygons.
    pub fn centroid(&self) -> Point2 {
        let n = self.points.len();
        if n == 0 {
            return Point2::origin();
        }
        let a = self.signed_area();
        if a.abs() < 1e-12 {
            let sum = self
                .points
                .iter()
                .fold(Vec2::zeros(), |acc, p| acc + p.coords);
            return Point2::from(sum / n as f64);
        }
        let mut cx = 0.0;
        let mut cy = 0.0;
        for i in 0..n {
            let p = self.points[i];
            let q = self.points[(i + 1) % n];
            let cross = p.x * q.y - q.x * p.y;
            cx += (p.x + q.x) * cross;
            cy += (p.y + q.y) * cross;
        }
        Point2::new(cx / (6.0 * a), cy / (6.0 * a))
    }

    /// Bounding box as `(min, max)`.
    pub fn bounds(&self) -> Option<(Point2, Point2)> {
        let first = self.points.first()?;
        let mut min = *first;
        let mut max = *first;
        for p in &self.points {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
        }
        Some((min, max))
    }

    /// Check if a point is inside the polygon (ray casting).
    pub fn contains(&self, point: &Point2) -> bool {
        let n = self.points.len();
        if n < 3 {
            return false;
        }

        let mut inside = false;
        let mut j = n - 1;

        for i in 0..n {
            let pi = &self.points[i];
            let pj = &self.points[j];

            if ((pi.y > point.y) != (pj.y > point.y))
                && (point.x < (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y) + pi.x)
            {
                inside = !inside;
            }
            j = i;
        }

        inside
    }

    /// Distance from a point to the polygon boundary.
    pub fn boundary_distance(&self, point: &Point2) -> f64 {
        self.edges()
            .map(|(a, b)| segment_distance(point, &a, &b))
            .fold(f64::MAX, f64::min)
    }

    /// Iterate edges as `(start, end)` pairs, closing back to the first vertex.
    pub fn edges(&self) -> impl Iterator<Item = (Point2, Point2)> + '_ {
        let n = self.points.len();
        (0..n).map(move |i| (self.points[i], self.points[(i + 1) % n]))
    }

    /// Area of the convex hull.
    pub fn hull_area(&self) -> f64 {
        if self.points.len() < 3 {
            return 0.0;
        }
        self.to_geo().convex_hull().unsigned_area()
    }

    /// Ratio of area to convex hull area (1.0 for convex shapes).
    pub fn convexity_index(&self) -> f64 {
        let hull = self.hull_area();
        if hull <= 0.0 {
            return 0.0;
        }
        (self.area() / hull).min(1.0)
    }

    /// Rotate every vertex by `angle` radians about `center`.
    pub fn rotated(&self, angle: f64, center: &Point2) -> Self {
        Self {
            points: self
                .points
                .iter()
                .map(|p| rotate_point(p, angle, center))
                .collect(),
        }
    }

    /// Convert to a closed geo polygon without holes.
    pub fn to_geo(&self) -> geo::Polygon<f64> {
        let mut coords: Vec<Coord<f64>> = self
            .points
            .iter()
            .map(|p| Coord { x: p.x, y: p.y })
            .collect();
        if let Some(first) = coords.first().copied() {
            coords.push(first);
        }
        geo::Polygon::new(LineString::from(coords), vec![])
    }

    /// Build from a geo ring, dropping the closing coordinate.
    pub fn from_ring(ring: &LineString<f64>) -> Self {
        Self::new(ring.coords().map(|c| Point2::new(c.x, c.y)).collect())
    }

    /// Offset the polygon. Positive distance shrinks, negative grows.
    ///
    /// Shrinking may split the polygon into several islands or remove it
    /// entirely; every returned polygon is counter-clockwise.
    pub fn offset(&self, distance: f64) -> Vec<Polygon> {
        if self.points.len() < 3 || self.area() < 1e-12 {
            return Vec::new();
        }
        if distance.abs() < 1e-12 {
            return vec![self.to_ccw()];
        }

        let pline = self.to_ccw().to_pline();
        let original = self.area();

        // Winding convention is checked against the area change.
        let first = offset_pline(&pline, distance);
        let total: f64 = first.iter().map(Polygon::area).sum();
        let consistent = if distance > 0.0 {
            total < original
        } else {
            total > original
        };
        if consistent {
            return first;
        }
        offset_pline(&pline, -distance)
    }

    fn to_pline(&self) -> Polyline<f64> {
        let mut pline = Polyline::new();
        let mut last: Option<Point2> = None;
        for p in &self.points {
            if last.is_some_and(|l| (l - p).norm() < 1e-9) {
                continue;
            }
            pline.add_vertex(PlineVertex::new(p.x, p.y, 0.0));
            last = Some(*p);
        }
        if pline.vertex_count() > 1 {
            let first = pline.at(0);
            let end = pline.at(pline.vertex_count() - 1);
            if (first.x - end.x).abs() < 1e-9 && (first.y - end.y).abs() < 1e-9 {
                pline.remove_last();
            }
        }
        pline.set_is_closed(true);
        pline
    }
}

fn offset_pline(pline: &Polyline<f64>, delta: f64) -> Vec<Polygon> {
    match panic::catch_unwind(AssertUnwindSafe(|| pline.parallel_offset(delta))) {
        Ok(results) => results
            .iter()
            .map(pline_to_polygon)
            .filter(|p| p.len() >= 3 && p.area() > 1e-12)
            .map(|mut p| {
                p.ensure_ccw();
                p
            })
            .collect(),
        Err(_) => {
            warn!(delta, "polygon offset panicked; treating result as empty");
            Vec::new()
        }
    }
}

/// Flatten a closed cavalier polyline (with arc bulges) into a polygon.
fn pline_to_polygon(pline: &Polyline<f64>) -> Polygon {
    let count = pline.vertex_count();
    let mut points = Vec::with_capacity(count * 2);
    for i in 0..count {
        let v1 = pline.at(i);
        let v2 = pline.at((i + 1) % count);
        points.push(Point2::new(v1.x, v1.y));
        if v1.bulge.abs() > 1e-9 {
            flatten_arc(
                Point2::new(v1.x, v1.y),
                Point2::new(v2.x, v2.y),
                v1.bulge,
                &mut points,
            );
        }
    }
    Polygon::new(points)
}

/// Push the interior points of a bulge arc from `a` to `b`.
fn flatten_arc(a: Point2, b: Point2, bulge: f64, out: &mut Vec<Point2>) {
    let chord = b - a;
    let c = chord.norm();
    if c < 1e-12 {
        return;
    }
    let sweep = 4.0 * bulge.atan();
    let mid = Point2::from((a.coords + b.coords) / 2.0);
    let left = Vec2::new(-chord.y, chord.x) / c;
    let center = mid + left * ((c / 2.0) / (sweep / 2.0).tan());
    let radius = (a - center).norm();
    let start = (a.y - center.y).atan2(a.x - center.x);
    let steps = (sweep.abs() / ARC_STEP).ceil().max(1.0) as usize;
    for j in 1..steps {
        let angle = start + sweep * j as f64 / steps as f64;
        out.push(Point2::new(
            center.x + radius * angle.cos(),
            center.y + radius * angle.sin(),
        ));
    }
}

/// Rotate `p` by `angle` radians about `center`.
pub fn rotate_point(p: &Point2, angle: f64, center: &Point2) -> Point2 {
    let (s, c) = angle.sin_cos();
    let d = p - center;
    Point2::new(center.x + d.x * c - d.y * s, center.y + d.x * s + d.y * c)
}

/// Distance from `p` to the segment `a`-`b`.
pub fn segment_distance(p: &Point2, a: &Point2, b: &Point2) -> f64 {
    let ab = b - a;
    let len2 = ab.norm_squared();
    if len2 < 1e-24 {
        return (p - a).norm();
    }
    let t = ((p - a).dot(&ab) / len2).clamp(0.0, 1.0);
    (p - (a + ab * t)).norm()
}

/// Proper intersection test between segments `a1`-`a2` and `b1`-`b2`.
///
/// Touching at endpoints does not count.
pub fn segments_cross(a1: &Point2, a2: &Point2, b1: &Point2, b2: &Point2) -> bool {
    fn orient(p: &Point2, q: &Point2, r: &Point2) -> f64 {
        (q.x - p.x) * (r.y - p.y) - (q.y - p.y) * (r.x - p.x)
    }
    let eps = 1e-12;
    let d1 = orient(b1, b2, a1);
    let d2 = orient(b1, b2, a2);
    let d3 = orient(a1, a2, b1);
    let d4 = orient(a1, a2, b2);
    ((d1 > eps && d2 < -eps) || (d1 < -eps && d2 > eps))
        && ((d3 > eps && d4 < -eps) || (d3 < -eps && d4 > eps))
}
