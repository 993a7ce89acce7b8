//! Concave vertex detection.
//!
//! The ring is resampled by arc length and smoothed with a circular Gaussian
//! before turning angles are measured, so scan noise does not register as
//! concavity. Each run of concave samples contributes its sharpest sample,
//! snapped back to the nearest original vertex.

use weldpath_math::{Point2, Vec2};
use weldpath_slicer::Polygon;

/// Turning angle (degrees) a smoothed sample must exceed to count as concave.
pub const CONCAVE_TURN_DEG: f64 = 6.0;

/// Gaussian sigma in samples.
const SIGMA: f64 = 2.0;

/// Resample a closed ring into `count` points evenly spaced by arc length.
pub fn resample(polygon: &Polygon, count: usize) -> Vec<Point2> {
    let perimeter = polygon.perimeter();
    if count == 0 || perimeter <= 0.0 {
        return Vec::new();
    }
    let step = perimeter / count as f64;
    let mut out = Vec::with_capacity(count);
    let mut edges = polygon.edges();
    let mut current = edges.next();
    let mut walked = 0.0;
    for k in 0..count {
        let target = k as f64 * step;
        while let Some((a, b)) = current {
            let len = (b - a).norm();
            if walked + len >= target {
                let t = if len > 0.0 { (target - walked) / len } else { 0.0 };
                out.push(a + (b - a) * t.clamp(0.0, 1.0));
                break;
            }
            walked += len;
            current = edges.next();
        }
    }
    out
}

/// Circular Gaussian smoothing with `sigma` in samples.
pub fn smooth(points: &[Point2], sigma: f64) -> Vec<Point2> {
    let n = points.len();
    if n < 3 || sigma <= 0.0 {
        return points.to_vec();
    }
    let radius = (3.0 * sigma).ceil() as isize;
    let weights: Vec<f64> = (-radius..=radius)
        .map(|d| (-(d * d) as f64 / (2.0 * sigma * sigma)).exp())
        .collect();
    let total: f64 = weights.iter().sum();

    (0..n as isize)
        .map(|i| {
            let acc = (-radius..=radius)
                .zip(&weights)
                .fold(Vec2::zeros(), |acc, (d, w)| {
                    let j = (i + d).rem_euclid(n as isize) as usize;
                    acc + points[j].coords * *w
                });
            Point2::from(acc / total)
        })
        .collect()
}

/// Signed turning angle at each sample in radians (left turns positive).
pub fn turning_angles(points: &[Point2]) -> Vec<f64> {
    let n = points.len();
    (0..n)
        .map(|i| {
            let prev = points[(i + n - 1) % n];
            let next = points[(i + 1) % n];
            let u = points[i] - prev;
            let v = next - points[i];
            (u.x * v.y - u.y * v.x).atan2(u.dot(&v))
        })
        .collect()
}

/// Indices (into the counter-clockwise copy of `polygon`) of concave vertices.
pub fn concave_vertices(polygon: &Polygon) -> Vec<usize> {
    let ring = polygon.to_ccw();
    if ring.len() < 4 {
        return Vec::new();
    }
    let count = (2 * ring.len()).clamp(64, 512);
    let samples = smooth(&resample(&ring, count), SIGMA);
    let turns = turning_angles(&samples);
    let threshold = -CONCAVE_TURN_DEG.to_radians();
    let concave: Vec<bool> = turns.iter().map(|&t| t < threshold).collect();

    // Start scanning right after a convex sample so no run wraps around.
    let Some(offset) = concave.iter().position(|&c| !c) else {
        return Vec::new();
    };
    let n = samples.len();
    let mut peaks = Vec::new();
    let mut run: Option<usize> = None;
    for k in 1..=n {
        let i = (offset + k) % n;
        if concave[i] {
            run = Some(match run {
                Some(best) if turns[best] <= turns[i] => best,
                _ => i,
            });
        } else if let Some(best) = run.take() {
            peaks.push(best);
        }
    }

    let mut vertices: Vec<usize> = peaks
        .into_iter()
        .map(|s| nearest_vertex(&ring.points, &samples[s]))
        .collect();
    vertices.sort_unstable();
    vertices.dedup();
    vertices
}

fn nearest_vertex(points: &[Point2], to: &Point2) -> usize {
    points
        .iter()
        .enumerate()
        .min_by(|a, b| (a.1 - to).norm_squared().total_cmp(&(b.1 - to).norm_squared()))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Boundary points on the horizontal and vertical lines through the centroid.
pub fn axis_points(polygon: &Polygon) -> Vec<Point2> {
    let c = polygon.centroid();
    let mut out = Vec::new();
    for (a, b) in polygon.edges() {
        if (a.y > c.y) != (b.y > c.y) {
            out.push(Point2::new(a.x + (c.y - a.y) * (b.x - a.x) / (b.y - a.y), c.y));
        }
        if (a.x > c.x) != (b.x > c.x) {
            out.push(Point2::new(c.x, a.y + (c.x - a.x) * (b.y - a.y) / (b.x - a.x)));
        }
    }
    out
}

/// Candidate cut endpoints of a contour.
///
/// Concave vertices, plus the centroid axis crossings when fewer than two
/// concave vertices exist.
pub fn points_concaves(polygon: &Polygon) -> Vec<Point2> {
    let ring = polygon.to_ccw();
    let mut points: Vec<Point2> = concave_vertices(&ring)
        .into_iter()
        .map(|i| ring.points[i])
        .collect();
    if points.len() < 2 {
        points.extend(axis_points(&ring));
    }
    points
}
