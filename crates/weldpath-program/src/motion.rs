//! Point thinning and motion-type classification.
//!
//! Dense bead polylines are reduced to the vertices a robot needs: sharp
//! corners, plus enough points along gentle curves to keep the shape. The
//! thresholds depend on the footprint area of the line. Curves with many
//! concave corners are driven with circular moves, the rest linearly.

use serde::{Deserialize, Serialize};
use weldpath_math::{Point2, Point3};

use crate::error::{ProgramError, Result};

/// Thresholds for one area tier. Angles are turning angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionTier {
    /// Convex vertices turning more than this are always kept.
    pub convex_keep_angle: f64,
    /// Concave vertices turning more than this are always kept.
    pub concave_keep_angle: f64,
    /// Arc length between kept convex vertices.
    pub d_filter: f64,
    /// Arc length between kept concave vertices.
    pub d_filter_concave: f64,
    /// A convex vertex this sharp is kept instead of its predecessor.
    pub convex_lookahead_angle: f64,
    /// A concave vertex this sharp is kept instead of its predecessor.
    pub concave_lookahead_angle: f64,
    /// Minimum spacing between kept vertices of one class.
    pub d_min: f64,
    /// Arc length of the slow-down points around a curve vertex.
    pub cut_d: f64,
    /// Slow-down points closer than this to the previous curve vertex are dropped.
    pub d_separation: f64,
}

impl Default for MotionTier {
    fn default() -> Self {
        Self {
            convex_keep_angle: 18.0,
            concave_keep_angle: 6.5,
            d_filter: 1.5,
            d_filter_concave: 1.5,
            convex_lookahead_angle: 12.0,
            concave_lookahead_angle: 0.5,
            d_min: 1.1,
            cut_d: 0.5,
            d_separation: 10.0,
        }
    }
}

/// Area tiers and classification limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionPolicy {
    /// Lines with at most this many points pass through unchanged.
    pub passthrough_points: usize,
    /// Upper area bound of the `tiny` tier.
    pub tiny_area: f64,
    /// Upper area bound of the `small` tier.
    pub small_area: f64,
    /// Upper area bound (inclusive) of the `medium` tier.
    pub medium_area: f64,
    /// Below `tiny_area`.
    pub tiny: MotionTier,
    /// Below `small_area`.
    pub small: MotionTier,
    /// Up to `medium_area`.
    pub medium: MotionTier,
    /// Above `medium_area`.
    pub large: MotionTier,
    /// Concave vertices needed for circular motion.
    pub circular_min_concave: usize,
    /// More near-right convex corners than this force linear motion.
    pub right_angle_limit: usize,
    /// Vertices turning more than this are welded at reduced speed.
    pub curve_angle: f64,
    /// Convex vertices turning more than this end a circular segment.
    pub repeat_angle: f64,
    /// Speed factor applied at curve points.
    pub curve_speed_factor: f64,
}

impl Default for MotionPolicy {
    fn default() -> Self {
        let small = MotionTier::default();
        Self {
            passthrough_points: 15,
            tiny_area: 500.0,
            small_area: 1100.0,
            medium_area: 3000.0,
            tiny: MotionTier {
                d_filter_concave: 0.4,
                d_min: 1.5,
                cut_d: 0.4,
                ..small
            },
            small,
            medium: MotionTier {
                convex_keep_angle: 20.0,
                concave_keep_angle: 15.0,
                d_filter: 2.8,
                d_filter_concave: 2.8,
                d_min: 3.2,
                d_separation: 6.0,
                ..small
            },
            large: MotionTier {
                convex_keep_angle: 70.0,
                concave_keep_angle: 60.0,
                d_filter: 3.0,
                d_filter_concave: 3.0,
                concave_lookahead_angle: 8.0,
                d_min: 4.0,
                cut_d: 2.0,
                d_separation: 6.0,
                ..small
            },
            circular_min_concave: 6,
            right_angle_limit: 4,
            curve_angle: 15.0,
            repeat_angle: 12.0,
            curve_speed_factor: 0.5,
        }
    }
}

impl MotionPolicy {
    /// Tier for a footprint of `area`.
    pub fn tier(&self, area: f64) -> &MotionTier {
        if area < self.tiny_area {
            &self.tiny
        } else if area < self.small_area {
            &self.small
        } else if area <= self.medium_area {
            &self.medium
        } else {
            &self.large
        }
    }

    /// Validate the policy.
    pub fn validate(&self) -> Result<()> {
        if !(self.tiny_area <= self.small_area && self.small_area <= self.medium_area) {
            return Err(ProgramError::InvalidSettings(
                "motion tier areas must increase".into(),
            ));
        }
        if self.passthrough_points < 2 {
            return Err(ProgramError::InvalidSettings(
                "passthrough_points must be at least 2".into(),
            ));
        }
        if !(self.curve_speed_factor > 0.0 && self.curve_speed_factor <= 1.0) {
            return Err(ProgramError::InvalidSettings(
                "curve_speed_factor must be in (0, 1]".into(),
            ));
        }
        for tier in [&self.tiny, &self.small, &self.medium, &self.large] {
            let distances = [
                tier.d_filter,
                tier.d_filter_concave,
                tier.d_min,
                tier.cut_d,
                tier.d_separation,
            ];
            if distances.iter().any(|d| *d < 0.0) {
                return Err(ProgramError::InvalidSettings(
                    "motion distances must not be negative".into(),
                ));
            }
        }
        Ok(())
    }
}

/// How a line is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionKind {
    /// Straight moves between points.
    #[default]
    Linear,
    /// Three-point circular moves.
    Circular,
}

/// A point that survived thinning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionPoint {
    /// Position.
    pub position: Point3,
    /// Weld this point at reduced speed.
    pub is_curve_point: bool,
    /// A circular segment must end at this point.
    pub repeat_for_arc: bool,
}

impl MotionPoint {
    fn plain(position: Point3) -> Self {
        Self {
            position,
            is_curve_point: false,
            repeat_for_arc: false,
        }
    }
}

/// Thinned line and its motion type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionPlan {
    /// Motion type.
    pub kind: MotionKind,
    /// Points in order.
    pub points: Vec<MotionPoint>,
    /// Concave vertices that decided the motion type.
    pub concave_count: usize,
}

#[derive(Debug, Clone, Copy)]
struct Vertex {
    index: usize,
    angle: f64,
}

/// Turning angle (degrees, signed so convex is positive) at interior vertices.
fn turning(points: &[Point2]) -> Vec<Option<f64>> {
    let n = points.len();
    let signed_area: f64 = (0..n)
        .map(|i| {
            let (a, b) = (points[i], points[(i + 1) % n]);
            a.x * b.y - b.x * a.y
        })
        .sum();
    let orientation = if signed_area < 0.0 { -1.0 } else { 1.0 };

    (0..n)
        .map(|i| {
            if i == 0 || i + 1 == n {
                return None;
            }
            let u = points[i] - points[i - 1];
            let v = points[i + 1] - points[i];
            if u.norm() < 1e-12 || v.norm() < 1e-12 {
                return None;
            }
            let angle = (u.x * v.y - u.y * v.x).atan2(u.dot(&v)).to_degrees();
            Some(angle * orientation)
        })
        .collect()
}

/// Keep a class member once `d_filter` of arc length has accumulated.
fn thin(class: &[Vertex], lengths: &[f64], d_filter: f64, lookahead: f64) -> Vec<Vertex> {
    let Some(first) = class.first() else {
        return Vec::new();
    };
    let mut kept = vec![*first];
    let mut cum = 0.0;
    for k in 1..class.len() {
        cum += lengths[class[k].index] - lengths[class[k - 1].index];
        if cum >= d_filter {
            let pick = match class.get(k + 1) {
                Some(next) if next.angle >= lookahead => *next,
                _ => class[k],
            };
            if kept.last().map_or(true, |last| last.index != pick.index) {
                kept.push(pick);
            }
            cum = 0.0;
        }
    }
    kept
}

fn spaced(kept: Vec<Vertex>, points: &[Point2], d_min: f64) -> Vec<Vertex> {
    let mut out: Vec<Vertex> = Vec::with_capacity(kept.len());
    for v in kept {
        match out.last() {
            Some(prev) if (points[v.index] - points[prev.index]).norm() <= d_min => {}
            _ => out.push(v),
        }
    }
    out
}

/// Cumulative arc length at each point.
fn arc_lengths(points: &[Point3]) -> Vec<f64> {
    let mut s = Vec::with_capacity(points.len());
    let mut acc = 0.0;
    for (i, p) in points.iter().enumerate() {
        if i > 0 {
            acc += (p - points[i - 1]).norm();
        }
        s.push(acc);
    }
    s
}

fn point_at(points: &[Point3], lengths: &[f64], s: f64) -> Point3 {
    let i = lengths.partition_point(|&l| l < s).clamp(1, points.len() - 1);
    let (s0, s1) = (lengths[i - 1], lengths[i]);
    let t = if s1 > s0 { (s - s0) / (s1 - s0) } else { 0.0 };
    points[i - 1] + (points[i] - points[i - 1]) * t.clamp(0.0, 1.0)
}

/// Thin `points` and choose the motion type.
pub fn classify(points: &[Point3], policy: &MotionPolicy) -> MotionPlan {
    if points.len() <= policy.passthrough_points {
        return MotionPlan {
            kind: MotionKind::Linear,
            points: points.iter().copied().map(MotionPoint::plain).collect(),
            concave_count: 0,
        };
    }

    let flat: Vec<Point2> = points.iter().map(|p| Point2::new(p.x, p.y)).collect();
    let area = shoelace(&flat).abs();
    let tier = policy.tier(area);

    let mut convex = Vec::new();
    let mut concave = Vec::new();
    for (index, angle) in turning(&flat).into_iter().enumerate() {
        match angle {
            Some(a) if a > 0.0 => convex.push(Vertex { index, angle: a }),
            Some(a) if a < 0.0 => concave.push(Vertex { index, angle: -a }),
            _ => {}
        }
    }

    let lengths = arc_lengths(points);
    let convex_thinned = thin(&convex, &lengths, tier.d_filter, tier.convex_lookahead_angle);
    let concave_thinned = thin(
        &concave,
        &lengths,
        tier.d_filter_concave,
        tier.concave_lookahead_angle,
    );
    let convex_count = convex_thinned.len();
    let convex_spaced = spaced(convex_thinned, &flat, tier.d_min);
    let concave_spaced = spaced(concave_thinned, &flat, tier.d_min);

    // Mostly convex outlines lose less from dropping shallow vertices.
    let ratio = convex_count as f64 / concave_spaced.len().max(1) as f64;
    let (a_min, a_concave) = if ratio > 1.5 { (1.2, 2.0) } else { (0.2, 1.5) };

    let mut kept: Vec<(Vertex, bool)> = convex_spaced
        .into_iter()
        .filter(|v| v.angle > a_min)
        .map(|v| (v, true))
        .chain(
            concave_spaced
                .into_iter()
                .filter(|v| v.angle > a_min)
                .map(|v| (v, false)),
        )
        .collect();
    kept.extend(
        convex
            .iter()
            .filter(|v| v.angle > tier.convex_keep_angle)
            .map(|v| (*v, true)),
    );
    kept.extend(
        concave
            .iter()
            .filter(|v| v.angle > tier.concave_keep_angle)
            .map(|v| (*v, false)),
    );
    kept.sort_by_key(|(v, _)| v.index);
    kept.dedup_by_key(|(v, _)| v.index);

    let right_angles = kept
        .iter()
        .filter(|(v, is_convex)| *is_convex && v.angle > 89.9)
        .count();
    let mut concave_count = kept
        .iter()
        .filter(|(v, is_convex)| !*is_convex && v.angle > a_concave)
        .count();
    if right_angles > policy.right_angle_limit {
        concave_count = 0;
    }
    let kind = if concave_count >= policy.circular_min_concave {
        MotionKind::Circular
    } else {
        MotionKind::Linear
    };

    let total = lengths.last().copied().unwrap_or(0.0);
    let curves: Vec<usize> = kept
        .iter()
        .filter(|(v, _)| v.angle > policy.curve_angle)
        .map(|(v, _)| v.index)
        .collect();

    let mut out: Vec<MotionPoint> = Vec::with_capacity(kept.len() + 2 * curves.len() + 2);
    out.push(MotionPoint::plain(points[0]));
    let mut found = 0usize;
    for (v, is_convex) in &kept {
        let curve_pos = curves.iter().position(|&c| c == v.index);
        let s = lengths[v.index];
        if let Some(c) = curve_pos {
            let before = s - tier.cut_d;
            let far_from_previous = c == 0 || {
                let p = point_at(points, &lengths, before);
                (p - points[curves[c - 1]]).norm() > tier.d_separation
            };
            if before > 0.0 && far_from_previous {
                out.push(MotionPoint::plain(point_at(points, &lengths, before)));
            }
        }

        found += 1;
        let repeat = kind == MotionKind::Circular
            && (found % 3 == 0 || (*is_convex && v.angle > policy.repeat_angle.max(10.0)));
        out.push(MotionPoint {
            position: points[v.index],
            is_curve_point: curve_pos.is_some(),
            repeat_for_arc: repeat,
        });

        if let Some(c) = curve_pos {
            let after = s + tier.cut_d;
            let separated = c == 0 || (points[curves[c - 1]] - points[v.index]).norm() > tier.d_separation;
            if v.index + 3 < points.len() && after < total && separated {
                out.push(MotionPoint::plain(point_at(points, &lengths, after)));
            }
        }
    }
    if let Some(last) = points.last() {
        out.push(MotionPoint::plain(*last));
    }
    out.dedup_by(|b, a| a.position == b.position);

    MotionPlan {
        kind,
        points: out,
        concave_count,
    }
}

fn shoelace(points: &[Point2]) -> f64 {
    let n = points.len();
    (0..n)
        .map(|i| {
            let (a, b) = (points[i], points[(i + 1) % n]);
            a.x * b.y - b.x * a.y
        })
        .sum::<f64>()
        / 2.0
}
