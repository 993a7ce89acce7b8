//! Contours and layers built from raw slice rings.
//!
//! Each slice ring is cleaned with a small morphological opening, filtered
//! against the bead size and classified as an outer boundary or a hole by
//! nesting depth. Holes stay separate contours: downstream stages iterate them
//! exactly like outer boundaries.

use serde::{Deserialize, Serialize};
use tracing::debug;
use weldpath_math::{Point2, Point3};

use crate::bead::BeadSettings;
use crate::path::Polygon;
use crate::slice::SliceLayer;

/// One closed damage boundary at one height.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contour {
    /// Boundary samples; z carries the surface height at each sample.
    pub points: Vec<Point3>,
    /// True for interior rings of a section with holes.
    pub is_hole: bool,
    /// Index of the enclosing contour in the same layer, if any.
    pub parent: Option<usize>,
}

impl Contour {
    /// Contour at constant height `z` from a planar polygon.
    pub fn from_polygon(polygon: &Polygon, z: f64) -> Self {
        Self {
            points: polygon
                .points
                .iter()
                .map(|p| Point3::new(p.x, p.y, z))
                .collect(),
            is_hole: false,
            parent: None,
        }
    }

    /// Planar footprint of the contour.
    pub fn polygon(&self) -> Polygon {
        Polygon::new(self.points.iter().map(|p| Point2::new(p.x, p.y)).collect())
    }

    /// Area of the planar footprint.
    pub fn area(&self) -> f64 {
        self.polygon().area()
    }

    /// Area centroid of the planar footprint.
    pub fn centroid(&self) -> Point2 {
        self.polygon().centroid()
    }

    /// Mean height of the samples.
    pub fn mean_z(&self) -> f64 {
        if self.points.is_empty() {
            return 0.0;
        }
        self.points.iter().map(|p| p.z).sum::<f64>() / self.points.len() as f64
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True when the contour has no samples.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Ordered contours at one cutting height.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    /// Cutting height.
    pub z: f64,
    /// Layer index (0 = lowest).
    pub index: usize,
    /// Contours, largest first.
    pub contours: Vec<Contour>,
}

impl Layer {
    /// Create a new empty layer.
    pub fn new(z: f64, index: usize) -> Self {
        Self {
            z,
            index,
            contours: Vec::new(),
        }
    }

    /// True when no contour survived at this height.
    pub fn is_empty(&self) -> bool {
        self.contours.is_empty()
    }
}

/// Contour clean-up parameters, expressed relative to the bead width.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContourSettings {
    /// Opening distance as a fraction of bead width (0 disables).
    pub opening_ratio: f64,
    /// Minimum `area / perimeter` is `bead_width / slenderness_divisor`.
    pub slenderness_divisor: f64,
}

impl Default for ContourSettings {
    fn default() -> Self {
        Self {
            opening_ratio: 0.08,
            slenderness_divisor: 2.5,
        }
    }
}

/// Check a ring against the bead-size filters.
///
/// Rejects rings that cannot hold a single bead, rings whose bounding box is
/// narrower than a bead and sliver shapes with a small area to perimeter
/// ratio.
pub fn passes_filter(polygon: &Polygon, bead: &BeadSettings, settings: &ContourSettings) -> bool {
    let w = bead.width;
    let area = polygon.area();
    if area < bead.min_area() {
        return false;
    }
    let Some((min, max)) = polygon.bounds() else {
        return false;
    };
    if max.x - min.x < w || max.y - min.y < w {
        return false;
    }
    let perimeter = polygon.perimeter();
    perimeter > 0.0 && area / perimeter >= w / settings.slenderness_divisor
}

/// Morphological opening of a ring (inset then outset by `distance`).
///
/// Holes are treated from the material side, so their opening grows first.
pub fn open_ring(polygon: &Polygon, distance: f64, is_hole: bool) -> Vec<Polygon> {
    if distance <= 0.0 {
        return vec![polygon.to_ccw()];
    }
    let sign = if is_hole { -1.0 } else { 1.0 };
    polygon
        .offset(sign * distance)
        .iter()
        .flat_map(|p| p.offset(-sign * distance))
        .collect()
}

/// Turn a raw slice layer into a filtered, classified contour layer.
pub fn build_layer(raw: &SliceLayer, bead: &BeadSettings, settings: &ContourSettings) -> Layer {
    let opening = settings.opening_ratio * bead.width;
    let depths = nesting_depths(&raw.rings);

    let mut rings: Vec<(Polygon, bool)> = Vec::new();
    for (ring, depth) in raw.rings.iter().zip(&depths) {
        let is_hole = depth % 2 == 1;
        for opened in open_ring(ring, opening, is_hole) {
            if passes_filter(&opened, bead, settings) {
                rings.push((opened, is_hole));
            }
        }
    }
    rings.sort_by(|a, b| b.0.area().total_cmp(&a.0.area()));

    let polygons: Vec<Polygon> = rings.iter().map(|(p, _)| p.clone()).collect();
    let contours = rings
        .into_iter()
        .enumerate()
        .map(|(i, (mut polygon, is_hole))| {
            if is_hole {
                polygon.ensure_cw();
            } else {
                polygon.ensure_ccw();
            }
            let mut contour = Contour::from_polygon(&polygon, raw.z);
            contour.is_hole = is_hole;
            contour.parent = tightest_container(&polygons, i);
            contour
        })
        .collect::<Vec<_>>();

    debug!(
        layer = raw.index,
        z = raw.z,
        raw = raw.rings.len(),
        kept = contours.len(),
        "built contour layer"
    );

    Layer {
        z: raw.z,
        index: raw.index,
        contours,
    }
}

/// Number of other rings containing each ring.
fn nesting_depths(rings: &[Polygon]) -> Vec<usize> {
    rings
        .iter()
        .enumerate()
        .map(|(i, ring)| {
            let Some(sample) = ring.points.first() else {
                return 0;
            };
            rings
                .iter()
                .enumerate()
                .filter(|&(j, other)| j != i && other.contains(sample))
                .count()
        })
        .collect()
}

/// Smallest other polygon containing polygon `i`.
fn tightest_container(polygons: &[Polygon], i: usize) -> Option<usize> {
    let sample = polygons[i].points.first()?;
    polygons
        .iter()
        .enumerate()
        .filter(|&(j, other)| j != i && other.area() > polygons[i].area() && other.contains(sample))
        .min_by(|a, b| a.1.area().total_cmp(&b.1.area()))
        .map(|(j, _)| j)
}
