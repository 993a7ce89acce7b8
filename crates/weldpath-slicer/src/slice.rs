//! Mesh slicing - intersect a triangle mesh with parallel planes.

use rayon::prelude::*;
use tracing::debug;
use weldpath_math::{Dir3, Point2, Transform, Vec3};

use crate::error::{Result, SlicerError};
use crate::mesh::TriangleMesh;
use crate::path::Polygon;

/// Raw cross-section of the mesh at one height.
#[derive(Debug, Clone)]
pub struct SliceLayer {
    /// Height of the cutting plane.
    pub z: f64,
    /// Layer index (0 = lowest).
    pub index: usize,
    /// Closed rings found at this height, largest first.
    pub rings: Vec<Polygon>,
}

impl SliceLayer {
    /// Create a new empty layer.
    pub fn new(z: f64, index: usize) -> Self {
        Self {
            z,
            index,
            rings: Vec::new(),
        }
    }
}

/// Slice a triangle mesh at multiple Z heights.
///
/// Returns layers in the order of `heights`.
pub fn slice_mesh(mesh: &TriangleMesh, heights: &[f64]) -> Result<Vec<SliceLayer>> {
    mesh.validate()?;

    let triangles = extract_triangles(mesh);

    let layers: Vec<SliceLayer> = heights
        .par_iter()
        .enumerate()
        .map(|(idx, &z)| slice_at_z(&triangles, z, idx))
        .collect();

    debug!(
        layers = layers.len(),
        triangles = triangles.len(),
        "sliced mesh"
    );
    Ok(layers)
}

/// Rotation that brings `axis` onto +Z.
pub fn alignment(axis: &Dir3) -> Transform {
    Transform::aligning(axis, &Dir3::new_normalize(Vec3::z()))
}

/// Slice along an arbitrary axis.
///
/// The mesh is rotated so `axis` becomes +Z before cutting; returned rings and
/// heights are expressed in that aligned frame. Use `alignment(axis).inverse()`
/// to map results back.
pub fn slice_along(
    mesh: &TriangleMesh,
    heights: &[f64],
    axis: &Dir3,
) -> Result<Vec<SliceLayer>> {
    let aligned = mesh.transformed(&alignment(axis));
    slice_mesh(&aligned, heights)
}

/// Layer thickness for beads of height `h`, width `w` and step-over `p`.
///
/// Overlapping beads settle lower than a single bead; the deposit thickness
/// is `h * (1 - (p / w)^2)`.
pub fn layer_thickness(bead_height: f64, bead_width: f64, step_over: f64) -> f64 {
    bead_height * (1.0 - (step_over / bead_width).powi(2))
}

/// Generate cutting heights from `z_min` up to `z_max`.
///
/// Heights start at `z_min` and step by `thickness`. When the top of the
/// damage is a full layer or more above the last height, one extra height is
/// appended so the top is not left uncovered.
pub fn layer_heights(z_min: f64, z_max: f64, thickness: f64) -> Vec<f64> {
    let mut heights = Vec::new();

    if z_max <= z_min || thickness <= 0.0 {
        return heights;
    }

    let mut k = 0usize;
    loop {
        let z = z_min + k as f64 * thickness;
        if z >= z_max {
            break;
        }
        heights.push(z);
        k += 1;
    }

    if let Some(&last) = heights.last() {
        if z_max - last >= thickness - 1e-9 {
            heights.push(last + thickness);
        }
    }

    heights
}

/// A triangle with its vertices and bounding Z range.
#[derive(Debug, Clone, Copy)]
struct Triangle {
    v0: [f64; 3],
    v1: [f64; 3],
    v2: [f64; 3],
    z_min: f64,
    z_max: f64,
}

/// Extract triangles from mesh for slicing.
fn extract_triangles(mesh: &TriangleMesh) -> Vec<Triangle> {
    (0..mesh.num_triangles())
        .map(|t| {
            let [v0, v1, v2] = mesh.triangle(t).map(|i| {
                let p = mesh.vertex(i);
                [p.x, p.y, p.z]
            });
            Triangle {
                v0,
                v1,
                v2,
                z_min: v0[2].min(v1[2]).min(v2[2]),
                z_max: v0[2].max(v1[2]).max(v2[2]),
            }
        })
        .collect()
}

/// Slice mesh at a single Z height.
fn slice_at_z(triangles: &[Triangle], z: f64, index: usize) -> SliceLayer {
    let mut segments: Vec<([f64; 2], [f64; 2])> = Vec::new();

    for tri in triangles {
        // Skip triangles that don't cross this Z plane
        if tri.z_max < z || tri.z_min > z {
            continue;
        }

        if let Some(seg) = triangle_plane_intersection(tri, z) {
            segments.push(seg);
        }
    }

    SliceLayer {
        z,
        index,
        rings: chain_segments(segments),
    }
}

/// Intersect a triangle with a horizontal plane at Z.
/// Returns the 2D line segment (projected to XY) if intersection exists.
fn triangle_plane_intersection(tri: &Triangle, z: f64) -> Option<([f64; 2], [f64; 2])> {
    let eps = 1e-10;

    let d0 = tri.v0[2] - z;
    let d1 = tri.v1[2] - z;
    let d2 = tri.v2[2] - z;

    let above = [d0 > eps, d1 > eps, d2 > eps];
    let below = [d0 < -eps, d1 < -eps, d2 < -eps];

    // All on same side - no intersection
    if above.iter().all(|&a| a) || below.iter().all(|&b| b) {
        return None;
    }

    let mut points: Vec<[f64; 2]> = Vec::with_capacity(3);

    let edges = [
        (tri.v0, tri.v1, d0, d1),
        (tri.v1, tri.v2, d1, d2),
        (tri.v2, tri.v0, d2, d0),
    ];

    for (va, vb, da, db) in edges {
        if (da > eps && db < -eps) || (da < -eps && db > eps) {
            let t = da / (da - db);
            points.push([va[0] + t * (vb[0] - va[0]), va[1] + t * (vb[1] - va[1])]);
        } else if da.abs() <= eps && db.abs() > eps {
            points.push([va[0], va[1]]);
        } else if db.abs() <= eps && da.abs() > eps {
            points.push([vb[0], vb[1]]);
        }
    }

    points.dedup_by(|a, b| {
        let dx = a[0] - b[0];
        let dy = a[1] - b[1];
        (dx * dx + dy * dy) < eps * eps
    });
    if points.len() == 3 {
        // Closing duplicate from a vertex lying on the plane.
        let dx = points[0][0] - points[2][0];
        let dy = points[0][1] - points[2][1];
        if dx * dx + dy * dy < eps * eps {
            points.pop();
        }
    }

    if points.len() >= 2 {
        Some((points[0], points[1]))
    } else {
        None
    }
}

/// Chain line segments into closed polygons.
fn chain_segments(segments: Vec<([f64; 2], [f64; 2])>) -> Vec<Polygon> {
    let eps = 1e-6;
    let mut remaining = segments;
    let mut contours: Vec<Polygon> = Vec::new();

    while !remaining.is_empty() {
        let (start, end) = remaining.swap_remove(0);
        let mut chain = vec![Point2::new(start[0], start[1]), Point2::new(end[0], end[1])];

        let mut changed = true;
        while changed {
            changed = false;

            let chain_start = chain[0];
            let chain_end = chain[chain.len() - 1];

            let mut i = 0;
            while i < remaining.len() {
                let (seg_a, seg_b) = remaining[i];
                let pa = Point2::new(seg_a[0], seg_a[1]);
                let pb = Point2::new(seg_b[0], seg_b[1]);

                if (pb - chain_end).norm() < eps {
                    chain.push(pa);
                } else if (pa - chain_end).norm() < eps {
                    chain.push(pb);
                } else if (pb - chain_start).norm() < eps {
                    chain.insert(0, pa);
                } else if (pa - chain_start).norm() < eps {
                    chain.insert(0, pb);
                } else {
                    i += 1;
                    continue;
                }
                remaining.swap_remove(i);
                changed = true;
                break;
            }
        }

        if chain.len() >= 3 {
            let dist = (chain[0] - chain[chain.len() - 1]).norm();
            if dist < eps {
                chain.pop();
                if chain.len() >= 3 {
                    contours.push(Polygon::new(chain));
                }
            }
        }
    }

    // Largest ring first; outer boundaries precede the holes they contain.
    contours.sort_by(|a, b| b.area().total_cmp(&a.area()));

    contours
}

/// Reject heights outside the mesh range before slicing.
pub fn check_heights(mesh: &TriangleMesh, heights: &[f64]) -> Result<()> {
    let (min, max) = mesh.bounds().ok_or(SlicerError::EmptyMesh)?;
    if heights.is_empty() {
        return Err(SlicerError::SliceFailed("no cutting heights".into()));
    }
    if heights.iter().all(|&z| z < min.z || z > max.z) {
        return Err(SlicerError::SliceFailed(format!(
            "all heights outside mesh range [{:.3}, {:.3}]",
            min.z, max.z
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::tests::make_box_mesh;

    #[test]
    fn test_layer_thickness() {
        // p = w gives zero growth, p = 0 gives the full bead height.
        assert!((layer_thickness(2.0, 5.0, 0.0) - 2.0).abs() < 1e-12);
        assert!(layer_thickness(2.0, 5.0, 5.0).abs() < 1e-12);
        let t = layer_thickness(2.0, 5.0, 3.69);
        assert!((t - 2.0 * (1.0 - 0.738f64.powi(2))).abs() < 1e-9);
    }

    #[test]
    fn test_layer_heights_start_at_bottom() {
        let heights = layer_heights(1.0, 4.5, 1.0);
        assert_eq!(heights.len(), 4);
        assert!((heights[0] - 1.0).abs() < 1e-12);
        assert!((heights[3] - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_layer_heights_extra_top_layer() {
        // 0, 1, 2 then the top at 3 is a full layer away: one more.
        let heights = layer_heights(0.0, 3.0, 1.0);
        assert_eq!(heights.len(), 4);
        assert!((heights[3] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_layer_heights_degenerate() {
        assert!(layer_heights(2.0, 2.0, 0.5).is_empty());
        assert!(layer_heights(0.0, 2.0, 0.0).is_empty());
    }

    #[test]
    fn test_slice_box() {
        let mesh = make_box_mesh([10.0, 10.0, 10.0]);
        let heights = layer_heights(0.5, 9.5, 1.0);
        let layers = slice_mesh(&mesh, &heights).unwrap();
        assert_eq!(layers.len(), heights.len());
        for layer in &layers {
            assert_eq!(layer.rings.len(), 1);
            assert!((layer.rings[0].area() - 100.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_slice_along_x() {
        let mesh = make_box_mesh([20.0, 10.0, 4.0]);
        let axis = Dir3::new_normalize(Vec3::x());
        // In the aligned frame +X maps to +Z, so cut at x = 5.
        let layers = slice_along(&mesh, &[5.0], &axis).unwrap();
        assert_eq!(layers[0].rings.len(), 1);
        assert!((layers[0].rings[0].area() - 40.0).abs() < 1e-6);
    }

    #[test]
    fn test_slice_empty_mesh() {
        assert!(slice_mesh(&TriangleMesh::new(), &[0.0]).is_err());
    }

    #[test]
    fn test_check_heights() {
        let mesh = make_box_mesh([1.0, 1.0, 1.0]);
        assert!(check_heights(&mesh, &[0.5]).is_ok());
        assert!(check_heights(&mesh, &[5.0]).is_err());
    }
}
