//! Surface layer builder.
//!
//! Offsets a sampled surface along its normals to get the shape of the next
//! weld pass. Each offset layer gets fresh normals from a k-nearest-neighbour
//! plane fit, then spurious points are dropped in two passes: a statistical
//! outlier filter and hidden-point removal from a viewpoint along the
//! reference direction.

use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};

use nalgebra::{Matrix3, SymmetricEigen};
use parry3d::transformation::try_convex_hull;
use rayon::prelude::*;
use rstar::primitives::GeomWithData;
use rstar::RTree;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use weldpath_math::{Point3, Vec3};

use crate::error::{Result, SlicerError};
use crate::mesh::TriangleMesh;

type IndexedPoint = GeomWithData<[f64; 3], usize>;

/// Points with one unit normal each.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointCloud {
    /// Sample positions.
    pub points: Vec<Point3>,
    /// Unit normals, parallel to `points`.
    pub normals: Vec<Vec3>,
}

impl PointCloud {
    /// Pair points with normals; both lists must have the same length.
    pub fn new(points: Vec<Point3>, normals: Vec<Vec3>) -> Result<Self> {
        if points.len() != normals.len() {
            return Err(SlicerError::GeometryDegenerate(format!(
                "{} points but {} normals",
                points.len(),
                normals.len()
            )));
        }
        Ok(Self { points, normals })
    }

    /// Mesh vertices with their vertex normals.
    pub fn from_mesh(mesh: &TriangleMesh) -> Self {
        Self {
            points: mesh.points(),
            normals: mesh.vertex_normals(),
        }
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True when the cloud has no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Sub-cloud holding only the given indices, in order.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            points: indices.iter().map(|&i| self.points[i]).collect(),
            normals: indices.iter().map(|&i| self.normals[i]).collect(),
        }
    }
}

/// Surface layer builder parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceSettings {
    /// Neighbours used for each normal plane fit.
    pub normal_neighbors: usize,
    /// Neighbours used for the outlier distance statistics.
    pub outlier_neighbors: usize,
    /// Outlier threshold in standard deviations per unit of offset height.
    pub outlier_std_ratio_per_height: f64,
    /// Hidden-point-removal sphere radius as a multiple of the cloud diameter.
    pub hpr_radius_factor: f64,
    /// Points closer than `duplicate_ratio * height` to the previous layer are dropped.
    pub duplicate_ratio: f64,
    /// Viewing direction normals are oriented towards.
    pub reference: [f64; 3],
}

impl Default for SurfaceSettings {
    fn default() -> Self {
        Self {
            normal_neighbors: 10,
            outlier_neighbors: 5,
            outlier_std_ratio_per_height: 1.0,
            hpr_radius_factor: 1000.0,
            duplicate_ratio: 0.8,
            reference: [0.0, 0.0, 1.0],
        }
    }
}

impl SurfaceSettings {
    /// Reference direction as a unit vector.
    pub fn reference_dir(&self) -> Vec3 {
        let v = Vec3::from(self.reference);
        let len = v.norm();
        if len > 1e-12 {
            v / len
        } else {
            Vec3::z()
        }
    }

    /// Validate settings.
    pub fn validate(&self) -> Result<()> {
        if self.normal_neighbors < 3 {
            return Err(SlicerError::InvalidSettings(
                "normal_neighbors must be at least 3".into(),
            ));
        }
        if self.outlier_neighbors == 0 {
            return Err(SlicerError::InvalidSettings(
                "outlier_neighbors must be positive".into(),
            ));
        }
        if self.hpr_radius_factor <= 1.0 {
            return Err(SlicerError::InvalidSettings(
                "hpr_radius_factor must exceed 1".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.duplicate_ratio) {
            return Err(SlicerError::InvalidSettings(
                "duplicate_ratio must be in [0, 1)".into(),
            ));
        }
        if Vec3::from(self.reference).norm() < 1e-12 {
            return Err(SlicerError::InvalidSettings(
                "reference direction must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

fn point_tree(points: &[Point3]) -> RTree<IndexedPoint> {
    RTree::bulk_load(
        points
            .iter()
            .enumerate()
            .map(|(i, p)| GeomWithData::new([p.x, p.y, p.z], i))
            .collect(),
    )
}

/// Estimate unit normals from the `k` nearest neighbours of each point.
///
/// The normal is the eigenvector of the smallest eigenvalue of the local
/// covariance, flipped to face `reference`.
pub fn estimate_normals(points: &[Point3], k: usize, reference: &Vec3) -> Vec<Vec3> {
    let tree = point_tree(points);
    points
        .par_iter()
        .map(|p| {
            let neighbours: Vec<Vec3> = tree
                .nearest_neighbor_iter(&[p.x, p.y, p.z])
                .take(k.max(3))
                .map(|n| Vec3::from(*n.geom()))
                .collect();
            if neighbours.len() < 3 {
                return *reference;
            }
            let mean = neighbours.iter().sum::<Vec3>() / neighbours.len() as f64;
            let covariance = neighbours
                .iter()
                .map(|q| (q - mean) * (q - mean).transpose())
                .fold(Matrix3::zeros(), |acc, m| acc + m);
            let eigen = SymmetricEigen::new(covariance);
            let smallest = eigen.eigenvalues.imin();
            let normal: Vec3 = eigen.eigenvectors.column(smallest).into_owned();
            let len = normal.norm();
            if len < 1e-12 {
                return *reference;
            }
            let normal = normal / len;
            if normal.dot(reference) < 0.0 {
                -normal
            } else {
                normal
            }
        })
        .collect()
}

/// Indices of the points kept by a statistical outlier filter.
///
/// A point is kept when its mean distance to its `k` nearest neighbours is at
/// most `mean + std_ratio * std` over the whole cloud.
pub fn remove_statistical_outliers(points: &[Point3], k: usize, std_ratio: f64) -> Vec<usize> {
    if points.len() <= k {
        return (0..points.len()).collect();
    }
    let tree = point_tree(points);
    let mean_distances: Vec<f64> = points
        .par_iter()
        .map(|p| {
            let query = [p.x, p.y, p.z];
            // The nearest hit is the point itself.
            let distances: Vec<f64> = tree
                .nearest_neighbor_iter(&query)
                .skip(1)
                .take(k)
                .map(|n| (Vec3::from(*n.geom()) - p.coords).norm())
                .collect();
            distances.iter().sum::<f64>() / distances.len().max(1) as f64
        })
        .collect();

    let n = mean_distances.len() as f64;
    let mean = mean_distances.iter().sum::<f64>() / n;
    let variance = mean_distances.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n;
    let threshold = mean + std_ratio * variance.sqrt();

    mean_distances
        .iter()
        .enumerate()
        .filter(|&(_, &d)| d <= threshold)
        .map(|(i, _)| i)
        .collect()
}

/// Indices of the points visible from `camera`.
///
/// Uses spherical flipping: every point is mirrored about a sphere of
/// `radius` centred on the camera and the points on the convex hull of the
/// flipped set plus the camera are the visible ones. When the hull cannot be
/// built all points are reported visible.
pub fn hidden_point_removal(points: &[Point3], camera: &Point3, radius: f64) -> Vec<usize> {
    let all: Vec<usize> = (0..points.len()).collect();
    if points.len() < 4 || radius <= 0.0 {
        return all;
    }

    // Flipped coordinates are scaled by 1 / radius to stay well inside f32 range.
    let mut flipped: Vec<parry3d::na::Point3<f32>> = points
        .iter()
        .map(|p| {
            let rel = p - camera;
            let dist = rel.norm().max(1e-12);
            let f = rel * ((2.0 * radius - dist) / dist) / radius;
            parry3d::na::Point3::new(f.x as f32, f.y as f32, f.z as f32)
        })
        .collect();
    flipped.push(parry3d::na::Point3::origin());

    let hull = panic::catch_unwind(AssertUnwindSafe(|| try_convex_hull(&flipped)));
    let (vertices, _) = match hull {
        Ok(Ok(hull)) => hull,
        Ok(Err(err)) => {
            warn!(?err, "hidden point removal hull failed, keeping all points");
            return all;
        }
        Err(_) => {
            warn!("hidden point removal hull panicked, keeping all points");
            return all;
        }
    };

    // Hull vertices come back renormalized, so match them to the nearest input.
    let tree: RTree<IndexedPoint> = RTree::bulk_load(
        flipped
            .iter()
            .take(points.len())
            .enumerate()
            .map(|(i, p)| GeomWithData::new([p.x as f64, p.y as f64, p.z as f64], i))
            .collect(),
    );
    let mut visible: Vec<usize> = vertices
        .iter()
        .filter(|v| v.coords.norm_squared() > 1e-6)
        .filter_map(|v| tree.nearest_neighbor(&[v.x as f64, v.y as f64, v.z as f64]))
        .map(|n| n.data)
        .collect();
    visible.sort_unstable();
    visible.dedup();
    visible
}

fn cloud_diameter(points: &[Point3]) -> f64 {
    let Some(first) = points.first() else {
        return 0.0;
    };
    let (min, max) = points.iter().fold((*first, *first), |(lo, hi), p| {
        (
            Point3::new(lo.x.min(p.x), lo.y.min(p.y), lo.z.min(p.z)),
            Point3::new(hi.x.max(p.x), hi.y.max(p.y), hi.z.max(p.z)),
        )
    });
    (max - min).norm()
}

fn centroid(points: &[Point3]) -> Point3 {
    let sum = points.iter().fold(Vec3::zeros(), |acc, p| acc + p.coords);
    Point3::from(sum / points.len().max(1) as f64)
}

/// Indices surviving both the outlier filter and hidden-point removal.
fn surviving_indices(points: &[Point3], height: f64, settings: &SurfaceSettings) -> Vec<usize> {
    let kept = remove_statistical_outliers(
        points,
        settings.outlier_neighbors,
        settings.outlier_std_ratio_per_height * height.abs(),
    );
    let kept_points: Vec<Point3> = kept.iter().map(|&i| points[i]).collect();
    let diameter = cloud_diameter(&kept_points);
    let camera = centroid(&kept_points) + settings.reference_dir() * diameter;
    let visible = hidden_point_removal(
        &kept_points,
        &camera,
        diameter * settings.hpr_radius_factor,
    );
    visible.into_iter().map(|i| kept[i]).collect()
}

/// Displace every point by `height` along its normal and clean the result.
///
/// Fewer than three surviving points give an empty cloud, meaning no contour
/// at this height.
pub fn build_offset_layer(
    cloud: &PointCloud,
    height: f64,
    settings: &SurfaceSettings,
) -> Result<PointCloud> {
    settings.validate()?;
    if cloud.points.len() != cloud.normals.len() {
        return Err(SlicerError::GeometryDegenerate(
            "points and normals differ in length".into(),
        ));
    }

    let moved: Vec<Point3> = cloud
        .points
        .iter()
        .zip(&cloud.normals)
        .map(|(p, n)| p + n * height)
        .collect();
    let normals = estimate_normals(&moved, settings.normal_neighbors, &settings.reference_dir());
    let displaced = PointCloud {
        points: moved,
        normals,
    };

    let kept = surviving_indices(&displaced.points, height, settings);
    if kept.len() < 3 {
        debug!(survivors = kept.len(), "offset layer collapsed");
        return Ok(PointCloud::default());
    }

    debug!(
        input = cloud.len(),
        kept = kept.len(),
        height,
        "built offset layer"
    );
    Ok(displaced.select(&kept))
}

/// Remove from `layer` the points lying within `distance` of `previous`.
pub fn subtract_near(layer: &PointCloud, previous: &[Point3], distance: f64) -> PointCloud {
    if previous.is_empty() || distance <= 0.0 {
        return layer.clone();
    }
    let tree = point_tree(previous);
    let limit = distance * distance;
    let kept: Vec<usize> = layer
        .points
        .iter()
        .enumerate()
        .filter(|(_, p)| {
            tree.nearest_neighbor(&[p.x, p.y, p.z])
                .map(|n| (Vec3::from(*n.geom()) - p.coords).norm_squared() >= limit)
                .unwrap_or(true)
        })
        .map(|(i, _)| i)
        .collect();
    layer.select(&kept)
}

/// Build `n` successive offset layers.
///
/// Layer `i + 1` is offset from layer `i`. Afterwards each layer loses the
/// points within `duplicate_ratio * height` of the layer below it (the input
/// surface for the first one).
pub fn build_n_layers(
    cloud: &PointCloud,
    height: f64,
    n: usize,
    settings: &SurfaceSettings,
) -> Result<Vec<PointCloud>> {
    let mut raw = Vec::with_capacity(n);
    let mut current = cloud.clone();
    for _ in 0..n {
        let next = build_offset_layer(&current, height, settings)?;
        raw.push(next.clone());
        if next.is_empty() {
            break;
        }
        current = next;
    }
    raw.resize_with(n, PointCloud::default);

    let distance = settings.duplicate_ratio * height.abs();
    let mut layers = Vec::with_capacity(n);
    for (i, layer) in raw.iter().enumerate() {
        let previous = if i == 0 {
            &cloud.points
        } else {
            &raw[i - 1].points
        };
        let cleaned = subtract_near(layer, previous, distance);
        layers.push(if cleaned.len() < 3 {
            PointCloud::default()
        } else {
            cleaned
        });
    }
    Ok(layers)
}

/// Offset towards several reference directions and merge the results.
///
/// Exact duplicate points are kept once.
pub fn build_offset_layer_multi(
    cloud: &PointCloud,
    height: f64,
    references: &[[f64; 3]],
    settings: &SurfaceSettings,
) -> Result<PointCloud> {
    let mut seen: HashSet<[u64; 3]> = HashSet::new();
    let mut merged = PointCloud::default();
    for reference in references {
        let directed = SurfaceSettings {
            reference: *reference,
            ..*settings
        };
        let layer = build_offset_layer(cloud, height, &directed)?;
        for (p, n) in layer.points.into_iter().zip(layer.normals) {
            if seen.insert([p.x.to_bits(), p.y.to_bits(), p.z.to_bits()]) {
                merged.points.push(p);
                merged.normals.push(n);
            }
        }
    }
    Ok(merged)
}

/// Offset a mesh along its vertex normals.
///
/// Vertices removed by the clean-up passes take their faces with them; the
/// remaining faces are re-indexed so the result can be sliced again.
pub fn offset_mesh(
    mesh: &TriangleMesh,
    height: f64,
    settings: &SurfaceSettings,
) -> Result<TriangleMesh> {
    mesh.validate()?;
    settings.validate()?;

    let normals = mesh.vertex_normals();
    let moved: Vec<Point3> = mesh
        .points()
        .iter()
        .zip(&normals)
        .map(|(p, n)| p + n * height)
        .collect();

    let kept = surviving_indices(&moved, height, settings);
    if kept.len() < 3 {
        return Ok(TriangleMesh::new());
    }

    let mut remap = vec![None; moved.len()];
    for (new, &old) in kept.iter().enumerate() {
        remap[old] = Some(new as u32);
    }
    let points: Vec<Point3> = kept.iter().map(|&i| moved[i]).collect();
    let triangles: Vec<[u32; 3]> = (0..mesh.num_triangles())
        .filter_map(|t| {
            let [a, b, c] = mesh.triangle(t);
            Some([remap[a]?, remap[b]?, remap[c]?])
        })
        .collect();

    debug!(
        vertices = points.len(),
        faces = triangles.len(),
        "offset mesh"
    );
    Ok(TriangleMesh::from_parts(&points, &triangles))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Flat `n x n` grid at z = 0 with +Z normals.
    fn grid(n: usize, spacing: f64) -> PointCloud {
        let mut points = Vec::new();
        for i in 0..n {
            for j in 0..n {
                points.push(Point3::new(i as f64 * spacing, j as f64 * spacing, 0.0));
            }
        }
        let normals = vec![Vec3::z(); points.len()];
        PointCloud { points, normals }
    }

    #[test]
    fn test_mismatched_lengths() {
        assert!(PointCloud::new(vec![Point3::origin()], vec![]).is_err());
    }

    #[test]
    fn test_estimate_normals_flat_grid() {
        let cloud = grid(6, 1.0);
        let normals = estimate_normals(&cloud.points, 8, &Vec3::z());
        for n in normals {
            assert!((n - Vec3::z()).norm() < 1e-6);
        }
    }

    #[test]
    fn test_normals_face_reference() {
        let cloud = grid(6, 1.0);
        let normals = estimate_normals(&cloud.points, 8, &(-Vec3::z()));
        assert!(normals.iter().all(|n| n.z < -0.99));
    }

    #[test]
    fn test_outlier_removed() {
        let mut cloud = grid(8, 1.0);
        cloud.points.push(Point3::new(3.5, 3.5, 40.0));
        let kept = remove_statistical_outliers(&cloud.points, 5, 1.0);
        assert!(!kept.contains(&(cloud.points.len() - 1)));
        assert!(kept.len() >= 60);
    }

    #[test]
    fn test_hidden_points_on_sphere() {
        // Points on a unit sphere; the camera looks down from +Z.
        let mut points = Vec::new();
        for i in 0..12 {
            for j in 1..12 {
                let theta = i as f64 * std::f64::consts::TAU / 12.0;
                let phi = j as f64 * std::f64::consts::PI / 12.0;
                points.push(Point3::new(
                    phi.sin() * theta.cos(),
                    phi.sin() * theta.sin(),
                    phi.cos(),
                ));
            }
        }
        let camera = Point3::new(0.0, 0.0, 10.0);
        let visible = hidden_point_removal(&points, &camera, 1000.0);
        assert!(!visible.is_empty());
        assert!(visible.iter().all(|&i| points[i].z > -0.2));
        // The pole facing the camera is visible.
        let top = points
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.z.total_cmp(&b.1.z))
            .map(|(i, _)| i)
            .unwrap();
        assert!(visible.contains(&top));
    }

    #[test]
    fn test_offset_layer_moves_along_normal() {
        let cloud = grid(10, 1.0);
        let layer = build_offset_layer(&cloud, 2.0, &SurfaceSettings::default()).unwrap();
        assert!(layer.len() >= 3);
        assert!(layer.points.iter().all(|p| (p.z - 2.0).abs() < 1e-9));
        assert!(layer.normals.iter().all(|n| n.z > 0.99));
    }

    #[test]
    fn test_tiny_cloud_gives_empty_layer() {
        let cloud = PointCloud {
            points: vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)],
            normals: vec![Vec3::z(); 2],
        };
        let layer = build_offset_layer(&cloud, 1.0, &SurfaceSettings::default()).unwrap();
        assert!(layer.is_empty());
    }

    #[test]
    fn test_n_layers_stack_up() {
        let cloud = grid(10, 1.0);
        let layers = build_n_layers(&cloud, 1.5, 3, &SurfaceSettings::default()).unwrap();
        assert_eq!(layers.len(), 3);
        for (i, layer) in layers.iter().enumerate() {
            let expected = 1.5 * (i + 1) as f64;
            assert!(layer.points.iter().all(|p| (p.z - expected).abs() < 1e-6));
        }
    }

    #[test]
    fn test_subtract_near() {
        let base = grid(4, 1.0);
        let mut layer = grid(4, 1.0);
        for p in &mut layer.points[..8] {
            p.z = 0.5;
        }
        for p in &mut layer.points[8..] {
            p.z = 5.0;
        }
        let cleaned = subtract_near(&layer, &base.points, 1.6);
        assert_eq!(cleaned.len(), 8);
    }

    #[test]
    fn test_multi_direction_dedup() {
        let cloud = grid(6, 1.0);
        let settings = SurfaceSettings::default();
        let single = build_offset_layer(&cloud, 1.0, &settings).unwrap();
        let merged =
            build_offset_layer_multi(&cloud, 1.0, &[[0.0, 0.0, 1.0], [0.0, 0.0, 1.0]], &settings)
                .unwrap();
        assert_eq!(single.len(), merged.len());
    }

    #[test]
    fn test_offset_mesh_keeps_faces() {
        // Flat 5 x 5 grid mesh.
        let n = 5;
        let mut points = Vec::new();
        for i in 0..n {
            for j in 0..n {
                points.push(Point3::new(i as f64, j as f64, 0.0));
            }
        }
        let mut triangles = Vec::new();
        for i in 0..n - 1 {
            for j in 0..n - 1 {
                let a = (i * n + j) as u32;
                let b = a + n as u32;
                triangles.push([a, b, b + 1]);
                triangles.push([a, b + 1, a + 1]);
            }
        }
        let mesh = TriangleMesh::from_parts(&points, &triangles);
        let offset = offset_mesh(&mesh, 1.0, &SurfaceSettings::default()).unwrap();
        assert!(offset.num_triangles() > 0);
        let (min, max) = offset.bounds().unwrap();
        assert!((min.z - 1.0).abs() < 1e-9);
        assert!((max.z - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_settings_validate() {
        assert!(SurfaceSettings::default().validate().is_ok());
        let bad = SurfaceSettings {
            reference: [0.0; 3],
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
