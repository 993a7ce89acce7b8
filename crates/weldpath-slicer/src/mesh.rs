//! Triangle mesh of the scanned damage surface.

use serde::{Deserialize, Serialize};
use weldpath_math::{Point3, Transform, Vec3};

use crate::error::{Result, SlicerError};

/// Triangle mesh in flat-array form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriangleMesh {
    /// Flat array of vertex positions: `[x0, y0, z0, x1, y1, z1, ...]`.
    pub vertices: Vec<f64>,
    /// Flat array of triangle indices: `[i0, i1, i2, ...]`.
    pub indices: Vec<u32>,
    /// Flat array of vertex normals, same length as `vertices` or empty.
    #[serde(default)]
    pub normals: Vec<f64>,
}

impl TriangleMesh {
    /// Create an empty mesh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a mesh from points and index triples.
    pub fn from_parts(points: &[Point3], triangles: &[[u32; 3]]) -> Self {
        Self {
            vertices: points.iter().flat_map(|p| [p.x, p.y, p.z]).collect(),
            indices: triangles.iter().flatten().copied().collect(),
            normals: Vec::new(),
        }
    }

    /// Number of triangles.
    pub fn num_triangles(&self) -> usize {
        self.indices.len() / 3
    }

    /// Number of vertices.
    pub fn num_vertices(&self) -> usize {
        self.vertices.len() / 3
    }

    /// True when the mesh has no triangles.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty() || self.vertices.is_empty()
    }

    /// Vertex position `i`.
    pub fn vertex(&self, i: usize) -> Point3 {
        Point3::new(
            self.vertices[i * 3],
            self.vertices[i * 3 + 1],
            self.vertices[i * 3 + 2],
        )
    }

    /// All vertex positions.
    pub fn points(&self) -> Vec<Point3> {
        (0..self.num_vertices()).map(|i| self.vertex(i)).collect()
    }

    /// Vertex indices of triangle `t`.
    pub fn triangle(&self, t: usize) -> [usize; 3] {
        [
            self.indices[t * 3] as usize,
            self.indices[t * 3 + 1] as usize,
            self.indices[t * 3 + 2] as usize,
        ]
    }

    /// Check index ranges and array shapes.
    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(SlicerError::EmptyMesh);
        }
        if self.vertices.len() % 3 != 0 || self.indices.len() % 3 != 0 {
            return Err(SlicerError::DegenerateMesh(
                "flat arrays are not multiples of 3".into(),
            ));
        }
        let n = self.num_vertices() as u32;
        if let Some(bad) = self.indices.iter().find(|&&i| i >= n) {
            return Err(SlicerError::DegenerateMesh(format!(
                "index {bad} out of range for {n} vertices"
            )));
        }
        if !self.normals.is_empty() && self.normals.len() != self.vertices.len() {
            return Err(SlicerError::DegenerateMesh(
                "normals length does not match vertices".into(),
            ));
        }
        Ok(())
    }

    /// Compute the bounding box as `(min, max)`.
    pub fn bounds(&self) -> Option<(Point3, Point3)> {
        if self.vertices.len() < 3 {
            return None;
        }
        let mut min = self.vertex(0);
        let mut max = min;
        for i in 1..self.num_vertices() {
            let p = self.vertex(i);
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            min.z = min.z.min(p.z);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
            max.z = max.z.max(p.z);
        }
        Some((min, max))
    }

    /// Per-vertex normals.
    ///
    /// Stored normals are returned as-is; otherwise area-weighted face normals
    /// are accumulated per vertex.
    pub fn vertex_normals(&self) -> Vec<Vec3> {
        let n = self.num_vertices();
        if self.normals.len() == self.vertices.len() {
            return (0..n)
                .map(|i| {
                    Vec3::new(
                        self.normals[i * 3],
                        self.normals[i * 3 + 1],
                        self.normals[i * 3 + 2],
                    )
                })
                .collect();
        }

        let mut acc = vec![Vec3::zeros(); n];
        for t in 0..self.num_triangles() {
            let [a, b, c] = self.triangle(t);
            let face = (self.vertex(b) - self.vertex(a)).cross(&(self.vertex(c) - self.vertex(a)));
            acc[a] += face;
            acc[b] += face;
            acc[c] += face;
        }
        acc.into_iter()
            .map(|v| {
                let len = v.norm();
                if len > 1e-12 {
                    v / len
                } else {
                    Vec3::z()
                }
            })
            .collect()
    }

    /// Apply an affine transform to every vertex (and normal).
    pub fn transformed(&self, transform: &Transform) -> Self {
        let mut out = self.clone();
        for i in 0..self.num_vertices() {
            let p = transform.apply_point(&self.vertex(i));
            out.vertices[i * 3] = p.x;
            out.vertices[i * 3 + 1] = p.y;
            out.vertices[i * 3 + 2] = p.z;
        }
        if self.normals.len() == self.vertices.len() {
            for i in 0..self.num_vertices() {
                let v = Vec3::new(
                    self.normals[i * 3],
                    self.normals[i * 3 + 1],
                    self.normals[i * 3 + 2],
                );
                let r = transform.apply_vec(&v);
                out.normals[i * 3] = r.x;
                out.normals[i * 3 + 1] = r.y;
                out.normals[i * 3 + 2] = r.z;
            }
        }
        out
    }

    /// Map every vertex through a fallible point function.
    ///
    /// Stored normals are dropped since a non-affine map invalidates them.
    pub fn try_map_points<E>(
        &self,
        mut f: impl FnMut(&Point3) -> std::result::Result<Point3, E>,
    ) -> std::result::Result<Self, E> {
        let mut vertices = Vec::with_capacity(self.vertices.len());
        for i in 0..self.num_vertices() {
            let p = f(&self.vertex(i))?;
            vertices.extend_from_slice(&[p.x, p.y, p.z]);
        }
        Ok(Self {
            vertices,
            indices: self.indices.clone(),
            normals: Vec::new(),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Axis-aligned box from `(0,0,0)` to `size`.
    pub(crate) fn make_box_mesh(size: [f64; 3]) -> TriangleMesh {
        let [sx, sy, sz] = size;
        let points = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(sx, 0.0, 0.0),
            Point3::new(sx, sy, 0.0),
            Point3::new(0.0, sy, 0.0),
            Point3::new(0.0, 0.0, sz),
            Point3::new(sx, 0.0, sz),
            Point3::new(sx, sy, sz),
            Point3::new(0.0, sy, sz),
        ];
        let triangles = [
            [0, 2, 1],
            [0, 3, 2],
            [4, 5, 6],
            [4, 6, 7],
            [0, 1, 5],
            [0, 5, 4],
            [2, 3, 7],
            [2, 7, 6],
            [0, 4, 7],
            [0, 7, 3],
            [1, 2, 6],
            [1, 6, 5],
        ];
        TriangleMesh::from_parts(&points, &triangles)
    }

    #[test]
    fn test_bounds() {
        let mesh = make_box_mesh([10.0, 20.0, 5.0]);
        let (min, max) = mesh.bounds().unwrap();
        assert!(min.coords.norm() < 1e-12);
        assert!((max.y - 20.0).abs() < 1e-12);
        assert!((max.z - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_validate() {
        let mut mesh = make_box_mesh([1.0, 1.0, 1.0]);
        assert!(mesh.validate().is_ok());
        mesh.indices.push(99);
        mesh.indices.push(0);
        mesh.indices.push(1);
        assert!(matches!(mesh.validate(), Err(SlicerError::DegenerateMesh(_))));
        assert!(matches!(
            TriangleMesh::new().validate(),
            Err(SlicerError::EmptyMesh)
        ));
    }

    #[test]
    fn test_vertex_normals_point_outward() {
        let mesh = make_box_mesh([2.0, 2.0, 2.0]);
        let normals = mesh.vertex_normals();
        // Top corner normal leans towards +X+Y+Z.
        let n = normals[6];
        assert!(n.x > 0.0 && n.y > 0.0 && n.z > 0.0);
        assert!((n.norm() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_transformed() {
        let mesh = make_box_mesh([1.0, 1.0, 1.0]);
        let moved = mesh.transformed(&Transform::translation(0.0, 0.0, 5.0));
        let (min, _) = moved.bounds().unwrap();
        assert!((min.z - 5.0).abs() < 1e-12);
    }
}
