#![warn(missing_docs)]

//! Damage slicing for weld repair planning.
//!
//! This crate turns a triangulated damage surface into a stack of contour
//! layers: surface offsetting for successive passes, plane slicing at
//! bead-derived heights, contour clean-up and filtering, and the parent/child
//! curve hierarchy across layers.
//!
//! # Example
//!
//! ```ignore
//! use weldpath_slicer::{slice, BeadSettings, SliceSettings};
//!
//! let mesh: TriangleMesh = // ... damage volume in the planning frame
//! let layers = slice(&mesh, &BeadSettings::default(), &SliceSettings::default())?;
//!
//! for layer in &layers {
//!     println!("z = {:.2}: {} contours", layer.z, layer.contours.len());
//! }
//! ```

pub mod bead;
pub mod contour;
pub mod error;
pub mod hierarchy;
pub mod mesh;
pub mod path;
pub mod slice;
pub mod surface;

pub use bead::{BeadSettings, DEFAULT_INSET_RATIO, DEFAULT_STEP_RATIO};
pub use contour::{build_layer, passes_filter, Contour, ContourSettings, Layer};
pub use error::{Result, SlicerError};
pub use hierarchy::{CurveId, CurveNode, CurveTree};
pub use mesh::TriangleMesh;
pub use path::{rotate_point, segment_distance, segments_cross, Polygon};
pub use slice::{layer_heights, layer_thickness, slice_mesh, SliceLayer};
pub use surface::{
    build_n_layers, build_offset_layer, build_offset_layer_multi, offset_mesh, PointCloud,
    SurfaceSettings,
};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;
use weldpath_math::{Dir3, PartFrame, Vec3};

/// Slicing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SliceSettings {
    /// Contour clean-up and filter parameters.
    pub contour: ContourSettings,
    /// Append one more height when the damage top is a full layer above the last cut.
    pub extra_top_layer: bool,
    /// Cutting direction (planes are normal to it).
    pub axis: [f64; 3],
}

impl Default for SliceSettings {
    fn default() -> Self {
        Self {
            contour: ContourSettings::default(),
            extra_top_layer: true,
            axis: [0.0, 0.0, 1.0],
        }
    }
}

impl SliceSettings {
    /// Cutting direction as a unit vector.
    pub fn axis_dir(&self) -> Dir3 {
        Dir3::new_normalize(Vec3::from(self.axis))
    }

    /// Validate settings.
    pub fn validate(&self) -> Result<()> {
        if Vec3::from(self.axis).norm() < 1e-12 {
            return Err(SlicerError::InvalidSettings(
                "slicing axis must be non-zero".into(),
            ));
        }
        if self.contour.opening_ratio < 0.0 || self.contour.opening_ratio >= 0.5 {
            return Err(SlicerError::InvalidSettings(
                "opening_ratio must be in [0, 0.5)".into(),
            ));
        }
        if self.contour.slenderness_divisor <= 0.0 {
            return Err(SlicerError::InvalidSettings(
                "slenderness_divisor must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Cutting heights for a damage spanning `z_min..z_max`.
pub fn damage_heights(z_min: f64, z_max: f64, bead: &BeadSettings, settings: &SliceSettings) -> Vec<f64> {
    let thickness = layer_thickness(bead.height, bead.width, bead.step_over);
    let mut heights = layer_heights(z_min, z_max, thickness);
    if !settings.extra_top_layer {
        heights.retain(|&z| z < z_max - 1e-9);
    }
    heights
}

/// Slice a damage mesh into filtered contour layers.
///
/// The mesh is rotated so the slicing axis is +Z; layers and contours are
/// returned in that frame, bottom to top. Heights with no surviving contour
/// give empty layers.
pub fn slice(mesh: &TriangleMesh, bead: &BeadSettings, settings: &SliceSettings) -> Result<Vec<Layer>> {
    bead.validate()?;
    settings.validate()?;
    mesh.validate()?;

    let aligned = mesh.transformed(&slice::alignment(&settings.axis_dir()));
    let (min, max) = aligned.bounds().ok_or(SlicerError::EmptyMesh)?;
    let heights = damage_heights(min.z, max.z, bead, settings);
    if heights.is_empty() {
        return Err(SlicerError::SliceFailed(
            "damage thinner than one layer".into(),
        ));
    }
    slice::check_heights(&aligned, &heights)?;

    let raw = slice_mesh(&aligned, &heights)?;
    let layers: Vec<Layer> = raw
        .par_iter()
        .map(|r| build_layer(r, bead, &settings.contour))
        .collect();

    info!(
        layers = layers.len(),
        contours = layers.iter().map(|l| l.contours.len()).sum::<usize>(),
        "sliced damage"
    );
    Ok(layers)
}

/// Map a mesh into the part's planning frame and slice it.
pub fn slice_part(
    mesh: &TriangleMesh,
    frame: &PartFrame,
    bead: &BeadSettings,
    settings: &SliceSettings,
) -> Result<Vec<Layer>> {
    let planar = if frame.is_identity() {
        mesh.clone()
    } else {
        mesh.try_map_points(|p| frame.to_planning(p))?
    };
    slice(&planar, bead, settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::tests::make_box_mesh;

    #[test]
    fn test_settings_validate() {
        assert!(SliceSettings::default().validate().is_ok());
        let bad = SliceSettings {
            axis: [0.0; 3],
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_damage_heights_extra_top() {
        let bead = BeadSettings::default();
        let settings = SliceSettings::default();
        let t = layer_thickness(bead.height, bead.width, bead.step_over);
        let with = damage_heights(0.0, 3.0 * t, &bead, &settings);
        let without = damage_heights(
            0.0,
            3.0 * t,
            &bead,
            &SliceSettings {
                extra_top_layer: false,
                ..settings
            },
        );
        assert_eq!(with.len(), without.len() + 1);
    }

    #[test]
    fn test_slice_box_damage() {
        let mesh = make_box_mesh([30.0, 20.0, 4.0]);
        let layers = slice(&mesh, &BeadSettings::default(), &SliceSettings::default()).unwrap();
        assert!(!layers.is_empty());
        // Interior cuts see the full 30 x 20 section, slightly rounded by the opening.
        let mid = &layers[layers.len() / 2];
        assert_eq!(mid.contours.len(), 1);
        assert!((mid.contours[0].area() - 600.0).abs() < 5.0);
    }

    #[test]
    fn test_slice_part_plate_matches_slice() {
        let mesh = make_box_mesh([30.0, 20.0, 4.0]);
        let bead = BeadSettings::default();
        let settings = SliceSettings::default();
        let a = slice(&mesh, &bead, &settings).unwrap();
        let b = slice_part(&mesh, &PartFrame::plate(), &bead, &settings).unwrap();
        assert_eq!(a, b);
    }
}
