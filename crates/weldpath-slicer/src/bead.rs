//! Weld bead geometry shared by every planning stage.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SlicerError};

/// Ratio of step-over to bead width used when no step-over is given.
pub const DEFAULT_STEP_RATIO: f64 = 0.738;

/// Ratio of boundary inset to bead width used when no inset is given.
pub const DEFAULT_INSET_RATIO: f64 = 0.3;

/// Bead and process parameters.
///
/// All lengths in mm. `weld_speed` is in m/min and `material_density` in
/// g/cm^3.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeadSettings {
    /// Bead width `w`.
    pub width: f64,
    /// Bead height `h`.
    pub height: f64,
    /// Step-over `p` between adjacent beads.
    pub step_over: f64,
    /// Inset `o` of the first bead centre from the boundary.
    pub inset: f64,
    /// Travel speed while welding (m/min).
    pub weld_speed: f64,
    /// Filler material density (g/cm^3).
    pub material_density: f64,
}

impl BeadSettings {
    /// Settings derived from a bead width and height with the default ratios.
    pub fn from_bead(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            step_over: DEFAULT_STEP_RATIO * width,
            inset: DEFAULT_INSET_RATIO * width,
            ..Self::default()
        }
    }

    /// Smallest area that can hold a single bead, `pi * (w/2)^2`.
    pub fn min_area(&self) -> f64 {
        std::f64::consts::PI * (self.width / 2.0).powi(2)
    }

    /// Validate settings.
    pub fn validate(&self) -> Result<()> {
        if self.width <= 0.0 || self.height <= 0.0 {
            return Err(SlicerError::InvalidSettings(
                "bead width and height must be positive".into(),
            ));
        }
        if self.step_over <= 0.0 || self.step_over > self.width {
            return Err(SlicerError::InvalidSettings(
                "step_over must be in (0, width]".into(),
            ));
        }
        if self.inset < 0.0 {
            return Err(SlicerError::InvalidSettings(
                "inset must not be negative".into(),
            ));
        }
        if self.weld_speed <= 0.0 {
            return Err(SlicerError::InvalidSettings(
                "weld_speed must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl Default for BeadSettings {
    fn default() -> Self {
        let width = 5.0;
        Self {
            width,
            height: 2.0,
            step_over: DEFAULT_STEP_RATIO * width,
            inset: DEFAULT_INSET_RATIO * width,
            weld_speed: 0.4,
            material_density: 5.06,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let bead = BeadSettings::default();
        assert!((bead.step_over - 3.69).abs() < 1e-9);
        assert!((bead.inset - 1.5).abs() < 1e-9);
        assert!(bead.validate().is_ok());
    }

    #[test]
    fn test_invalid_step_over() {
        let bead = BeadSettings {
            step_over: 6.0,
            ..Default::default()
        };
        assert!(bead.validate().is_err());
    }
}
