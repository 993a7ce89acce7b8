//! Strategy selection policy.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StrategyError};

/// Tunable thresholds and weights for strategy selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionPolicy {
    /// Coverage (%) below which a contour is partitioned.
    pub min_area_covered: f64,
    /// Score weight of `area_covered_pct`.
    pub weight_area: f64,
    /// Score weight (penalty) of the element count.
    pub weight_elements: f64,
    /// Score weight (penalty) of `material_outside_pct`.
    pub weight_outside: f64,
    /// Score weight (penalty) of `overlap_excess_pct`.
    pub weight_overlap: f64,
    /// Raster angle sweep step in degrees.
    pub angle_step_deg: f64,
    /// Maximum partition recursion depth per contour.
    pub max_partition_depth: usize,
    /// Cut lines applied per partition.
    pub partition_cuts: usize,
    /// Margin added to a claimed footprint when matching repeated contours.
    pub dedup_radius: f64,
    /// Convexity index above which the 0 degree raster adapts its step-over.
    pub adaptive_convexity_0: f64,
    /// Convexity index above which the 90 degree raster adapts its step-over.
    pub adaptive_convexity_90: f64,
    /// Evaluate contours on the rayon pool.
    pub parallel: bool,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            min_area_covered: 92.0,
            weight_area: 0.98,
            weight_elements: 0.35,
            weight_outside: 0.12,
            weight_overlap: 0.09,
            angle_step_deg: 10.0,
            max_partition_depth: 1,
            partition_cuts: 1,
            dedup_radius: 3.0,
            adaptive_convexity_0: 0.9,
            adaptive_convexity_90: 0.95,
            parallel: true,
        }
    }
}

impl SelectionPolicy {
    /// Sweep angles in degrees, `0, step, 2 step, ...` below 180.
    pub fn sweep_angles(&self) -> Vec<f64> {
        let mut angles = Vec::new();
        let mut k = 0usize;
        loop {
            let a = k as f64 * self.angle_step_deg;
            if a >= 180.0 - 1e-9 {
                break;
            }
            angles.push(a);
            k += 1;
        }
        angles
    }

    /// Sum of the score weights.
    pub fn total_weight(&self) -> f64 {
        self.weight_area + self.weight_elements + self.weight_outside + self.weight_overlap
    }

    /// Validate the policy.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.min_area_covered) {
            return Err(StrategyError::InvalidSettings(
                "min_area_covered must be a percentage".into(),
            ));
        }
        if self.angle_step_deg <= 0.0 || self.angle_step_deg >= 180.0 {
            return Err(StrategyError::InvalidSettings(
                "angle_step_deg must be in (0, 180)".into(),
            ));
        }
        if self.total_weight() <= 0.0 {
            return Err(StrategyError::InvalidSettings(
                "score weights must not sum to zero".into(),
            ));
        }
        if self.partition_cuts == 0 {
            return Err(StrategyError::InvalidSettings(
                "partition_cuts must be at least 1".into(),
            ));
        }
        if self.dedup_radius < 0.0 {
            return Err(StrategyError::InvalidSettings(
                "dedup_radius must not be negative".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweep_angles() {
        let angles = SelectionPolicy::default().sweep_angles();
        assert_eq!(angles.len(), 18);
        assert_eq!(angles[0], 0.0);
        assert!((angles[17] - 170.0).abs() < 1e-9);
    }

    #[test]
    fn test_validate() {
        assert!(SelectionPolicy::default().validate().is_ok());
        let bad = SelectionPolicy {
            angle_step_deg: 0.0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
