//! Planner configuration.

use serde::{Deserialize, Serialize};
use weldpath_math::{Descriptor, PartFrame, PartKind};
use weldpath_program::MotionPolicy;
use weldpath_slicer::{BeadSettings, SliceSettings, SurfaceSettings};
use weldpath_strategy::SelectionPolicy;

use crate::error::Result;

/// Part shape and its fitted descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PartSettings {
    /// Plate, cylinder or cone.
    pub kind: PartKind,
    /// Base radius and half angle; ignored for plates.
    pub descriptor: Descriptor,
}

impl PartSettings {
    /// Planning frame for this part.
    pub fn frame(&self) -> Result<PartFrame> {
        Ok(PartFrame::new(self.kind, self.descriptor)?)
    }
}

/// Every tunable of the planner in one place.
///
/// Missing tables and keys fall back to their defaults, so a file holding
/// only `[bead]` is a complete configuration.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerSettings {
    /// Bead geometry and weld parameters.
    pub bead: BeadSettings,
    /// Slicing and contour filters.
    pub slice: SliceSettings,
    /// Surface offset layers.
    pub surface: SurfaceSettings,
    /// Strategy scoring and partitioning.
    pub policy: SelectionPolicy,
    /// Point thinning and motion classification.
    pub motion: MotionPolicy,
    /// Part shape.
    pub part: PartSettings,
}

impl PlannerSettings {
    /// Parse and validate settings from TOML.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let settings: Self = toml::from_str(s)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Serialize to TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.bead.validate()?;
        self.slice.validate()?;
        self.surface.validate()?;
        self.policy.validate()?;
        self.motion.validate()?;
        self.part.frame()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlanError;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults_round_trip() {
        let defaults = PlannerSettings::default();
        let text = defaults.to_toml_string().unwrap();
        assert_eq!(PlannerSettings::from_toml_str(&text).unwrap(), defaults);
    }

    #[test]
    fn test_partial_file() {
        let settings = PlannerSettings::from_toml_str(
            r#"
            [bead]
            width = 6.0
            step_over = 4.0

            [part]
            kind = "cylinder"
            descriptor = { base_radius = 50.0, half_angle_deg = 0.0 }
            "#,
        )
        .unwrap();
        assert_relative_eq!(settings.bead.width, 6.0);
        assert_relative_eq!(settings.bead.height, BeadSettings::default().height);
        assert_eq!(settings.part.kind, PartKind::Cylinder);
        assert_eq!(settings.policy, SelectionPolicy::default());
    }

    #[test]
    fn test_invalid_sections_rejected() {
        let err = PlannerSettings::from_toml_str("[bead]\nstep_over = 9.0\n").unwrap_err();
        assert!(matches!(err, PlanError::Slicer(_)));

        let err = PlannerSettings::from_toml_str("[part]\nkind = \"cone\"\n").unwrap_err();
        assert!(matches!(err, PlanError::Remap(_)));

        let err = PlannerSettings::from_toml_str("[bead\n").unwrap_err();
        assert!(matches!(err, PlanError::TomlParse(_)));
    }
}
