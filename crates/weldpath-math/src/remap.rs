//! Cylindrical and conical unrolling.
//!
//! Curved parts are planned in a flat frame: x stays along the part axis,
//! y becomes arc length around the axis and z becomes the radial distance.
//! Cones are additionally tilted about Y by their half angle so the unrolled
//! surface lies flat.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Point3, Transform};

/// Errors raised by the part-frame remap.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemapError {
    /// The radius function evaluated to zero or less.
    #[error("radius must be positive, got {radius} at x={x}")]
    NonPositiveRadius {
        /// Axial coordinate where the radius was evaluated.
        x: f64,
        /// The offending radius.
        radius: f64,
    },

    /// Descriptor values are unusable for the requested part kind.
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),
}

/// Result type for remap operations.
pub type Result<T> = std::result::Result<T, RemapError>;

/// Classified shape of the part being repaired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartKind {
    /// Flat part; the planning frame is the input frame.
    #[default]
    Plate,
    /// Cylinder with its axis along X.
    Cylinder,
    /// Cone with its axis along X, narrowing towards +X.
    Cone,
}

/// Shape descriptor supplied alongside the part kind.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Descriptor {
    /// Radius at x = 0 (mm).
    pub base_radius: f64,
    /// Cone half angle in degrees. Zero for cylinders.
    pub half_angle_deg: f64,
}

/// Reference radius used to turn an angle into arc length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RadiusFn {
    /// Same radius everywhere along the axis.
    Constant(f64),
    /// `radius(x) = base_radius - x * tan(half_angle)`.
    Cone {
        /// Radius at x = 0.
        base_radius: f64,
        /// Half angle in degrees.
        half_angle_deg: f64,
    },
}

impl RadiusFn {
    /// Evaluate the radius at axial position `x`.
    pub fn at(&self, x: f64) -> f64 {
        match *self {
            RadiusFn::Constant(r) => r,
            RadiusFn::Cone {
                base_radius,
                half_angle_deg,
            } => base_radius - x * half_angle_deg.to_radians().tan(),
        }
    }

    fn checked_at(&self, x: f64) -> Result<f64> {
        let radius = self.at(x);
        if radius <= 0.0 || !radius.is_finite() {
            return Err(RemapError::NonPositiveRadius { x, radius });
        }
        Ok(radius)
    }
}

/// Map a cartesian point to `(x, theta * radius(x), r)`.
pub fn cartesian_to_cylindrical(p: &Point3, radius: &RadiusFn) -> Result<Point3> {
    let reference = radius.checked_at(p.x)?;
    let theta = p.y.atan2(p.z);
    let r = (p.y * p.y + p.z * p.z).sqrt();
    Ok(Point3::new(p.x, theta * reference, r))
}

/// Inverse of [`cartesian_to_cylindrical`].
pub fn cylindrical_to_cartesian(p: &Point3, radius: &RadiusFn) -> Result<Point3> {
    let reference = radius.checked_at(p.x)?;
    let theta = p.y / reference;
    let (s, c) = theta.sin_cos();
    Ok(Point3::new(p.x, p.z * s, p.z * c))
}

/// Bidirectional mapping between the part frame and the planning frame.
#[derive(Debug, Clone)]
pub struct PartFrame {
    kind: PartKind,
    radius: Option<RadiusFn>,
    tilt: Transform,
    untilt: Transform,
}

impl PartFrame {
    /// Build the frame for a part kind and its descriptor.
    pub fn new(kind: PartKind, descriptor: Descriptor) -> Result<Self> {
        match kind {
            PartKind::Plate => Ok(Self::plate()),
            PartKind::Cylinder => {
                if descriptor.base_radius <= 0.0 {
                    return Err(RemapError::InvalidDescriptor(
                        "cylinder needs a positive base_radius".into(),
                    ));
                }
                Ok(Self {
                    kind,
                    radius: Some(RadiusFn::Constant(descriptor.base_radius)),
                    tilt: Transform::identity(),
                    untilt: Transform::identity(),
                })
            }
            PartKind::Cone => {
                if descriptor.base_radius <= 0.0 {
                    return Err(RemapError::InvalidDescriptor(
                        "cone needs a positive base_radius".into(),
                    ));
                }
                if !(0.0..90.0).contains(&descriptor.half_angle_deg) {
                    return Err(RemapError::InvalidDescriptor(format!(
                        "cone half angle {} outside [0, 90)",
                        descriptor.half_angle_deg
                    )));
                }
                let alpha = descriptor.half_angle_deg.to_radians();
                Ok(Self {
                    kind,
                    radius: Some(RadiusFn::Cone {
                        base_radius: descriptor.base_radius,
                        half_angle_deg: descriptor.half_angle_deg,
                    }),
                    tilt: Transform::rotation_y(-alpha),
                    untilt: Transform::rotation_y(alpha),
                })
            }
        }
    }

    /// Identity frame for flat parts.
    pub fn plate() -> Self {
        Self {
            kind: PartKind::Plate,
            radius: None,
            tilt: Transform::identity(),
            untilt: Transform::identity(),
        }
    }

    /// Part kind this frame was built for.
    pub fn kind(&self) -> PartKind {
        self.kind
    }

    /// True when planning happens directly in the part frame.
    pub fn is_identity(&self) -> bool {
        self.radius.is_none()
    }

    /// Map a part-frame point into the planning frame.
    pub fn to_planning(&self, p: &Point3) -> Result<Point3> {
        match &self.radius {
            None => Ok(*p),
            Some(radius) => {
                let unrolled = cartesian_to_cylindrical(p, radius)?;
                Ok(self.tilt.apply_point(&unrolled))
            }
        }
    }

    /// Map a planning-frame point back into the part frame.
    pub fn to_cartesian(&self, p: &Point3) -> Result<Point3> {
        match &self.radius {
            None => Ok(*p),
            Some(radius) => {
                let unrolled = self.untilt.apply_point(p);
                cylindrical_to_cartesian(&unrolled, radius)
            }
        }
    }

    /// Map every point into the planning frame.
    pub fn to_planning_all(&self, points: &[Point3]) -> Result<Vec<Point3>> {
        points.iter().map(|p| self.to_planning(p)).collect()
    }

    /// Map every point back into the part frame.
    pub fn to_cartesian_all(&self, points: &[Point3]) -> Result<Vec<Point3>> {
        points.iter().map(|p| self.to_cartesian(p)).collect()
    }
}

impl Default for PartFrame {
    fn default() -> Self {
        Self::plate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_points() -> Vec<Point3> {
        vec![
            Point3::new(0.0, 0.0, 50.0),
            Point3::new(12.5, 30.0, 40.0),
            Point3::new(-4.0, -20.0, 45.0),
            Point3::new(7.0, 49.0, 5.0),
        ]
    }

    #[test]
    fn test_cylinder_round_trip() {
        let radius = RadiusFn::Constant(50.0);
        for p in sample_points() {
            let unrolled = cartesian_to_cylindrical(&p, &radius).unwrap();
            let back = cylindrical_to_cartesian(&unrolled, &radius).unwrap();
            assert!((back - p).norm() < 1e-6);
        }
    }

    #[test]
    fn test_inverse_then_forward_is_identity() {
        let radius = RadiusFn::Cone {
            base_radius: 60.0,
            half_angle_deg: 15.0,
        };
        // Planning-frame samples with |y / r(x)| < pi.
        let planning = [
            Point3::new(0.0, 10.0, 58.0),
            Point3::new(20.0, -40.0, 52.0),
            Point3::new(35.0, 100.0, 49.0),
        ];
        for p in planning {
            let cart = cylindrical_to_cartesian(&p, &radius).unwrap();
            let again = cartesian_to_cylindrical(&cart, &radius).unwrap();
            assert!((again - p).norm() < 1e-6);
        }
    }

    #[test]
    fn test_unrolled_y_is_arc_length() {
        let radius = RadiusFn::Constant(10.0);
        let p = Point3::new(0.0, 10.0, 0.0);
        let unrolled = cartesian_to_cylindrical(&p, &radius).unwrap();
        assert_relative_eq!(unrolled.y, 10.0 * std::f64::consts::FRAC_PI_2, epsilon = 1e-12);
        assert_relative_eq!(unrolled.z, 10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_cone_radius() {
        let radius = RadiusFn::Cone {
            base_radius: 20.0,
            half_angle_deg: 45.0,
        };
        assert_relative_eq!(radius.at(5.0), 15.0, epsilon = 1e-12);
        assert!(matches!(
            cartesian_to_cylindrical(&Point3::new(25.0, 1.0, 1.0), &radius),
            Err(RemapError::NonPositiveRadius { .. })
        ));
    }

    #[test]
    fn test_cone_frame_round_trip() {
        let frame = PartFrame::new(
            PartKind::Cone,
            Descriptor {
                base_radius: 60.0,
                half_angle_deg: 20.0,
            },
        )
        .unwrap();
        for p in sample_points() {
            let planning = frame.to_planning(&p).unwrap();
            let back = frame.to_cartesian(&planning).unwrap();
            assert!((back - p).norm() < 1e-6);
        }
    }

    #[test]
    fn test_plate_frame_is_identity() {
        let frame = PartFrame::new(PartKind::Plate, Descriptor::default()).unwrap();
        assert!(frame.is_identity());
        let p = Point3::new(1.0, 2.0, 3.0);
        assert_eq!(frame.to_planning(&p).unwrap(), p);
    }

    #[test]
    fn test_invalid_descriptor() {
        assert!(PartFrame::new(PartKind::Cylinder, Descriptor::default()).is_err());
        let steep = Descriptor {
            base_radius: 10.0,
            half_angle_deg: 95.0,
        };
        assert!(PartFrame::new(PartKind::Cone, steep).is_err());
    }
}
