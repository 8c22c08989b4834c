//! Light types for the scene
//!
//! Position and orientation come from the light's node; directions stored
//! here are in the light's local frame.

use glam::DVec3;

use crate::math::{Angle, Color, Pose};

/// Variant-specific light parameters
#[derive(Debug, Clone, PartialEq)]
pub enum LightKind {
    /// Infinitely distant light (like the sun)
    Directional { direction: DVec3 },
    Point,
    Spot {
        direction: DVec3,
        inner_angle: Angle,
        outer_angle: Angle,
        falloff: f64,
    },
}

impl LightKind {
    pub fn directional() -> Self {
        LightKind::Directional {
            direction: DVec3::new(0.0, 0.0, -1.0),
        }
    }

    pub fn spot() -> Self {
        LightKind::Spot {
            direction: DVec3::new(0.0, 0.0, -1.0),
            inner_angle: Angle::from_radians(0.3),
            outer_angle: Angle::from_radians(0.5),
            falloff: 1.0,
        }
    }
}

/// Light source attached to a scene node
#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    pub kind: LightKind,
    pub diffuse: Color,
    pub specular: Color,
    pub intensity: f64,
    pub attenuation_constant: f64,
    pub attenuation_linear: f64,
    pub attenuation_quadratic: f64,
    /// Distance beyond which the light contributes nothing.
    pub range: f64,
    pub cast_shadows: bool,
}

impl Light {
    pub fn new(kind: LightKind) -> Self {
        Self {
            kind,
            diffuse: Color::WHITE,
            specular: Color::WHITE,
            intensity: 1.0,
            attenuation_constant: 1.0,
            attenuation_linear: 0.0,
            attenuation_quadratic: 0.0,
            range: 100.0,
            cast_shadows: true,
        }
    }

    pub fn directional(direction: DVec3) -> Self {
        Self::new(LightKind::Directional {
            direction: direction.normalize_or_zero(),
        })
    }

    pub fn point() -> Self {
        Self::new(LightKind::Point)
    }

    pub fn spot(direction: DVec3, inner_angle: Angle, outer_angle: Angle) -> Self {
        Self::new(LightKind::Spot {
            direction: direction.normalize_or_zero(),
            inner_angle,
            outer_angle,
            falloff: 1.0,
        })
    }

    pub fn with_diffuse(mut self, color: Color) -> Self {
        self.diffuse = color;
        self
    }

    pub fn with_attenuation(mut self, constant: f64, linear: f64, quadratic: f64) -> Self {
        self.attenuation_constant = constant;
        self.attenuation_linear = linear;
        self.attenuation_quadratic = quadratic;
        self
    }

    /// Local-frame direction, `None` for point lights.
    pub fn direction(&self) -> Option<DVec3> {
        match &self.kind {
            LightKind::Directional { direction } | LightKind::Spot { direction, .. } => {
                Some(*direction)
            }
            LightKind::Point => None,
        }
    }

    pub fn set_direction(&mut self, new_direction: DVec3) {
        let new_direction = new_direction.normalize_or_zero();
        match &mut self.kind {
            LightKind::Directional { direction } | LightKind::Spot { direction, .. } => {
                *direction = new_direction;
            }
            LightKind::Point => {}
        }
    }

    /// Distance attenuation factor; 1 for directional lights.
    pub fn attenuation(&self, distance: f64) -> f64 {
        if matches!(self.kind, LightKind::Directional { .. }) {
            return 1.0;
        }
        if distance > self.range {
            return 0.0;
        }
        let denom = self.attenuation_constant
            + self.attenuation_linear * distance
            + self.attenuation_quadratic * distance * distance;
        if denom <= f64::EPSILON {
            1.0
        } else {
            (1.0 / denom).min(1.0)
        }
    }

    /// Spot cone factor in `[0, 1]` for the angle between the spot axis and the
    /// direction to the lit point; 1 for other light kinds.
    pub fn spot_factor(&self, angle: f64) -> f64 {
        match self.kind {
            LightKind::Spot {
                inner_angle,
                outer_angle,
                falloff,
                ..
            } => {
                let (inner, outer) = (inner_angle.radians() * 0.5, outer_angle.radians() * 0.5);
                if angle <= inner {
                    1.0
                } else if angle >= outer || outer <= inner {
                    0.0
                } else {
                    ((outer - angle) / (outer - inner)).powf(falloff.max(f64::EPSILON))
                }
            }
            _ => 1.0,
        }
    }

    /// World-space direction given the light node's world pose.
    pub fn world_direction(&self, pose: &Pose) -> Option<DVec3> {
        self.direction().map(|d| (pose.rotation * d).normalize_or_zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attenuation_respects_range() {
        let light = Light::point().with_attenuation(1.0, 0.5, 0.0);
        assert!((light.attenuation(2.0) - 0.5).abs() < 1e-12);
        assert_eq!(light.attenuation(200.0), 0.0);
        assert_eq!(Light::directional(DVec3::NEG_Z).attenuation(1e6), 1.0);
    }

    #[test]
    fn test_spot_cone() {
        let light = Light::spot(
            DVec3::NEG_Z,
            Angle::from_radians(0.4),
            Angle::from_radians(1.0),
        );
        assert_eq!(light.spot_factor(0.1), 1.0);
        assert_eq!(light.spot_factor(0.6), 0.0);
        let mid = light.spot_factor(0.35);
        assert!(mid > 0.0 && mid < 1.0);
    }

    #[test]
    fn test_world_direction_follows_node() {
        let light = Light::directional(DVec3::X);
        let pose = Pose::from_xyz_rpy(0.0, 0.0, 0.0, 0.0, 0.0, std::f64::consts::FRAC_PI_2);
        let dir = light.world_direction(&pose).unwrap();
        assert!(dir.abs_diff_eq(DVec3::Y, 1e-12));
        assert!(Light::point().world_direction(&pose).is_none());
    }
}
