//! Wide-angle lens projection models.
//!
//! A lens maps the angle `theta` between a ray and the optical axis to a
//! normalised image radius `r = c1 * f * fun(theta / c2 + c3)`.

use std::f64::consts::FRAC_PI_2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AngleFunctionType {
    Identity,
    Sin,
    Tan,
}

impl AngleFunctionType {
    pub fn apply(self, x: f64) -> f64 {
        match self {
            AngleFunctionType::Identity => x,
            AngleFunctionType::Sin => x.sin(),
            AngleFunctionType::Tan => x.tan(),
        }
    }

    pub fn inverse(self, y: f64) -> f64 {
        match self {
            AngleFunctionType::Identity => y,
            AngleFunctionType::Sin => y.clamp(-1.0, 1.0).asin(),
            AngleFunctionType::Tan => y.atan(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingFunctionType {
    Gnomonical,
    Stereographic,
    Equidistant,
    EquisolidAngle,
    Orthographic,
    Custom,
}

/// Parameters of the radial projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraLens {
    mapping: MappingFunctionType,
    c1: f64,
    c2: f64,
    c3: f64,
    f: f64,
    fun: AngleFunctionType,
    /// Rescale `f` so that half the HFOV lands on the image edge.
    pub scale_to_hfov: bool,
    /// Rays further than this from the optical axis are not imaged.
    pub cutoff_angle: f64,
}

impl Default for CameraLens {
    fn default() -> Self {
        Self::new(MappingFunctionType::Stereographic)
    }
}

impl CameraLens {
    pub fn new(mapping: MappingFunctionType) -> Self {
        let mut lens = Self {
            mapping,
            c1: 1.0,
            c2: 1.0,
            c3: 0.0,
            f: 1.0,
            fun: AngleFunctionType::Tan,
            scale_to_hfov: true,
            cutoff_angle: FRAC_PI_2,
        };
        lens.set_type(mapping);
        lens
    }

    /// Fully custom mapping `r = c1 * f * fun(theta / c2 + c3)`.
    pub fn custom(c1: f64, c2: f64, c3: f64, f: f64, fun: AngleFunctionType) -> Self {
        Self {
            mapping: MappingFunctionType::Custom,
            c1,
            c2,
            c3,
            f,
            fun,
            scale_to_hfov: true,
            cutoff_angle: FRAC_PI_2,
        }
    }

    pub fn mapping(&self) -> MappingFunctionType {
        self.mapping
    }

    /// Switch to a predefined mapping. `Custom` keeps the current coefficients.
    pub fn set_type(&mut self, mapping: MappingFunctionType) {
        let coefficients = match mapping {
            MappingFunctionType::Gnomonical => Some((1.0, 1.0, AngleFunctionType::Tan)),
            MappingFunctionType::Stereographic => Some((2.0, 2.0, AngleFunctionType::Tan)),
            MappingFunctionType::Equidistant => Some((1.0, 1.0, AngleFunctionType::Identity)),
            MappingFunctionType::EquisolidAngle => Some((2.0, 2.0, AngleFunctionType::Sin)),
            MappingFunctionType::Orthographic => Some((1.0, 1.0, AngleFunctionType::Sin)),
            MappingFunctionType::Custom => None,
        };
        if let Some((c1, c2, fun)) = coefficients {
            self.c1 = c1;
            self.c2 = c2;
            self.c3 = 0.0;
            self.f = 1.0;
            self.fun = fun;
        }
        self.mapping = mapping;
    }

    pub fn c1(&self) -> f64 {
        self.c1
    }

    pub fn c2(&self) -> f64 {
        self.c2
    }

    pub fn c3(&self) -> f64 {
        self.c3
    }

    pub fn f(&self) -> f64 {
        self.f
    }

    pub fn angle_function(&self) -> AngleFunctionType {
        self.fun
    }

    /// Focal scale used for an image with the given horizontal field of view.
    pub fn focal_scale(&self, hfov: f64) -> f64 {
        if !self.scale_to_hfov {
            return self.f;
        }
        let edge = self.c1 * self.fun.apply(hfov * 0.5 / self.c2 + self.c3);
        if edge.abs() <= f64::EPSILON {
            self.f
        } else {
            1.0 / edge
        }
    }

    /// Normalised radius of a ray at `theta` from the axis.
    pub fn radius(&self, theta: f64, hfov: f64) -> f64 {
        self.c1 * self.focal_scale(hfov) * self.fun.apply(theta / self.c2 + self.c3)
    }

    /// Angle from the axis for a normalised image radius.
    pub fn angle(&self, radius: f64, hfov: f64) -> f64 {
        let scale = self.c1 * self.focal_scale(hfov);
        self.c2 * (self.fun.inverse(radius / scale) - self.c3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let lens = CameraLens::new(MappingFunctionType::EquisolidAngle);
        assert_eq!((lens.c1(), lens.c2()), (2.0, 2.0));
        assert_eq!(lens.angle_function(), AngleFunctionType::Sin);
    }

    #[test]
    fn test_scaled_edge_maps_to_unit_radius() {
        for mapping in [
            MappingFunctionType::Gnomonical,
            MappingFunctionType::Stereographic,
            MappingFunctionType::Equidistant,
            MappingFunctionType::EquisolidAngle,
        ] {
            let lens = CameraLens::new(mapping);
            let r = lens.radius(0.6, 1.2);
            assert!((r - 1.0).abs() < 1e-12, "{mapping:?}");
        }
    }

    #[test]
    fn test_angle_inverts_radius() {
        let lens = CameraLens::new(MappingFunctionType::Stereographic);
        let hfov = 3.0;
        for theta in [0.1, 0.5, 1.2] {
            let r = lens.radius(theta, hfov);
            assert!((lens.angle(r, hfov) - theta).abs() < 1e-9);
        }
    }

    #[test]
    fn test_custom_keeps_coefficients() {
        let mut lens = CameraLens::custom(1.5, 3.0, 0.1, 2.0, AngleFunctionType::Sin);
        lens.set_type(MappingFunctionType::Custom);
        assert_eq!(lens.c1(), 1.5);
        assert_eq!(lens.f(), 2.0);
    }
}
