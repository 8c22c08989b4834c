//! Voxel cone traced global illumination.
//!
//! Static geometry is voxelized ([`voxelizer`]), lit and bounced
//! ([`lighting`]) into a [`RadianceVolume`] that backends sample at shading
//! time. [`GlobalIlluminationVct`] bakes one fixed volume;
//! [`GlobalIlluminationCivct`] keeps a set of camera-centred cascades.

pub mod civct;
pub mod lighting;
pub mod vct;
pub mod voxelizer;

use std::sync::Arc;

use glam::{DVec3, UVec3, Vec3};

use crate::backend::FrameSnapshot;
use crate::error::RenderResult;
use crate::math::Aabb;

pub use civct::{Cascade, GlobalIlluminationCivct};
pub use lighting::LightingBake;
pub use vct::GlobalIlluminationVct;
pub use voxelizer::{Voxel, VoxelGrid, Voxelizer};

/// +X, -X, +Y, -Y, +Z, -Z.
pub(crate) const AXES: [DVec3; 6] = [
    DVec3::X,
    DVec3::NEG_X,
    DVec3::Y,
    DVec3::NEG_Y,
    DVec3::Z,
    DVec3::NEG_Z,
];

const MAX_OCCLUSION: f32 = 0.95;

/// Replace baked lighting with a raw voxel channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugVisualization {
    #[default]
    None,
    Albedo,
    Normal,
    Emissive,
}

/// Outgoing radiance per voxel.
#[derive(Debug, Clone, PartialEq)]
pub enum Radiance {
    Isotropic(Vec<Vec3>),
    /// One value per direction in [`AXES`] order.
    Anisotropic(Vec<[Vec3; 6]>),
}

/// Baked radiance sampled by cone tracing.
#[derive(Debug, Clone)]
pub struct RadianceVolume {
    bounds: Aabb,
    resolution: UVec3,
    occupancy: Vec<f32>,
    radiance: Radiance,
    high_quality: bool,
}

impl RadianceVolume {
    pub fn new(
        bounds: Aabb,
        resolution: UVec3,
        occupancy: Vec<f32>,
        radiance: Radiance,
        high_quality: bool,
    ) -> Self {
        Self {
            bounds,
            resolution,
            occupancy,
            radiance,
            high_quality,
        }
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn resolution(&self) -> UVec3 {
        self.resolution
    }

    pub fn voxel_size(&self) -> DVec3 {
        self.bounds.size() / self.resolution.as_dvec3()
    }

    pub fn is_anisotropic(&self) -> bool {
        matches!(self.radiance, Radiance::Anisotropic(_))
    }

    /// Bytes held by the radiance channel.
    pub fn radiance_bytes(&self) -> usize {
        match &self.radiance {
            Radiance::Isotropic(values) => std::mem::size_of_val(values.as_slice()),
            Radiance::Anisotropic(values) => std::mem::size_of_val(values.as_slice()),
        }
    }

    fn index(&self, cell: UVec3) -> usize {
        let r = self.resolution;
        (cell.z as usize * r.y as usize + cell.y as usize) * r.x as usize + cell.x as usize
    }

    /// Radiance leaving `cell` in direction `dir`.
    pub fn radiance_toward(&self, cell: UVec3, dir: DVec3) -> Vec3 {
        let i = self.index(cell);
        match &self.radiance {
            Radiance::Isotropic(values) => values[i],
            Radiance::Anisotropic(values) => {
                let dir = dir.normalize_or_zero();
                AXES.iter()
                    .zip(values[i].iter())
                    .map(|(axis, value)| {
                        let w = dir.dot(*axis).max(0.0);
                        *value * (w * w) as f32
                    })
                    .sum()
            }
        }
    }

    /// Indirect light arriving at a surface point, or `None` outside the volume.
    pub fn sample(&self, point: DVec3, normal: DVec3) -> Option<Vec3> {
        if self.bounds.is_empty() || !self.bounds.contains(point) {
            return None;
        }
        let normal = normal.normalize_or_zero();
        if normal == DVec3::ZERO {
            return None;
        }
        let (tangent, bitangent) = normal.any_orthonormal_pair();
        let side_cones = if self.high_quality { 8 } else { 4 };
        let (sin, cos) = std::f64::consts::FRAC_PI_3.sin_cos();

        let mut total = self.trace_cone(point, normal);
        let mut weight = 1.0;
        for k in 0..side_cones {
            let phi = std::f64::consts::TAU * k as f64 / side_cones as f64;
            let dir = normal * cos + (tangent * phi.cos() + bitangent * phi.sin()) * sin;
            total += self.trace_cone(point, dir) * cos as f32;
            weight += cos as f32;
        }
        Some(total / weight)
    }

    fn trace_cone(&self, origin: DVec3, dir: DVec3) -> Vec3 {
        let size = self.voxel_size().min_element();
        let max_distance = self.bounds.size().length();
        let mut t = size * 1.5;
        let mut occlusion = 0.0f32;
        let mut gathered = Vec3::ZERO;
        while t < max_distance && occlusion < MAX_OCCLUSION {
            let Some(cell) = voxelizer::cell_of(&self.bounds, self.resolution, origin + dir * t)
            else {
                break;
            };
            let alpha = self.occupancy[self.index(cell)];
            if alpha > 0.0 {
                gathered += self.radiance_toward(cell, -dir) * (1.0 - occlusion) * alpha;
                occlusion += (1.0 - occlusion) * alpha;
            }
            t += size * 0.5;
        }
        gathered
    }
}

/// A global illumination solution registered with a scene.
pub enum GlobalIllumination {
    Vct(GlobalIlluminationVct),
    Civct(GlobalIlluminationCivct),
}

impl GlobalIllumination {
    pub fn enabled(&self) -> bool {
        match self {
            GlobalIllumination::Vct(vct) => vct.enabled(),
            GlobalIllumination::Civct(civct) => civct.enabled(),
        }
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        match self {
            GlobalIllumination::Vct(vct) => vct.set_enabled(enabled),
            GlobalIllumination::Civct(civct) => civct.set_enabled(enabled),
        }
    }

    pub fn is_built(&self) -> bool {
        match self {
            GlobalIllumination::Vct(vct) => vct.is_built(),
            GlobalIllumination::Civct(civct) => civct.is_built(),
        }
    }

    /// Baked volumes, finest first.
    pub fn volumes(&self) -> Vec<Arc<RadianceVolume>> {
        match self {
            GlobalIllumination::Vct(vct) => vct.volume().into_iter().collect(),
            GlobalIllumination::Civct(civct) => civct.volumes(),
        }
    }

    /// Re-bake lighting without re-voxelizing.
    pub fn lighting_changed(&mut self, frame: &FrameSnapshot) -> RenderResult<()> {
        match self {
            GlobalIllumination::Vct(vct) => vct.lighting_changed(frame),
            GlobalIllumination::Civct(civct) => civct.lighting_changed(frame),
        }
    }

    pub fn as_vct(&self) -> Option<&GlobalIlluminationVct> {
        match self {
            GlobalIllumination::Vct(vct) => Some(vct),
            _ => None,
        }
    }

    pub fn as_vct_mut(&mut self) -> Option<&mut GlobalIlluminationVct> {
        match self {
            GlobalIllumination::Vct(vct) => Some(vct),
            _ => None,
        }
    }

    pub fn as_civct(&self) -> Option<&GlobalIlluminationCivct> {
        match self {
            GlobalIllumination::Civct(civct) => Some(civct),
            _ => None,
        }
    }

    pub fn as_civct_mut(&mut self) -> Option<&mut GlobalIlluminationCivct> {
        match self {
            GlobalIllumination::Civct(civct) => Some(civct),
            _ => None,
        }
    }
}

/// True when every component is a non-zero power of two.
pub(crate) fn is_power_of_two(resolution: [u32; 3]) -> bool {
    resolution.iter().all(|r| r.is_power_of_two())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Lit wall at +X, sampled from a point facing it.
    fn wall_volume(anisotropic: bool) -> RadianceVolume {
        let resolution = UVec3::new(8, 1, 1);
        let mut occupancy = vec![0.0; 8];
        occupancy[7] = 1.0;
        let mut radiance = vec![Vec3::ZERO; 8];
        radiance[7] = Vec3::ONE;
        let radiance = if anisotropic {
            Radiance::Anisotropic(
                radiance
                    .iter()
                    .map(|r| [Vec3::ZERO, *r, Vec3::ZERO, Vec3::ZERO, Vec3::ZERO, Vec3::ZERO])
                    .collect(),
            )
        } else {
            Radiance::Isotropic(radiance)
        };
        RadianceVolume::new(
            Aabb::new(DVec3::new(0.0, -0.5, -0.5), DVec3::new(8.0, 0.5, 0.5)),
            resolution,
            occupancy,
            radiance,
            false,
        )
    }

    #[test]
    fn test_sample_sees_facing_wall() {
        let volume = wall_volume(false);
        let indirect = volume.sample(DVec3::new(0.5, 0.0, 0.0), DVec3::X).unwrap();
        assert!(indirect.x > 0.0);
        assert!(volume.sample(DVec3::new(0.5, 0.0, 0.0), DVec3::NEG_X).unwrap() == Vec3::ZERO);
    }

    #[test]
    fn test_sample_outside_volume_is_none() {
        let volume = wall_volume(false);
        assert!(volume.sample(DVec3::new(-1.0, 0.0, 0.0), DVec3::X).is_none());
    }

    #[test]
    fn test_anisotropic_radiance_is_directional() {
        let volume = wall_volume(true);
        let cell = UVec3::new(7, 0, 0);
        assert_eq!(volume.radiance_toward(cell, DVec3::NEG_X), Vec3::ONE);
        assert_eq!(volume.radiance_toward(cell, DVec3::X), Vec3::ZERO);
        assert!(volume.radiance_bytes() > wall_volume(false).radiance_bytes());
    }

    #[test]
    fn test_power_of_two_check() {
        assert!(is_power_of_two([128, 128, 32]));
        assert!(!is_power_of_two([100, 100, 100]));
        assert!(!is_power_of_two([0, 1, 1]));
    }
}
