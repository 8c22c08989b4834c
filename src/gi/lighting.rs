//! Light propagation over a voxel grid.

use glam::{DVec3, UVec3, Vec3};

use crate::backend::extract::ExtractedLight;
use crate::gi::voxelizer::VoxelGrid;
use crate::gi::{DebugVisualization, Radiance, RadianceVolume, AXES};

/// Bakes direct light plus a number of diffuse bounces into a
/// [`RadianceVolume`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightingBake {
    pub bounce_count: u32,
    pub anisotropic: bool,
    /// Voxels skipped at the start of shadow and gather rays, so thin walls
    /// do not shadow themselves.
    pub thin_wall_counter: f32,
    /// Extra cones when sampling the result.
    pub high_quality: bool,
    pub debug: DebugVisualization,
}

impl Default for LightingBake {
    fn default() -> Self {
        Self {
            bounce_count: 6,
            anisotropic: true,
            thin_wall_counter: 1.0,
            high_quality: false,
            debug: DebugVisualization::None,
        }
    }
}

impl LightingBake {
    pub fn bake(&self, grid: &VoxelGrid, lights: &[ExtractedLight]) -> RadianceVolume {
        let filled: Vec<usize> = (0..grid.len())
            .filter(|i| grid.voxel(*i).is_filled())
            .collect();

        let mut radiance = vec![Vec3::ZERO; grid.len()];
        match self.debug {
            DebugVisualization::None => {
                let direct: Vec<Vec3> = filled
                    .iter()
                    .map(|i| self.direct_light(grid, *i, lights))
                    .collect();
                for (slot, i) in filled.iter().enumerate() {
                    let voxel = grid.voxel(*i);
                    radiance[*i] = voxel.albedo.truncate() * direct[slot] + voxel.emissive;
                }
                for bounce in 0..self.bounce_count {
                    let previous = radiance.clone();
                    for (slot, i) in filled.iter().enumerate() {
                        let voxel = grid.voxel(*i);
                        let gathered = self.gather(grid, *i, &previous);
                        radiance[*i] =
                            voxel.albedo.truncate() * (direct[slot] + gathered) + voxel.emissive;
                    }
                    log::trace!("gi: bounce {} done over {} voxels", bounce + 1, filled.len());
                }
            }
            channel => {
                for i in &filled {
                    let voxel = grid.voxel(*i);
                    radiance[*i] = match channel {
                        DebugVisualization::Albedo => voxel.albedo.truncate(),
                        DebugVisualization::Normal => voxel.normal * 0.5 + Vec3::splat(0.5),
                        DebugVisualization::Emissive => voxel.emissive,
                        DebugVisualization::None => Vec3::ZERO,
                    };
                }
            }
        }

        let occupancy = grid
            .voxels()
            .iter()
            .map(|v| if v.is_filled() { 1.0 } else { 0.0 })
            .collect();
        let radiance = if self.anisotropic {
            Radiance::Anisotropic(
                radiance
                    .iter()
                    .zip(grid.voxels())
                    .map(|(r, voxel)| directional(*r, voxel.normal))
                    .collect(),
            )
        } else {
            Radiance::Isotropic(radiance)
        };
        RadianceVolume::new(
            grid.bounds(),
            grid.resolution(),
            occupancy,
            radiance,
            self.high_quality,
        )
    }

    fn direct_light(&self, grid: &VoxelGrid, index: usize, lights: &[ExtractedLight]) -> Vec3 {
        let cell = grid.coords(index);
        let center = grid.voxel_center(cell);
        let normal = grid.voxel(index).normal.as_dvec3();
        let mut total = Vec3::ZERO;
        for light in lights {
            let Some(incidence) = light.incidence(center) else {
                continue;
            };
            let n_dot_l = if normal == DVec3::ZERO {
                1.0
            } else {
                normal.dot(incidence.to_light)
            };
            if n_dot_l <= 0.0 {
                continue;
            }
            if light.light.cast_shadows
                && self
                    .march(grid, cell, incidence.to_light, incidence.distance)
                    .is_some()
            {
                continue;
            }
            total += light.light.diffuse.to_vec3() * (incidence.strength * n_dot_l) as f32;
        }
        total
    }

    /// Cosine-weighted radiance arriving from the six axis directions.
    fn gather(&self, grid: &VoxelGrid, index: usize, radiance: &[Vec3]) -> Vec3 {
        let cell = grid.coords(index);
        let normal = grid.voxel(index).normal.as_dvec3();
        let mut sum = Vec3::ZERO;
        let mut weight = 0.0;
        for axis in AXES {
            let w = if normal == DVec3::ZERO {
                1.0
            } else {
                normal.dot(axis)
            };
            if w <= 0.0 {
                continue;
            }
            weight += w;
            if let Some(hit) = self.march(grid, cell, axis, f64::INFINITY) {
                sum += radiance[grid.index(hit)] * w as f32;
            }
        }
        if weight > 0.0 {
            sum / weight as f32
        } else {
            Vec3::ZERO
        }
    }

    /// First filled cell along `dir` from the center of `from`, within `max_distance`.
    fn march(&self, grid: &VoxelGrid, from: UVec3, dir: DVec3, max_distance: f64) -> Option<UVec3> {
        let size = grid.voxel_size();
        let step = size.min_element() * 0.5;
        let origin = grid.voxel_center(from);
        let mut t = step * (1.0 + 2.0 * self.thin_wall_counter.max(0.0) as f64);
        while t < max_distance {
            let cell = grid.cell_of(origin + dir * t)?;
            if cell != from && grid.is_filled_at(cell) {
                return Some(cell);
            }
            t += step;
        }
        None
    }
}

/// Split isotropic radiance into the six axis directions of a surface.
fn directional(radiance: Vec3, normal: Vec3) -> [Vec3; 6] {
    AXES.map(|axis| {
        if normal == Vec3::ZERO {
            radiance
        } else {
            radiance * normal.dot(axis.as_vec3()).max(0.0)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::extract::{ExtractedItem, ExtractedMaterial, FrameSnapshot};
    use crate::gi::voxelizer::Voxelizer;
    use crate::math::{Aabb, Pose};
    use crate::resources::Mesh;
    use crate::scene::light::Light;
    use crate::scene::object::ObjectId;
    use std::sync::Arc;

    fn floor_grid() -> VoxelGrid {
        let mut frame = FrameSnapshot::default();
        frame.items.push(ExtractedItem {
            visual: ObjectId(1),
            mesh: Arc::new(Mesh::plane(1)),
            world: Pose::from_xyz(0.0, 0.0, -0.9).with_scale(DVec3::new(4.0, 4.0, 1.0)),
            material: Arc::new(ExtractedMaterial::default()),
            is_static: true,
        });
        let bounds = Aabb::new(DVec3::splat(-2.0), DVec3::splat(2.0));
        Voxelizer::new(UVec3::splat(8), UVec3::ONE).voxelize(&frame, bounds, |_| true)
    }

    fn sun() -> ExtractedLight {
        ExtractedLight {
            id: ObjectId(2),
            light: Light::directional(DVec3::new(0.0, 0.0, -1.0)),
            pose: Pose::IDENTITY,
        }
    }

    #[test]
    fn test_lit_floor_has_radiance() {
        let grid = floor_grid();
        let bake = LightingBake {
            bounce_count: 0,
            anisotropic: false,
            ..Default::default()
        };
        let volume = bake.bake(&grid, &[sun()]);
        let cell = grid.cell_of(DVec3::new(0.1, 0.1, -0.9)).unwrap();
        assert!(volume.radiance_toward(cell, DVec3::Z).x > 0.5);
    }

    #[test]
    fn test_unlit_grid_is_dark() {
        let grid = floor_grid();
        let volume = LightingBake::default().bake(&grid, &[]);
        let cell = grid.cell_of(DVec3::new(0.1, 0.1, -0.9)).unwrap();
        assert_eq!(volume.radiance_toward(cell, DVec3::Z), Vec3::ZERO);
    }

    #[test]
    fn test_anisotropic_faces_follow_normal() {
        let grid = floor_grid();
        let volume = LightingBake::default().bake(&grid, &[sun()]);
        let cell = grid.cell_of(DVec3::new(0.1, 0.1, -0.9)).unwrap();
        assert!(volume.is_anisotropic());
        assert!(volume.radiance_toward(cell, DVec3::Z).x > 0.0);
        assert_eq!(volume.radiance_toward(cell, DVec3::NEG_Z), Vec3::ZERO);
    }

    #[test]
    fn test_debug_albedo_channel() {
        let grid = floor_grid();
        let bake = LightingBake {
            debug: DebugVisualization::Albedo,
            anisotropic: false,
            ..Default::default()
        };
        let volume = bake.bake(&grid, &[]);
        let cell = grid.cell_of(DVec3::new(0.1, 0.1, -0.9)).unwrap();
        let albedo = ExtractedMaterial::default().diffuse;
        assert!(volume.radiance_toward(cell, DVec3::Z).abs_diff_eq(albedo, 1e-6));
    }
}
