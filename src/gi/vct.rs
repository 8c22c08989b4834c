//! Single-volume voxel cone tracing.

use std::sync::Arc;

use glam::{DVec3, UVec3};

use crate::backend::FrameSnapshot;
use crate::error::{contract_violation, RenderError, RenderResult};
use crate::gi::lighting::LightingBake;
use crate::gi::voxelizer::{VoxelGrid, Voxelizer};
use crate::gi::{is_power_of_two, DebugVisualization, RadianceVolume};
use crate::math::Aabb;

/// One radiance volume around the scene's static geometry.
///
/// [`build`](Self::build) voxelizes every static visual and bakes lighting;
/// [`lighting_changed`](Self::lighting_changed) re-bakes from the cached
/// voxels.
pub struct GlobalIlluminationVct {
    resolution: [u32; 3],
    octant_count: [u32; 3],
    bake: LightingBake,
    conserve_memory: bool,
    area: Option<Aabb>,
    enabled: bool,
    built: bool,
    grid: Option<VoxelGrid>,
    volume: Option<Arc<RadianceVolume>>,
    build_count: u64,
    bake_count: u64,
}

impl Default for GlobalIlluminationVct {
    fn default() -> Self {
        Self {
            resolution: [64, 64, 64],
            octant_count: [1, 1, 1],
            bake: LightingBake::default(),
            conserve_memory: false,
            area: None,
            enabled: false,
            built: false,
            grid: None,
            volume: None,
            build_count: 0,
            bake_count: 0,
        }
    }
}

impl GlobalIlluminationVct {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolution(&self) -> [u32; 3] {
        self.resolution
    }

    /// Voxel resolution per axis. Every axis must be a power of two; anything
    /// else is rejected and the previous resolution kept.
    pub fn set_resolution(&mut self, resolution: [u32; 3]) -> bool {
        if !is_power_of_two(resolution) {
            log::warn!("Ignoring VCT resolution: {}", RenderError::NotPowerOfTwo(resolution));
            return false;
        }
        self.resolution = resolution;
        true
    }

    pub fn octant_count(&self) -> [u32; 3] {
        self.octant_count
    }

    pub fn set_octant_count(&mut self, octants: [u32; 3]) {
        self.octant_count = octants.map(|o| o.max(1));
    }

    pub fn bounce_count(&self) -> u32 {
        self.bake.bounce_count
    }

    pub fn set_bounce_count(&mut self, bounces: u32) {
        self.bake.bounce_count = bounces;
    }

    pub fn anisotropic(&self) -> bool {
        self.bake.anisotropic
    }

    pub fn set_anisotropic(&mut self, anisotropic: bool) {
        self.bake.anisotropic = anisotropic;
    }

    pub fn high_quality(&self) -> bool {
        self.bake.high_quality
    }

    pub fn set_high_quality(&mut self, high_quality: bool) {
        self.bake.high_quality = high_quality;
    }

    /// Drop the voxel grid after baking. Lighting changes then re-voxelize.
    pub fn conserve_memory(&self) -> bool {
        self.conserve_memory
    }

    pub fn set_conserve_memory(&mut self, conserve: bool) {
        self.conserve_memory = conserve;
    }

    pub fn thin_wall_counter(&self) -> f32 {
        self.bake.thin_wall_counter
    }

    pub fn set_thin_wall_counter(&mut self, counter: f32) {
        self.bake.thin_wall_counter = counter.max(0.0);
    }

    pub fn debug_visualization(&self) -> DebugVisualization {
        self.bake.debug
    }

    pub fn set_debug_visualization(&mut self, debug: DebugVisualization) {
        self.bake.debug = debug;
    }

    /// Volume to voxelize; `None` fits the static geometry.
    pub fn area(&self) -> Option<Aabb> {
        self.area
    }

    pub fn set_area(&mut self, area: Option<Aabb>) {
        self.area = area;
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_built(&self) -> bool {
        self.built
    }

    pub fn volume(&self) -> Option<Arc<RadianceVolume>> {
        self.volume.clone()
    }

    /// Filled voxels of the last voxelization.
    pub fn voxel_count(&self) -> usize {
        self.grid.as_ref().map_or(0, VoxelGrid::filled_count)
    }

    pub fn build_count(&self) -> u64 {
        self.build_count
    }

    pub fn bake_count(&self) -> u64 {
        self.bake_count
    }

    fn voxel_bounds(&self, frame: &FrameSnapshot) -> Aabb {
        if let Some(area) = self.area {
            return area;
        }
        let bounds = frame
            .items
            .iter()
            .filter(|item| item.is_static)
            .fold(Aabb::EMPTY, |acc, item| acc.merge(&item.world_bounds()));
        if bounds.is_empty() {
            return bounds;
        }
        // One voxel of padding so surfaces on the boundary stay inside.
        let resolution = UVec3::from_array(self.resolution).as_dvec3();
        let pad = bounds.size().max(DVec3::splat(1e-3)) / (resolution - DVec3::splat(2.0)).max(DVec3::ONE);
        Aabb::new(bounds.min - pad, bounds.max + pad)
    }

    fn voxelize(&mut self, frame: &FrameSnapshot) {
        let bounds = self.voxel_bounds(frame);
        let voxelizer = Voxelizer::new(
            UVec3::from_array(self.resolution),
            UVec3::from_array(self.octant_count),
        );
        let grid = voxelizer.voxelize(frame, bounds, |item| item.is_static);
        log::debug!(
            "VCT voxelized {} of {} voxels",
            grid.filled_count(),
            grid.len()
        );
        self.grid = Some(grid);
    }

    fn bake_lighting(&mut self, frame: &FrameSnapshot) {
        let Some(grid) = &self.grid else {
            return;
        };
        let volume = self.bake.bake(grid, &frame.lights);
        self.volume = Some(Arc::new(volume));
        self.bake_count += 1;
        if self.conserve_memory {
            self.grid = None;
        }
    }

    /// Voxelize static geometry and bake lighting.
    pub fn build(&mut self, frame: &FrameSnapshot) -> RenderResult<()> {
        self.voxelize(frame);
        self.bake_lighting(frame);
        self.built = true;
        self.build_count += 1;
        log::debug!("VCT build #{} finished", self.build_count);
        Ok(())
    }

    /// Re-bake lighting from cached voxels.
    pub fn lighting_changed(&mut self, frame: &FrameSnapshot) -> RenderResult<()> {
        if !self.built {
            return contract_violation("VCT lighting_changed called before build");
        }
        if self.grid.is_none() {
            self.voxelize(frame);
        }
        self.bake_lighting(frame);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::extract::{ExtractedItem, ExtractedLight, ExtractedMaterial};
    use crate::math::Pose;
    use crate::resources::Mesh;
    use crate::scene::light::Light;
    use crate::scene::object::ObjectId;

    fn frame(is_static: bool) -> FrameSnapshot {
        let mut frame = FrameSnapshot::default();
        frame.items.push(ExtractedItem {
            visual: ObjectId(1),
            mesh: Arc::new(Mesh::cube()),
            world: Pose::IDENTITY,
            material: Arc::new(ExtractedMaterial::default()),
            is_static,
        });
        frame.lights.push(ExtractedLight {
            id: ObjectId(2),
            light: Light::directional(DVec3::new(0.0, 0.0, -1.0)),
            pose: Pose::IDENTITY,
        });
        frame
    }

    fn small() -> GlobalIlluminationVct {
        let mut gi = GlobalIlluminationVct::new();
        assert!(gi.set_resolution([8, 8, 8]));
        gi.set_bounce_count(1);
        gi
    }

    #[test]
    fn test_defaults() {
        let gi = GlobalIlluminationVct::new();
        assert_eq!(gi.resolution(), [64, 64, 64]);
        assert_eq!(gi.bounce_count(), 6);
        assert!(gi.anisotropic());
        assert!(!gi.enabled());
        assert!(!gi.is_built());
    }

    #[test]
    fn test_resolution_must_be_power_of_two() {
        let mut gi = GlobalIlluminationVct::new();
        assert!(gi.set_resolution([128, 128, 32]));
        assert_eq!(gi.resolution(), [128, 128, 32]);
        assert!(!gi.set_resolution([100, 100, 100]));
        assert_eq!(gi.resolution(), [128, 128, 32]);
    }

    #[test]
    fn test_build_voxelizes_only_static_geometry() {
        let mut gi = small();
        gi.build(&frame(true)).unwrap();
        assert!(gi.voxel_count() > 0);
        assert!(gi.volume().is_some());

        let mut dynamic = small();
        dynamic.build(&frame(false)).unwrap();
        assert_eq!(dynamic.voxel_count(), 0);
    }

    #[test]
    fn test_lighting_changed_rebakes_without_revoxelizing() {
        let mut gi = small();
        gi.build(&frame(true)).unwrap();
        gi.lighting_changed(&frame(true)).unwrap();
        assert_eq!(gi.build_count(), 1);
        assert_eq!(gi.bake_count(), 2);
    }

    #[test]
    fn test_conserve_memory_drops_grid() {
        let mut gi = small();
        gi.set_conserve_memory(true);
        gi.build(&frame(true)).unwrap();
        assert_eq!(gi.voxel_count(), 0);
        assert!(gi.volume().is_some());
        gi.lighting_changed(&frame(true)).unwrap();
        assert_eq!(gi.bake_count(), 2);
    }

    #[cfg(not(debug_assertions))]
    #[test]
    fn test_lighting_changed_before_build_is_an_error() {
        let mut gi = small();
        assert!(matches!(
            gi.lighting_changed(&frame(true)),
            Err(RenderError::ContractViolation(_))
        ));
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "before build")]
    fn test_lighting_changed_before_build_panics_in_debug() {
        let mut gi = small();
        let _ = gi.lighting_changed(&frame(true));
    }
}
