//! Cascaded, camera-relative voxel cone tracing.
//!
//! Each [`Cascade`] voxelizes a box of `2 * area_half_size` around the bound
//! camera. Cascades are ordered finest first and their areas never shrink.
//! When the camera moves, a cascade re-voxelizes once the movement reaches
//! its `camera_step_size`:
//!
//! * consistent steps: the camera position is quantized to a grid of
//!   `camera_step_size` cells and crossing a cell boundary triggers it. The
//!   same position always gives the same cascade placement.
//! * otherwise: it triggers once the camera moved a full step on any axis
//!   since the last voxelization, and the cascade re-centres on the camera.

use std::sync::Arc;

use glam::{DVec3, I64Vec3, UVec3};

use crate::backend::FrameSnapshot;
use crate::error::{contract_violation, RenderError, RenderResult};
use crate::gi::lighting::LightingBake;
use crate::gi::voxelizer::{VoxelGrid, Voxelizer};
use crate::gi::{is_power_of_two, DebugVisualization, RadianceVolume};
use crate::math::Aabb;
use crate::scene::object::ObjectId;

/// Settings of one cascade.
#[derive(Debug, Clone, PartialEq)]
pub struct Cascade {
    area_half_size: DVec3,
    resolution: [u32; 3],
    octant_count: [u32; 3],
    camera_step_size: DVec3,
    thin_wall_counter: f32,
}

impl Default for Cascade {
    fn default() -> Self {
        Self {
            area_half_size: DVec3::splat(5.0),
            resolution: [32, 32, 32],
            octant_count: [1, 1, 1],
            camera_step_size: DVec3::ONE,
            thin_wall_counter: 1.0,
        }
    }
}

impl Cascade {
    pub fn area_half_size(&self) -> DVec3 {
        self.area_half_size
    }

    pub fn resolution(&self) -> [u32; 3] {
        self.resolution
    }

    pub fn octant_count(&self) -> [u32; 3] {
        self.octant_count
    }

    pub fn camera_step_size(&self) -> DVec3 {
        self.camera_step_size
    }

    pub fn thin_wall_counter(&self) -> f32 {
        self.thin_wall_counter
    }

    /// World size of one voxel.
    pub fn voxel_size(&self) -> DVec3 {
        self.area_half_size * 2.0 / UVec3::from_array(self.resolution).as_dvec3()
    }
}

#[derive(Debug, Default)]
struct CascadeState {
    center: DVec3,
    /// Camera position at the last voxelization.
    anchor: DVec3,
    cell: Option<I64Vec3>,
    grid: Option<VoxelGrid>,
    volume: Option<Arc<RadianceVolume>>,
}

pub struct GlobalIlluminationCivct {
    cascades: Vec<Cascade>,
    states: Vec<CascadeState>,
    bake: LightingBake,
    consistent_steps: bool,
    camera: Option<ObjectId>,
    enabled: bool,
    built: bool,
    build_count: u64,
    revoxelization_count: u64,
    bake_count: u64,
}

impl Default for GlobalIlluminationCivct {
    fn default() -> Self {
        Self {
            cascades: Vec::new(),
            states: Vec::new(),
            bake: LightingBake::default(),
            consistent_steps: false,
            camera: None,
            enabled: false,
            built: false,
            build_count: 0,
            revoxelization_count: 0,
            bake_count: 0,
        }
    }
}

impl GlobalIlluminationCivct {
    pub fn new() -> Self {
        Self::default()
    }

    /// Camera whose position drives cascade placement.
    pub fn bind_camera(&mut self, camera: Option<ObjectId>) {
        self.camera = camera;
    }

    pub fn bound_camera(&self) -> Option<ObjectId> {
        self.camera
    }

    pub fn cascades(&self) -> &[Cascade] {
        &self.cascades
    }

    pub fn cascade(&self, index: usize) -> Option<&Cascade> {
        self.cascades.get(index)
    }

    /// Append a cascade copied from `reference`, or with default settings.
    /// Returns its index.
    pub fn add_cascade(&mut self, reference: Option<&Cascade>) -> RenderResult<usize> {
        let cascade = reference.cloned().unwrap_or_default();
        let index = self.cascades.len();
        if let Some(previous) = self.cascades.last() {
            if cascade.area_half_size.cmplt(previous.area_half_size).any() {
                log::warn!("Rejecting cascade {index}: area shrinks below cascade {}", index - 1);
                return Err(RenderError::CascadeOrder { index });
            }
        }
        self.cascades.push(cascade);
        self.states.push(CascadeState::default());
        self.built = false;
        Ok(index)
    }

    fn cascade_mut(&mut self, index: usize) -> RenderResult<&mut Cascade> {
        self.cascades
            .get_mut(index)
            .ok_or_else(|| RenderError::InvalidConfig(format!("no cascade {index}")))
    }

    /// Rejected when it would break the non-decreasing order of areas.
    pub fn set_cascade_area_half_size(&mut self, index: usize, half_size: DVec3) -> RenderResult<()> {
        if !half_size.cmpgt(DVec3::ZERO).all() {
            return Err(RenderError::InvalidConfig(format!(
                "cascade area half size {half_size} must be positive"
            )));
        }
        self.cascade_mut(index)?;
        let shrinks_below_previous = index > 0
            && half_size
                .cmplt(self.cascades[index - 1].area_half_size)
                .any();
        if shrinks_below_previous {
            return Err(RenderError::CascadeOrder { index });
        }
        if let Some(next) = self.cascades.get(index + 1) {
            if next.area_half_size.cmplt(half_size).any() {
                return Err(RenderError::CascadeOrder { index: index + 1 });
            }
        }
        self.cascades[index].area_half_size = half_size;
        Ok(())
    }

    pub fn set_cascade_resolution(&mut self, index: usize, resolution: [u32; 3]) -> RenderResult<()> {
        if !is_power_of_two(resolution) {
            return Err(RenderError::NotPowerOfTwo(resolution));
        }
        self.cascade_mut(index)?.resolution = resolution;
        Ok(())
    }

    pub fn set_cascade_octant_count(&mut self, index: usize, octants: [u32; 3]) -> RenderResult<()> {
        self.cascade_mut(index)?.octant_count = octants.map(|o| o.max(1));
        Ok(())
    }

    pub fn set_cascade_step_size(&mut self, index: usize, step: DVec3) -> RenderResult<()> {
        if !step.cmpgt(DVec3::ZERO).all() {
            return Err(RenderError::InvalidConfig(format!(
                "camera step size {step} must be positive"
            )));
        }
        self.cascade_mut(index)?.camera_step_size = step;
        Ok(())
    }

    pub fn set_cascade_thin_wall_counter(&mut self, index: usize, counter: f32) -> RenderResult<()> {
        self.cascade_mut(index)?.thin_wall_counter = counter.max(0.0);
        Ok(())
    }

    /// Derive camera step sizes from the last cascade backward.
    ///
    /// The coarsest cascade steps `base_step` of its voxels. Every finer
    /// cascade steps close to `base_step` of its own voxels, rounded so that
    /// the next coarser step is a whole multiple of it.
    pub fn auto_calculate_step_sizes(&mut self, base_step: DVec3) {
        let Some(last) = self.cascades.last_mut() else {
            return;
        };
        last.camera_step_size = base_step * last.voxel_size();
        let mut coarser = last.camera_step_size;
        for cascade in self.cascades.iter_mut().rev().skip(1) {
            let desired = base_step * cascade.voxel_size();
            let ratio = (coarser / desired).round().max(DVec3::ONE);
            cascade.camera_step_size = coarser / ratio;
            coarser = cascade.camera_step_size;
        }
    }

    pub fn consistent_cascade_steps(&self) -> bool {
        self.consistent_steps
    }

    pub fn set_consistent_cascade_steps(&mut self, consistent: bool) {
        self.consistent_steps = consistent;
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

    pub fn debug_visualization(&self) -> DebugVisualization {
        self.bake.debug
    }

    pub fn set_debug_visualization(&mut self, debug: DebugVisualization) {
        self.bake.debug = debug;
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

    pub fn build_count(&self) -> u64 {
        self.build_count
    }

    /// Cascade re-voxelizations caused by camera movement.
    pub fn revoxelization_count(&self) -> u64 {
        self.revoxelization_count
    }

    pub fn bake_count(&self) -> u64 {
        self.bake_count
    }

    /// World centre of a cascade's voxel volume.
    pub fn cascade_center(&self, index: usize) -> Option<DVec3> {
        self.states.get(index).map(|s| s.center)
    }

    /// Baked volumes, finest first.
    pub fn volumes(&self) -> Vec<Arc<RadianceVolume>> {
        self.states.iter().filter_map(|s| s.volume.clone()).collect()
    }

    /// Check the non-decreasing area order.
    pub fn validate(&self) -> RenderResult<()> {
        for (index, pair) in self.cascades.windows(2).enumerate() {
            if pair[1].area_half_size.cmplt(pair[0].area_half_size).any() {
                return Err(RenderError::CascadeOrder { index: index + 1 });
            }
        }
        Ok(())
    }

    fn step_of(cascade: &Cascade) -> DVec3 {
        let step = cascade.camera_step_size;
        DVec3::select(step.cmpgt(DVec3::ZERO), step, cascade.voxel_size())
    }

    fn grid_cell(cascade: &Cascade, position: DVec3) -> I64Vec3 {
        (position / Self::step_of(cascade)).floor().as_i64vec3()
    }

    fn place(&mut self, index: usize, camera_position: DVec3) {
        let cascade = &self.cascades[index];
        let state = &mut self.states[index];
        state.anchor = camera_position;
        if self.consistent_steps {
            let cell = Self::grid_cell(cascade, camera_position);
            state.center = (cell.as_dvec3() + 0.5) * Self::step_of(cascade);
            state.cell = Some(cell);
        } else {
            state.center = camera_position;
            state.cell = None;
        }
    }

    fn needs_revoxelization(&self, index: usize, camera_position: DVec3) -> bool {
        let cascade = &self.cascades[index];
        let state = &self.states[index];
        if state.grid.is_none() {
            return true;
        }
        if self.consistent_steps {
            state.cell != Some(Self::grid_cell(cascade, camera_position))
        } else {
            (camera_position - state.anchor)
                .abs()
                .cmpge(Self::step_of(cascade))
                .any()
        }
    }

    fn voxelize(&mut self, index: usize, frame: &FrameSnapshot) {
        let cascade = &self.cascades[index];
        let state = &self.states[index];
        let area = Aabb::from_center_half_size(state.center, cascade.area_half_size);
        let voxelizer = Voxelizer::new(
            UVec3::from_array(cascade.resolution),
            UVec3::from_array(cascade.octant_count),
        );
        let grid = voxelizer.voxelize(frame, area, |item| item.is_static);
        log::debug!(
            "CIVCT cascade {index} voxelized around {:?}: {} filled",
            state.center,
            grid.filled_count()
        );
        self.states[index].grid = Some(grid);
    }

    fn bake_cascade(&mut self, index: usize, frame: &FrameSnapshot) {
        let mut bake = self.bake;
        bake.thin_wall_counter = self.cascades[index].thin_wall_counter;
        let state = &mut self.states[index];
        if let Some(grid) = &state.grid {
            state.volume = Some(Arc::new(bake.bake(grid, &frame.lights)));
            self.bake_count += 1;
        }
    }

    /// Place every cascade around `camera_position`, voxelize and bake.
    pub fn build(&mut self, frame: &FrameSnapshot, camera_position: DVec3) -> RenderResult<()> {
        self.validate()?;
        for index in 0..self.cascades.len() {
            if !is_power_of_two(self.cascades[index].resolution) {
                return Err(RenderError::NotPowerOfTwo(self.cascades[index].resolution));
            }
            self.place(index, camera_position);
            self.voxelize(index, frame);
            self.bake_cascade(index, frame);
        }
        self.built = true;
        self.build_count += 1;
        log::debug!(
            "CIVCT build #{} finished with {} cascades",
            self.build_count,
            self.cascades.len()
        );
        Ok(())
    }

    /// Follow the camera. Returns true when any cascade re-voxelized.
    pub fn update(&mut self, frame: &FrameSnapshot, camera_position: DVec3) -> RenderResult<bool> {
        if !self.built {
            return contract_violation("CIVCT update called before build");
        }
        let mut changed = false;
        for index in 0..self.cascades.len() {
            if !self.needs_revoxelization(index, camera_position) {
                continue;
            }
            self.place(index, camera_position);
            self.voxelize(index, frame);
            self.bake_cascade(index, frame);
            self.revoxelization_count += 1;
            changed = true;
        }
        Ok(changed)
    }

    /// Re-bake every cascade from its cached voxels.
    pub fn lighting_changed(&mut self, frame: &FrameSnapshot) -> RenderResult<()> {
        if !self.built {
            return contract_violation("CIVCT lighting_changed called before build");
        }
        for index in 0..self.cascades.len() {
            self.bake_cascade(index, frame);
        }
        Ok(())
    }
}
