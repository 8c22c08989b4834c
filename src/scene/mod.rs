//! Scene management
//!
//! A [`Scene`] is the factory and owner of every object drawn through one
//! render engine: visuals, lights, cameras, materials and global
//! illumination solutions. Objects are addressed by [`ObjectId`]; nodes
//! (visuals, lights and cameras) live in a single [`NodeGraph`] below the
//! root visual.
//!
//! Every mutation marks the scene dirty. [`Scene::pre_render`] consumes the
//! dirty state once per logical frame and produces the [`FrameSnapshot`]
//! shared by all camera captures until the next mutation.
//!
//! Scenes hold `Rc` handles and are neither `Send` nor `Sync`: all scene,
//! camera and material calls belong to the thread that owns the engine.

pub mod graph;
pub mod input;
pub mod light;
pub mod object;
pub mod orbit;
pub mod ray_query;
pub mod store;
pub mod visual;

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use glam::{DQuat, DVec3};

use crate::backend::extract::{self, ExtractedItem, ExtractedLight, ExtractedMaterial, ExtractedVisual};
use crate::backend::raytrace::Bvh;
use crate::backend::{FrameSnapshot, RenderBackend};
use crate::camera::{
    BoundingBoxCamera, Camera, CameraKind, DepthCamera, Image, SegmentationCamera, ThermalCamera,
    WideAngleCamera,
};
use crate::error::{RenderError, RenderResult};
use crate::gi::{GlobalIllumination, GlobalIlluminationCivct, GlobalIlluminationVct};
use crate::math::{Aabb, Color, Pose};
use crate::resources::{Material, SearchPaths};

pub use graph::NodeGraph;
pub use input::{InputFrame, MouseButton, SharedInput};
pub use light::{Light, LightKind};
pub use object::{ObjectId, ObjectKind, Variant};
pub use orbit::OrbitViewController;
pub use ray_query::{RayQuery, RayQueryResult};
pub use store::Store;
pub use visual::{Geometry, Visual, LABEL_KEY, TEMPERATURE_KEY};

/// Name of the sentinel node every other node hangs under.
pub const ROOT_VISUAL_NAME: &str = "__root__";

/// Backend shared by an engine and all of its scenes.
pub type SharedBackend = Rc<RefCell<Box<dyn RenderBackend>>>;

/// Engine-unique scene identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SceneId(pub u32);

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scene#{}", self.0)
    }
}

/// Ways of naming an object inside one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectRef<'a> {
    Id(ObjectId),
    Name(&'a str),
    /// Position in creation order.
    Index(usize),
}

impl From<ObjectId> for ObjectRef<'_> {
    fn from(id: ObjectId) -> Self {
        ObjectRef::Id(id)
    }
}

impl<'a> From<&'a str> for ObjectRef<'a> {
    fn from(name: &'a str) -> Self {
        ObjectRef::Name(name)
    }
}

impl<T> Store<T> {
    fn resolve(&self, reference: ObjectRef<'_>) -> Option<ObjectId> {
        match reference {
            ObjectRef::Id(id) => self.contains(id).then_some(id),
            ObjectRef::Name(name) => self.id_of(name),
            ObjectRef::Index(index) => self.id_at(index),
        }
    }
}

pub struct Scene {
    id: SceneId,
    name: String,
    backend: SharedBackend,
    next_id: u32,
    root: ObjectId,
    graph: NodeGraph,
    visuals: Store<Visual>,
    lights: Store<Light>,
    sensors: Store<Camera>,
    materials: Store<Material>,
    global_illumination: Store<GlobalIllumination>,
    active_gi: Option<ObjectId>,
    ambient: Color,
    background: Color,
    resource_paths: SearchPaths,
    loaded: bool,
    initialized: bool,
    dirty: bool,
    lights_dirty: bool,
    pre_render_count: u64,
    frame: Option<Arc<FrameSnapshot>>,
    query_cache: Option<(u64, Arc<Bvh>)>,
}

impl Scene {
    pub fn new(id: SceneId, name: &str, backend: SharedBackend) -> Self {
        let mut graph = NodeGraph::new();
        let root = ObjectId(1);
        // A fresh graph cannot already hold the root id.
        let _ = graph.insert(root);
        Self {
            id,
            name: name.to_string(),
            backend,
            next_id: root.0 + 1,
            root,
            graph,
            visuals: Store::new(),
            lights: Store::new(),
            sensors: Store::new(),
            materials: Store::new(),
            global_illumination: Store::new(),
            active_gi: None,
            ambient: Color::rgb(0.1, 0.1, 0.1),
            background: Color::BLACK,
            resource_paths: SearchPaths::from_env(),
            loaded: false,
            initialized: false,
            dirty: true,
            lights_dirty: true,
            pre_render_count: 0,
            frame: None,
            query_cache: None,
        }
    }

    pub fn id(&self) -> SceneId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.borrow().name()
    }

    // Lifecycle

    /// Prepare scene resources. Does not touch the render device.
    pub fn load(&mut self) {
        if self.loaded {
            return;
        }
        self.loaded = true;
        log::info!("Scene '{}' loaded", self.name);
    }

    /// Bind the scene to the engine's live device.
    pub fn init(&mut self) -> RenderResult<()> {
        if self.initialized {
            return Ok(());
        }
        self.load();
        if !self.backend.borrow().is_initialized() {
            log::error!(
                "Scene '{}': backend '{}' has no live device",
                self.name,
                self.backend_name()
            );
            return Err(RenderError::NotInitialized);
        }
        self.initialized = true;
        log::info!("Scene '{}' initialized on '{}'", self.name, self.backend_name());
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Destroy every object. The scene stays usable.
    pub fn clear(&mut self) {
        for child in self.graph.children(self.root).to_vec() {
            self.destroy_node(child);
        }
        let materials: Vec<_> = self.materials.ids().collect();
        for id in materials {
            self.materials.remove(id);
        }
        let gis: Vec<_> = self.global_illumination.ids().collect();
        for id in gis {
            self.global_illumination.remove(id);
        }
        self.active_gi = None;
        self.mark_dirty(true);
    }

    // Identity

    pub fn root_visual(&self) -> ObjectId {
        self.root
    }

    pub fn has_scene_id(&self, id: ObjectId) -> bool {
        id == self.root || self.kind_of(id).is_some()
    }

    pub fn has_scene_name(&self, name: &str) -> bool {
        name == ROOT_VISUAL_NAME
            || self.visuals.contains_name(name)
            || self.lights.contains_name(name)
            || self.sensors.contains_name(name)
            || self.materials.contains_name(name)
            || self.global_illumination.contains_name(name)
    }

    pub fn kind_of(&self, id: ObjectId) -> Option<ObjectKind> {
        if self.visuals.contains(id) {
            Some(ObjectKind::Visual)
        } else if self.lights.contains(id) {
            Some(ObjectKind::Light)
        } else if self.sensors.contains(id) {
            Some(ObjectKind::Camera)
        } else if self.materials.contains(id) {
            Some(ObjectKind::Material)
        } else if self.global_illumination.contains(id) {
            Some(ObjectKind::GlobalIllumination)
        } else {
            None
        }
    }

    /// Id of the object called `name`, in any store.
    pub fn id_of(&self, name: &str) -> Option<ObjectId> {
        if name == ROOT_VISUAL_NAME {
            return Some(self.root);
        }
        self.visuals
            .id_of(name)
            .or_else(|| self.lights.id_of(name))
            .or_else(|| self.sensors.id_of(name))
            .or_else(|| self.materials.id_of(name))
            .or_else(|| self.global_illumination.id_of(name))
    }

    pub fn name_of(&self, id: ObjectId) -> Option<&str> {
        if id == self.root {
            return Some(ROOT_VISUAL_NAME);
        }
        self.visuals
            .name_of(id)
            .or_else(|| self.lights.name_of(id))
            .or_else(|| self.sensors.name_of(id))
            .or_else(|| self.materials.name_of(id))
            .or_else(|| self.global_illumination.name_of(id))
    }

    /// Reserve an id and a name, generating whichever is missing.
    fn reserve(
        &mut self,
        kind: ObjectKind,
        id: Option<ObjectId>,
        name: Option<&str>,
    ) -> RenderResult<(ObjectId, String)> {
        let id = id.unwrap_or(ObjectId(self.next_id));
        if id.is_none() || self.has_scene_id(id) {
            log::warn!("Scene '{}': id {} already in use", self.name, id.0);
            return Err(RenderError::DuplicateId(id.0));
        }
        let name = match name {
            Some(name) => name.to_string(),
            None => format!("{}({})", kind.name_prefix(), id.0),
        };
        if self.has_scene_name(&name) {
            log::warn!("Scene '{}': name '{name}' already in use", self.name);
            return Err(RenderError::DuplicateName(name));
        }
        self.next_id = self.next_id.max(id.0 + 1);
        Ok((id, name))
    }

    fn register_node(&mut self, id: ObjectId) -> RenderResult<()> {
        self.graph.insert(id)?;
        self.graph.add_child(self.root, id)
    }

    // Factory

    pub fn create_visual(&mut self) -> RenderResult<ObjectId> {
        self.create_visual_with(None, None)
    }

    pub fn create_visual_named(&mut self, name: &str) -> RenderResult<ObjectId> {
        self.create_visual_with(None, Some(name))
    }

    pub fn create_visual_with_id(&mut self, id: ObjectId, name: &str) -> RenderResult<ObjectId> {
        self.create_visual_with(Some(id), Some(name))
    }

    fn create_visual_with(
        &mut self,
        id: Option<ObjectId>,
        name: Option<&str>,
    ) -> RenderResult<ObjectId> {
        let (id, name) = self.reserve(ObjectKind::Visual, id, name)?;
        self.visuals.insert(id, &name, Visual::new())?;
        self.register_node(id)?;
        self.mark_dirty(false);
        log::trace!("Scene '{}': created visual '{name}' {id}", self.name);
        Ok(id)
    }

    fn create_light(&mut self, light: Light, name: Option<&str>) -> RenderResult<ObjectId> {
        let (id, name) = self.reserve(ObjectKind::Light, None, name)?;
        self.lights.insert(id, &name, light)?;
        self.register_node(id)?;
        self.mark_dirty(true);
        log::trace!("Scene '{}': created light '{name}' {id}", self.name);
        Ok(id)
    }

    pub fn create_directional_light(&mut self, name: Option<&str>) -> RenderResult<ObjectId> {
        self.create_light(Light::new(LightKind::directional()), name)
    }

    pub fn create_point_light(&mut self, name: Option<&str>) -> RenderResult<ObjectId> {
        self.create_light(Light::point(), name)
    }

    pub fn create_spot_light(&mut self, name: Option<&str>) -> RenderResult<ObjectId> {
        self.create_light(Light::new(LightKind::spot()), name)
    }

    fn create_sensor(&mut self, kind: CameraKind, name: Option<&str>) -> RenderResult<ObjectId> {
        let (id, name) = self.reserve(ObjectKind::Camera, None, name)?;
        let kind_name = kind.name();
        self.sensors.insert(id, &name, Camera::new(kind))?;
        self.register_node(id)?;
        log::trace!("Scene '{}': created {kind_name} '{name}' {id}", self.name);
        Ok(id)
    }

    pub fn create_camera(&mut self, name: Option<&str>) -> RenderResult<ObjectId> {
        self.create_sensor(CameraKind::Plain, name)
    }

    pub fn create_depth_camera(&mut self, name: Option<&str>) -> RenderResult<ObjectId> {
        self.create_sensor(CameraKind::Depth(DepthCamera::new()), name)
    }

    pub fn create_thermal_camera(&mut self, name: Option<&str>) -> RenderResult<ObjectId> {
        self.create_sensor(CameraKind::Thermal(ThermalCamera::new()), name)
    }

    pub fn create_segmentation_camera(&mut self, name: Option<&str>) -> RenderResult<ObjectId> {
        self.create_sensor(CameraKind::Segmentation(SegmentationCamera::new()), name)
    }

    pub fn create_bounding_box_camera(&mut self, name: Option<&str>) -> RenderResult<ObjectId> {
        self.create_sensor(CameraKind::BoundingBox(BoundingBoxCamera::new()), name)
    }

    pub fn create_wide_angle_camera(&mut self, name: Option<&str>) -> RenderResult<ObjectId> {
        self.create_sensor(CameraKind::WideAngle(WideAngleCamera::new()), name)
    }

    pub fn create_material(&mut self, name: Option<&str>) -> RenderResult<ObjectId> {
        self.create_material_from(Material::default(), name)
    }

    pub fn create_material_from(
        &mut self,
        material: Material,
        name: Option<&str>,
    ) -> RenderResult<ObjectId> {
        let (id, name) = self.reserve(ObjectKind::Material, None, name)?;
        self.materials.insert(id, &name, material)?;
        Ok(id)
    }

    /// Independent copy of a material under a new id.
    pub fn clone_material(&mut self, source: ObjectId, name: Option<&str>) -> RenderResult<ObjectId> {
        let material = self
            .materials
            .get(source)
            .cloned()
            .ok_or(RenderError::UnknownObject(source.0))?;
        self.create_material_from(material, name)
    }

    pub fn create_global_illumination_vct(&mut self, name: Option<&str>) -> RenderResult<ObjectId> {
        let (id, name) = self.reserve(ObjectKind::GlobalIllumination, None, name)?;
        self.global_illumination.insert(
            id,
            &name,
            GlobalIllumination::Vct(GlobalIlluminationVct::new()),
        )?;
        Ok(id)
    }

    pub fn create_global_illumination_civct(
        &mut self,
        name: Option<&str>,
    ) -> RenderResult<ObjectId> {
        let (id, name) = self.reserve(ObjectKind::GlobalIllumination, None, name)?;
        self.global_illumination.insert(
            id,
            &name,
            GlobalIllumination::Civct(GlobalIlluminationCivct::new()),
        )?;
        Ok(id)
    }

    // Access

    pub fn visual(&self, id: ObjectId) -> Option<&Visual> {
        self.visuals.get(id)
    }

    /// Mutable access; marks the scene dirty.
    pub fn visual_mut(&mut self, id: ObjectId) -> Option<&mut Visual> {
        if self.visuals.contains(id) {
            self.mark_dirty(false);
        }
        self.visuals.get_mut(id)
    }

    pub fn visual_id(&self, reference: ObjectRef<'_>) -> Option<ObjectId> {
        self.visuals.resolve(reference)
    }

    pub fn visual_count(&self) -> usize {
        self.visuals.len()
    }

    pub fn light(&self, id: ObjectId) -> Option<&Light> {
        self.lights.get(id)
    }

    /// Mutable access; re-bakes active global illumination on the next frame.
    pub fn light_mut(&mut self, id: ObjectId) -> Option<&mut Light> {
        if self.lights.contains(id) {
            self.mark_dirty(true);
        }
        self.lights.get_mut(id)
    }

    pub fn light_id(&self, reference: ObjectRef<'_>) -> Option<ObjectId> {
        self.lights.resolve(reference)
    }

    pub fn light_count(&self) -> usize {
        self.lights.len()
    }

    pub fn camera(&self, id: ObjectId) -> Option<&Camera> {
        self.sensors.get(id)
    }

    /// Camera settings never affect the extracted frame, so this does not
    /// mark the scene dirty.
    pub fn camera_mut(&mut self, id: ObjectId) -> Option<&mut Camera> {
        self.sensors.get_mut(id)
    }

    pub fn sensor_id(&self, reference: ObjectRef<'_>) -> Option<ObjectId> {
        self.sensors.resolve(reference)
    }

    pub fn sensor_count(&self) -> usize {
        self.sensors.len()
    }

    pub fn material(&self, id: ObjectId) -> Option<&Material> {
        self.materials.get(id)
    }

    /// Mutable access. Every visual using the material sees the change.
    pub fn material_mut(&mut self, id: ObjectId) -> Option<&mut Material> {
        if self.materials.contains(id) {
            self.mark_dirty(false);
        }
        self.materials.get_mut(id)
    }

    pub fn material_id(&self, reference: ObjectRef<'_>) -> Option<ObjectId> {
        self.materials.resolve(reference)
    }

    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    pub fn global_illumination(&self, id: ObjectId) -> Option<&GlobalIllumination> {
        self.global_illumination.get(id)
    }

    pub fn global_illumination_mut(&mut self, id: ObjectId) -> Option<&mut GlobalIllumination> {
        self.global_illumination.get_mut(id)
    }

    // Destruction

    /// Destroy a node and its whole subtree, children first.
    pub fn destroy_node(&mut self, id: ObjectId) -> bool {
        if id == self.root || !self.graph.contains(id) {
            return false;
        }
        for node in self.graph.subtree_post_order(id) {
            if self.lights.remove(node).is_some() {
                self.lights_dirty = true;
            }
            self.visuals.remove(node);
            if self.sensors.remove(node).is_some() {
                self.unbind_camera(node);
            }
            self.graph.remove(node);
            log::trace!("Scene '{}': destroyed node {node}", self.name);
        }
        self.mark_dirty(false);
        true
    }

    fn unbind_camera(&mut self, camera: ObjectId) {
        for id in self.global_illumination.ids().collect::<Vec<_>>() {
            if let Some(civct) = self
                .global_illumination
                .get_mut(id)
                .and_then(GlobalIllumination::as_civct_mut)
            {
                if civct.bound_camera() == Some(camera) {
                    civct.bind_camera(None);
                }
            }
        }
    }

    pub fn destroy_visual(&mut self, reference: ObjectRef<'_>) -> bool {
        self.visuals
            .resolve(reference)
            .is_some_and(|id| self.destroy_node(id))
    }

    pub fn destroy_visuals(&mut self) {
        for id in self.visuals.ids().collect::<Vec<_>>() {
            // Earlier subtrees may already have taken this one.
            if self.visuals.contains(id) {
                self.destroy_node(id);
            }
        }
    }

    pub fn destroy_light(&mut self, reference: ObjectRef<'_>) -> bool {
        self.lights
            .resolve(reference)
            .is_some_and(|id| self.destroy_node(id))
    }

    pub fn destroy_lights(&mut self) {
        for id in self.lights.ids().collect::<Vec<_>>() {
            if self.lights.contains(id) {
                self.destroy_node(id);
            }
        }
    }

    pub fn destroy_sensor(&mut self, reference: ObjectRef<'_>) -> bool {
        self.sensors
            .resolve(reference)
            .is_some_and(|id| self.destroy_node(id))
    }

    pub fn destroy_sensors(&mut self) {
        for id in self.sensors.ids().collect::<Vec<_>>() {
            if self.sensors.contains(id) {
                self.destroy_node(id);
            }
        }
    }

    /// Visuals still referring to the material fall back to the default one.
    pub fn destroy_material(&mut self, reference: ObjectRef<'_>) -> bool {
        let Some(id) = self.materials.resolve(reference) else {
            return false;
        };
        self.materials.remove(id);
        self.mark_dirty(false);
        true
    }

    pub fn destroy_global_illumination(&mut self, id: ObjectId) -> bool {
        if self.global_illumination.remove(id).is_none() {
            return false;
        }
        if self.active_gi == Some(id) {
            self.active_gi = None;
            self.mark_dirty(false);
        }
        true
    }

    // Graph

    fn check_node(&self, id: ObjectId) -> RenderResult<()> {
        if self.graph.contains(id) {
            Ok(())
        } else if self.has_scene_id(id) {
            Err(RenderError::WrongKind(id.0))
        } else {
            Err(RenderError::UnknownObject(id.0))
        }
    }

    /// Record that `id` moved or changed; light subtrees re-bake GI.
    fn touch(&mut self, id: ObjectId) {
        let subtree = self.graph.subtree_post_order(id);
        let lights_changed = subtree.iter().any(|node| self.lights.contains(*node));
        self.mark_dirty(lights_changed);
    }

    fn mark_dirty(&mut self, lights: bool) {
        self.dirty = true;
        self.lights_dirty |= lights;
    }

    /// Move `child` under `parent`. Cycles are rejected.
    pub fn add_child(&mut self, parent: ObjectId, child: ObjectId) -> RenderResult<()> {
        self.check_node(parent)?;
        self.check_node(child)?;
        if child == self.root {
            return Err(RenderError::InvalidConfig(
                "the root visual cannot be re-parented".into(),
            ));
        }
        self.graph.add_child(parent, child)?;
        self.touch(child);
        Ok(())
    }

    /// Detach `child` from `parent`; it returns to the root visual.
    pub fn remove_child(&mut self, parent: ObjectId, child: ObjectId) -> bool {
        if parent == self.root || !self.graph.remove_child(parent, child) {
            return false;
        }
        // Both ids are known to the graph here.
        let _ = self.graph.add_child(self.root, child);
        self.touch(child);
        true
    }

    /// Parent node; `None` for the root and for unknown ids.
    pub fn parent(&self, id: ObjectId) -> Option<ObjectId> {
        self.graph.parent(id)
    }

    pub fn children(&self, id: ObjectId) -> &[ObjectId] {
        self.graph.children(id)
    }

    pub fn local_pose(&self, id: ObjectId) -> Option<Pose> {
        self.graph.local_pose(id)
    }

    pub fn set_local_pose(&mut self, id: ObjectId, pose: Pose) -> RenderResult<()> {
        self.check_node(id)?;
        self.graph.set_local_pose(id, pose)?;
        self.touch(id);
        Ok(())
    }

    pub fn set_local_position(&mut self, id: ObjectId, position: DVec3) -> RenderResult<()> {
        let mut pose = self.local_pose(id).ok_or(RenderError::UnknownObject(id.0))?;
        pose.position = position;
        self.set_local_pose(id, pose)
    }

    pub fn set_local_rotation(&mut self, id: ObjectId, rotation: DQuat) -> RenderResult<()> {
        let mut pose = self.local_pose(id).ok_or(RenderError::UnknownObject(id.0))?;
        pose.rotation = rotation.normalize();
        self.set_local_pose(id, pose)
    }

    pub fn set_local_scale(&mut self, id: ObjectId, scale: DVec3) -> RenderResult<()> {
        let mut pose = self.local_pose(id).ok_or(RenderError::UnknownObject(id.0))?;
        pose.scale = scale;
        self.set_local_pose(id, pose)
    }

    /// Composed from the root down on every call.
    pub fn world_pose(&self, id: ObjectId) -> Option<Pose> {
        self.graph.world_pose(id)
    }

    pub fn set_world_pose(&mut self, id: ObjectId, pose: Pose) -> RenderResult<()> {
        self.check_node(id)?;
        self.graph.set_world_pose(id, pose)?;
        self.touch(id);
        Ok(())
    }

    // Visuals

    fn visual_entry(&mut self, id: ObjectId) -> RenderResult<&mut Visual> {
        if !self.visuals.contains(id) {
            return Err(if self.has_scene_id(id) {
                RenderError::WrongKind(id.0)
            } else {
                RenderError::UnknownObject(id.0)
            });
        }
        self.mark_dirty(false);
        self.visuals
            .get_mut(id)
            .ok_or(RenderError::UnknownObject(id.0))
    }

    pub fn add_geometry(&mut self, visual: ObjectId, geometry: Geometry) -> RenderResult<usize> {
        Ok(self.visual_entry(visual)?.add_geometry(geometry))
    }

    pub fn remove_geometry(&mut self, visual: ObjectId, index: usize) -> RenderResult<Option<Geometry>> {
        Ok(self.visual_entry(visual)?.remove_geometry(index))
    }

    /// Material used by `material`, cloned first when `unique`.
    fn material_for_assignment(&mut self, material: ObjectId, unique: bool) -> RenderResult<ObjectId> {
        if !self.materials.contains(material) {
            return Err(RenderError::UnknownObject(material.0));
        }
        if unique {
            self.clone_material(material, None)
        } else {
            Ok(material)
        }
    }

    /// Assign a material to a visual and its geometries without overrides.
    /// With `unique` the visual gets its own copy, isolated from later
    /// changes to `material`. Returns the id actually assigned.
    pub fn set_material(
        &mut self,
        visual: ObjectId,
        material: ObjectId,
        unique: bool,
    ) -> RenderResult<ObjectId> {
        self.visual_entry(visual)?;
        let assigned = self.material_for_assignment(material, unique)?;
        self.visual_entry(visual)?.material = Some(assigned);
        Ok(assigned)
    }

    /// Override the material of one geometry.
    pub fn set_geometry_material(
        &mut self,
        visual: ObjectId,
        index: usize,
        material: ObjectId,
        unique: bool,
    ) -> RenderResult<ObjectId> {
        if self.visual_entry(visual)?.geometries().len() <= index {
            return Err(RenderError::InvalidConfig(format!(
                "visual {visual} has no geometry {index}"
            )));
        }
        let assigned = self.material_for_assignment(material, unique)?;
        if let Some(geometry) = self.visual_entry(visual)?.geometry_mut(index) {
            geometry.material = Some(assigned);
        }
        Ok(assigned)
    }

    pub fn set_user_data(
        &mut self,
        visual: ObjectId,
        key: &str,
        value: impl Into<Variant>,
    ) -> RenderResult<()> {
        self.visual_entry(visual)?.set_user_data(key, value);
        Ok(())
    }

    pub fn user_data(&self, visual: ObjectId, key: &str) -> Option<&Variant> {
        self.visuals.get(visual).and_then(|v| v.user_data(key))
    }

    pub fn set_visible(&mut self, visual: ObjectId, visible: bool) -> RenderResult<()> {
        self.visual_entry(visual)?.visible = visible;
        Ok(())
    }

    pub fn set_static(&mut self, visual: ObjectId, is_static: bool) -> RenderResult<()> {
        self.visual_entry(visual)?.is_static = is_static;
        Ok(())
    }

    /// Bounds of the visual's own geometries in its local frame.
    pub fn local_bounding_box(&self, visual: ObjectId) -> Option<Aabb> {
        self.visuals.get(visual).map(Visual::local_bounds)
    }

    /// World bounds of the visual and every visual below it.
    pub fn world_bounding_box(&self, visual: ObjectId) -> Option<Aabb> {
        if !self.visuals.contains(visual) {
            return None;
        }
        let bounds = self
            .graph
            .subtree_post_order(visual)
            .into_iter()
            .filter_map(|node| Some((self.visuals.get(node)?, self.graph.world_pose(node)?)))
            .flat_map(|(v, world)| {
                v.geometries()
                    .iter()
                    .map(move |g| g.mesh.bounds().transformed(&world.compose(&g.origin)))
            })
            .fold(Aabb::EMPTY, |acc, b| acc.merge(&b));
        Some(bounds)
    }

    /// Visible when it and every visual above it is visible.
    /// Nearest visual above `id`, skipping lights and cameras in between.
    fn visual_ancestor(&self, id: ObjectId) -> Option<ObjectId> {
        let mut current = self.graph.parent(id);
        while let Some(node) = current {
            if self.visuals.contains(node) {
                return Some(node);
            }
            current = self.graph.parent(node);
        }
        None
    }

    fn is_visible(&self, id: ObjectId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if let Some(visual) = self.visuals.get(node) {
                if !visual.visible {
                    return false;
                }
            }
            current = self.graph.parent(node);
        }
        true
    }

    // Materials and resources

    pub fn resource_paths(&self) -> &SearchPaths {
        &self.resource_paths
    }

    pub fn resource_paths_mut(&mut self) -> &mut SearchPaths {
        &mut self.resource_paths
    }

    fn material_entry(&mut self, id: ObjectId) -> RenderResult<&mut Material> {
        self.dirty = true;
        self.materials
            .get_mut(id)
            .ok_or(RenderError::UnknownObject(id.0))
    }

    /// Returns false when the texture could not be loaded; the material then
    /// renders untextured.
    pub fn set_texture(&mut self, material: ObjectId, path: &str) -> RenderResult<bool> {
        let locator = self.resource_paths.clone();
        Ok(self.material_entry(material)?.set_texture(path, &locator))
    }

    pub fn set_normal_map(&mut self, material: ObjectId, path: &str) -> RenderResult<bool> {
        let locator = self.resource_paths.clone();
        Ok(self.material_entry(material)?.set_normal_map(path, &locator))
    }

    pub fn set_vertex_shader(&mut self, material: ObjectId, path: &str) -> RenderResult<bool> {
        let locator = self.resource_paths.clone();
        Ok(self.material_entry(material)?.set_vertex_shader(path, &locator))
    }

    pub fn set_fragment_shader(&mut self, material: ObjectId, path: &str) -> RenderResult<bool> {
        let locator = self.resource_paths.clone();
        Ok(self
            .material_entry(material)?
            .set_fragment_shader(path, &locator))
    }

    // Environment

    pub fn ambient_light(&self) -> Color {
        self.ambient
    }

    pub fn set_ambient_light(&mut self, color: Color) {
        self.ambient = color;
        self.mark_dirty(false);
    }

    pub fn background_color(&self) -> Color {
        self.background
    }

    pub fn set_background_color(&mut self, color: Color) {
        self.background = color;
        self.mark_dirty(false);
    }

    // Global illumination

    pub fn active_global_illumination(&self) -> Option<ObjectId> {
        self.active_gi
    }

    /// Make `gi` the only enabled solution, or disable global illumination
    /// with `None`.
    pub fn set_active_global_illumination(&mut self, gi: Option<ObjectId>) -> RenderResult<()> {
        if let Some(id) = gi {
            if !self.global_illumination.contains(id) {
                return Err(RenderError::UnknownObject(id.0));
            }
        }
        if let Some(previous) = self.active_gi.take() {
            if let Some(previous) = self.global_illumination.get_mut(previous) {
                previous.set_enabled(false);
            }
        }
        if let Some(id) = gi {
            if let Some(next) = self.global_illumination.get_mut(id) {
                next.set_enabled(true);
            }
            self.active_gi = Some(id);
        }
        log::debug!("Scene '{}': active global illumination {:?}", self.name, gi);
        self.mark_dirty(false);
        Ok(())
    }

    fn bound_camera_position(&self, gi: ObjectId) -> Option<DVec3> {
        let camera = self
            .global_illumination
            .get(gi)?
            .as_civct()?
            .bound_camera()?;
        self.graph.world_pose(camera).map(|pose| pose.position)
    }

    /// Voxelize static visuals and bake lighting for `gi`.
    pub fn build_global_illumination(&mut self, gi: ObjectId) -> RenderResult<()> {
        let frame = self.extract();
        let camera_position = self.bound_camera_position(gi);
        let name = self.name.clone();
        let solution = self
            .global_illumination
            .get_mut(gi)
            .ok_or(RenderError::UnknownObject(gi.0))?;
        match solution {
            GlobalIllumination::Vct(vct) => vct.build(&frame)?,
            GlobalIllumination::Civct(civct) => {
                let position = camera_position.unwrap_or_else(|| {
                    log::warn!("Scene '{name}': CIVCT {gi} has no bound camera, centring at origin");
                    DVec3::ZERO
                });
                civct.build(&frame, position)?;
            }
        }
        self.mark_dirty(false);
        Ok(())
    }

    fn update_global_illumination(&mut self, frame: &FrameSnapshot) -> RenderResult<()> {
        let Some(active) = self.active_gi else {
            return Ok(());
        };
        let camera_position = self.bound_camera_position(active);
        let lights_dirty = self.lights_dirty;
        let Some(gi) = self.global_illumination.get_mut(active) else {
            return Ok(());
        };
        if !gi.is_built() {
            return Ok(());
        }
        if let (Some(civct), Some(position)) = (gi.as_civct_mut(), camera_position) {
            if civct.update(frame, position)? {
                log::debug!("CIVCT {active}: cascades followed camera to {position}");
            }
        }
        if lights_dirty {
            gi.lighting_changed(frame)?;
        }
        Ok(())
    }

    // Frame

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// How many times [`pre_render`](Self::pre_render) did real work.
    pub fn pre_render_count(&self) -> u64 {
        self.pre_render_count
    }

    /// Flush pending changes into a new frame snapshot. A no-op when nothing
    /// changed since the last call, so any number of cameras can share one
    /// logical frame.
    pub fn pre_render(&mut self) -> RenderResult<()> {
        if !self.dirty && self.frame.is_some() {
            return Ok(());
        }
        for material in self.materials.values_mut() {
            material.clear_dirty_params();
        }
        let mut frame = self.extract();
        self.update_global_illumination(&frame)?;
        if let Some(gi) = self.active_gi.and_then(|id| self.global_illumination.get(id)) {
            if gi.enabled() && gi.is_built() {
                frame.gi = gi.volumes();
            }
        }
        log::trace!(
            "Scene '{}': frame {} with {} items, {} lights",
            self.name,
            frame.generation,
            frame.items.len(),
            frame.lights.len()
        );
        self.frame = Some(Arc::new(frame));
        self.dirty = false;
        self.lights_dirty = false;
        self.pre_render_count += 1;
        Ok(())
    }

    /// Current frame snapshot, flushing pending changes first.
    pub fn frame(&mut self) -> RenderResult<Arc<FrameSnapshot>> {
        self.pre_render()?;
        self.frame.clone().ok_or(RenderError::NotInitialized)
    }

    fn extract(&self) -> FrameSnapshot {
        let mut frame = FrameSnapshot {
            ambient: self.ambient,
            background: self.background,
            generation: extract::next_generation(),
            ..Default::default()
        };
        let mut materials: HashMap<ObjectId, Arc<ExtractedMaterial>> = HashMap::new();
        let default_material = Arc::new(ExtractedMaterial::default());

        for (id, visual) in self.visuals.iter() {
            let Some(world) = self.graph.world_pose(id) else {
                continue;
            };
            frame.visuals.insert(
                id,
                ExtractedVisual {
                    name: self.visuals.name_of(id).unwrap_or_default().to_string(),
                    parent: self.visual_ancestor(id),
                    label: visual.label(),
                    temperature: visual.temperature(),
                    world,
                },
            );
            if !self.is_visible(id) {
                continue;
            }
            for (index, geometry) in visual.geometries().iter().enumerate() {
                let material = match visual
                    .geometry_material(index)
                    .and_then(|m| self.materials.get(m).map(|material| (m, material)))
                {
                    Some((material_id, material)) => materials
                        .entry(material_id)
                        .or_insert_with(|| Arc::new(ExtractedMaterial::from_material(material)))
                        .clone(),
                    None => default_material.clone(),
                };
                frame.items.push(ExtractedItem {
                    visual: id,
                    mesh: geometry.mesh.clone(),
                    world: world.compose(&geometry.origin),
                    material,
                    is_static: visual.is_static,
                });
            }
        }

        for (id, light) in self.lights.iter() {
            if let Some(pose) = self.graph.world_pose(id) {
                frame.lights.push(ExtractedLight {
                    id,
                    light: light.clone(),
                    pose,
                });
            }
        }
        frame
    }

    // Cameras

    /// Render `camera` and run its post-processing; subscribers are notified
    /// before this returns.
    pub fn render(&mut self, camera: ObjectId) -> RenderResult<()> {
        if !self.sensors.contains(camera) {
            return Err(RenderError::UnknownObject(camera.0));
        }
        if !self.initialized {
            return Err(RenderError::NotInitialized);
        }
        self.pre_render()?;
        let frame = self.frame.clone().ok_or(RenderError::NotInitialized)?;
        let pose = self
            .graph
            .world_pose(camera)
            .ok_or(RenderError::UnknownObject(camera.0))?;
        let sensor = self
            .sensors
            .get_mut(camera)
            .ok_or(RenderError::UnknownObject(camera.0))?;
        let mut backend = self.backend.borrow_mut();
        sensor.render(&mut **backend, &frame, pose)
    }

    /// Render `camera` and copy its output into `image`.
    ///
    /// An uninitialized scene yields a background-coloured image instead of
    /// an error.
    pub fn capture(&mut self, camera: ObjectId, image: &mut Image) -> RenderResult<()> {
        if !self.initialized {
            let sensor = self
                .sensors
                .get(camera)
                .ok_or(RenderError::UnknownObject(camera.0))?;
            log::warn!(
                "Scene '{}': capture before init, returning background",
                self.name
            );
            *image = sensor.background_image(self.background);
            return Ok(());
        }
        self.render(camera)?;
        if let Some(sensor) = self.sensors.get(camera) {
            sensor.copy_to(image);
        }
        Ok(())
    }

    /// Cast a world-space ray against visible geometry.
    pub fn ray_query(&mut self, query: &RayQuery) -> RenderResult<RayQueryResult> {
        let frame = self.frame()?;
        let bvh = match &self.query_cache {
            Some((generation, bvh)) if *generation == frame.generation => bvh.clone(),
            _ => {
                let bvh = Arc::new(Bvh::build(&frame, |_| true));
                self.query_cache = Some((frame.generation, bvh.clone()));
                bvh
            }
        };
        Ok(query.cast(&bvh, &frame))
    }

    /// Ray through a point of `camera`'s image, in normalized device
    /// coordinates.
    pub fn camera_ray(&self, camera: ObjectId, ndc_x: f64, ndc_y: f64) -> RenderResult<RayQuery> {
        let sensor = self
            .sensors
            .get(camera)
            .ok_or(RenderError::UnknownObject(camera.0))?;
        let pose = self
            .graph
            .world_pose(camera)
            .ok_or(RenderError::UnknownObject(camera.0))?;
        Ok(RayQuery::from_camera(&sensor.view_setup(pose), ndc_x, ndc_y))
    }

    /// Point a camera (or any node) at `target` with +Z up.
    pub fn look_at(&mut self, id: ObjectId, target: DVec3) -> RenderResult<()> {
        let current = self.world_pose(id).ok_or(RenderError::UnknownObject(id.0))?;
        let pose = Pose::look_at(current.position, target, DVec3::Z).with_scale(current.scale);
        self.set_world_pose(id, pose)
    }

    /// Orbit controller seeded from a camera's pose and view.
    pub fn orbit_controller(&self, camera: ObjectId, target: DVec3) -> Option<OrbitViewController> {
        let sensor = self.sensors.get(camera)?;
        let mut orbit = OrbitViewController::new(self.world_pose(camera)?, target);
        orbit.set_view(sensor.image_width(), sensor.image_height(), sensor.hfov());
        Some(orbit)
    }
}

impl fmt::Debug for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scene")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("visuals", &self.visuals.len())
            .field("lights", &self.lights.len())
            .field("sensors", &self.sensors.len())
            .field("materials", &self.materials.len())
            .field("initialized", &self.initialized)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::null::NullBackend;
    use crate::EngineConfig;

    fn scene() -> Scene {
        let mut backend: Box<dyn RenderBackend> = Box::new(NullBackend::new());
        backend.init(&EngineConfig::default()).unwrap();
        let mut scene = Scene::new(SceneId(1), "test", Rc::new(RefCell::new(backend)));
        scene.init().unwrap();
        scene
    }

    #[test]
    fn test_root_visual_is_parent_of_new_nodes() {
        let mut scene = scene();
        let visual = scene.create_visual().unwrap();
        let light = scene.create_point_light(None).unwrap();
        assert_eq!(scene.parent(visual), Some(scene.root_visual()));
        assert_eq!(scene.parent(light), Some(scene.root_visual()));
        assert_eq!(scene.name_of(visual), Some("visual(2)"));
        assert!(scene.has_scene_name(ROOT_VISUAL_NAME));
    }

    #[test]
    fn test_names_are_unique_across_stores() {
        let mut scene = scene();
        scene.create_visual_named("thing").unwrap();
        assert_eq!(
            scene.create_point_light(Some("thing")),
            Err(RenderError::DuplicateName("thing".into()))
        );
        assert_eq!(
            scene.create_visual_with_id(ObjectId(2), "other"),
            Err(RenderError::DuplicateId(2))
        );
        assert!(scene.has_scene_name("thing"));
        assert_eq!(scene.light_count(), 0);
    }

    #[test]
    fn test_explicit_ids_advance_counter() {
        let mut scene = scene();
        let explicit = scene.create_visual_with_id(ObjectId(40), "forty").unwrap();
        let next = scene.create_visual().unwrap();
        assert_eq!(explicit, ObjectId(40));
        assert_eq!(next, ObjectId(41));
    }

    #[test]
    fn test_pre_render_runs_once_per_change() {
        let mut scene = scene();
        let camera = scene.create_camera(None).unwrap();
        let other = scene.create_depth_camera(None).unwrap();
        scene.render(camera).unwrap();
        scene.render(other).unwrap();
        assert_eq!(scene.pre_render_count(), 1);

        let visual = scene.create_visual().unwrap();
        scene.set_local_position(visual, DVec3::X).unwrap();
        assert!(scene.is_dirty());
        scene.render(camera).unwrap();
        assert_eq!(scene.pre_render_count(), 2);
    }

    #[test]
    fn test_hidden_parent_hides_children() {
        let mut scene = scene();
        let parent = scene.create_visual().unwrap();
        let child = scene.create_visual().unwrap();
        scene.add_child(parent, child).unwrap();
        scene.add_geometry(child, Geometry::cube()).unwrap();
        assert_eq!(scene.frame().unwrap().items.len(), 1);
        scene.set_visible(parent, false).unwrap();
        let frame = scene.frame().unwrap();
        assert!(frame.items.is_empty());
        assert_eq!(frame.visuals[&child].parent, Some(parent));
    }

    #[test]
    fn test_unique_material_isolates_changes() {
        let mut scene = scene();
        let shared = scene.create_material(Some("shared")).unwrap();
        let a = scene.create_visual().unwrap();
        let b = scene.create_visual().unwrap();
        scene.set_material(a, shared, false).unwrap();
        let copy = scene.set_material(b, shared, true).unwrap();
        assert_ne!(copy, shared);

        scene.material_mut(shared).unwrap().diffuse = Color::RED;
        assert_eq!(scene.material(copy).unwrap().diffuse, Material::default().diffuse);
        assert_eq!(scene.visual(a).unwrap().material(), Some(shared));
    }

    #[test]
    fn test_destroy_by_name_and_index() {
        let mut scene = scene();
        scene.create_point_light(Some("a")).unwrap();
        scene.create_point_light(Some("b")).unwrap();
        scene.create_point_light(Some("c")).unwrap();
        assert!(scene.destroy_light(ObjectRef::Name("b")));
        assert!(scene.destroy_light(ObjectRef::Index(0)));
        assert_eq!(scene.light_id(ObjectRef::Index(0)), scene.light_id("c".into()));
        scene.destroy_lights();
        assert_eq!(scene.light_count(), 0);
        assert!(!scene.destroy_light(ObjectRef::Name("a")));
    }

    #[test]
    fn test_capture_before_init_is_background() {
        let backend: Box<dyn RenderBackend> = Box::new(NullBackend::new());
        let mut scene = Scene::new(SceneId(1), "cold", Rc::new(RefCell::new(backend)));
        scene.set_background_color(Color::BLUE);
        let camera = scene.create_camera(None).unwrap();
        scene.camera_mut(camera).unwrap().set_image_width(4);
        scene.camera_mut(camera).unwrap().set_image_height(2);
        let mut image = scene.camera(camera).unwrap().create_image();
        scene.capture(camera, &mut image).unwrap();
        assert_eq!(image.data().len(), 4 * 2 * 3);
        assert!(image.data().chunks(3).all(|px| px == [0, 0, 255]));
        assert_eq!(scene.init(), Err(RenderError::NotInitialized));
    }

    #[test]
    fn test_ray_query_hits_visual() {
        let mut scene = scene();
        let visual = scene.create_visual().unwrap();
        scene.add_geometry(visual, Geometry::cube()).unwrap();
        scene.set_local_position(visual, DVec3::new(3.0, 0.0, 0.0)).unwrap();
        let camera = scene.create_camera(None).unwrap();
        let ray = scene.camera_ray(camera, 0.0, 0.0).unwrap();
        let result = scene.ray_query(&ray).unwrap();
        assert!(result.is_hit());
        assert_eq!(result.object_id, visual);
    }
}
