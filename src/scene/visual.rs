//! Visuals: renderable scene-graph nodes made of geometries.

use std::collections::HashMap;
use std::sync::Arc;

use crate::math::{Aabb, Pose};
use crate::resources::Mesh;
use crate::scene::object::{ObjectId, Variant};

/// User data key holding a segmentation / bounding-box label.
pub const LABEL_KEY: &str = "label";
/// User data key holding a surface temperature in kelvin.
pub const TEMPERATURE_KEY: &str = "temperature";

/// One piece of renderable shape owned by a visual.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    /// Primitive or mesh name, e.g. `"box"`.
    pub name: String,
    pub mesh: Arc<Mesh>,
    /// Offset of the mesh relative to the owning visual.
    pub origin: Pose,
    /// Overrides the visual's material when set.
    pub material: Option<ObjectId>,
}

impl Geometry {
    pub fn from_mesh(mesh: Arc<Mesh>) -> Self {
        Self {
            name: mesh.name.clone(),
            mesh,
            origin: Pose::IDENTITY,
            material: None,
        }
    }

    pub fn cube() -> Self {
        Self::from_mesh(Arc::new(Mesh::cube()))
    }

    pub fn sphere() -> Self {
        Self::from_mesh(Arc::new(Mesh::sphere(32, 16)))
    }

    pub fn cylinder() -> Self {
        Self::from_mesh(Arc::new(Mesh::cylinder(32)))
    }

    pub fn cone() -> Self {
        Self::from_mesh(Arc::new(Mesh::cone(32)))
    }

    pub fn plane() -> Self {
        Self::from_mesh(Arc::new(Mesh::plane(1)))
    }

    pub fn with_origin(mut self, origin: Pose) -> Self {
        self.origin = origin;
        self
    }

    /// Bounds in the owning visual's frame.
    pub fn local_bounds(&self) -> Aabb {
        self.mesh.bounds().transformed(&self.origin)
    }
}

/// Renderable node payload
#[derive(Debug, Clone, PartialEq)]
pub struct Visual {
    geometries: Vec<Geometry>,
    pub(crate) material: Option<ObjectId>,
    user_data: HashMap<String, Variant>,
    pub visible: bool,
    /// Will not move; eligible for baked global illumination.
    pub is_static: bool,
}

impl Default for Visual {
    fn default() -> Self {
        Self {
            geometries: Vec::new(),
            material: None,
            user_data: HashMap::new(),
            visible: true,
            is_static: false,
        }
    }
}

impl Visual {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn geometries(&self) -> &[Geometry] {
        &self.geometries
    }

    pub fn geometry_mut(&mut self, index: usize) -> Option<&mut Geometry> {
        self.geometries.get_mut(index)
    }

    pub fn add_geometry(&mut self, geometry: Geometry) -> usize {
        self.geometries.push(geometry);
        self.geometries.len() - 1
    }

    pub fn remove_geometry(&mut self, index: usize) -> Option<Geometry> {
        (index < self.geometries.len()).then(|| self.geometries.remove(index))
    }

    pub fn material(&self) -> Option<ObjectId> {
        self.material
    }

    /// Material used for geometry `index`: its override, else the visual's.
    pub fn geometry_material(&self, index: usize) -> Option<ObjectId> {
        self.geometries
            .get(index)
            .and_then(|g| g.material)
            .or(self.material)
    }

    pub fn set_user_data(&mut self, key: &str, value: impl Into<Variant>) {
        self.user_data.insert(key.to_string(), value.into());
    }

    pub fn user_data(&self, key: &str) -> Option<&Variant> {
        self.user_data.get(key)
    }

    pub fn has_user_data(&self, key: &str) -> bool {
        self.user_data.contains_key(key)
    }

    /// Segmentation label, if this visual carries one.
    pub fn label(&self) -> Option<i64> {
        self.user_data(LABEL_KEY).and_then(Variant::as_i64)
    }

    pub fn temperature(&self) -> Option<f64> {
        self.user_data(TEMPERATURE_KEY).and_then(Variant::as_f64)
    }

    /// Bounds of this visual's own geometries in its local frame.
    pub fn local_bounds(&self) -> Aabb {
        self.geometries
            .iter()
            .fold(Aabb::EMPTY, |acc, g| acc.merge(&g.local_bounds()))
    }
}
