//! Extracted render data.
//!
//! A [`FrameSnapshot`] is a flat, world-space copy of everything a backend
//! needs to draw one logical frame. It is produced by the scene after
//! `pre_render` and shared by every camera capture until the scene changes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use glam::{DVec3, Vec3};

use crate::gi::RadianceVolume;
use crate::math::{Aabb, Color, Pose};
use crate::resources::{Material, Mesh, TextureData};
use crate::scene::light::{Light, LightKind};
use crate::scene::object::ObjectId;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Process-unique snapshot generation. Backends key their caches on it, so
/// two scenes never share a value.
pub(crate) fn next_generation() -> u64 {
    NEXT_GENERATION.fetch_add(1, Ordering::Relaxed)
}

/// Material parameters ready for shading.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedMaterial {
    pub ambient: Vec3,
    pub diffuse: Vec3,
    pub specular: Vec3,
    pub emissive: Vec3,
    pub shininess: f32,
    pub transparency: f32,
    pub reflectivity: f32,
    pub lighting: bool,
    pub cast_shadows: bool,
    pub receive_shadows: bool,
    pub texture: Option<Arc<TextureData>>,
    pub normal_map: Option<Arc<TextureData>>,
}

impl Default for ExtractedMaterial {
    fn default() -> Self {
        Self::from_material(&Material::default())
    }
}

impl ExtractedMaterial {
    pub fn from_material(material: &Material) -> Self {
        Self {
            ambient: material.ambient.to_vec3(),
            diffuse: material.diffuse.to_vec3(),
            specular: material.specular.to_vec3(),
            emissive: material.emissive.to_vec3(),
            shininess: material.shininess as f32,
            transparency: material.transparency() as f32,
            reflectivity: material.reflectivity as f32,
            lighting: material.lighting,
            cast_shadows: material.cast_shadows,
            receive_shadows: material.receive_shadows,
            texture: material.texture().map(|t| t.data.clone()),
            normal_map: material.normal_map().map(|t| t.data.clone()),
        }
    }
}

/// One geometry instance in world space.
#[derive(Debug, Clone)]
pub struct ExtractedItem {
    /// Visual that owns the geometry; written to id buffers.
    pub visual: ObjectId,
    pub mesh: Arc<Mesh>,
    /// Geometry-to-world placement including scale.
    pub world: Pose,
    pub material: Arc<ExtractedMaterial>,
    pub is_static: bool,
}

impl ExtractedItem {
    pub fn world_bounds(&self) -> Aabb {
        self.mesh.bounds().transformed(&self.world)
    }
}

/// Light with its world placement.
#[derive(Debug, Clone)]
pub struct ExtractedLight {
    pub id: ObjectId,
    pub light: Light,
    pub pose: Pose,
}

/// Direction toward a light and the strength of its contribution at a point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Incidence {
    pub to_light: DVec3,
    /// Distance to the light; infinite for directional lights.
    pub distance: f64,
    pub strength: f64,
}

impl ExtractedLight {
    /// How this light reaches `point`, or `None` when it contributes nothing.
    pub fn incidence(&self, point: DVec3) -> Option<Incidence> {
        let light = &self.light;
        let (to_light, distance) = match &light.kind {
            LightKind::Directional { .. } => {
                let direction = light.world_direction(&self.pose)?;
                (-direction, f64::INFINITY)
            }
            LightKind::Point | LightKind::Spot { .. } => {
                let offset = self.pose.position - point;
                let distance = offset.length();
                if distance <= f64::EPSILON {
                    return None;
                }
                (offset / distance, distance)
            }
        };
        let mut strength = light.intensity * light.attenuation(distance);
        if let Some(axis) = light
            .world_direction(&self.pose)
            .filter(|_| matches!(light.kind, LightKind::Spot { .. }))
        {
            strength *= light.spot_factor(axis.angle_between(-to_light));
        }
        (strength > 0.0).then_some(Incidence {
            to_light,
            distance,
            strength,
        })
    }
}

/// Per-visual annotation data used by sensor post-processing.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedVisual {
    pub name: String,
    pub parent: Option<ObjectId>,
    pub label: Option<i64>,
    pub temperature: Option<f64>,
    pub world: Pose,
}

/// Backend-neutral copy of the scene for one logical frame.
#[derive(Debug, Clone, Default)]
pub struct FrameSnapshot {
    pub items: Vec<ExtractedItem>,
    pub lights: Vec<ExtractedLight>,
    pub visuals: HashMap<ObjectId, ExtractedVisual>,
    pub ambient: Color,
    pub background: Color,
    /// Baked indirect lighting, finest volume first.
    pub gi: Vec<Arc<RadianceVolume>>,
    /// Changes every time a scene is re-extracted; `0` for hand-built frames.
    pub generation: u64,
}

impl FrameSnapshot {
    /// Nearest visual at or above `id` for which `select` returns a value.
    pub fn find_annotation<T>(
        &self,
        id: ObjectId,
        select: impl Fn(&ExtractedVisual) -> Option<T>,
    ) -> Option<(ObjectId, T)> {
        let mut current = Some(id);
        while let Some(node) = current {
            let info = self.visuals.get(&node)?;
            if let Some(value) = select(info) {
                return Some((node, value));
            }
            current = info.parent;
        }
        None
    }

    /// Visual that carries the label for pixels drawn by `id`.
    pub fn label_owner(&self, id: ObjectId) -> Option<(ObjectId, i64)> {
        if id.is_none() {
            return None;
        }
        self.find_annotation(id, |v| v.label)
    }

    pub fn temperature_of(&self, id: ObjectId) -> Option<f64> {
        if id.is_none() {
            return None;
        }
        self.find_annotation(id, |v| v.temperature).map(|(_, t)| t)
    }

    /// True if `ancestor` is `id` or one of its parents.
    pub fn is_descendant(&self, id: ObjectId, ancestor: ObjectId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.visuals.get(&node).and_then(|v| v.parent);
        }
        false
    }

    /// Bounds of every geometry under `owner`, expressed in `frame`
    /// (a rigid pose; scale ignored).
    pub fn subtree_bounds_in(&self, owner: ObjectId, frame: &Pose) -> Aabb {
        let to_frame = frame.rotation.inverse();
        let mut bounds = Aabb::EMPTY;
        for item in self
            .items
            .iter()
            .filter(|item| self.is_descendant(item.visual, owner))
        {
            for corner in item.mesh.bounds().corners() {
                let world = item.world.transform_point(corner);
                bounds.grow(to_frame * (world - frame.position));
            }
        }
        bounds
    }

    pub fn world_bounds(&self) -> Aabb {
        self.items
            .iter()
            .fold(Aabb::EMPTY, |acc, item| acc.merge(&item.world_bounds()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::Mesh;

    fn visual(parent: Option<u32>, label: Option<i64>) -> ExtractedVisual {
        ExtractedVisual {
            name: String::new(),
            parent: parent.map(ObjectId),
            label,
            temperature: None,
            world: Pose::IDENTITY,
        }
    }

    #[test]
    fn test_label_inherited_from_ancestor() {
        let mut frame = FrameSnapshot::default();
        frame.visuals.insert(ObjectId(1), visual(None, None));
        frame.visuals.insert(ObjectId(2), visual(Some(1), Some(5)));
        frame.visuals.insert(ObjectId(3), visual(Some(2), None));

        assert_eq!(frame.label_owner(ObjectId(3)), Some((ObjectId(2), 5)));
        assert_eq!(frame.label_owner(ObjectId(1)), None);
        assert_eq!(frame.label_owner(ObjectId::NONE), None);
    }

    #[test]
    fn test_subtree_bounds_in_owner_frame() {
        let mut frame = FrameSnapshot::default();
        frame.visuals.insert(ObjectId(1), visual(None, Some(1)));
        frame.items.push(ExtractedItem {
            visual: ObjectId(1),
            mesh: Arc::new(Mesh::cube()),
            world: Pose::from_xyz(3.0, 0.0, 0.0).with_scale(DVec3::new(2.0, 1.0, 1.0)),
            material: Arc::new(ExtractedMaterial::default()),
            is_static: false,
        });

        let bounds = frame.subtree_bounds_in(ObjectId(1), &Pose::from_xyz(3.0, 0.0, 0.0));
        assert!(bounds.size().abs_diff_eq(DVec3::new(2.0, 1.0, 1.0), 1e-6));
        assert!(bounds.center().abs_diff_eq(DVec3::ZERO, 1e-6));
    }

    #[test]
    fn test_point_light_incidence() {
        let light = ExtractedLight {
            id: ObjectId(1),
            light: Light::point(),
            pose: Pose::from_xyz(0.0, 0.0, 2.0),
        };
        let hit = light.incidence(DVec3::ZERO).unwrap();
        assert!(hit.to_light.abs_diff_eq(DVec3::Z, 1e-12));
        assert!((hit.distance - 2.0).abs() < 1e-12);
        assert!((hit.strength - 1.0).abs() < 1e-12);
    }
}
