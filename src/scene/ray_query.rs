//! Ray intersection queries against the extracted scene.

use glam::DVec3;

use crate::backend::raytrace::Bvh;
use crate::backend::{FrameSnapshot, ViewSetup};
use crate::scene::object::ObjectId;

/// A world-space ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayQuery {
    pub origin: DVec3,
    /// Normalized direction.
    pub direction: DVec3,
}

impl RayQuery {
    pub fn new(origin: DVec3, direction: DVec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    /// Ray through a point of the camera image in normalized device
    /// coordinates: `(-1, -1)` is the bottom-left corner, `(1, 1)` the top-right.
    pub fn from_camera(view: &ViewSetup, ndc_x: f64, ndc_y: f64) -> Self {
        let x = (ndc_x + 1.0) * 0.5 * view.width as f64;
        let y = (1.0 - ndc_y) * 0.5 * view.height as f64;
        Self::new(view.pose.position, view.world_ray(x, y))
    }

    /// Closest hit on a visible geometry.
    pub fn cast(&self, bvh: &Bvh, frame: &FrameSnapshot) -> RayQueryResult {
        if self.direction == DVec3::ZERO {
            return RayQueryResult::default();
        }
        match bvh.intersect(self.origin, self.direction, 0.0, f64::INFINITY) {
            Some(hit) => {
                let item = bvh.triangle(hit.triangle).item;
                RayQueryResult {
                    distance: hit.t,
                    point: self.origin + self.direction * hit.t,
                    object_id: frame.items[item].visual,
                }
            }
            None => RayQueryResult::default(),
        }
    }
}

/// Outcome of a [`RayQuery`]. An empty result is not an error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayQueryResult {
    /// Distance along the ray, negative when nothing was hit.
    pub distance: f64,
    pub point: DVec3,
    /// Visual owning the hit geometry.
    pub object_id: ObjectId,
}

impl Default for RayQueryResult {
    fn default() -> Self {
        Self {
            distance: -1.0,
            point: DVec3::ZERO,
            object_id: ObjectId::NONE,
        }
    }
}

impl RayQueryResult {
    pub fn is_hit(&self) -> bool {
        self.distance >= 0.0
    }
}
