//! Orbit view control
//!
//! Moves a camera pose around a target point from 2D drag input. Pure
//! geometry: the caller applies [`OrbitViewController::pose`] to the camera
//! node afterwards.

use glam::{DQuat, DVec2, DVec3};

use crate::math::{Angle, Pose};

/// Camera manipulation around a target point.
#[derive(Debug, Clone, PartialEq)]
pub struct OrbitViewController {
    pose: Pose,
    target: DVec3,
    image_width: u32,
    image_height: u32,
    hfov: Angle,
    /// Closest the camera may zoom to the target.
    pub min_distance: f64,
    /// Largest elevation above or below the target, in radians.
    pub max_elevation: f64,
}

impl OrbitViewController {
    pub fn new(pose: Pose, target: DVec3) -> Self {
        Self {
            pose,
            target,
            image_width: 1,
            image_height: 1,
            hfov: Angle::from_degrees(80.0),
            min_distance: 0.05,
            max_elevation: std::f64::consts::FRAC_PI_2 - 0.01,
        }
    }

    /// Image size and field of view used to convert pixels into motion.
    pub fn set_view(&mut self, image_width: u32, image_height: u32, hfov: Angle) {
        self.image_width = image_width.max(1);
        self.image_height = image_height.max(1);
        self.hfov = hfov;
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn set_pose(&mut self, pose: Pose) {
        self.pose = pose;
    }

    pub fn target(&self) -> DVec3 {
        self.target
    }

    pub fn set_target(&mut self, target: DVec3) {
        self.target = target;
    }

    pub fn distance(&self) -> f64 {
        self.pose.position.distance(self.target)
    }

    /// Translate camera and target in the view plane so the point under the
    /// cursor follows a drag of `drag` pixels.
    pub fn pan(&mut self, drag: DVec2) {
        let distance = self.distance();
        let meters_per_pixel =
            2.0 * distance * (self.hfov.radians() * 0.5).tan() / self.image_width as f64;
        let offset =
            (self.pose.left() * drag.x + self.pose.up() * drag.y) * meters_per_pixel;
        self.pose.position += offset;
        self.target += offset;
    }

    /// Rotate around the target. A drag across the full image width turns a
    /// full circle; across the full height, half of one.
    pub fn orbit(&mut self, drag: DVec2) {
        let offset = self.pose.position - self.target;
        let distance = offset.length();
        if distance <= f64::EPSILON {
            return;
        }
        let yaw = -drag.x / self.image_width as f64 * std::f64::consts::TAU;
        let pitch = drag.y / self.image_height as f64 * std::f64::consts::PI;

        let elevation = (offset.z / distance).asin();
        let new_elevation = (elevation + pitch).clamp(-self.max_elevation, self.max_elevation);
        let azimuth = offset.y.atan2(offset.x) + yaw;

        let direction = DQuat::from_rotation_z(azimuth)
            * DQuat::from_rotation_y(-new_elevation)
            * DVec3::X;
        let position = self.target + direction * distance;
        self.pose = Pose::look_at(position, self.target, DVec3::Z).with_scale(self.pose.scale);
    }

    /// Move along the view ray toward the target by `amount` (negative moves
    /// away). The camera never reaches or crosses the target.
    pub fn zoom(&mut self, amount: f64) {
        let to_target = self.target - self.pose.position;
        let distance = to_target.length();
        if distance <= f64::EPSILON {
            return;
        }
        let new_distance = (distance - amount).max(self.min_distance);
        self.pose.position = self.target - to_target / distance * new_distance;
    }
}
