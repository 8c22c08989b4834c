//! Pose, colour and angle types shared by the scene graph and cameras.

use bytemuck::{Pod, Zeroable};
use glam::{DMat3, DMat4, DQuat, DVec3, Vec3};

/// Local or world placement of a scene-graph node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: DVec3,
    pub rotation: DQuat,
    pub scale: DVec3,
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Pose {
    pub const IDENTITY: Self = Self {
        position: DVec3::ZERO,
        rotation: DQuat::IDENTITY,
        scale: DVec3::ONE,
    };

    pub fn new(position: DVec3, rotation: DQuat) -> Self {
        Self {
            position,
            rotation,
            scale: DVec3::ONE,
        }
    }

    pub fn from_position(position: DVec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    pub fn from_xyz(x: f64, y: f64, z: f64) -> Self {
        Self::from_position(DVec3::new(x, y, z))
    }

    /// Create a pose from position and roll/pitch/yaw (radians, extrinsic XYZ).
    pub fn from_xyz_rpy(x: f64, y: f64, z: f64, roll: f64, pitch: f64, yaw: f64) -> Self {
        Self::new(
            DVec3::new(x, y, z),
            DQuat::from_euler(glam::EulerRot::ZYX, yaw, pitch, roll),
        )
    }

    pub fn with_scale(mut self, scale: DVec3) -> Self {
        self.scale = scale;
        self
    }

    /// Compose `self ∘ local`: the pose of `local` expressed in the frame of `self`.
    ///
    /// The parent's scale stretches the child's offset but not its orientation.
    pub fn compose(&self, local: &Pose) -> Pose {
        Pose {
            position: self.position + self.rotation * (self.scale * local.position),
            rotation: (self.rotation * local.rotation).normalize(),
            scale: self.scale * local.scale,
        }
    }

    /// Inverse of [`Pose::compose`]: find `local` such that `self.compose(local) == world`.
    pub fn relative(&self, world: &Pose) -> Pose {
        let inv_rotation = self.rotation.inverse();
        let safe = |s: f64| if s.abs() < f64::EPSILON { 1.0 } else { s };
        let safe_scale = DVec3::new(safe(self.scale.x), safe(self.scale.y), safe(self.scale.z));
        Pose {
            position: (inv_rotation * (world.position - self.position)) / safe_scale,
            rotation: (inv_rotation * world.rotation).normalize(),
            scale: world.scale / safe_scale,
        }
    }

    /// Model matrix for this pose.
    pub fn matrix(&self) -> DMat4 {
        DMat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// Rigid part of the pose (scale ignored).
    pub fn rigid_matrix(&self) -> DMat4 {
        DMat4::from_rotation_translation(self.rotation, self.position)
    }

    /// Transform a point from this pose's frame into the parent frame.
    pub fn transform_point(&self, point: DVec3) -> DVec3 {
        self.position + self.rotation * (self.scale * point)
    }

    /// Camera forward axis (+X).
    pub fn forward(&self) -> DVec3 {
        self.rotation * DVec3::X
    }

    /// Camera left axis (+Y).
    pub fn left(&self) -> DVec3 {
        self.rotation * DVec3::Y
    }

    /// Camera up axis (+Z).
    pub fn up(&self) -> DVec3 {
        self.rotation * DVec3::Z
    }

    /// Rotate so that +X points from `position` toward `target`, keeping +Z as close to `up` as possible.
    pub fn look_at(position: DVec3, target: DVec3, up: DVec3) -> Pose {
        let forward = (target - position).normalize_or_zero();
        if forward == DVec3::ZERO {
            return Pose::from_position(position);
        }
        let mut left = up.cross(forward);
        if left.length_squared() < 1e-12 {
            left = DVec3::Z.cross(forward);
            if left.length_squared() < 1e-12 {
                left = DVec3::Y;
            }
        }
        let left = left.normalize();
        let up = forward.cross(left);
        Pose::new(
            position,
            DQuat::from_mat3(&DMat3::from_cols(forward, left, up)),
        )
    }

    /// Approximate equality used by tests and change detection.
    pub fn abs_diff_eq(&self, other: &Pose, tolerance: f64) -> bool {
        self.position.abs_diff_eq(other.position, tolerance)
            && self.scale.abs_diff_eq(other.scale, tolerance)
            && (self.rotation.dot(other.rotation).abs() - 1.0).abs() <= tolerance
    }
}

/// Linear RGBA colour.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

impl Color {
    pub const BLACK: Self = Self::rgb(0.0, 0.0, 0.0);
    pub const WHITE: Self = Self::rgb(1.0, 1.0, 1.0);
    pub const RED: Self = Self::rgb(1.0, 0.0, 0.0);
    pub const GREEN: Self = Self::rgb(0.0, 1.0, 0.0);
    pub const BLUE: Self = Self::rgb(0.0, 0.0, 1.0);
    pub const GRAY: Self = Self::rgb(0.5, 0.5, 0.5);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_vec3(self) -> Vec3 {
        Vec3::new(self.r, self.g, self.b)
    }

    pub fn from_vec3(v: Vec3) -> Self {
        Self::rgb(v.x, v.y, v.z)
    }

    /// Quantise to 8-bit RGB, clamping to `[0, 1]`.
    pub fn to_rgb8(self) -> [u8; 3] {
        let q = |c: f32| (c.clamp(0.0, 1.0) * 255.0 + 0.5) as u8;
        [q(self.r), q(self.g), q(self.b)]
    }

    pub fn from_rgb8(rgb: [u8; 3]) -> Self {
        Self::rgb(
            rgb[0] as f32 / 255.0,
            rgb[1] as f32 / 255.0,
            rgb[2] as f32 / 255.0,
        )
    }
}

/// Angle stored in radians.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Angle(f64);

impl Angle {
    pub const HALF_PI: Self = Self(std::f64::consts::FRAC_PI_2);
    pub const PI: Self = Self(std::f64::consts::PI);

    pub fn from_radians(radians: f64) -> Self {
        Self(radians)
    }

    pub fn from_degrees(degrees: f64) -> Self {
        Self(degrees.to_radians())
    }

    pub fn radians(self) -> f64 {
        self.0
    }

    pub fn degrees(self) -> f64 {
        self.0.to_degrees()
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl Aabb {
    pub const EMPTY: Self = Self {
        min: DVec3::splat(f64::INFINITY),
        max: DVec3::splat(f64::NEG_INFINITY),
    };

    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    pub fn from_center_half_size(center: DVec3, half_size: DVec3) -> Self {
        Self::new(center - half_size, center + half_size)
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn grow(&mut self, point: DVec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn merge(&self, other: &Aabb) -> Aabb {
        Aabb::new(self.min.min(other.min), self.max.max(other.max))
    }

    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> DVec3 {
        self.max - self.min
    }

    pub fn corners(&self) -> [DVec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            DVec3::new(a.x, a.y, a.z),
            DVec3::new(b.x, a.y, a.z),
            DVec3::new(a.x, b.y, a.z),
            DVec3::new(b.x, b.y, a.z),
            DVec3::new(a.x, a.y, b.z),
            DVec3::new(b.x, a.y, b.z),
            DVec3::new(a.x, b.y, b.z),
            DVec3::new(b.x, b.y, b.z),
        ]
    }

    /// Bounds of this box after transformation by `pose`.
    pub fn transformed(&self, pose: &Pose) -> Aabb {
        if self.is_empty() {
            return *self;
        }
        let mut out = Aabb::EMPTY;
        for corner in self.corners() {
            out.grow(pose.transform_point(corner));
        }
        out
    }

    pub fn contains(&self, point: DVec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }
}
