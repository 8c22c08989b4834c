//! Backend abstraction layer
//!
//! Every rendering backend implements [`RenderBackend`]. Backends receive an
//! already-extracted, world-space [`FrameSnapshot`] plus a [`ViewSetup`] and
//! fill a [`RenderTarget`]; they never see the scene graph itself.

pub mod extract;
pub mod null;
pub mod raytrace;
#[cfg(feature = "wgpu-backend")]
pub mod wgpu_backend;

use glam::{DMat4, DVec3};
use thiserror::Error;

use crate::math::{Color, Pose};
use crate::EngineConfig;

pub use extract::FrameSnapshot;

/// Backend error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("Failed to initialize backend: {0}")]
    InitializationFailed(String),
    #[error("Failed to create device: {0}")]
    DeviceCreationFailed(String),
    #[error("Failed to read back frame: {0}")]
    ReadbackFailed(String),
    #[error("Backend is not initialized")]
    NotInitialized,
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Capability interface implemented once per rendering backend.
pub trait RenderBackend {
    /// Short identifier, matches the name used to select the engine.
    fn name(&self) -> &'static str;

    /// Acquire the device context. Scenes can only initialize after this succeeded.
    fn init(&mut self, config: &EngineConfig) -> BackendResult<()>;

    fn is_initialized(&self) -> bool;

    /// Render `frame` as seen from `view` into `target`.
    ///
    /// The target is already sized to the view resolution.
    fn render(
        &mut self,
        frame: &FrameSnapshot,
        view: &ViewSetup,
        target: &mut RenderTarget,
    ) -> BackendResult<()>;
}

/// Auxiliary buffers a camera asks the backend to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetOutputs {
    /// Shaded colour. When false the colour buffer is left at the background.
    pub color: bool,
    pub depth: bool,
    pub ids: bool,
}

impl Default for TargetOutputs {
    fn default() -> Self {
        Self {
            color: true,
            depth: true,
            ids: true,
        }
    }
}

/// Camera parameters for one render pass.
///
/// Camera frame convention: +X forward, +Y left, +Z up. Image x grows to the
/// right (-Y) and image y grows downward (-Z).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewSetup {
    /// World pose of the camera; scale is ignored.
    pub pose: Pose,
    pub width: u32,
    pub height: u32,
    /// Horizontal field of view in radians.
    pub hfov: f64,
    /// Width over height of the image plane.
    pub aspect: f64,
    pub near: f64,
    pub far: f64,
    /// Rays per pixel for backends that supersample.
    pub samples: u32,
    pub outputs: TargetOutputs,
}

impl ViewSetup {
    pub fn new(pose: Pose, width: u32, height: u32, hfov: f64) -> Self {
        Self {
            pose,
            width,
            height,
            hfov,
            aspect: if height == 0 {
                1.0
            } else {
                width as f64 / height as f64
            },
            near: 0.01,
            far: 1000.0,
            samples: 1,
            outputs: TargetOutputs::default(),
        }
    }

    fn tan_half_hfov(&self) -> f64 {
        (self.hfov * 0.5).tan()
    }

    fn tan_half_vfov(&self) -> f64 {
        self.tan_half_hfov() / self.aspect.max(f64::EPSILON)
    }

    /// Vertical field of view derived from HFOV and aspect ratio.
    pub fn vfov(&self) -> f64 {
        2.0 * self.tan_half_vfov().atan()
    }

    /// Direction in camera space through the image point `(x, y)` (pixels, may be fractional).
    pub fn camera_ray(&self, x: f64, y: f64) -> DVec3 {
        let ndc_x = 2.0 * x / self.width.max(1) as f64 - 1.0;
        let ndc_y = 1.0 - 2.0 * y / self.height.max(1) as f64;
        DVec3::new(
            1.0,
            -ndc_x * self.tan_half_hfov(),
            ndc_y * self.tan_half_vfov(),
        )
    }

    /// World-space unit direction through the image point `(x, y)`.
    pub fn world_ray(&self, x: f64, y: f64) -> DVec3 {
        (self.pose.rotation * self.camera_ray(x, y)).normalize()
    }

    /// Project a camera-space point. Returns image coordinates and depth along +X.
    pub fn project_camera_point(&self, point: DVec3) -> Option<(f64, f64, f64)> {
        if point.x <= f64::EPSILON {
            return None;
        }
        let ndc_x = -point.y / (point.x * self.tan_half_hfov());
        let ndc_y = point.z / (point.x * self.tan_half_vfov());
        let x = (ndc_x + 1.0) * 0.5 * self.width as f64;
        let y = (1.0 - ndc_y) * 0.5 * self.height as f64;
        Some((x, y, point.x))
    }

    /// Transform a world point into the camera frame.
    pub fn to_camera(&self, world: DVec3) -> DVec3 {
        self.pose.rotation.inverse() * (world - self.pose.position)
    }

    /// Project a world point. Returns image coordinates and depth along +X.
    pub fn project(&self, world: DVec3) -> Option<(f64, f64, f64)> {
        self.project_camera_point(self.to_camera(world))
    }

    /// World-to-camera matrix.
    pub fn view_matrix(&self) -> DMat4 {
        self.pose.rigid_matrix().inverse()
    }

    /// Right-handed perspective projection for the camera frame remapped to a
    /// -Z forward, +Y up clip convention, depth range `[0, 1]`.
    pub fn projection_matrix(&self) -> DMat4 {
        let axes = DMat4::from_cols(
            glam::DVec4::new(0.0, 0.0, -1.0, 0.0),
            glam::DVec4::new(-1.0, 0.0, 0.0, 0.0),
            glam::DVec4::new(0.0, 1.0, 0.0, 0.0),
            glam::DVec4::W,
        );
        DMat4::perspective_rh(self.vfov(), self.aspect, self.near, self.far) * axes
    }
}

/// Frame buffers written by a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTarget {
    width: u32,
    height: u32,
    /// Tightly packed RGB8.
    pub color: Vec<u8>,
    /// Distance along the camera forward axis; `+inf` where nothing was hit.
    pub depth: Vec<f32>,
    /// Visual id per pixel; 0 is background.
    pub ids: Vec<u32>,
}

impl RenderTarget {
    pub fn new(width: u32, height: u32) -> Self {
        let count = (width as usize) * (height as usize);
        Self {
            width,
            height,
            color: vec![0; count * 3],
            depth: vec![f32::INFINITY; count],
            ids: vec![0; count],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// Reallocate if the resolution changed. Returns true when it did.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        if self.width == width && self.height == height {
            return false;
        }
        *self = Self::new(width, height);
        true
    }

    /// Reset every pixel to the background.
    pub fn clear(&mut self, background: Color) {
        let rgb = background.to_rgb8();
        for pixel in self.color.chunks_exact_mut(3) {
            pixel.copy_from_slice(&rgb);
        }
        self.depth.fill(f32::INFINITY);
        self.ids.fill(0);
    }

    pub fn color_at(&self, x: u32, y: u32) -> [u8; 3] {
        let i = self.index(x, y) * 3;
        [self.color[i], self.color[i + 1], self.color[i + 2]]
    }

    pub fn depth_at(&self, x: u32, y: u32) -> f32 {
        self.depth[self.index(x, y)]
    }

    pub fn id_at(&self, x: u32, y: u32) -> u32 {
        self.ids[self.index(x, y)]
    }

    #[inline]
    pub fn index(&self, x: u32, y: u32) -> usize {
        (y as usize) * (self.width as usize) + x as usize
    }
}

/// Instantiate a backend by its registered name.
pub fn create_backend(name: &str) -> Option<Box<dyn RenderBackend>> {
    match name {
        "null" => Some(Box::new(null::NullBackend::new())),
        "raytrace" => Some(Box::new(raytrace::RayTraceBackend::new())),
        #[cfg(feature = "wgpu-backend")]
        "wgpu" => Some(Box::new(wgpu_backend::WgpuBackend::new())),
        _ => None,
    }
}

/// Names accepted by [`create_backend`].
pub fn backend_names() -> &'static [&'static str] {
    #[cfg(feature = "wgpu-backend")]
    {
        &["null", "raytrace", "wgpu"]
    }
    #[cfg(not(feature = "wgpu-backend"))]
    {
        &["null", "raytrace"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_ray_points_forward() {
        let view = ViewSetup::new(Pose::IDENTITY, 64, 48, std::f64::consts::FRAC_PI_2);
        let ray = view.world_ray(32.0, 24.0);
        assert!(ray.abs_diff_eq(DVec3::X, 1e-12));
    }

    #[test]
    fn test_image_axes_follow_camera_convention() {
        let view = ViewSetup::new(Pose::IDENTITY, 64, 64, std::f64::consts::FRAC_PI_2);
        // Right half of the image looks toward -Y, top half toward +Z.
        let right = view.camera_ray(60.0, 32.0);
        assert!(right.y < 0.0);
        let top = view.camera_ray(32.0, 4.0);
        assert!(top.z > 0.0);
    }

    #[test]
    fn test_project_inverts_ray() {
        let view = ViewSetup::new(
            Pose::from_xyz(1.0, 2.0, 0.5),
            320,
            240,
            1.2,
        );
        let dir = view.world_ray(100.0, 50.0);
        let point = view.pose.position + dir * 7.0;
        let (x, y, depth) = view.project(point).unwrap();
        assert!((x - 100.0).abs() < 1e-6);
        assert!((y - 50.0).abs() < 1e-6);
        assert!(depth > 0.0);
    }

    #[test]
    fn test_points_behind_do_not_project() {
        let view = ViewSetup::new(Pose::IDENTITY, 32, 32, 1.0);
        assert!(view.project(DVec3::new(-1.0, 0.0, 0.0)).is_none());
    }

    #[test]
    fn test_vfov_square_image_matches_hfov() {
        let view = ViewSetup::new(Pose::IDENTITY, 32, 32, 1.0);
        assert!((view.vfov() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_target_clear_and_resize() {
        let mut target = RenderTarget::new(2, 2);
        target.ids[0] = 7;
        target.clear(Color::RED);
        assert_eq!(target.color_at(1, 1), [255, 0, 0]);
        assert_eq!(target.id_at(0, 0), 0);
        assert!(target.depth_at(0, 0).is_infinite());
        assert!(target.resize(4, 3));
        assert_eq!(target.pixel_count(), 12);
        assert!(!target.resize(4, 3));
    }

    #[test]
    fn test_create_backend_by_name() {
        assert_eq!(create_backend("null").unwrap().name(), "null");
        assert_eq!(create_backend("raytrace").unwrap().name(), "raytrace");
        assert!(create_backend("ogre").is_none());
    }
}
