//! Wide-angle camera built from a six-face environment render.
//!
//! The scene is rendered once per cube face with a 90 degree square frustum,
//! then every output pixel is traced back through the [`CameraLens`] to a
//! direction and looked up in the matching face.

use std::f64::consts::{FRAC_PI_2, PI};

use glam::{DQuat, DVec3};

use crate::backend::{BackendResult, FrameSnapshot, RenderBackend, RenderTarget, ViewSetup};
use crate::camera::image::PixelFormat;
use crate::camera::lens::CameraLens;
use crate::math::Pose;

/// Rotations that turn the camera's +X axis onto each cube face:
/// +X, -X, +Y, -Y, +Z, -Z.
fn face_rotations() -> [DQuat; 6] {
    [
        DQuat::IDENTITY,
        DQuat::from_rotation_z(PI),
        DQuat::from_rotation_z(FRAC_PI_2),
        DQuat::from_rotation_z(-FRAC_PI_2),
        DQuat::from_rotation_y(-FRAC_PI_2),
        DQuat::from_rotation_y(FRAC_PI_2),
    ]
}

pub struct WideAngleCamera {
    lens: CameraLens,
    env_texture_size: u32,
    faces: Vec<RenderTarget>,
}

impl Default for WideAngleCamera {
    fn default() -> Self {
        Self {
            lens: CameraLens::default(),
            env_texture_size: 512,
            faces: Vec::new(),
        }
    }
}

impl WideAngleCamera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lens(&self) -> &CameraLens {
        &self.lens
    }

    pub fn lens_mut(&mut self) -> &mut CameraLens {
        &mut self.lens
    }

    pub fn set_lens(&mut self, lens: CameraLens) {
        self.lens = lens;
    }

    /// Edge length in pixels of each cube face.
    pub fn env_texture_size(&self) -> u32 {
        self.env_texture_size
    }

    pub fn set_env_texture_size(&mut self, size: u32) -> bool {
        if size == 0 {
            log::warn!("Ignoring zero environment texture size");
            return false;
        }
        self.env_texture_size = size;
        true
    }

    pub(crate) fn supports(format: PixelFormat) -> bool {
        matches!(
            format,
            PixelFormat::Rgb8 | PixelFormat::Bgr8 | PixelFormat::L8
        )
    }

    fn face_view(&self, view: &ViewSetup, rotation: DQuat) -> ViewSetup {
        let mut face = *view;
        face.pose = Pose::new(view.pose.position, view.pose.rotation * rotation);
        face.width = self.env_texture_size;
        face.height = self.env_texture_size;
        face.hfov = FRAC_PI_2;
        face.aspect = 1.0;
        face
    }

    /// Render the six faces and resample them into `target`.
    ///
    /// `target.depth` receives the distance along each pixel's ray.
    pub(crate) fn render(
        &mut self,
        backend: &mut dyn RenderBackend,
        frame: &FrameSnapshot,
        view: &ViewSetup,
        target: &mut RenderTarget,
    ) -> BackendResult<()> {
        let size = self.env_texture_size;
        let views = face_rotations().map(|rotation| self.face_view(view, rotation));
        self.faces.resize_with(6, || RenderTarget::new(size, size));
        for (face, face_view) in self.faces.iter_mut().zip(views.iter()) {
            face.resize(size, size);
            backend.render(frame, face_view, face)?;
        }
        log::trace!("wide-angle: rendered 6 faces at {size}x{size}");
        self.remap(frame, view, target);
        Ok(())
    }

    /// Camera-frame direction seen through output pixel `(x, y)`, or `None`
    /// beyond the lens cutoff.
    pub fn pixel_direction(&self, view: &ViewSetup, x: u32, y: u32) -> Option<DVec3> {
        let half_width = view.width as f64 * 0.5;
        let px = (x as f64 + 0.5 - half_width) / half_width;
        let py = (y as f64 + 0.5 - view.height as f64 * 0.5) / half_width;
        let theta = self.lens.angle(px.hypot(py), view.hfov);
        if !theta.is_finite() || theta > self.lens.cutoff_angle {
            return None;
        }
        let phi = py.atan2(px);
        Some(DVec3::new(
            theta.cos(),
            -theta.sin() * phi.cos(),
            -theta.sin() * phi.sin(),
        ))
    }

    fn remap(&self, frame: &FrameSnapshot, view: &ViewSetup, target: &mut RenderTarget) {
        target.clear(frame.background);
        if self.faces.len() != 6 {
            return;
        }
        let rotations = face_rotations();
        let size = self.env_texture_size;
        let face_view = ViewSetup::new(Pose::IDENTITY, size, size, FRAC_PI_2);
        let last = size.saturating_sub(1) as f64;

        for y in 0..target.height() {
            for x in 0..target.width() {
                let Some(dir) = self.pixel_direction(view, x, y) else {
                    continue;
                };
                let (index, rotation) = rotations
                    .iter()
                    .enumerate()
                    .map(|(i, r)| (i, *r))
                    .max_by(|a, b| {
                        let da = (a.1 * DVec3::X).dot(dir);
                        let db = (b.1 * DVec3::X).dot(dir);
                        da.total_cmp(&db)
                    })
                    .unwrap_or((0, DQuat::IDENTITY));
                let local = rotation.inverse() * dir;
                let Some((fx, fy, _)) = face_view.project_camera_point(local) else {
                    continue;
                };
                let face = &self.faces[index];
                let (fx, fy) = (fx.floor().clamp(0.0, last) as u32, fy.floor().clamp(0.0, last) as u32);

                let src = face.index(fx, fy);
                let dst = target.index(x, y);
                target.color[dst * 3..dst * 3 + 3].copy_from_slice(&face.color[src * 3..src * 3 + 3]);
                target.ids[dst] = face.ids[src];
                target.depth[dst] = (face.depth[src] as f64 / local.x) as f32;
            }
        }
    }

    /// Project a world point through the lens. Returns image coordinates and
    /// distance from the camera.
    pub fn project(&self, view: &ViewSetup, world: DVec3) -> Option<(f64, f64, f64)> {
        let cam = view.to_camera(world);
        let distance = cam.length();
        if distance <= f64::EPSILON {
            return None;
        }
        let theta = cam.y.hypot(cam.z).atan2(cam.x);
        if theta > self.lens.cutoff_angle {
            return None;
        }
        let r = self.lens.radius(theta, view.hfov);
        let phi = (-cam.z).atan2(-cam.y);
        let half_width = view.width as f64 * 0.5;
        Some((
            r * phi.cos() * half_width + half_width,
            r * phi.sin() * half_width + view.height as f64 * 0.5,
            distance,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendError;
    use crate::camera::lens::MappingFunctionType;
    use crate::math::Color;
    use crate::EngineConfig;

    /// Paints each face with a colour keyed on its forward axis.
    struct FaceColors;

    impl RenderBackend for FaceColors {
        fn name(&self) -> &'static str {
            "face-colors"
        }

        fn init(&mut self, _config: &EngineConfig) -> BackendResult<()> {
            Ok(())
        }

        fn is_initialized(&self) -> bool {
            true
        }

        fn render(
            &mut self,
            _frame: &FrameSnapshot,
            view: &ViewSetup,
            target: &mut RenderTarget,
        ) -> BackendResult<()> {
            let forward = view.pose.forward();
            let rgb = if forward.abs_diff_eq(DVec3::X, 1e-9) {
                [255, 0, 0]
            } else if forward.abs_diff_eq(DVec3::NEG_Y, 1e-9) {
                [0, 255, 0]
            } else if forward.abs_diff_eq(DVec3::Z, 1e-9) {
                [0, 0, 255]
            } else {
                [9, 9, 9]
            };
            if view.hfov != FRAC_PI_2 {
                return Err(BackendError::Unsupported("face hfov".into()));
            }
            for pixel in target.color.chunks_exact_mut(3) {
                pixel.copy_from_slice(&rgb);
            }
            target.depth.fill(2.0);
            Ok(())
        }
    }

    fn camera() -> WideAngleCamera {
        let mut camera = WideAngleCamera::new();
        camera.set_lens(CameraLens::new(MappingFunctionType::Equidistant));
        assert!(camera.set_env_texture_size(16));
        camera
    }

    #[test]
    fn test_faces_land_where_the_lens_points() {
        let mut camera = camera();
        let view = ViewSetup::new(Pose::IDENTITY, 32, 32, PI);
        let mut target = RenderTarget::new(32, 32);
        let frame = FrameSnapshot {
            background: Color::BLACK,
            ..Default::default()
        };
        camera
            .render(&mut FaceColors, &frame, &view, &mut target)
            .unwrap();

        assert_eq!(target.color_at(16, 16), [255, 0, 0]);
        // Right edge looks along -Y, top edge along +Z.
        assert_eq!(target.color_at(31, 16), [0, 255, 0]);
        assert_eq!(target.color_at(16, 0), [0, 0, 255]);
        // Corners lie beyond the 90 degree cutoff.
        assert_eq!(target.color_at(0, 0), [0, 0, 0]);
        assert!(target.depth_at(0, 0).is_infinite());
        assert!((target.depth_at(16, 16) - 2.0).abs() < 0.1);
    }

    #[test]
    fn test_project_inverts_pixel_direction() {
        let camera = camera();
        let view = ViewSetup::new(Pose::from_xyz(1.0, 0.0, 0.0), 64, 48, 2.5);
        let dir = camera.pixel_direction(&view, 50, 10).unwrap();
        let (x, y, distance) = camera.project(&view, view.pose.position + dir * 3.0).unwrap();
        assert!((x - 50.5).abs() < 1e-6);
        assert!((y - 10.5).abs() < 1e-6);
        assert!((distance - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_project_rejects_points_past_cutoff() {
        let camera = camera();
        let view = ViewSetup::new(Pose::IDENTITY, 64, 64, PI);
        assert!(camera.project(&view, DVec3::new(-1.0, 0.0, 0.0)).is_none());
        let (x, y, _) = camera.project(&view, DVec3::new(5.0, 0.0, 0.0)).unwrap();
        assert_eq!((x, y), (32.0, 32.0));
    }

    #[test]
    fn test_zero_env_size_rejected() {
        let mut camera = WideAngleCamera::new();
        assert!(!camera.set_env_texture_size(0));
        assert_eq!(camera.env_texture_size(), 512);
    }
}
