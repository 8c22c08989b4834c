//! Cameras and sensor post-processing.
//!
//! A [`Camera`] holds the state every camera shares (resolution, format,
//! field of view, clip planes) and a [`CameraKind`] chosen at creation that
//! decides which buffers the backend produces and how they are turned into
//! the output image and sensor events.

pub mod bounding_box;
pub mod connection;
pub mod depth;
pub mod image;
pub mod lens;
pub mod segmentation;
pub mod thermal;
pub mod wide_angle;

use glam::{DMat4, DVec3};

use crate::backend::{FrameSnapshot, RenderBackend, RenderTarget, TargetOutputs, ViewSetup};
use crate::error::RenderResult;
use crate::math::{Angle, Color, Pose};

pub use bounding_box::{draw_bounding_box, BoundingBox, BoundingBoxCamera, BoundingBoxType};
pub use connection::{Connection, Signal};
pub use depth::DepthCamera;
pub use image::{Image, PixelFormat};
pub use lens::{AngleFunctionType, CameraLens, MappingFunctionType};
pub use segmentation::{SegmentationCamera, SegmentationType};
pub use thermal::{thermal_to_grayscale, ThermalCamera};
pub use wide_angle::WideAngleCamera;

/// One frame handed to a subscriber. Only valid for the duration of the call.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a, T> {
    pub data: &'a [T],
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub format: PixelFormat,
}

impl<'a, T> FrameView<'a, T> {
    /// Format string of the payload, e.g. `"FLOAT32"`.
    pub fn format_str(&self) -> &'static str {
        self.format.as_str()
    }
}

/// Callback type shared by every frame event.
pub type FrameCallback<T> = dyn for<'a> FnMut(FrameView<'a, T>);

/// Sensor behaviour layered over the common capture flow.
pub enum CameraKind {
    Plain,
    Depth(DepthCamera),
    Thermal(ThermalCamera),
    Segmentation(SegmentationCamera),
    BoundingBox(BoundingBoxCamera),
    WideAngle(WideAngleCamera),
}

impl CameraKind {
    pub fn name(&self) -> &'static str {
        match self {
            CameraKind::Plain => "camera",
            CameraKind::Depth(_) => "depth_camera",
            CameraKind::Thermal(_) => "thermal_camera",
            CameraKind::Segmentation(_) => "segmentation_camera",
            CameraKind::BoundingBox(_) => "bounding_box_camera",
            CameraKind::WideAngle(_) => "wide_angle_camera",
        }
    }

    fn default_format(&self) -> PixelFormat {
        match self {
            CameraKind::Depth(_) => PixelFormat::Float32,
            CameraKind::Thermal(_) => PixelFormat::L16,
            _ => PixelFormat::Rgb8,
        }
    }

    fn supports(&self, format: PixelFormat) -> bool {
        match self {
            CameraKind::Plain => matches!(
                format,
                PixelFormat::Rgb8 | PixelFormat::Bgr8 | PixelFormat::L8
            ),
            CameraKind::Depth(_) => DepthCamera::supports(format),
            CameraKind::Thermal(_) => ThermalCamera::supports(format),
            CameraKind::Segmentation(_) => SegmentationCamera::supports(format),
            CameraKind::BoundingBox(_) => BoundingBoxCamera::supports(format),
            CameraKind::WideAngle(_) => WideAngleCamera::supports(format),
        }
    }

    fn outputs(&self) -> TargetOutputs {
        match self {
            CameraKind::Plain | CameraKind::WideAngle(_) => TargetOutputs {
                color: true,
                depth: false,
                ids: false,
            },
            CameraKind::Depth(depth) => depth.outputs(),
            CameraKind::Thermal(_) => ThermalCamera::outputs(),
            CameraKind::Segmentation(_) => SegmentationCamera::outputs(),
            CameraKind::BoundingBox(_) => BoundingBoxCamera::outputs(),
        }
    }

    fn max_hfov(&self) -> f64 {
        match self {
            CameraKind::WideAngle(_) => std::f64::consts::TAU,
            _ => std::f64::consts::PI,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraState {
    /// No buffers allocated.
    Uninitialized,
    /// Buffers allocated; captures run synchronously from here.
    Ready,
}

pub struct Camera {
    image_width: u32,
    image_height: u32,
    format: PixelFormat,
    hfov: Angle,
    aspect: Option<f64>,
    near: f64,
    far: f64,
    anti_aliasing: u32,
    kind: CameraKind,
    state: CameraState,
    target: RenderTarget,
    output: Image,
    image_frames: Signal<FrameCallback<u8>>,
    frame_count: u64,
}

impl Camera {
    pub fn new(kind: CameraKind) -> Self {
        let mut camera = Self {
            image_width: 1,
            image_height: 1,
            format: PixelFormat::Rgb8,
            hfov: Angle::from_degrees(80.0),
            aspect: None,
            near: 0.01,
            far: 1000.0,
            anti_aliasing: 0,
            kind,
            state: CameraState::Uninitialized,
            target: RenderTarget::new(0, 0),
            output: Image::default(),
            image_frames: Signal::new(),
            frame_count: 0,
        };
        camera.reset();
        camera
    }

    pub fn plain() -> Self {
        Self::new(CameraKind::Plain)
    }

    /// Restore defaults: 1x1, the kind's native format, 80 degree HFOV, aspect 1.
    pub fn reset(&mut self) {
        self.image_width = 1;
        self.image_height = 1;
        self.format = self.kind.default_format();
        self.hfov = Angle::from_degrees(80.0);
        self.aspect = None;
        self.near = 0.01;
        self.far = 1000.0;
        self.anti_aliasing = 0;
    }

    pub fn kind(&self) -> &CameraKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut CameraKind {
        &mut self.kind
    }

    pub fn as_depth(&self) -> Option<&DepthCamera> {
        match &self.kind {
            CameraKind::Depth(depth) => Some(depth),
            _ => None,
        }
    }

    pub fn as_depth_mut(&mut self) -> Option<&mut DepthCamera> {
        match &mut self.kind {
            CameraKind::Depth(depth) => Some(depth),
            _ => None,
        }
    }

    pub fn as_thermal(&self) -> Option<&ThermalCamera> {
        match &self.kind {
            CameraKind::Thermal(thermal) => Some(thermal),
            _ => None,
        }
    }

    pub fn as_thermal_mut(&mut self) -> Option<&mut ThermalCamera> {
        match &mut self.kind {
            CameraKind::Thermal(thermal) => Some(thermal),
            _ => None,
        }
    }

    pub fn as_segmentation(&self) -> Option<&SegmentationCamera> {
        match &self.kind {
            CameraKind::Segmentation(segmentation) => Some(segmentation),
            _ => None,
        }
    }

    pub fn as_segmentation_mut(&mut self) -> Option<&mut SegmentationCamera> {
        match &mut self.kind {
            CameraKind::Segmentation(segmentation) => Some(segmentation),
            _ => None,
        }
    }

    pub fn as_bounding_box(&self) -> Option<&BoundingBoxCamera> {
        match &self.kind {
            CameraKind::BoundingBox(bbox) => Some(bbox),
            _ => None,
        }
    }

    pub fn as_bounding_box_mut(&mut self) -> Option<&mut BoundingBoxCamera> {
        match &mut self.kind {
            CameraKind::BoundingBox(bbox) => Some(bbox),
            _ => None,
        }
    }

    pub fn as_wide_angle(&self) -> Option<&WideAngleCamera> {
        match &self.kind {
            CameraKind::WideAngle(wide) => Some(wide),
            _ => None,
        }
    }

    pub fn as_wide_angle_mut(&mut self) -> Option<&mut WideAngleCamera> {
        match &mut self.kind {
            CameraKind::WideAngle(wide) => Some(wide),
            _ => None,
        }
    }

    pub fn state(&self) -> CameraState {
        self.state
    }

    pub fn image_width(&self) -> u32 {
        self.image_width
    }

    pub fn image_height(&self) -> u32 {
        self.image_height
    }

    pub fn set_image_width(&mut self, width: u32) -> bool {
        if width == 0 {
            log::warn!("Ignoring zero image width");
            return false;
        }
        self.image_width = width;
        true
    }

    pub fn set_image_height(&mut self, height: u32) -> bool {
        if height == 0 {
            log::warn!("Ignoring zero image height");
            return false;
        }
        self.image_height = height;
        true
    }

    pub fn image_format(&self) -> PixelFormat {
        self.format
    }

    /// Rejected when the camera kind cannot produce `format`.
    pub fn set_image_format(&mut self, format: PixelFormat) -> bool {
        if !self.kind.supports(format) {
            log::warn!(
                "{} does not support pixel format {}",
                self.kind.name(),
                format.as_str()
            );
            return false;
        }
        self.format = format;
        true
    }

    pub fn hfov(&self) -> Angle {
        self.hfov
    }

    pub fn set_hfov(&mut self, hfov: Angle) -> bool {
        let radians = hfov.radians();
        if !(radians > 0.0 && radians < self.kind.max_hfov()) {
            log::warn!("Ignoring degenerate HFOV of {} degrees", hfov.degrees());
            return false;
        }
        self.hfov = hfov;
        true
    }

    /// Vertical field of view implied by HFOV and aspect ratio.
    pub fn vfov(&self) -> Angle {
        Angle::from_radians(self.view_setup(Pose::IDENTITY).vfov())
    }

    /// Explicit aspect ratio, or width over height when none was set.
    pub fn aspect_ratio(&self) -> f64 {
        self.aspect
            .unwrap_or(self.image_width as f64 / self.image_height.max(1) as f64)
    }

    pub fn set_aspect_ratio(&mut self, aspect: f64) -> bool {
        if !(aspect > 0.0 && aspect.is_finite()) {
            log::warn!("Ignoring invalid aspect ratio {aspect}");
            return false;
        }
        self.aspect = Some(aspect);
        true
    }

    pub fn near_clip_plane(&self) -> f64 {
        self.near
    }

    pub fn far_clip_plane(&self) -> f64 {
        self.far
    }

    pub fn set_near_clip_plane(&mut self, near: f64) -> bool {
        if !(near > 0.0 && near < self.far) {
            log::warn!("Ignoring near clip {near} (far is {})", self.far);
            return false;
        }
        self.near = near;
        true
    }

    pub fn set_far_clip_plane(&mut self, far: f64) -> bool {
        if !(far > self.near) {
            log::warn!("Ignoring far clip {far} (near is {})", self.near);
            return false;
        }
        self.far = far;
        true
    }

    /// Extra rays per pixel for anti-aliasing; 0 disables it.
    pub fn anti_aliasing(&self) -> u32 {
        self.anti_aliasing
    }

    pub fn set_anti_aliasing(&mut self, samples: u32) {
        self.anti_aliasing = samples;
    }

    /// Frames rendered since creation.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Image sized for the current resolution and format.
    pub fn create_image(&self) -> Image {
        Image::new(self.image_width, self.image_height, self.format)
    }

    /// Output of the last frame in the camera's pixel format.
    pub fn last_image(&self) -> &Image {
        &self.output
    }

    pub fn connect_new_image_frame(
        &self,
        callback: impl for<'a> FnMut(FrameView<'a, u8>) + 'static,
    ) -> Connection {
        self.image_frames.connect(Box::new(callback))
    }

    /// Render parameters for a camera placed at `pose`.
    pub fn view_setup(&self, pose: Pose) -> ViewSetup {
        let mut view = ViewSetup::new(
            Pose::new(pose.position, pose.rotation),
            self.image_width,
            self.image_height,
            self.hfov.radians(),
        );
        view.aspect = self.aspect_ratio();
        view.near = self.near;
        view.far = self.far;
        view.samples = self.anti_aliasing.max(1);
        view.outputs = self.kind.outputs();
        view
    }

    pub fn projection_matrix(&self) -> DMat4 {
        self.view_setup(Pose::IDENTITY).projection_matrix()
    }

    pub fn view_matrix(&self, pose: Pose) -> DMat4 {
        self.view_setup(pose).view_matrix()
    }

    /// Image coordinates and depth of a world point seen from `pose`.
    pub fn project(&self, pose: Pose, world: DVec3) -> Option<(f64, f64, f64)> {
        let view = self.view_setup(pose);
        match &self.kind {
            CameraKind::WideAngle(wide) => wide.project(&view, world),
            _ => view.project(world),
        }
    }

    /// Allocate the render target and output image.
    pub fn init(&mut self) {
        self.target = RenderTarget::new(self.image_width, self.image_height);
        self.output = self.create_image();
        self.state = CameraState::Ready;
    }

    /// Release frame buffers. The camera re-initializes on the next render.
    pub fn destroy(&mut self) {
        self.target = RenderTarget::new(0, 0);
        self.output = Image::default();
        self.state = CameraState::Uninitialized;
    }

    /// Render one frame, run the kind's post-processing and notify subscribers.
    pub fn render(
        &mut self,
        backend: &mut dyn RenderBackend,
        frame: &FrameSnapshot,
        pose: Pose,
    ) -> RenderResult<()> {
        if self.state == CameraState::Uninitialized {
            self.init();
        }
        let view = self.view_setup(pose);
        self.target.resize(view.width, view.height);
        log::trace!(
            "{}: rendering {}x{} frame {}",
            self.kind.name(),
            view.width,
            view.height,
            self.frame_count
        );

        match &mut self.kind {
            CameraKind::WideAngle(wide) => wide.render(backend, frame, &view, &mut self.target)?,
            _ => backend.render(frame, &view, &mut self.target)?,
        }

        match &mut self.kind {
            CameraKind::Plain | CameraKind::WideAngle(_) => {}
            CameraKind::Depth(depth) => depth.process(&view, &self.target),
            CameraKind::Thermal(thermal) => thermal.process(frame, &view, &self.target),
            CameraKind::Segmentation(segmentation) => {
                segmentation.process(frame, &view, &self.target)
            }
            CameraKind::BoundingBox(bbox) => bbox.process(frame, &view, &self.target),
        }

        self.output = self.convert_output();
        self.frame_count += 1;

        let output = &self.output;
        self.image_frames.emit_with(|cb| {
            cb(FrameView {
                data: output.data(),
                width: output.width(),
                height: output.height(),
                channels: output.format().channels(),
                format: output.format(),
            })
        });
        Ok(())
    }

    /// Copy the last frame into `image`, reshaping it if needed.
    pub fn copy_to(&self, image: &mut Image) {
        if image.width() != self.output.width()
            || image.height() != self.output.height()
            || image.format() != self.output.format()
        {
            log::debug!(
                "Capture image reshaped to {}x{} {}",
                self.output.width(),
                self.output.height(),
                self.output.format().as_str()
            );
        }
        image.clone_from(&self.output);
    }

    /// Image of the camera's shape filled with `background`. Used when
    /// nothing can be rendered.
    pub fn background_image(&self, background: Color) -> Image {
        let mut image = self.create_image();
        let rgb = background.to_rgb8();
        match self.format {
            PixelFormat::Rgb8 => fill_pixels(&mut image, &rgb),
            PixelFormat::Bgr8 => fill_pixels(&mut image, &[rgb[2], rgb[1], rgb[0]]),
            PixelFormat::L8 => fill_pixels(&mut image, &[luminance(rgb)]),
            _ => {}
        }
        image
    }

    fn convert_output(&self) -> Image {
        let (width, height) = (self.target.width(), self.target.height());
        match &self.kind {
            CameraKind::Depth(depth) => {
                Image::from_pixels(width, height, PixelFormat::Float32, depth.depth_data())
            }
            CameraKind::Thermal(thermal) => match self.format {
                PixelFormat::L16 => {
                    Image::from_pixels(width, height, PixelFormat::L16, thermal.thermal_data())
                }
                PixelFormat::L8 => Image::from_pixels(
                    width,
                    height,
                    PixelFormat::L8,
                    &thermal_to_grayscale(thermal.thermal_data()),
                ),
                format => {
                    let gray: Vec<u8> = thermal_to_grayscale(thermal.thermal_data())
                        .into_iter()
                        .flat_map(|g| [g, g, g])
                        .collect();
                    Image::from_pixels(width, height, format, &gray)
                }
            },
            CameraKind::Segmentation(segmentation) => Image::from_pixels(
                width,
                height,
                PixelFormat::Rgb8,
                segmentation.segmentation_data(),
            ),
            _ => color_image(&self.target, self.format),
        }
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::plain()
    }
}

fn luminance(rgb: [u8; 3]) -> u8 {
    (0.299 * rgb[0] as f64 + 0.587 * rgb[1] as f64 + 0.114 * rgb[2] as f64).round() as u8
}

fn fill_pixels(image: &mut Image, pixel: &[u8]) {
    for chunk in image.data_mut().chunks_exact_mut(pixel.len()) {
        chunk.copy_from_slice(pixel);
    }
}

fn color_image(target: &RenderTarget, format: PixelFormat) -> Image {
    let (width, height) = (target.width(), target.height());
    match format {
        PixelFormat::Bgr8 => {
            let bgr: Vec<u8> = target
                .color
                .chunks_exact(3)
                .flat_map(|p| [p[2], p[1], p[0]])
                .collect();
            Image::from_pixels(width, height, format, &bgr)
        }
        PixelFormat::L8 => {
            let gray: Vec<u8> = target
                .color
                .chunks_exact(3)
                .map(|p| luminance([p[0], p[1], p[2]]))
                .collect();
            Image::from_pixels(width, height, format, &gray)
        }
        _ => Image::from_pixels(width, height, PixelFormat::Rgb8, &target.color),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::null::NullBackend;
    use crate::EngineConfig;
    use std::cell::Cell;
    use std::rc::Rc;

    fn backend() -> NullBackend {
        let mut backend = NullBackend::new();
        backend.init(&EngineConfig::default()).unwrap();
        backend
    }

    #[test]
    fn test_reset_defaults() {
        let camera = Camera::plain();
        assert_eq!((camera.image_width(), camera.image_height()), (1, 1));
        assert_eq!(camera.image_format(), PixelFormat::Rgb8);
        assert!((camera.hfov().degrees() - 80.0).abs() < 1e-9);
        assert_eq!(camera.aspect_ratio(), 1.0);
        assert_eq!(camera.state(), CameraState::Uninitialized);

        let depth = Camera::new(CameraKind::Depth(DepthCamera::new()));
        assert_eq!(depth.image_format(), PixelFormat::Float32);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let mut camera = Camera::plain();
        assert!(!camera.set_image_width(0));
        assert!(!camera.set_hfov(Angle::from_radians(0.0)));
        assert!(!camera.set_hfov(Angle::PI));
        assert!(!camera.set_image_format(PixelFormat::Float32));
        assert!(!camera.set_aspect_ratio(-1.0));
        assert!(!camera.set_near_clip_plane(2000.0));
        assert_eq!(camera.image_width(), 1);
        assert!(camera.set_image_format(PixelFormat::Bgr8));

        let mut wide = Camera::new(CameraKind::WideAngle(WideAngleCamera::new()));
        assert!(wide.set_hfov(Angle::PI));
    }

    #[test]
    fn test_render_fills_output_and_notifies() {
        let mut camera = Camera::plain();
        camera.set_image_width(4);
        camera.set_image_height(2);
        let frames = Rc::new(Cell::new(0));
        let counter = frames.clone();
        let _connection = camera.connect_new_image_frame(move |frame: FrameView<u8>| {
            assert_eq!(frame.data.len(), 4 * 2 * 3);
            assert_eq!(frame.format_str(), "R8G8B8");
            counter.set(counter.get() + 1);
        });

        let snapshot = FrameSnapshot {
            background: Color::BLUE,
            ..Default::default()
        };
        camera.render(&mut backend(), &snapshot, Pose::IDENTITY).unwrap();
        assert_eq!(frames.get(), 1);
        assert_eq!(camera.state(), CameraState::Ready);

        let mut image = camera.create_image();
        camera.copy_to(&mut image);
        assert_eq!(image.pixel(3, 1), &[0, 0, 255]);
    }

    #[test]
    fn test_l8_output_is_single_channel() {
        let mut camera = Camera::plain();
        camera.set_image_width(3);
        assert!(camera.set_image_format(PixelFormat::L8));
        let snapshot = FrameSnapshot {
            background: Color::WHITE,
            ..Default::default()
        };
        camera.render(&mut backend(), &snapshot, Pose::IDENTITY).unwrap();
        assert_eq!(camera.last_image().data(), &[255, 255, 255]);
    }

    #[test]
    fn test_background_image_matches_shape() {
        let mut camera = Camera::plain();
        camera.set_image_width(2);
        camera.set_image_format(PixelFormat::Bgr8);
        let image = camera.background_image(Color::RED);
        assert_eq!(image.data(), &[0, 0, 255, 0, 0, 255]);
    }

    #[test]
    fn test_project_center() {
        let mut camera = Camera::plain();
        camera.set_image_width(64);
        camera.set_image_height(64);
        let (x, y, depth) = camera
            .project(Pose::IDENTITY, DVec3::new(5.0, 0.0, 0.0))
            .unwrap();
        assert_eq!((x, y, depth), (32.0, 32.0, 5.0));
    }
}
