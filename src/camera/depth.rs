//! Depth camera post-processing.

use crate::backend::{RenderTarget, TargetOutputs, ViewSetup};
use crate::camera::connection::{Connection, Signal};
use crate::camera::image::PixelFormat;
use crate::camera::{FrameCallback, FrameView};

/// Depth and coloured point cloud output.
///
/// Depth is the distance along the camera's forward axis. Pixels closer than
/// the near plane get the min sentinel; misses and pixels beyond the far
/// plane get the max sentinel.
pub struct DepthCamera {
    min_sentinel: f32,
    max_sentinel: f32,
    depth: Vec<f32>,
    point_cloud: Vec<f32>,
    depth_frames: Signal<FrameCallback<f32>>,
    point_cloud_frames: Signal<FrameCallback<f32>>,
}

impl Default for DepthCamera {
    fn default() -> Self {
        Self {
            min_sentinel: f32::NEG_INFINITY,
            max_sentinel: f32::INFINITY,
            depth: Vec::new(),
            point_cloud: Vec::new(),
            depth_frames: Signal::new(),
            point_cloud_frames: Signal::new(),
        }
    }
}

impl DepthCamera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sentinels(&self) -> (f32, f32) {
        (self.min_sentinel, self.max_sentinel)
    }

    /// Values written for pixels outside `[near, far]`.
    pub fn set_sentinels(&mut self, min: f32, max: f32) {
        self.min_sentinel = min;
        self.max_sentinel = max;
    }

    /// Depth buffer of the last frame.
    pub fn depth_data(&self) -> &[f32] {
        &self.depth
    }

    /// XYZRGBA point cloud of the last frame; empty when nobody subscribed.
    pub fn point_cloud_data(&self) -> &[f32] {
        &self.point_cloud
    }

    pub fn connect_new_depth_frame(
        &self,
        callback: impl for<'a> FnMut(FrameView<'a, f32>) + 'static,
    ) -> Connection {
        self.depth_frames.connect(Box::new(callback))
    }

    /// Subscribe to the point cloud. The colour pass only runs while at least
    /// one subscriber is connected.
    pub fn connect_new_rgb_point_cloud(
        &self,
        callback: impl for<'a> FnMut(FrameView<'a, f32>) + 'static,
    ) -> Connection {
        self.point_cloud_frames.connect(Box::new(callback))
    }

    pub(crate) fn outputs(&self) -> TargetOutputs {
        TargetOutputs {
            color: self.point_cloud_frames.has_connections(),
            depth: true,
            ids: false,
        }
    }

    pub(crate) fn supports(format: PixelFormat) -> bool {
        format == PixelFormat::Float32
    }

    fn clamp(&self, depth: f32, view: &ViewSetup) -> f32 {
        if !depth.is_finite() || depth as f64 > view.far {
            self.max_sentinel
        } else if (depth as f64) < view.near {
            self.min_sentinel
        } else {
            depth
        }
    }

    pub(crate) fn process(&mut self, view: &ViewSetup, target: &RenderTarget) {
        let clamped: Vec<f32> = target.depth.iter().map(|d| self.clamp(*d, view)).collect();
        self.depth = clamped;

        let (width, height) = (view.width, view.height);
        self.depth_frames.emit_with(|cb| {
            cb(FrameView {
                data: &self.depth,
                width,
                height,
                channels: 1,
                format: PixelFormat::Float32,
            })
        });

        self.point_cloud.clear();
        if !self.point_cloud_frames.has_connections() {
            return;
        }
        self.point_cloud.reserve(self.depth.len() * 4);
        for y in 0..height {
            for x in 0..width {
                let index = target.index(x, y);
                let depth = self.depth[index];
                let [r, g, b] = target.color_at(x, y);
                let rgba = f32::from_bits(u32::from_le_bytes([r, g, b, 255]));
                if depth.is_finite() {
                    let ray = view.camera_ray(x as f64 + 0.5, y as f64 + 0.5) * depth as f64;
                    self.point_cloud
                        .extend_from_slice(&[ray.x as f32, ray.y as f32, ray.z as f32, rgba]);
                } else {
                    self.point_cloud
                        .extend_from_slice(&[depth, depth, depth, rgba]);
                }
            }
        }
        self.point_cloud_frames.emit_with(|cb| {
            cb(FrameView {
                data: &self.point_cloud,
                width,
                height,
                channels: 4,
                format: PixelFormat::Float32Rgba,
            })
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Pose;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn view() -> ViewSetup {
        let mut view = ViewSetup::new(Pose::IDENTITY, 3, 1, 1.0);
        view.near = 0.5;
        view.far = 10.0;
        view
    }

    #[test]
    fn test_out_of_range_values_are_pinned() {
        let mut camera = DepthCamera::new();
        let mut target = RenderTarget::new(3, 1);
        target.depth.copy_from_slice(&[0.1, 4.0, 20.0]);
        camera.process(&view(), &target);
        assert_eq!(
            camera.depth_data(),
            &[f32::NEG_INFINITY, 4.0, f32::INFINITY]
        );

        camera.set_sentinels(0.5, 10.0);
        camera.process(&view(), &target);
        assert_eq!(camera.depth_data(), &[0.5, 4.0, 10.0]);
    }

    #[test]
    fn test_point_cloud_only_with_subscriber() {
        let mut camera = DepthCamera::new();
        let mut target = RenderTarget::new(3, 1);
        target.depth.copy_from_slice(&[2.0, 2.0, 2.0]);
        target.color.fill(9);

        assert!(!camera.outputs().color);
        camera.process(&view(), &target);
        assert!(camera.point_cloud_data().is_empty());

        let received = Rc::new(RefCell::new(Vec::new()));
        let sink = received.clone();
        let _connection = camera.connect_new_rgb_point_cloud(move |frame: FrameView<f32>| {
            sink.borrow_mut().extend_from_slice(frame.data);
        });
        assert!(camera.outputs().color);
        camera.process(&view(), &target);

        let cloud = received.borrow();
        assert_eq!(cloud.len(), 12);
        // Centre pixel lies on the optical axis.
        assert!((cloud[4] - 2.0).abs() < 1e-6);
        assert!(cloud[5].abs() < 1e-6);
        assert_eq!(cloud[7].to_bits().to_le_bytes(), [9, 9, 9, 255]);
    }
}
