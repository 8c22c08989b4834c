//! Bounding box annotations for labelled visuals.

use std::collections::BTreeMap;

use glam::{DQuat, DVec3};

use crate::backend::{FrameSnapshot, RenderTarget, TargetOutputs, ViewSetup};
use crate::camera::connection::{Connection, Signal};
use crate::camera::image::{Image, PixelFormat};
use crate::math::Pose;
use crate::scene::object::ObjectId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoundingBoxType {
    /// Pixel extent of the visible part of the object.
    #[default]
    VisibleBox2D,
    /// Projection of the full object, including occluded parts.
    FullBox2D,
    /// Oriented box in the camera frame.
    Box3D,
}

/// One annotation.
///
/// 2D boxes use image pixels: `center = (x, y, 0)` and `size = (w, h, 0)`.
/// 3D boxes use metres in the camera frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub box_type: BoundingBoxType,
    pub label: u32,
    pub center: DVec3,
    pub size: DVec3,
    pub orientation: DQuat,
}

pub type BoundingBoxCallback = dyn FnMut(&[BoundingBox]);

#[derive(Default)]
pub struct BoundingBoxCamera {
    box_type: BoundingBoxType,
    boxes: Vec<BoundingBox>,
    frames: Signal<BoundingBoxCallback>,
}

struct PixelExtent {
    label: i64,
    min: (u32, u32),
    max: (u32, u32),
}

impl BoundingBoxCamera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn box_type(&self) -> BoundingBoxType {
        self.box_type
    }

    pub fn set_box_type(&mut self, box_type: BoundingBoxType) {
        self.box_type = box_type;
    }

    /// Boxes of the last frame, ordered by visual id.
    pub fn bounding_boxes(&self) -> &[BoundingBox] {
        &self.boxes
    }

    pub fn connect_new_bounding_boxes(
        &self,
        callback: impl FnMut(&[BoundingBox]) + 'static,
    ) -> Connection {
        self.frames.connect(Box::new(callback))
    }

    pub(crate) fn outputs() -> TargetOutputs {
        TargetOutputs {
            color: true,
            depth: false,
            ids: true,
        }
    }

    pub(crate) fn supports(format: PixelFormat) -> bool {
        matches!(format, PixelFormat::Rgb8 | PixelFormat::Bgr8)
    }

    pub(crate) fn process(&mut self, frame: &FrameSnapshot, view: &ViewSetup, target: &RenderTarget) {
        let mut visible: BTreeMap<ObjectId, PixelExtent> = BTreeMap::new();
        for y in 0..target.height() {
            for x in 0..target.width() {
                let Some((owner, label)) = frame.label_owner(ObjectId(target.id_at(x, y))) else {
                    continue;
                };
                let extent = visible.entry(owner).or_insert(PixelExtent {
                    label,
                    min: (x, y),
                    max: (x, y),
                });
                extent.min = (extent.min.0.min(x), extent.min.1.min(y));
                extent.max = (extent.max.0.max(x), extent.max.1.max(y));
            }
        }

        let mut boxes = Vec::with_capacity(visible.len());
        for (owner, extent) in visible {
            let label = extent.label.clamp(0, u32::MAX as i64) as u32;
            let bbox = match self.box_type {
                BoundingBoxType::VisibleBox2D => Some(box_2d(
                    self.box_type,
                    label,
                    (extent.min.0 as f64, extent.min.1 as f64),
                    ((extent.max.0 + 1) as f64, (extent.max.1 + 1) as f64),
                )),
                BoundingBoxType::FullBox2D => full_box_2d(frame, view, owner, label),
                BoundingBoxType::Box3D => box_3d(frame, view, owner, label),
            };
            boxes.extend(bbox);
        }
        self.boxes = boxes;
        self.frames.emit_with(|cb| cb(&self.boxes));
    }
}

fn box_2d(box_type: BoundingBoxType, label: u32, min: (f64, f64), max: (f64, f64)) -> BoundingBox {
    BoundingBox {
        box_type,
        label,
        center: DVec3::new((min.0 + max.0) * 0.5, (min.1 + max.1) * 0.5, 0.0),
        size: DVec3::new(max.0 - min.0, max.1 - min.1, 0.0),
        orientation: DQuat::IDENTITY,
    }
}

/// Rigid frame of a labelled visual.
fn owner_frame(frame: &FrameSnapshot, owner: ObjectId) -> Option<Pose> {
    let world = frame.visuals.get(&owner)?.world;
    Some(Pose::new(world.position, world.rotation))
}

fn full_box_2d(
    frame: &FrameSnapshot,
    view: &ViewSetup,
    owner: ObjectId,
    label: u32,
) -> Option<BoundingBox> {
    let pose = owner_frame(frame, owner)?;
    let bounds = frame.subtree_bounds_in(owner, &pose);
    if bounds.is_empty() {
        return None;
    }
    let (mut min, mut max) = ((f64::INFINITY, f64::INFINITY), (f64::NEG_INFINITY, f64::NEG_INFINITY));
    for corner in bounds.corners() {
        if let Some((x, y, _)) = view.project(pose.transform_point(corner)) {
            min = (min.0.min(x), min.1.min(y));
            max = (max.0.max(x), max.1.max(y));
        }
    }
    if !min.0.is_finite() {
        return None;
    }
    let (w, h) = (view.width as f64, view.height as f64);
    let min = (min.0.clamp(0.0, w), min.1.clamp(0.0, h));
    let max = (max.0.clamp(0.0, w), max.1.clamp(0.0, h));
    Some(box_2d(BoundingBoxType::FullBox2D, label, min, max))
}

fn box_3d(
    frame: &FrameSnapshot,
    view: &ViewSetup,
    owner: ObjectId,
    label: u32,
) -> Option<BoundingBox> {
    let pose = owner_frame(frame, owner)?;
    let bounds = frame.subtree_bounds_in(owner, &pose);
    if bounds.is_empty() {
        return None;
    }
    let center_world = pose.transform_point(bounds.center());
    Some(BoundingBox {
        box_type: BoundingBoxType::Box3D,
        label,
        center: view.to_camera(center_world),
        size: bounds.size(),
        orientation: (view.pose.rotation.inverse() * pose.rotation).normalize(),
    })
}

/// Draw the outline of a 2D box onto an RGB image.
pub fn draw_bounding_box(image: &mut Image, bbox: &BoundingBox, color: [u8; 3]) {
    if bbox.box_type == BoundingBoxType::Box3D
        || !matches!(image.format(), PixelFormat::Rgb8 | PixelFormat::Bgr8)
        || !image.is_valid()
    {
        return;
    }
    let color = if image.format() == PixelFormat::Bgr8 {
        [color[2], color[1], color[0]]
    } else {
        color
    };
    let (w, h) = (image.width() as i64, image.height() as i64);
    let x0 = ((bbox.center.x - bbox.size.x * 0.5).floor() as i64).clamp(0, w - 1);
    let x1 = ((bbox.center.x + bbox.size.x * 0.5).ceil() as i64 - 1).clamp(0, w - 1);
    let y0 = ((bbox.center.y - bbox.size.y * 0.5).floor() as i64).clamp(0, h - 1);
    let y1 = ((bbox.center.y + bbox.size.y * 0.5).ceil() as i64 - 1).clamp(0, h - 1);

    let width = image.width() as usize;
    let data = image.data_mut();
    let mut put = |x: i64, y: i64| {
        let i = (y as usize * width + x as usize) * 3;
        data[i..i + 3].copy_from_slice(&color);
    };
    for x in x0..=x1 {
        put(x, y0);
        put(x, y1);
    }
    for y in y0..=y1 {
        put(x0, y);
        put(x1, y);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::extract::{ExtractedItem, ExtractedMaterial, ExtractedVisual};
    use crate::resources::Mesh;
    use std::sync::Arc;

    fn box_frame() -> FrameSnapshot {
        let mut frame = FrameSnapshot::default();
        let world = Pose::from_xyz(3.0, 0.0, 0.0);
        frame.visuals.insert(
            ObjectId(4),
            ExtractedVisual {
                name: "box".into(),
                parent: None,
                label: Some(2),
                temperature: None,
                world,
            },
        );
        frame.items.push(ExtractedItem {
            visual: ObjectId(4),
            mesh: Arc::new(Mesh::cube()),
            world,
            material: Arc::new(ExtractedMaterial::default()),
            is_static: false,
        });
        frame
    }

    fn ids_target() -> (ViewSetup, RenderTarget) {
        let view = ViewSetup::new(Pose::IDENTITY, 8, 8, std::f64::consts::FRAC_PI_2);
        let mut target = RenderTarget::new(8, 8);
        for y in 3..5 {
            for x in 2..6 {
                let i = target.index(x, y);
                target.ids[i] = 4;
            }
        }
        (view, target)
    }

    #[test]
    fn test_visible_box_covers_pixels() {
        let mut camera = BoundingBoxCamera::new();
        let (view, target) = ids_target();
        camera.process(&box_frame(), &view, &target);
        let boxes = camera.bounding_boxes();
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].label, 2);
        assert_eq!(boxes[0].center, DVec3::new(4.0, 4.0, 0.0));
        assert_eq!(boxes[0].size, DVec3::new(4.0, 2.0, 0.0));
    }

    #[test]
    fn test_box_3d_in_camera_frame() {
        let mut camera = BoundingBoxCamera::new();
        camera.set_box_type(BoundingBoxType::Box3D);
        let (view, target) = ids_target();
        camera.process(&box_frame(), &view, &target);
        let bbox = camera.bounding_boxes()[0];
        assert!(bbox.center.abs_diff_eq(DVec3::new(3.0, 0.0, 0.0), 1e-6));
        assert!(bbox.size.abs_diff_eq(DVec3::ONE, 1e-6));
    }

    #[test]
    fn test_full_box_projects_whole_object() {
        let mut camera = BoundingBoxCamera::new();
        camera.set_box_type(BoundingBoxType::FullBox2D);
        let (view, target) = ids_target();
        camera.process(&box_frame(), &view, &target);
        let bbox = camera.bounding_boxes()[0];
        // Near face at x = 2.5 spans +-0.5, i.e. +-0.2 in normalised coordinates.
        assert!((bbox.center.x - 4.0).abs() < 1e-6);
        assert!((bbox.size.x - 8.0 * 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_draw_outline() {
        let mut image = Image::new(8, 8, PixelFormat::Rgb8);
        let bbox = box_2d(BoundingBoxType::VisibleBox2D, 1, (2.0, 2.0), (5.0, 5.0));
        draw_bounding_box(&mut image, &bbox, [255, 0, 0]);
        assert_eq!(image.pixel(2, 2), &[255, 0, 0]);
        assert_eq!(image.pixel(4, 3), &[255, 0, 0]);
        assert_eq!(image.pixel(3, 3), &[0, 0, 0]);
    }
}
