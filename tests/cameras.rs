use std::cell::RefCell;
use std::rc::Rc;

use glam::DVec3;
use prism_render::camera::{BoundingBoxType, FrameView, PixelFormat};
use prism_render::scene::{Geometry, LABEL_KEY, TEMPERATURE_KEY};
use prism_render::{Angle, EngineConfig, ObjectId, RenderEngine, Scene, SceneId};
use rstest::rstest;

const SIZE: u32 = 32;

struct Fixture {
    engine: RenderEngine,
    scene: SceneId,
}

impl Fixture {
    fn new(backend: &str) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut engine = RenderEngine::new(backend, EngineConfig::default()).unwrap();
        engine.init().unwrap();
        let scene = engine.create_scene("sensors").unwrap();
        Self { engine, scene }
    }

    fn scene(&mut self) -> &mut Scene {
        self.engine.scene_mut(self.scene).unwrap()
    }
}

/// Unit box three metres ahead of the origin, annotated with label 2 and 310 K.
fn add_box(scene: &mut Scene) -> ObjectId {
    let visual = scene.create_visual_named("box").unwrap();
    scene.add_geometry(visual, Geometry::cube()).unwrap();
    scene.set_local_position(visual, DVec3::new(3.0, 0.0, 0.0)).unwrap();
    scene.set_user_data(visual, LABEL_KEY, 2).unwrap();
    scene.set_user_data(visual, TEMPERATURE_KEY, 310.0).unwrap();
    scene.create_directional_light(None).unwrap();
    visual
}

fn configure(scene: &mut Scene, camera: ObjectId) {
    let camera = scene.camera_mut(camera).unwrap();
    camera.set_image_width(SIZE);
    camera.set_image_height(SIZE);
    camera.set_hfov(Angle::HALF_PI);
}

#[test]
fn test_bounding_box_camera_finds_labelled_box() {
    let mut fixture = Fixture::new("raytrace");
    let scene = fixture.scene();
    add_box(scene);
    let camera = scene.create_bounding_box_camera(Some("boxes")).unwrap();
    configure(scene, camera);

    let received = Rc::new(RefCell::new(Vec::new()));
    let sink = received.clone();
    let connection = scene
        .camera(camera)
        .unwrap()
        .as_bounding_box()
        .unwrap()
        .connect_new_bounding_boxes(move |boxes| sink.borrow_mut().extend_from_slice(boxes));

    scene.render(camera).unwrap();

    let boxes = received.borrow();
    assert_eq!(boxes.len(), 1);
    let bbox = boxes[0];
    assert_eq!(bbox.label, 2);
    assert_eq!(bbox.box_type, BoundingBoxType::VisibleBox2D);
    let center = SIZE as f64 / 2.0;
    assert!((bbox.center.x - center).abs() <= 1.0);
    assert!((bbox.center.y - center).abs() <= 1.0);
    // The near face spans [-0.5, 0.5] at 2.5 m: a fifth of the 90 degree view.
    assert!((bbox.size.x - SIZE as f64 * 0.2).abs() <= 2.0);
    connection.disconnect();
}

#[test]
fn test_full_box_includes_occluded_part() {
    let mut fixture = Fixture::new("raytrace");
    let scene = fixture.scene();
    let target = add_box(scene);
    let blocker = scene.create_visual_named("blocker").unwrap();
    scene.add_geometry(blocker, Geometry::cube()).unwrap();
    scene
        .set_local_pose(
            blocker,
            prism_render::Pose::from_xyz(1.5, 0.25, 0.0).with_scale(DVec3::new(0.1, 0.5, 2.0)),
        )
        .unwrap();

    let camera = scene.create_bounding_box_camera(None).unwrap();
    configure(scene, camera);
    scene.render(camera).unwrap();
    let visible = scene.camera(camera).unwrap().as_bounding_box().unwrap().bounding_boxes()[0];

    scene
        .camera_mut(camera)
        .unwrap()
        .as_bounding_box_mut()
        .unwrap()
        .set_box_type(BoundingBoxType::FullBox2D);
    scene.render(camera).unwrap();
    let full = scene.camera(camera).unwrap().as_bounding_box().unwrap().bounding_boxes()[0];

    assert_eq!(scene.name_of(target), Some("box"));
    assert!(full.size.x > visible.size.x);
}

#[test]
fn test_depth_camera_reports_distance_along_forward_axis() {
    let mut fixture = Fixture::new("raytrace");
    let scene = fixture.scene();
    add_box(scene);
    let camera = scene.create_depth_camera(None).unwrap();
    configure(scene, camera);
    scene.render(camera).unwrap();

    let depth = scene.camera(camera).unwrap().as_depth().unwrap().depth_data();
    let center = (SIZE / 2 * SIZE + SIZE / 2) as usize;
    assert!((depth[center] - 2.5).abs() < 1e-3);
    assert!(depth[0].is_infinite());
}

#[test]
fn test_segmentation_labels_pixels() {
    let mut fixture = Fixture::new("raytrace");
    let scene = fixture.scene();
    add_box(scene);
    let camera = scene.create_segmentation_camera(None).unwrap();
    configure(scene, camera);
    scene.render(camera).unwrap();

    let labels = scene
        .camera(camera)
        .unwrap()
        .as_segmentation()
        .unwrap()
        .segmentation_data();
    let center = ((SIZE / 2 * SIZE + SIZE / 2) * 3) as usize;
    assert_eq!(&labels[center..center + 3], &[2, 2, 2]);
    assert_eq!(&labels[0..3], &[0, 0, 0]);
}

#[test]
fn test_depth_camera_writes_finite_sentinels() {
    let mut fixture = Fixture::new("raytrace");
    let scene = fixture.scene();
    add_box(scene);
    let camera = scene.create_depth_camera(None).unwrap();
    configure(scene, camera);
    {
        let sensor = scene.camera_mut(camera).unwrap();
        assert!(sensor.set_far_clip_plane(2.0));
        sensor.as_depth_mut().unwrap().set_sentinels(0.0, 2.0);
    }
    scene.render(camera).unwrap();

    let center = (SIZE / 2 * SIZE + SIZE / 2) as usize;
    let depth = scene.camera(camera).unwrap().as_depth().unwrap().depth_data();
    // The box face at 2.5 m lies beyond the far plane.
    assert_eq!(depth[center], 2.0);
    assert_eq!(depth[0], 2.0);
    assert!(depth.iter().all(|d| d.is_finite()));

    assert!(scene.camera_mut(camera).unwrap().set_far_clip_plane(100.0));
    scene.render(camera).unwrap();
    let depth = scene.camera(camera).unwrap().as_depth().unwrap().depth_data();
    assert!((depth[center] - 2.5).abs() < 1e-3);
    assert_eq!(depth[0], 2.0);
}

#[test]
fn test_label_passes_through_light_node() {
    let mut fixture = Fixture::new("raytrace");
    let scene = fixture.scene();
    let carrier = scene.create_visual_named("carrier").unwrap();
    scene.set_user_data(carrier, LABEL_KEY, 5).unwrap();
    let lamp = scene.create_point_light(Some("lamp")).unwrap();
    scene.add_child(carrier, lamp).unwrap();
    let body = scene.create_visual_named("body").unwrap();
    scene.add_child(lamp, body).unwrap();
    scene.add_geometry(body, Geometry::cube()).unwrap();
    scene.set_local_position(body, DVec3::new(3.0, 0.0, 0.0)).unwrap();

    let camera = scene.create_segmentation_camera(None).unwrap();
    configure(scene, camera);
    scene.render(camera).unwrap();

    let labels = scene
        .camera(camera)
        .unwrap()
        .as_segmentation()
        .unwrap()
        .segmentation_data();
    let center = ((SIZE / 2 * SIZE + SIZE / 2) * 3) as usize;
    assert_eq!(&labels[center..center + 3], &[5, 5, 5]);
}

#[test]
fn test_thermal_camera_reads_annotated_temperature() {
    let mut fixture = Fixture::new("raytrace");
    let scene = fixture.scene();
    add_box(scene);
    let camera = scene.create_thermal_camera(None).unwrap();
    configure(scene, camera);
    scene.render(camera).unwrap();

    let thermal = scene.camera(camera).unwrap().as_thermal().unwrap();
    let raw = thermal.thermal_data();
    let center = (SIZE / 2 * SIZE + SIZE / 2) as usize;
    assert_eq!(raw[center], 31_000);
    assert_eq!(raw[0], 28_815);
}

#[rstest]
#[case("null")]
#[case("raytrace")]
fn test_image_subscribers_see_every_frame(#[case] backend: &str) {
    let mut fixture = Fixture::new(backend);
    let scene = fixture.scene();
    let camera = scene.create_camera(None).unwrap();
    configure(scene, camera);

    let frames = Rc::new(RefCell::new(Vec::new()));
    let sink = frames.clone();
    let connection = scene
        .camera(camera)
        .unwrap()
        .connect_new_image_frame(move |frame: FrameView<'_, u8>| {
            sink.borrow_mut()
                .push((frame.width, frame.height, frame.data.len(), frame.format));
        });

    scene.render(camera).unwrap();
    scene.render(camera).unwrap();
    connection.disconnect();
    scene.render(camera).unwrap();

    let frames = frames.borrow();
    assert_eq!(frames.len(), 2);
    assert_eq!(
        frames[0],
        (SIZE, SIZE, (SIZE * SIZE * 3) as usize, PixelFormat::Rgb8)
    );
    assert_eq!(scene.camera(camera).unwrap().frame_count(), 3);
}

#[rstest]
#[case("null")]
#[case("raytrace")]
fn test_capture_matches_last_frame(#[case] backend: &str) {
    let mut fixture = Fixture::new(backend);
    let scene = fixture.scene();
    scene.set_background_color(prism_render::Color::GREEN);
    let camera = scene.create_camera(None).unwrap();
    configure(scene, camera);

    let mut image = scene.camera(camera).unwrap().create_image();
    scene.capture(camera, &mut image).unwrap();
    assert_eq!(image.width(), SIZE);
    assert_eq!(image.pixel(0, 0), &[0, 255, 0]);
}
