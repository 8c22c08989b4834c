use glam::{DQuat, DVec3};
use prism_render::scene::{Geometry, ObjectKind};
use prism_render::{EngineConfig, ObjectRef, Pose, RenderEngine, RenderError, SceneId};
use rstest::rstest;

fn engine(backend: &str) -> (RenderEngine, SceneId) {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut engine = RenderEngine::new(backend, EngineConfig::default()).unwrap();
    engine.init().unwrap();
    let scene = engine.create_scene("graph").unwrap();
    (engine, scene)
}

#[rstest]
#[case("null")]
#[case("raytrace")]
fn test_world_pose_follows_parent(#[case] backend: &str) {
    let (mut engine, id) = engine(backend);
    let scene = engine.scene_mut(id).unwrap();

    let parent = scene.create_visual_named("parent").unwrap();
    let child = scene.create_visual_named("child").unwrap();
    scene.add_child(parent, child).unwrap();
    scene
        .set_local_pose(
            parent,
            Pose::new(
                DVec3::new(1.0, 0.0, 0.0),
                DQuat::from_rotation_z(std::f64::consts::FRAC_PI_2),
            ),
        )
        .unwrap();
    scene.set_local_position(child, DVec3::X).unwrap();

    let world = scene.world_pose(child).unwrap();
    assert!(world.position.abs_diff_eq(DVec3::new(1.0, 1.0, 0.0), 1e-9));

    // Setting the world pose solves for the local one.
    scene
        .set_world_pose(child, Pose::from_xyz(0.0, 0.0, 2.0))
        .unwrap();
    assert!(scene
        .world_pose(child)
        .unwrap()
        .position
        .abs_diff_eq(DVec3::new(0.0, 0.0, 2.0), 1e-9));
    assert_eq!(scene.local_pose(parent).unwrap().position, DVec3::X);
}

#[rstest]
#[case("null")]
#[case("raytrace")]
fn test_destroy_takes_subtree(#[case] backend: &str) {
    let (mut engine, id) = engine(backend);
    let scene = engine.scene_mut(id).unwrap();

    let parent = scene.create_visual().unwrap();
    let child = scene.create_visual().unwrap();
    let light = scene.create_point_light(Some("lamp")).unwrap();
    scene.add_child(parent, child).unwrap();
    scene.add_child(child, light).unwrap();
    assert_eq!(scene.visual_count(), 2);

    assert!(scene.destroy_visual(ObjectRef::Id(parent)));
    assert_eq!(scene.visual_count(), 0);
    assert_eq!(scene.light_count(), 0);
    assert!(!scene.has_scene_name("lamp"));
    assert!(!scene.destroy_visual(ObjectRef::Id(child)));
    assert!(scene.children(scene.root_visual()).is_empty());
}

#[rstest]
#[case("null")]
#[case("raytrace")]
fn test_remove_child_returns_to_root(#[case] backend: &str) {
    let (mut engine, id) = engine(backend);
    let scene = engine.scene_mut(id).unwrap();
    let root = scene.root_visual();

    let parent = scene.create_visual().unwrap();
    let child = scene.create_visual().unwrap();
    scene.add_child(parent, child).unwrap();
    assert_eq!(scene.children(parent), &[child]);

    assert!(scene.remove_child(parent, child));
    assert_eq!(scene.parent(child), Some(root));
    assert!(scene.children(parent).is_empty());
    assert!(!scene.remove_child(parent, child));
}

#[test]
fn test_root_cannot_be_destroyed_or_reparented() {
    let (mut engine, id) = engine("null");
    let scene = engine.scene_mut(id).unwrap();
    let root = scene.root_visual();
    let visual = scene.create_visual().unwrap();

    assert!(!scene.destroy_node(root));
    assert!(matches!(
        scene.add_child(visual, root),
        Err(RenderError::InvalidConfig(_))
    ));
    assert_eq!(scene.parent(root), None);
}

#[test]
fn test_lookup_by_id_name_and_index() {
    let (mut engine, id) = engine("null");
    let scene = engine.scene_mut(id).unwrap();
    let a = scene.create_visual_named("a").unwrap();
    let b = scene.create_visual_named("b").unwrap();
    let material = scene.create_material(Some("paint")).unwrap();

    assert_eq!(scene.visual_id(ObjectRef::Name("b")), Some(b));
    assert_eq!(scene.visual_id(ObjectRef::Index(0)), Some(a));
    assert_eq!(scene.visual_id(ObjectRef::Id(material)), None);
    assert_eq!(scene.kind_of(material), Some(ObjectKind::Material));
    assert_eq!(scene.id_of("paint"), Some(material));
    assert_eq!(
        scene.add_geometry(material, Geometry::cube()),
        Err(RenderError::WrongKind(material.raw()))
    );
}

#[test]
fn test_world_bounding_box_covers_children() {
    let (mut engine, id) = engine("null");
    let scene = engine.scene_mut(id).unwrap();
    let parent = scene.create_visual().unwrap();
    let child = scene.create_visual().unwrap();
    scene.add_child(parent, child).unwrap();
    scene.add_geometry(parent, Geometry::cube()).unwrap();
    scene.add_geometry(child, Geometry::cube()).unwrap();
    scene.set_local_position(child, DVec3::new(4.0, 0.0, 0.0)).unwrap();

    let local = scene.local_bounding_box(parent).unwrap();
    assert!(local.size().abs_diff_eq(DVec3::ONE, 1e-9));
    let world = scene.world_bounding_box(parent).unwrap();
    assert!(world.min.abs_diff_eq(DVec3::splat(-0.5), 1e-9));
    assert!(world.max.abs_diff_eq(DVec3::new(4.5, 0.5, 0.5), 1e-9));
}
