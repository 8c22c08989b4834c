use std::collections::HashMap;

use prism_render::{BackendType, EngineConfig, EngineRegistry, GpuApi};
use rstest::rstest;

fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[rstest]
#[case(BackendType::Null)]
#[case(BackendType::RayTrace)]
fn test_registry_loads_engine_once(#[case] backend: BackendType) {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut registry = EngineRegistry::new();
    assert!(registry.is_registered(backend.name()));

    let engine = registry
        .engine(backend.name(), &params(&[("samples", "2")]))
        .unwrap();
    assert_eq!(engine.name(), backend.name());
    assert_eq!(engine.config().samples, 2);
    let scene = engine.create_scene("main").unwrap();
    assert!(engine.scene(scene).unwrap().is_initialized());
    assert_eq!(engine.scene(scene).unwrap().backend_name(), backend.name());

    // Parameters only apply when the engine is first created.
    let again = registry.engine(backend.name(), &HashMap::new()).unwrap();
    assert_eq!(again.config().samples, 2);
    assert!(again.has_scene_name("main"));

    assert!(registry.unload_engine(backend.name()));
    assert!(!registry.unload_engine(backend.name()));
}

#[test]
fn test_engines_are_independent() {
    let mut registry = EngineRegistry::new();
    registry
        .engine("null", &HashMap::new())
        .unwrap()
        .create_scene("shared-name")
        .unwrap();
    let raytrace = registry.engine("raytrace", &HashMap::new()).unwrap();
    assert!(!raytrace.has_scene_name("shared-name"));
    assert!(raytrace.create_scene("shared-name").is_some());
    assert_eq!(registry.loaded_engines(), vec!["null", "raytrace"]);
}

#[test]
fn test_unknown_backend_is_rejected() {
    let mut registry = EngineRegistry::new();
    assert!(!registry.is_registered("ogre2"));
    assert!(registry.engine("ogre2", &HashMap::new()).is_none());
    assert!(!registry.has_engine("ogre2"));
}

#[test]
fn test_scenes_are_destroyed_with_engine() {
    let mut registry = EngineRegistry::new();
    let engine = registry.engine("null", &HashMap::new()).unwrap();
    let first = engine.create_scene("a").unwrap();
    let second = engine.create_scene("b").unwrap();
    assert_eq!(engine.scene_by_index(1).map(|s| s.id()), Some(second));

    engine.destroy_scenes();
    assert_eq!(engine.scene_count(), 0);
    assert!(engine.scene(first).is_none());
}

#[test]
fn test_config_parameters() {
    let config = EngineConfig::from_params(&params(&[
        ("gpu_api", "metal"),
        ("headless", "false"),
        ("max_ray_depth", "7"),
    ]));
    assert_eq!(config.gpu_api, GpuApi::Metal);
    assert!(!config.headless);
    assert_eq!(config.max_ray_depth, 7);
    assert_eq!(config.samples, EngineConfig::default().samples);
}
