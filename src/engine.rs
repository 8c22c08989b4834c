//! Engine selection and scene ownership

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use crate::backend::{self, BackendResult};
use crate::scene::{Scene, SceneId, SharedBackend};
use crate::EngineConfig;

/// One initialized backend and the scenes rendered through it.
pub struct RenderEngine {
    name: String,
    config: EngineConfig,
    backend: SharedBackend,
    scenes: BTreeMap<SceneId, Scene>,
    next_scene_id: u32,
}

impl RenderEngine {
    /// Create an engine for a registered backend name. `None` when the
    /// backend is unknown or not compiled in.
    pub fn new(name: &str, config: EngineConfig) -> Option<Self> {
        let backend = backend::create_backend(name)?;
        Some(Self {
            name: name.to_string(),
            config,
            backend: Rc::new(RefCell::new(backend)),
            scenes: BTreeMap::new(),
            next_scene_id: 1,
        })
    }

    /// Bring up the backend's device.
    pub fn init(&mut self) -> BackendResult<()> {
        if self.is_initialized() {
            return Ok(());
        }
        self.backend.borrow_mut().init(&self.config)?;
        log::info!("Render engine '{}' initialized", self.name);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.backend.borrow().is_initialized()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn has_scene_id(&self, id: SceneId) -> bool {
        self.scenes.contains_key(&id)
    }

    pub fn has_scene_name(&self, name: &str) -> bool {
        self.scenes.values().any(|scene| scene.name() == name)
    }

    /// Create, load and initialize a scene. `None` when the name is taken or
    /// the engine has no live device.
    pub fn create_scene(&mut self, name: &str) -> Option<SceneId> {
        let mut id = SceneId(self.next_scene_id);
        while self.has_scene_id(id) {
            id = SceneId(id.0 + 1);
        }
        self.create_scene_with_id(id, name)
    }

    pub fn create_scene_with_id(&mut self, id: SceneId, name: &str) -> Option<SceneId> {
        if self.has_scene_id(id) {
            log::error!("Render engine '{}': {id} already exists", self.name);
            return None;
        }
        if self.has_scene_name(name) {
            log::error!("Render engine '{}': scene '{name}' already exists", self.name);
            return None;
        }
        let mut scene = Scene::new(id, name, self.backend.clone());
        scene.load();
        if let Err(err) = scene.init() {
            log::error!("Render engine '{}': scene '{name}' failed to init: {err}", self.name);
            return None;
        }
        self.next_scene_id = self.next_scene_id.max(id.0 + 1);
        self.scenes.insert(id, scene);
        Some(id)
    }

    pub fn scene(&self, id: SceneId) -> Option<&Scene> {
        self.scenes.get(&id)
    }

    pub fn scene_mut(&mut self, id: SceneId) -> Option<&mut Scene> {
        self.scenes.get_mut(&id)
    }

    pub fn scene_by_name(&self, name: &str) -> Option<&Scene> {
        self.scenes.values().find(|scene| scene.name() == name)
    }

    pub fn scene_by_name_mut(&mut self, name: &str) -> Option<&mut Scene> {
        self.scenes.values_mut().find(|scene| scene.name() == name)
    }

    /// Scene at `index` in id order.
    pub fn scene_by_index(&self, index: usize) -> Option<&Scene> {
        self.scenes.values().nth(index)
    }

    /// Destroy a scene and every object in it.
    pub fn destroy_scene(&mut self, id: SceneId) -> bool {
        match self.scenes.remove(&id) {
            Some(mut scene) => {
                scene.clear();
                log::info!("Render engine '{}': destroyed scene '{}'", self.name, scene.name());
                true
            }
            None => false,
        }
    }

    pub fn destroy_scenes(&mut self) {
        let ids: Vec<_> = self.scenes.keys().copied().collect();
        for id in ids {
            self.destroy_scene(id);
        }
    }

    pub fn scene_count(&self) -> usize {
        self.scenes.len()
    }
}

impl Drop for RenderEngine {
    fn drop(&mut self) {
        self.destroy_scenes();
    }
}

/// Explicit registry of render engines, one per backend name.
pub struct EngineRegistry {
    registered: Vec<&'static str>,
    engines: HashMap<String, RenderEngine>,
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineRegistry {
    /// Registry knowing every backend compiled into this build.
    pub fn new() -> Self {
        Self {
            registered: backend::backend_names().to_vec(),
            engines: HashMap::new(),
        }
    }

    /// Backend names that can be requested.
    pub fn registered(&self) -> &[&'static str] {
        &self.registered
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.registered.contains(&name)
    }

    /// Engine for `name`, created and initialized on first request.
    ///
    /// `None` for unknown backends or when initialization fails; callers are
    /// expected to try another backend.
    pub fn engine(
        &mut self,
        name: &str,
        params: &HashMap<String, String>,
    ) -> Option<&mut RenderEngine> {
        if !self.engines.contains_key(name) {
            if !self.is_registered(name) {
                log::error!("No render engine registered under '{name}'");
                return None;
            }
            let config = EngineConfig::from_params(params);
            let mut engine = RenderEngine::new(name, config)?;
            if let Err(err) = engine.init() {
                log::error!("Render engine '{name}' failed to initialize: {err}");
                return None;
            }
            self.engines.insert(name.to_string(), engine);
        }
        self.engines.get_mut(name)
    }

    pub fn has_engine(&self, name: &str) -> bool {
        self.engines.contains_key(name)
    }

    /// Names of engines currently loaded.
    pub fn loaded_engines(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.engines.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Drop an engine and its scenes. Returns false if it was not loaded.
    pub fn unload_engine(&mut self, name: &str) -> bool {
        let unloaded = self.engines.remove(name).is_some();
        if unloaded {
            log::info!("Render engine '{name}' unloaded");
        }
        unloaded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_engine_is_none() {
        let mut registry = EngineRegistry::new();
        assert!(registry.engine("ogre", &HashMap::new()).is_none());
        assert!(registry.loaded_engines().is_empty());
    }

    #[test]
    fn test_engine_is_created_once() {
        let mut registry = EngineRegistry::new();
        let engine = registry.engine("null", &HashMap::new()).unwrap();
        assert!(engine.is_initialized());
        engine.create_scene("a").unwrap();

        let again = registry.engine("null", &HashMap::new()).unwrap();
        assert_eq!(again.scene_count(), 1);
        assert_eq!(registry.loaded_engines(), vec!["null"]);
        assert!(registry.unload_engine("null"));
        assert!(!registry.has_engine("null"));
    }

    #[test]
    fn test_scene_names_and_ids_are_unique() {
        let mut engine = RenderEngine::new("null", EngineConfig::default()).unwrap();
        engine.init().unwrap();
        let first = engine.create_scene("main").unwrap();
        assert!(engine.create_scene("main").is_none());
        assert!(engine.create_scene_with_id(first, "other").is_none());

        let second = engine.create_scene("other").unwrap();
        assert_ne!(first, second);
        assert!(engine.scene(first).unwrap().is_initialized());
        assert_eq!(engine.scene_by_name("other").map(Scene::id), Some(second));
        assert!(engine.destroy_scene(first));
        assert_eq!(engine.scene_count(), 1);
    }

    #[test]
    fn test_scene_needs_initialized_engine() {
        let mut engine = RenderEngine::new("null", EngineConfig::default()).unwrap();
        assert!(engine.create_scene("cold").is_none());
    }
}
