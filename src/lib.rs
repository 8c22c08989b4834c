//! Prism Render - one scene-graph API over interchangeable render backends
//!
//! Client code builds a [`Scene`] of visuals, lights, materials and cameras
//! once and renders it through whichever backend is available:
//! - **null**: headless no-op backend, clears every target to the background
//! - **raytrace**: CPU ray caster with shadows, transparency and baked global illumination
//! - **wgpu**: offscreen GPU rasterizer (feature `wgpu-backend`)
//!
//! # Features
//! - Typed object stores with id and name lookup, parent/child node graph
//! - Sensor cameras: depth, thermal, segmentation, bounding box, wide angle
//! - Scoped frame subscriptions through [`camera::Connection`]
//! - Voxel cone traced global illumination, single volume or camera-relative cascades
//!
//! Engines are created through an explicit [`EngineRegistry`]; there is no
//! global engine state.

pub mod backend;
pub mod camera;
pub mod engine;
pub mod error;
pub mod gi;
pub mod math;
pub mod resources;
pub mod scene;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

pub use backend::{RenderBackend, RenderTarget, ViewSetup};
pub use camera::{Camera, CameraKind, Connection, Image, PixelFormat};
pub use engine::{EngineRegistry, RenderEngine};
pub use error::{RenderError, RenderResult};
pub use gi::{GlobalIllumination, GlobalIlluminationCivct, GlobalIlluminationVct};
pub use math::{Aabb, Angle, Color, Pose};
pub use scene::{ObjectId, ObjectRef, Scene, SceneId};

/// Backend selection for a render engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackendType {
    /// Headless, draws nothing
    Null,
    /// CPU ray tracer
    #[default]
    RayTrace,
    /// GPU rasterizer through wgpu
    Wgpu,
}

impl BackendType {
    pub fn name(self) -> &'static str {
        match self {
            BackendType::Null => "null",
            BackendType::RayTrace => "raytrace",
            BackendType::Wgpu => "wgpu",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "null" => Some(BackendType::Null),
            "raytrace" => Some(BackendType::RayTrace),
            "wgpu" => Some(BackendType::Wgpu),
            _ => None,
        }
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Graphics API requested from GPU backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpuApi {
    #[default]
    Auto,
    Vulkan,
    Metal,
    Dx12,
    Gl,
}

impl FromStr for GpuApi {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(GpuApi::Auto),
            "vulkan" => Ok(GpuApi::Vulkan),
            "metal" => Ok(GpuApi::Metal),
            "dx12" | "direct3d12" => Ok(GpuApi::Dx12),
            "gl" | "opengl" => Ok(GpuApi::Gl),
            other => Err(format!("unknown graphics API '{other}'")),
        }
    }
}

/// Configuration for initializing a render engine
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Render offscreen only; never create a surface
    pub headless: bool,
    /// Graphics API for GPU backends
    pub gpu_api: GpuApi,
    /// Reuse a GPU context owned by the host application
    pub use_current_context: bool,
    /// Rays per pixel in the ray tracer
    pub samples: u32,
    /// Reflection and transparency bounces in the ray tracer
    pub max_ray_depth: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            headless: true,
            gpu_api: GpuApi::Auto,
            use_current_context: false,
            samples: 1,
            max_ray_depth: 3,
        }
    }
}

impl EngineConfig {
    /// Parse backend parameters. Unknown keys are ignored and unparsable
    /// values keep their defaults.
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let mut config = Self::default();
        for (key, value) in params {
            match key.as_str() {
                "headless" => parse_into(key, value, &mut config.headless),
                "gpu_api" => parse_into(key, value, &mut config.gpu_api),
                "use_current_context" => parse_into(key, value, &mut config.use_current_context),
                "samples" => parse_into(key, value, &mut config.samples),
                "max_ray_depth" => parse_into(key, value, &mut config.max_ray_depth),
                _ => log::debug!("Ignoring unknown engine parameter '{key}'"),
            }
        }
        config
    }
}

fn parse_into<T: FromStr>(key: &str, value: &str, slot: &mut T) {
    match value.trim().parse() {
        Ok(parsed) => *slot = parsed,
        Err(_) => log::warn!("Engine parameter '{key}': cannot parse '{value}', keeping default"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_config_from_params() {
        let config = EngineConfig::from_params(&params(&[
            ("samples", "4"),
            ("gpu_api", "Vulkan"),
            ("use_current_context", "true"),
        ]));
        assert_eq!(config.samples, 4);
        assert_eq!(config.gpu_api, GpuApi::Vulkan);
        assert!(config.use_current_context);
        assert_eq!(config.max_ray_depth, 3);
    }

    #[test]
    fn test_bad_params_keep_defaults() {
        let config = EngineConfig::from_params(&params(&[
            ("samples", "many"),
            ("gpu_api", "glide"),
            ("window", "yes"),
        ]));
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_backend_type_names_round_trip() {
        for backend in [BackendType::Null, BackendType::RayTrace, BackendType::Wgpu] {
            assert_eq!(BackendType::from_name(backend.name()), Some(backend));
        }
        assert_eq!(BackendType::from_name("ogre"), None);
    }
}
