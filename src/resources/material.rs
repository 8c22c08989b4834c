//! Material definitions for Blinn-Phong shading
//!
//! Materials live in the scene's material store and are referenced by id, so
//! every visual pointing at the same id sees every mutation. Cloning a
//! material through the scene creates an independent copy under a new id.

use std::sync::Arc;

use crate::math::Color;
use crate::resources::paths::ResourceLocator;
use crate::resources::shader::{ShaderProgram, ShaderStage};
use crate::resources::shader_params::ShaderParams;
use crate::resources::texture::TextureData;

/// A texture reference together with its decoded pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureBinding {
    pub path: String,
    pub data: Arc<TextureData>,
}

/// Surface reflectance and shading parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub ambient: Color,
    pub diffuse: Color,
    pub specular: Color,
    pub emissive: Color,
    pub shininess: f64,
    pub reflectivity: f64,
    transparency: f64,
    pub cast_shadows: bool,
    pub receive_shadows: bool,
    /// When false the surface is drawn with its diffuse colour only.
    pub lighting: bool,
    pub depth_write: bool,

    texture: Option<TextureBinding>,
    normal_map: Option<TextureBinding>,
    vertex_shader: Option<ShaderProgram>,
    fragment_shader: Option<ShaderProgram>,
    vertex_params: ShaderParams,
    fragment_params: ShaderParams,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            ambient: Color::rgb(0.3, 0.3, 0.3),
            diffuse: Color::rgb(0.7, 0.7, 0.7),
            specular: Color::rgb(0.2, 0.2, 0.2),
            emissive: Color::BLACK,
            shininess: 32.0,
            reflectivity: 0.0,
            transparency: 0.0,
            cast_shadows: true,
            receive_shadows: true,
            lighting: true,
            depth_write: true,
            texture: None,
            normal_map: None,
            vertex_shader: None,
            fragment_shader: None,
            vertex_params: ShaderParams::new(),
            fragment_params: ShaderParams::new(),
        }
    }
}

impl Material {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_diffuse(mut self, color: Color) -> Self {
        self.diffuse = color;
        self.ambient = Color::rgb(color.r * 0.3, color.g * 0.3, color.b * 0.3);
        self
    }

    pub fn with_specular(mut self, color: Color, shininess: f64) -> Self {
        self.specular = color;
        self.shininess = shininess;
        self
    }

    pub fn with_emissive(mut self, color: Color) -> Self {
        self.emissive = color;
        self
    }

    pub fn with_transparency(mut self, transparency: f64) -> Self {
        self.set_transparency(transparency);
        self
    }

    pub fn with_reflectivity(mut self, reflectivity: f64) -> Self {
        self.reflectivity = reflectivity.clamp(0.0, 1.0);
        self
    }

    pub fn transparency(&self) -> f64 {
        self.transparency
    }

    /// Set transparency, clamped to `[0, 1]`.
    pub fn set_transparency(&mut self, transparency: f64) {
        self.transparency = transparency.clamp(0.0, 1.0);
    }

    pub fn texture(&self) -> Option<&TextureBinding> {
        self.texture.as_ref()
    }

    pub fn normal_map(&self) -> Option<&TextureBinding> {
        self.normal_map.as_ref()
    }

    /// Bind a diffuse texture. On failure the binding is cleared and the
    /// material keeps its plain colour.
    pub fn set_texture(&mut self, path: &str, locator: &dyn ResourceLocator) -> bool {
        self.texture = load_texture(path, locator);
        self.texture.is_some()
    }

    pub fn set_normal_map(&mut self, path: &str, locator: &dyn ResourceLocator) -> bool {
        self.normal_map = load_texture(path, locator);
        self.normal_map.is_some()
    }

    pub fn clear_texture(&mut self) {
        self.texture = None;
    }

    pub fn vertex_shader(&self) -> Option<&ShaderProgram> {
        self.vertex_shader.as_ref()
    }

    pub fn fragment_shader(&self) -> Option<&ShaderProgram> {
        self.fragment_shader.as_ref()
    }

    /// Attach a custom vertex shader and seed its parameters from the
    /// uniforms it declares. Existing values for the same names are kept.
    pub fn set_vertex_shader(&mut self, path: &str, locator: &dyn ResourceLocator) -> bool {
        self.vertex_shader = load_shader(path, ShaderStage::Vertex, locator);
        if let Some(program) = &self.vertex_shader {
            merge_declared(&mut self.vertex_params, &program.declared);
        }
        self.vertex_shader.is_some()
    }

    pub fn set_fragment_shader(&mut self, path: &str, locator: &dyn ResourceLocator) -> bool {
        self.fragment_shader = load_shader(path, ShaderStage::Fragment, locator);
        if let Some(program) = &self.fragment_shader {
            merge_declared(&mut self.fragment_params, &program.declared);
        }
        self.fragment_shader.is_some()
    }

    pub fn vertex_params(&self) -> &ShaderParams {
        &self.vertex_params
    }

    pub fn vertex_params_mut(&mut self) -> &mut ShaderParams {
        &mut self.vertex_params
    }

    pub fn fragment_params(&self) -> &ShaderParams {
        &self.fragment_params
    }

    pub fn fragment_params_mut(&mut self) -> &mut ShaderParams {
        &mut self.fragment_params
    }

    pub fn has_dirty_params(&self) -> bool {
        self.vertex_params.is_dirty() || self.fragment_params.is_dirty()
    }

    pub(crate) fn clear_dirty_params(&mut self) {
        self.vertex_params.clear_dirty();
        self.fragment_params.clear_dirty();
    }

    // Preset materials

    pub fn plastic(color: Color) -> Self {
        Self::new()
            .with_diffuse(color)
            .with_specular(Color::rgb(0.5, 0.5, 0.5), 64.0)
    }

    pub fn metal(color: Color) -> Self {
        Self::new()
            .with_diffuse(color)
            .with_specular(color, 128.0)
            .with_reflectivity(0.6)
    }

    pub fn glass() -> Self {
        Self::new()
            .with_diffuse(Color::rgb(0.9, 0.95, 1.0))
            .with_specular(Color::WHITE, 256.0)
            .with_transparency(0.7)
    }

    pub fn emissive(color: Color) -> Self {
        let mut material = Self::new().with_diffuse(color).with_emissive(color);
        material.lighting = false;
        material
    }
}

fn load_texture(path: &str, locator: &dyn ResourceLocator) -> Option<TextureBinding> {
    let Some(resolved) = locator.resolve(path) else {
        log::warn!("Texture '{path}' not found, using default appearance");
        return None;
    };
    match TextureData::from_file(&resolved) {
        Ok(data) => Some(TextureBinding {
            path: path.to_string(),
            data: Arc::new(data),
        }),
        Err(e) => {
            log::warn!("Failed to load texture '{path}': {e}");
            None
        }
    }
}

fn load_shader(
    path: &str,
    stage: ShaderStage,
    locator: &dyn ResourceLocator,
) -> Option<ShaderProgram> {
    let Some(resolved) = locator.resolve(path) else {
        log::warn!("Shader '{path}' not found, using default shading");
        return None;
    };
    match ShaderProgram::from_file(&resolved, stage) {
        Ok(program) => Some(program),
        Err(e) => {
            log::warn!("Failed to load shader '{path}': {e}");
            None
        }
    }
}

fn merge_declared(params: &mut ShaderParams, declared: &ShaderParams) {
    for (name, value) in declared.iter() {
        if params.get(name).is_none() {
            params.set(name, value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::paths::SearchPaths;
    use crate::resources::shader_params::ShaderParam;

    #[test]
    fn test_transparency_is_clamped() {
        let mut material = Material::new();
        material.set_transparency(1.5);
        assert_eq!(material.transparency(), 1.0);
        material.set_transparency(-0.2);
        assert_eq!(material.transparency(), 0.0);
    }

    #[test]
    fn test_missing_texture_falls_back() {
        let mut material = Material::plastic(Color::RED);
        assert!(!material.set_texture("no/such/texture.png", &SearchPaths::new()));
        assert!(material.texture().is_none());
        assert_eq!(material.diffuse, Color::RED);
    }

    #[test]
    fn test_fragment_shader_seeds_params() {
        let dir = std::env::temp_dir().join("prism_render_material_test");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("tint.wgsl"),
            "struct P { gain: f32 };\n@group(0) @binding(0) var<uniform> p: P;\n@fragment fn fs_main() -> @location(0) vec4<f32> { return vec4<f32>(p.gain); }\n",
        )
        .unwrap();
        let mut paths = SearchPaths::new();
        paths.add(&dir);

        let mut material = Material::new();
        material
            .fragment_params_mut()
            .set("gain", ShaderParam::Float(3.0));
        assert!(material.set_fragment_shader("tint.wgsl", &paths));
        assert_eq!(
            material.fragment_params().get("gain"),
            Some(&ShaderParam::Float(3.0))
        );
        assert!(!material.set_vertex_shader("tint.wgsl", &paths));
        assert!(material.vertex_shader().is_none());
    }
}
