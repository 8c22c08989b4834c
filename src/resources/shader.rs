//! WGSL shader loading and uniform introspection.

use std::path::Path;

use naga::{AddressSpace, ArraySize, Handle, ImageDimension, Module, ScalarKind, Type, TypeInner};

use crate::error::{RenderError, RenderResult};
use crate::resources::shader_params::{ShaderParam, ShaderParams, TextureKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    fn to_naga(self) -> naga::ShaderStage {
        match self {
            ShaderStage::Vertex => naga::ShaderStage::Vertex,
            ShaderStage::Fragment => naga::ShaderStage::Fragment,
        }
    }
}

/// A validated WGSL shader stage with the parameters it declares.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderProgram {
    pub path: String,
    pub stage: ShaderStage,
    pub source: String,
    /// Default-valued parameters for every uniform and texture binding.
    pub declared: ShaderParams,
}

impl ShaderProgram {
    pub fn from_file(path: &Path, stage: ShaderStage) -> RenderResult<Self> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| RenderError::ResourceNotFound(format!("{}: {e}", path.display())))?;
        Self::from_source(&path.display().to_string(), &source, stage)
    }

    pub fn from_source(path: &str, source: &str, stage: ShaderStage) -> RenderResult<Self> {
        let module = parse_and_validate(source)?;
        if !module
            .entry_points
            .iter()
            .any(|ep| ep.stage == stage.to_naga())
        {
            return Err(RenderError::InvalidConfig(format!(
                "shader '{path}' has no {stage:?} entry point"
            )));
        }
        Ok(Self {
            path: path.to_string(),
            stage,
            source: source.to_string(),
            declared: declared_params(&module),
        })
    }
}

fn parse_and_validate(source: &str) -> RenderResult<Module> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|e| RenderError::InvalidConfig(format!("WGSL parse error: {e}")))?;
    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    validator
        .validate(&module)
        .map_err(|e| RenderError::InvalidConfig(format!("Validation error: {e}")))?;
    Ok(module)
}

/// Scalar kind and component count of a plain-data type.
fn component_layout(module: &Module, ty: Handle<Type>) -> Option<(ScalarKind, usize)> {
    match &module.types[ty].inner {
        TypeInner::Scalar(scalar) => Some((scalar.kind, 1)),
        TypeInner::Vector { size, scalar } => Some((scalar.kind, *size as usize)),
        TypeInner::Matrix {
            columns,
            rows,
            scalar,
        } => Some((scalar.kind, *columns as usize * *rows as usize)),
        TypeInner::Array {
            base,
            size: ArraySize::Constant(count),
            ..
        } => component_layout(module, *base).map(|(kind, n)| (kind, n * count.get() as usize)),
        _ => None,
    }
}

fn default_param(kind: ScalarKind, components: usize) -> ShaderParam {
    let float = matches!(kind, ScalarKind::Float | ScalarKind::AbstractFloat);
    match (float, components) {
        (true, 1) => ShaderParam::Float(0.0),
        (false, 1) => ShaderParam::Int(0),
        (true, n) => ShaderParam::FloatBuffer(vec![0.0; n]),
        (false, n) => ShaderParam::IntBuffer(vec![0; n]),
    }
}

fn declared_params(module: &Module) -> ShaderParams {
    let mut params = ShaderParams::new();
    for (_, var) in module.global_variables.iter() {
        let Some(name) = var.name.as_deref() else {
            continue;
        };
        match (&var.space, &module.types[var.ty].inner) {
            (AddressSpace::Uniform, TypeInner::Struct { members, .. }) => {
                for member in members {
                    let (Some(member_name), Some((kind, n))) =
                        (member.name.as_deref(), component_layout(module, member.ty))
                    else {
                        continue;
                    };
                    params.set(member_name, default_param(kind, n));
                }
            }
            (AddressSpace::Uniform, _) => {
                if let Some((kind, n)) = component_layout(module, var.ty) {
                    params.set(name, default_param(kind, n));
                }
            }
            (AddressSpace::Handle, TypeInner::Image { dim, .. }) => {
                let kind = match dim {
                    ImageDimension::Cube => TextureKind::Cube,
                    _ => TextureKind::Texture2d,
                };
                params.set(
                    name,
                    ShaderParam::Texture {
                        path: String::new(),
                        kind,
                    },
                );
            }
            _ => {}
        }
    }
    params.clear_dirty();
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAGMENT: &str = r#"
struct Params {
    gain: f32,
    mode: i32,
    tint: vec4<f32>,
};

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var env_map: texture_cube<f32>;
@group(0) @binding(2) var env_sampler: sampler;

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return params.tint * params.gain;
}
"#;

    #[test]
    fn test_uniform_members_become_params() {
        let program = ShaderProgram::from_source("test.wgsl", FRAGMENT, ShaderStage::Fragment).unwrap();
        let declared = &program.declared;
        assert_eq!(declared.get("gain"), Some(&ShaderParam::Float(0.0)));
        assert_eq!(declared.get("mode"), Some(&ShaderParam::Int(0)));
        assert_eq!(
            declared.get("tint"),
            Some(&ShaderParam::FloatBuffer(vec![0.0; 4]))
        );
        assert!(matches!(
            declared.get("env_map"),
            Some(ShaderParam::Texture {
                kind: TextureKind::Cube,
                ..
            })
        ));
        assert!(declared.get("env_sampler").is_none());
    }

    #[test]
    fn test_stage_must_exist() {
        let err = ShaderProgram::from_source("test.wgsl", FRAGMENT, ShaderStage::Vertex).unwrap_err();
        assert!(matches!(err, RenderError::InvalidConfig(_)));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(ShaderProgram::from_source("bad.wgsl", "fn {", ShaderStage::Fragment).is_err());
    }
}
