//! Resource management (meshes, textures, materials, shaders)

pub mod material;
pub mod mesh;
pub mod paths;
pub mod shader;
pub mod shader_params;
pub mod texture;

pub use material::*;
pub use mesh::*;
pub use paths::{ResourceLocator, SearchPaths, RESOURCE_PATH_ENV};
pub use shader::{ShaderProgram, ShaderStage};
pub use shader_params::{ShaderParam, ShaderParams, TextureKind};
pub use texture::*;
