//! Named uniform values bound to a material's custom shaders.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureKind {
    Texture2d,
    Cube,
}

/// Value of a single shader parameter.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ShaderParam {
    #[default]
    None,
    Float(f32),
    Int(i32),
    FloatBuffer(Vec<f32>),
    IntBuffer(Vec<i32>),
    Texture {
        path: String,
        kind: TextureKind,
    },
}

impl ShaderParam {
    /// Size in bytes of the value once packed for upload. Textures occupy no uniform space.
    pub fn byte_size(&self) -> usize {
        match self {
            ShaderParam::None | ShaderParam::Texture { .. } => 0,
            ShaderParam::Float(_) | ShaderParam::Int(_) => 4,
            ShaderParam::FloatBuffer(v) => v.len() * 4,
            ShaderParam::IntBuffer(v) => v.len() * 4,
        }
    }
}

/// Ordered, name-indexed set of shader parameters with change tracking.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShaderParams {
    params: Vec<(String, ShaderParam)>,
    dirty: bool,
}

impl ShaderParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ShaderParam> {
        self.params.iter().find(|(n, _)| n == name).map(|(_, p)| p)
    }

    /// Index-or-create: the entry named `name`, appended as [`ShaderParam::None`] if absent.
    pub fn get_or_create(&mut self, name: &str) -> &mut ShaderParam {
        self.dirty = true;
        let index = match self.params.iter().position(|(n, _)| n == name) {
            Some(index) => index,
            None => {
                self.params.push((name.to_string(), ShaderParam::None));
                self.params.len() - 1
            }
        };
        &mut self.params[index].1
    }

    pub fn set(&mut self, name: &str, value: ShaderParam) {
        *self.get_or_create(name) = value;
    }

    /// Overwrite the contents of a buffer parameter in place, keeping its element type.
    ///
    /// Returns false when `name` is missing or is not a float buffer.
    pub fn update_float_buffer(&mut self, name: &str, values: &[f32]) -> bool {
        match self.params.iter_mut().find(|(n, _)| n == name) {
            Some((_, ShaderParam::FloatBuffer(buffer))) => {
                buffer.clear();
                buffer.extend_from_slice(values);
                self.dirty = true;
                true
            }
            _ => false,
        }
    }

    pub fn update_int_buffer(&mut self, name: &str, values: &[i32]) -> bool {
        match self.params.iter_mut().find(|(n, _)| n == name) {
            Some((_, ShaderParam::IntBuffer(buffer))) => {
                buffer.clear();
                buffer.extend_from_slice(values);
                self.dirty = true;
                true
            }
            _ => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ShaderParam)> {
        self.params.iter().map(|(n, p)| (n.as_str(), p))
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Mark the current values as uploaded.
    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// Pack all numeric parameters in declaration order as little-endian 32-bit words.
    pub fn packed_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (_, param) in &self.params {
            match param {
                ShaderParam::Float(v) => out.extend_from_slice(bytemuck::bytes_of(v)),
                ShaderParam::Int(v) => out.extend_from_slice(bytemuck::bytes_of(v)),
                ShaderParam::FloatBuffer(v) => out.extend_from_slice(bytemuck::cast_slice(v)),
                ShaderParam::IntBuffer(v) => out.extend_from_slice(bytemuck::cast_slice(v)),
                ShaderParam::None | ShaderParam::Texture { .. } => {}
            }
        }
        out
    }
}
