//! Object identity shared by every scene-owned entity.

use std::fmt;

/// Scene-unique object identifier. `0` is reserved for "none" and is the
/// value written to id buffers for background pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ObjectId(pub u32);

impl ObjectId {
    pub const NONE: Self = Self(0);

    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<ObjectId> for u32 {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

/// What an id refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Visual,
    Light,
    Camera,
    Material,
    GlobalIllumination,
}

impl ObjectKind {
    /// Whether objects of this kind take part in the node graph.
    pub fn is_node(self) -> bool {
        matches!(self, Self::Visual | Self::Light | Self::Camera)
    }

    /// Prefix used for generated names.
    pub fn name_prefix(self) -> &'static str {
        match self {
            Self::Visual => "visual",
            Self::Light => "light",
            Self::Camera => "camera",
            Self::Material => "material",
            Self::GlobalIllumination => "gi",
        }
    }
}

/// Value stored in a visual's user data map.
#[derive(Debug, Clone, PartialEq)]
pub enum Variant {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
}

impl Variant {
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Variant::Int(v) => Some(v as f64),
            Variant::UInt(v) => Some(v as f64),
            Variant::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Variant::Int(v) => Some(v),
            Variant::UInt(v) => i64::try_from(v).ok(),
            Variant::Float(v) if v.fract() == 0.0 => Some(v as i64),
            Variant::Bool(v) => Some(v as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Variant::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for Variant {
    fn from(v: bool) -> Self {
        Variant::Bool(v)
    }
}

impl From<i32> for Variant {
    fn from(v: i32) -> Self {
        Variant::Int(v as i64)
    }
}

impl From<i64> for Variant {
    fn from(v: i64) -> Self {
        Variant::Int(v)
    }
}

impl From<u32> for Variant {
    fn from(v: u32) -> Self {
        Variant::UInt(v as u64)
    }
}

impl From<f32> for Variant {
    fn from(v: f32) -> Self {
        Variant::Float(v as f64)
    }
}

impl From<f64> for Variant {
    fn from(v: f64) -> Self {
        Variant::Float(v)
    }
}

impl From<&str> for Variant {
    fn from(v: &str) -> Self {
        Variant::String(v.to_string())
    }
}

impl From<String> for Variant {
    fn from(v: String) -> Self {
        Variant::String(v)
    }
}
