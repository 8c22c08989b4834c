//! Texture loading and sampling

use std::path::Path;

use glam::{Vec2, Vec3, Vec4};
use image::{DynamicImage, GenericImageView};

use crate::error::{RenderError, RenderResult};

/// Decoded RGBA8 texture
#[derive(Debug, Clone, PartialEq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub name: String,
}

impl TextureData {
    /// Load texture from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> RenderResult<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        let img = image::open(path)
            .map_err(|e| RenderError::ResourceNotFound(format!("{}: {e}", path.display())))?;
        Ok(Self::from_image(img, &name))
    }

    /// Load texture from encoded bytes
    pub fn from_bytes(bytes: &[u8], name: &str) -> RenderResult<Self> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| RenderError::ResourceNotFound(format!("{name}: {e}")))?;
        Ok(Self::from_image(img, name))
    }

    fn from_image(img: DynamicImage, name: &str) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            data: img.to_rgba8().into_raw(),
            name: name.to_string(),
        }
    }

    /// Create a solid color texture
    pub fn solid_color(color: [u8; 4], name: &str) -> Self {
        Self {
            width: 1,
            height: 1,
            data: color.to_vec(),
            name: name.to_string(),
        }
    }

    pub fn white() -> Self {
        Self::solid_color([255, 255, 255, 255], "white")
    }

    /// Flat normal map (tangent-space +Z)
    pub fn default_normal() -> Self {
        Self::solid_color([128, 128, 255, 255], "default_normal")
    }

    /// Checkerboard with 8-pixel cells
    pub fn checkerboard(size: u32, color1: [u8; 4], color2: [u8; 4]) -> Self {
        let mut data = Vec::with_capacity((size * size * 4) as usize);
        for y in 0..size {
            for x in 0..size {
                let is_even = ((x / 8) + (y / 8)) % 2 == 0;
                data.extend_from_slice(if is_even { &color1 } else { &color2 });
            }
        }
        Self {
            width: size,
            height: size,
            data,
            name: "checkerboard".to_string(),
        }
    }

    /// Nearest-neighbour lookup with wrapping UVs; returns linear `[0, 1]` RGBA.
    pub fn sample(&self, uv: Vec2) -> Vec4 {
        if self.width == 0 || self.height == 0 {
            return Vec4::ONE;
        }
        let u = uv.x - uv.x.floor();
        let v = uv.y - uv.y.floor();
        let x = ((u * self.width as f32) as u32).min(self.width - 1);
        let y = ((v * self.height as f32) as u32).min(self.height - 1);
        let i = ((y * self.width + x) * 4) as usize;
        Vec4::new(
            self.data[i] as f32,
            self.data[i + 1] as f32,
            self.data[i + 2] as f32,
            self.data[i + 3] as f32,
        ) / 255.0
    }

    /// Decode a tangent-space normal sample into `[-1, 1]`.
    pub fn sample_normal(&self, uv: Vec2) -> Vec3 {
        let s = self.sample(uv);
        (Vec3::new(s.x, s.y, s.z) * 2.0 - Vec3::ONE).normalize_or_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_wraps() {
        let tex = TextureData::checkerboard(16, [255, 0, 0, 255], [0, 0, 255, 255]);
        let a = tex.sample(Vec2::new(0.1, 0.1));
        let b = tex.sample(Vec2::new(1.1, 1.1));
        assert_eq!(a, b);
        assert_eq!(a, Vec4::new(1.0, 0.0, 0.0, 1.0));
        assert_eq!(tex.sample(Vec2::new(0.75, 0.1)).z, 1.0);
    }

    #[test]
    fn test_default_normal_points_out() {
        let n = TextureData::default_normal().sample_normal(Vec2::ZERO);
        assert!(n.z > 0.99);
    }

    #[test]
    fn test_missing_file_is_resource_error() {
        let err = TextureData::from_file("/definitely/not/here.png").unwrap_err();
        assert!(matches!(err, RenderError::ResourceNotFound(_)));
    }

    #[test]
    fn test_roundtrip_through_png_bytes() {
        let mut bytes = Vec::new();
        let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([10, 20, 30, 255]));
        DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageOutputFormat::Png)
            .unwrap();
        let tex = TextureData::from_bytes(&bytes, "tiny").unwrap();
        assert_eq!((tex.width, tex.height), (2, 2));
        assert_eq!(&tex.data[..4], &[10, 20, 30, 255]);
    }
}
