//! CPU-side image buffers returned by camera captures.

use std::path::Path;

use bytemuck::Pod;

use crate::error::{RenderError, RenderResult};

/// Pixel layout of an [`Image`] or camera output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    #[default]
    Rgb8,
    Bgr8,
    L8,
    L16,
    Float32,
    /// Point cloud layout: x, y, z and packed RGBA stored as f32 bits.
    Float32Rgba,
}

impl PixelFormat {
    pub fn channels(self) -> u32 {
        match self {
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
            PixelFormat::L8 | PixelFormat::L16 | PixelFormat::Float32 => 1,
            PixelFormat::Float32Rgba => 4,
        }
    }

    pub fn bytes_per_channel(self) -> u32 {
        match self {
            PixelFormat::Rgb8 | PixelFormat::Bgr8 | PixelFormat::L8 => 1,
            PixelFormat::L16 => 2,
            PixelFormat::Float32 | PixelFormat::Float32Rgba => 4,
        }
    }

    pub fn bytes_per_pixel(self) -> u32 {
        self.channels() * self.bytes_per_channel()
    }

    /// Format string carried in frame callbacks.
    pub fn as_str(self) -> &'static str {
        match self {
            PixelFormat::Rgb8 => "R8G8B8",
            PixelFormat::Bgr8 => "B8G8R8",
            PixelFormat::L8 => "L8",
            PixelFormat::L16 => "L16",
            PixelFormat::Float32 => "FLOAT32",
            PixelFormat::Float32Rgba => "PF_FLOAT32_RGBA",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "R8G8B8" => PixelFormat::Rgb8,
            "B8G8R8" => PixelFormat::Bgr8,
            "L8" => PixelFormat::L8,
            "L16" => PixelFormat::L16,
            "FLOAT32" => PixelFormat::Float32,
            "PF_FLOAT32_RGBA" => PixelFormat::Float32Rgba,
            _ => return None,
        })
    }
}

/// Tightly packed image with row-major pixels.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Image {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

impl Image {
    /// Zero-filled image.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let size = width as usize * height as usize * format.bytes_per_pixel() as usize;
        Self {
            width,
            height,
            format,
            data: vec![0; size],
        }
    }

    /// Wrap existing pixel data, converting to bytes.
    pub fn from_pixels<T: Pod>(width: u32, height: u32, format: PixelFormat, pixels: &[T]) -> Self {
        let mut image = Self::new(width, height, format);
        let bytes: &[u8] = bytemuck::cast_slice(pixels);
        let n = bytes.len().min(image.data.len());
        image.data[..n].copy_from_slice(&bytes[..n]);
        image
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Copy of the buffer as typed values (`u16` for L16, `f32` for float formats).
    pub fn pixels<T: Pod>(&self) -> Vec<T> {
        bytemuck::pod_collect_to_vec(&self.data)
    }

    /// Raw bytes of the pixel at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let bpp = self.format.bytes_per_pixel() as usize;
        let i = (y as usize * self.width as usize + x as usize) * bpp;
        &self.data[i..i + bpp]
    }

    /// Write the image to disk; the encoder is chosen from the file extension.
    pub fn save(&self, path: impl AsRef<Path>) -> RenderResult<()> {
        let path = path.as_ref();
        let (buffer, color) = match self.format {
            PixelFormat::Rgb8 => (self.data.clone(), image::ColorType::Rgb8),
            PixelFormat::Bgr8 => (
                self.data
                    .chunks_exact(3)
                    .flat_map(|p| [p[2], p[1], p[0]])
                    .collect(),
                image::ColorType::Rgb8,
            ),
            PixelFormat::L8 => (self.data.clone(), image::ColorType::L8),
            PixelFormat::L16 => (self.data.clone(), image::ColorType::L16),
            PixelFormat::Float32 | PixelFormat::Float32Rgba => {
                return Err(RenderError::InvalidConfig(format!(
                    "cannot save {} image as {}",
                    self.format.as_str(),
                    path.display()
                )))
            }
        };
        image::save_buffer(path, &buffer, self.width, self.height, color)
            .map_err(|e| RenderError::InvalidConfig(format!("{}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_sizes() {
        assert_eq!(PixelFormat::Rgb8.bytes_per_pixel(), 3);
        assert_eq!(PixelFormat::L16.bytes_per_pixel(), 2);
        assert_eq!(PixelFormat::Float32Rgba.bytes_per_pixel(), 16);
        assert_eq!(PixelFormat::parse("FLOAT32"), Some(PixelFormat::Float32));
        assert_eq!(PixelFormat::parse("RGBA"), None);
    }

    #[test]
    fn test_typed_pixels() {
        let image = Image::from_pixels(2, 1, PixelFormat::Float32, &[1.5f32, -2.0]);
        assert_eq!(image.data().len(), 8);
        assert_eq!(image.pixels::<f32>(), vec![1.5, -2.0]);
    }

    #[test]
    fn test_save_png() {
        let mut image = Image::new(2, 2, PixelFormat::Rgb8);
        image.data_mut()[0] = 255;
        let path = std::env::temp_dir().join("prism_render_image_test.png");
        image.save(&path).unwrap();
        let decoded = image::open(&path).unwrap().to_rgb8();
        assert_eq!(decoded.get_pixel(0, 0).0, [255, 0, 0]);
    }
}
