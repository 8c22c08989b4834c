//! Thermal camera post-processing.
//!
//! Temperatures come from the `temperature` user data of the nearest tagged
//! visual. Untagged surfaces sit within the ambient range, offset by their
//! brightness, and background pixels read the ambient temperature.

use crate::backend::{FrameSnapshot, RenderTarget, TargetOutputs, ViewSetup};
use crate::camera::connection::{Connection, Signal};
use crate::camera::image::PixelFormat;
use crate::camera::{FrameCallback, FrameView};
use crate::scene::object::ObjectId;

pub struct ThermalCamera {
    ambient: f64,
    ambient_range: f64,
    heat_source_range: f64,
    min_temperature: f64,
    max_temperature: f64,
    resolution: f64,
    raw: Vec<u16>,
    thermal_frames: Signal<FrameCallback<u16>>,
}

impl Default for ThermalCamera {
    fn default() -> Self {
        Self {
            ambient: 288.15,
            ambient_range: 0.0,
            heat_source_range: 0.0,
            min_temperature: 0.0,
            max_temperature: u16::MAX as f64 * 0.01,
            resolution: 0.01,
            raw: Vec::new(),
            thermal_frames: Signal::new(),
        }
    }
}

impl ThermalCamera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ambient_temperature(&self) -> f64 {
        self.ambient
    }

    pub fn set_ambient_temperature(&mut self, kelvin: f64) {
        self.ambient = kelvin;
    }

    pub fn ambient_temperature_range(&self) -> f64 {
        self.ambient_range
    }

    pub fn set_ambient_temperature_range(&mut self, range: f64) {
        self.ambient_range = range.max(0.0);
    }

    pub fn heat_source_temperature_range(&self) -> f64 {
        self.heat_source_range
    }

    pub fn set_heat_source_temperature_range(&mut self, range: f64) {
        self.heat_source_range = range.max(0.0);
    }

    pub fn min_temperature(&self) -> f64 {
        self.min_temperature
    }

    pub fn max_temperature(&self) -> f64 {
        self.max_temperature
    }

    /// Clamp range for reported temperatures. Rejected when `min > max`.
    pub fn set_temperature_limits(&mut self, min: f64, max: f64) -> bool {
        if min > max {
            log::warn!("Ignoring thermal limits: min {min} K exceeds max {max} K");
            return false;
        }
        self.min_temperature = min;
        self.max_temperature = max;
        true
    }

    /// Kelvin per raw unit.
    pub fn linear_resolution(&self) -> f64 {
        self.resolution
    }

    pub fn set_linear_resolution(&mut self, resolution: f64) -> bool {
        if !(resolution > 0.0) {
            log::warn!("Ignoring non-positive thermal resolution {resolution}");
            return false;
        }
        self.resolution = resolution;
        true
    }

    /// Raw temperature buffer of the last frame.
    pub fn thermal_data(&self) -> &[u16] {
        &self.raw
    }

    pub fn connect_new_thermal_frame(
        &self,
        callback: impl for<'a> FnMut(FrameView<'a, u16>) + 'static,
    ) -> Connection {
        self.thermal_frames.connect(Box::new(callback))
    }

    pub(crate) fn outputs() -> TargetOutputs {
        TargetOutputs {
            color: true,
            depth: false,
            ids: true,
        }
    }

    pub(crate) fn supports(format: PixelFormat) -> bool {
        matches!(
            format,
            PixelFormat::L16 | PixelFormat::L8 | PixelFormat::Rgb8
        )
    }

    /// Temperature in kelvin for one rendered pixel.
    fn temperature(&self, frame: &FrameSnapshot, id: u32, rgb: [u8; 3]) -> f64 {
        if id == 0 {
            return self.ambient;
        }
        let luminance =
            (0.2126 * rgb[0] as f64 + 0.7152 * rgb[1] as f64 + 0.0722 * rgb[2] as f64) / 255.0;
        match frame.temperature_of(ObjectId(id)) {
            Some(kelvin) => kelvin + self.heat_source_range * (luminance - 0.5),
            None => self.ambient + self.ambient_range * (luminance - 0.5),
        }
    }

    pub(crate) fn process(&mut self, frame: &FrameSnapshot, view: &ViewSetup, target: &RenderTarget) {
        let raw: Vec<u16> = (0..target.pixel_count())
            .map(|i| {
                let rgb = [target.color[i * 3], target.color[i * 3 + 1], target.color[i * 3 + 2]];
                let kelvin = self
                    .temperature(frame, target.ids[i], rgb)
                    .clamp(self.min_temperature, self.max_temperature);
                (kelvin / self.resolution).round().clamp(0.0, u16::MAX as f64) as u16
            })
            .collect();
        self.raw = raw;

        let (width, height) = (view.width, view.height);
        self.thermal_frames.emit_with(|cb| {
            cb(FrameView {
                data: &self.raw,
                width,
                height,
                channels: 1,
                format: PixelFormat::L16,
            })
        });
    }
}

/// Stretch a raw thermal frame to 8 bits using its own min/max.
///
/// A frame with a single temperature maps to all zeros.
pub fn thermal_to_grayscale(raw: &[u16]) -> Vec<u8> {
    let Some(min) = raw.iter().copied().min() else {
        return Vec::new();
    };
    let max = raw.iter().copied().max().unwrap_or(min);
    let range = (max - min) as f64;
    raw.iter()
        .map(|v| (255.0 * (*v - min) as f64 / range.max(f64::EPSILON)).round() as u8)
        .collect()
}
