//! Semantic and panoptic segmentation.
//!
//! Label maps are three channels per pixel:
//! * semantic: `[label, label, label]`
//! * panoptic: `[instance low byte, instance high byte, label]`
//!
//! Coloured maps replace each class (or class instance) with a stable colour
//! that [`SegmentationCamera::label_map_from_colored_buffer`] maps back.

use std::collections::{HashMap, HashSet};

use crate::backend::{FrameSnapshot, RenderTarget, TargetOutputs, ViewSetup};
use crate::camera::connection::{Connection, Signal};
use crate::camera::image::PixelFormat;
use crate::camera::{FrameCallback, FrameView};
use crate::scene::object::ObjectId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SegmentationType {
    #[default]
    Semantic,
    Panoptic,
}

pub struct SegmentationCamera {
    segmentation_type: SegmentationType,
    colored: bool,
    background_label: u8,
    background_color: [u8; 3],
    buffer: Vec<u8>,
    /// Label and instance number per owning visual.
    instances: HashMap<ObjectId, (u8, u16)>,
    colors: HashMap<(u8, u16), [u8; 3]>,
    color_to_label: HashMap<[u8; 3], (u8, u16)>,
    frames: Signal<FrameCallback<u8>>,
}

impl Default for SegmentationCamera {
    fn default() -> Self {
        Self {
            segmentation_type: SegmentationType::Semantic,
            colored: false,
            background_label: 0,
            background_color: [0, 0, 0],
            buffer: Vec::new(),
            instances: HashMap::new(),
            colors: HashMap::new(),
            color_to_label: HashMap::new(),
            frames: Signal::new(),
        }
    }
}

impl SegmentationCamera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn segmentation_type(&self) -> SegmentationType {
        self.segmentation_type
    }

    pub fn set_segmentation_type(&mut self, segmentation_type: SegmentationType) {
        self.segmentation_type = segmentation_type;
    }

    pub fn is_colored_map(&self) -> bool {
        self.colored
    }

    pub fn enable_colored_map(&mut self, colored: bool) {
        self.colored = colored;
    }

    pub fn background_label(&self) -> u8 {
        self.background_label
    }

    pub fn set_background_label(&mut self, label: u8) {
        self.background_label = label;
    }

    pub fn background_color(&self) -> [u8; 3] {
        self.background_color
    }

    /// Background colour of coloured maps. Colours already handed out to
    /// classes are re-assigned if they collide.
    pub fn set_background_color(&mut self, color: [u8; 3]) {
        self.background_color = color;
        self.colors.clear();
        self.color_to_label.clear();
    }

    /// Three-channel output of the last frame.
    pub fn segmentation_data(&self) -> &[u8] {
        &self.buffer
    }

    pub fn connect_new_segmentation_frame(
        &self,
        callback: impl for<'a> FnMut(FrameView<'a, u8>) + 'static,
    ) -> Connection {
        self.frames.connect(Box::new(callback))
    }

    pub(crate) fn outputs() -> TargetOutputs {
        TargetOutputs {
            color: false,
            depth: false,
            ids: true,
        }
    }

    pub(crate) fn supports(format: PixelFormat) -> bool {
        format == PixelFormat::Rgb8
    }

    /// Instance number of `owner` within `label`. A relabelled visual gets
    /// the lowest number not held by another visual of its new label.
    fn instance_of(&mut self, owner: ObjectId, label: u8) -> u16 {
        if let Some(&(known, instance)) = self.instances.get(&owner) {
            if known == label {
                return instance;
            }
        }
        let taken: HashSet<u16> = self
            .instances
            .iter()
            .filter(|(id, (known, _))| **id != owner && *known == label)
            .map(|(_, (_, instance))| *instance)
            .collect();
        let instance = (1..=u16::MAX)
            .find(|candidate| !taken.contains(candidate))
            .unwrap_or(u16::MAX);
        self.instances.insert(owner, (label, instance));
        instance
    }

    /// Forget visuals that left the scene along with their instance colours.
    fn prune(&mut self, frame: &FrameSnapshot) {
        self.instances.retain(|owner, _| frame.visuals.contains_key(owner));
        let live: HashSet<(u8, u16)> = self.instances.values().copied().collect();
        self.colors.retain(|key, _| key.1 == 0 || live.contains(key));
        self.color_to_label.retain(|_, key| key.1 == 0 || live.contains(&*key));
    }

    /// Stable colour for a class instance, unique among handed-out colours.
    fn color_of(&mut self, label: u8, instance: u16) -> [u8; 3] {
        if let Some(color) = self.colors.get(&(label, instance)) {
            return *color;
        }
        let mut seed = ((label as u64) << 16) | instance as u64;
        let color = loop {
            let bits = splitmix64(&mut seed);
            let candidate = [bits as u8, (bits >> 8) as u8, (bits >> 16) as u8];
            if candidate != self.background_color && !self.color_to_label.contains_key(&candidate)
            {
                break candidate;
            }
        };
        self.colors.insert((label, instance), color);
        self.color_to_label.insert(color, (label, instance));
        color
    }

    fn encode(&self, label: u8, instance: u16) -> [u8; 3] {
        match self.segmentation_type {
            SegmentationType::Semantic => [label, label, label],
            SegmentationType::Panoptic => {
                let [lo, hi] = instance.to_le_bytes();
                [lo, hi, label]
            }
        }
    }

    pub(crate) fn process(&mut self, frame: &FrameSnapshot, view: &ViewSetup, target: &RenderTarget) {
        self.prune(frame);
        let mut buffer = Vec::with_capacity(target.pixel_count() * 3);
        for id in &target.ids {
            let pixel = match frame.label_owner(ObjectId(*id)) {
                Some((owner, label)) => {
                    let label = label.clamp(0, u8::MAX as i64) as u8;
                    let instance = match self.segmentation_type {
                        SegmentationType::Semantic => 0,
                        SegmentationType::Panoptic => self.instance_of(owner, label),
                    };
                    if self.colored {
                        self.color_of(label, instance)
                    } else {
                        self.encode(label, instance)
                    }
                }
                None if self.colored => self.background_color,
                None => self.encode(self.background_label, 0),
            };
            buffer.extend_from_slice(&pixel);
        }
        self.buffer = buffer;

        let (width, height) = (view.width, view.height);
        self.frames.emit_with(|cb| {
            cb(FrameView {
                data: &self.buffer,
                width,
                height,
                channels: 3,
                format: PixelFormat::Rgb8,
            })
        });
    }

    /// Convert a coloured map produced by this camera back to a label map.
    /// Unknown colours read as background.
    pub fn label_map_from_colored_buffer(&self, colored: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(colored.len());
        for pixel in colored.chunks_exact(3) {
            let color = [pixel[0], pixel[1], pixel[2]];
            let (label, instance) = self
                .color_to_label
                .get(&color)
                .copied()
                .unwrap_or((self.background_label, 0));
            out.extend_from_slice(&self.encode(label, instance));
        }
        out
    }
}

fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
