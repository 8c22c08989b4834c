//! wgpu backend implementation
//!
//! Offscreen rasterizer: every render draws the frame into colour, linear
//! depth and id attachments and copies them back into the [`RenderTarget`].
//! Textures, shadows, transparency and baked indirect light are only
//! produced by the ray tracer.

use std::collections::{HashMap, HashSet};
use std::sync::{mpsc, Arc};

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};
use wgpu::util::DeviceExt;

use crate::backend::extract::{ExtractedItem, ExtractedLight};
use crate::backend::{
    BackendError, BackendResult, FrameSnapshot, RenderBackend, RenderTarget, ViewSetup,
};
use crate::resources::{Mesh, Vertex};
use crate::scene::light::LightKind;
use crate::{EngineConfig, GpuApi};

const SHADER: &str = include_str!("scene.wgsl");

/// Lights beyond this count are ignored by the rasterizer.
pub const MAX_LIGHTS: usize = 8;

const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;
const ID_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Uint;
const DEPTH_BUFFER_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Every attachment is four bytes per texel.
const TEXEL_BYTES: u32 = 4;

const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 3] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
struct GpuLight {
    position: Vec4,
    direction: Vec4,
    color: Vec4,
    specular: Vec4,
    attenuation: Vec4,
    cone: Vec4,
}

impl GpuLight {
    fn from_extracted(extracted: &ExtractedLight) -> Self {
        let light = &extracted.light;
        let direction = light
            .world_direction(&extracted.pose)
            .unwrap_or(glam::DVec3::ZERO)
            .as_vec3();
        let (kind, cone) = match light.kind {
            LightKind::Directional { .. } => (0.0, Vec4::ZERO),
            LightKind::Point => (1.0, Vec4::ZERO),
            LightKind::Spot {
                inner_angle,
                outer_angle,
                falloff,
                ..
            } => (
                2.0,
                Vec4::new(
                    (inner_angle.radians() * 0.5) as f32,
                    (outer_angle.radians() * 0.5) as f32,
                    falloff as f32,
                    0.0,
                ),
            ),
        };
        Self {
            position: extracted.pose.position.as_vec3().extend(kind),
            direction: direction.extend(0.0),
            color: light.diffuse.to_vec3().extend(light.intensity as f32),
            specular: light.specular.to_vec3().extend(0.0),
            attenuation: Vec4::new(
                light.attenuation_constant as f32,
                light.attenuation_linear as f32,
                light.attenuation_quadratic as f32,
                light.range.min(f32::MAX as f64) as f32,
            ),
            cone,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct FrameUniforms {
    view_proj: Mat4,
    camera_position: Vec4,
    camera_forward: Vec4,
    ambient: Vec4,
    light_count: [u32; 4],
    lights: [GpuLight; MAX_LIGHTS],
}

impl FrameUniforms {
    fn new(frame: &FrameSnapshot, view: &ViewSetup) -> Self {
        let mut lights = [GpuLight::default(); MAX_LIGHTS];
        if frame.lights.len() > MAX_LIGHTS {
            log::warn!(
                "WgpuBackend: {} lights in frame, only the first {MAX_LIGHTS} are used",
                frame.lights.len()
            );
        }
        let count = frame.lights.len().min(MAX_LIGHTS);
        for (slot, light) in lights.iter_mut().zip(&frame.lights) {
            *slot = GpuLight::from_extracted(light);
        }
        Self {
            view_proj: (view.projection_matrix() * view.view_matrix()).as_mat4(),
            camera_position: view.pose.position.as_vec3().extend(1.0),
            camera_forward: view.pose.forward().as_vec3().extend(0.0),
            ambient: frame.ambient.to_vec3().extend(1.0),
            light_count: [count as u32, 0, 0, 0],
            lights,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ObjectUniforms {
    model: Mat4,
    normal_matrix: Mat4,
    diffuse: Vec4,
    ambient: Vec4,
    specular: Vec4,
    emissive: Vec4,
    id: [u32; 4],
}

impl ObjectUniforms {
    fn new(item: &ExtractedItem) -> Self {
        let model = item.world.matrix();
        let material = &item.material;
        Self {
            model: model.as_mat4(),
            normal_matrix: model.inverse().transpose().as_mat4(),
            diffuse: material.diffuse.extend(1.0 - material.transparency),
            ambient: material.ambient.extend(0.0),
            specular: material.specular.extend(material.shininess),
            emissive: material
                .emissive
                .extend(if material.lighting { 1.0 } else { 0.0 }),
            id: [item.visual.raw(), 0, 0, 0],
        }
    }
}

/// Bytes per row rounded up to the copy alignment.
fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * TEXEL_BYTES;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

fn backends_for(api: GpuApi) -> wgpu::Backends {
    match api {
        GpuApi::Auto => wgpu::Backends::all(),
        GpuApi::Vulkan => wgpu::Backends::VULKAN,
        GpuApi::Metal => wgpu::Backends::METAL,
        GpuApi::Dx12 => wgpu::Backends::DX12,
        GpuApi::Gl => wgpu::Backends::GL,
    }
}

/// Geometry uploaded once per mesh and kept while frames keep using it.
struct MeshBuffers {
    // Held so the pointer key cannot be reused by another mesh.
    _mesh: Arc<Mesh>,
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
    index_count: u32,
}

/// Render attachments plus their readback buffers for one resolution.
struct Attachments {
    width: u32,
    height: u32,
    color: wgpu::Texture,
    depth: wgpu::Texture,
    ids: wgpu::Texture,
    depth_buffer: wgpu::TextureView,
    readback: [wgpu::Buffer; 3],
}

impl Attachments {
    fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = |label: &str, format: wgpu::TextureFormat, usage: wgpu::TextureUsages| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage,
                view_formats: &[],
            })
        };
        let copyable = wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC;
        let depth_buffer = texture(
            "Depth Buffer",
            DEPTH_BUFFER_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT,
        )
        .create_view(&wgpu::TextureViewDescriptor::default());

        let readback_size = padded_bytes_per_row(width) as u64 * height as u64;
        let readback = |label: &str| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: readback_size,
                usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                mapped_at_creation: false,
            })
        };

        Self {
            width,
            height,
            color: texture("Color Attachment", COLOR_FORMAT, copyable),
            depth: texture("Linear Depth Attachment", DEPTH_FORMAT, copyable),
            ids: texture("Id Attachment", ID_FORMAT, copyable),
            depth_buffer,
            readback: [
                readback("Color Readback"),
                readback("Depth Readback"),
                readback("Id Readback"),
            ],
        }
    }

    fn textures(&self) -> [&wgpu::Texture; 3] {
        [&self.color, &self.depth, &self.ids]
    }
}

struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::RenderPipeline,
    frame_layout: wgpu::BindGroupLayout,
    object_layout: wgpu::BindGroupLayout,
    attachments: Option<Attachments>,
    meshes: HashMap<usize, MeshBuffers>,
}

impl GpuContext {
    async fn new(config: &EngineConfig) -> BackendResult<Self> {
        if !config.headless {
            log::warn!("WgpuBackend renders offscreen only; ignoring headless=false");
        }
        if config.use_current_context {
            log::warn!("WgpuBackend cannot share a host context; creating its own device");
        }

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: backends_for(config.gpu_api),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| {
                BackendError::InitializationFailed(format!(
                    "No suitable adapter found for {:?}",
                    config.gpu_api
                ))
            })?;

        let adapter_info = adapter.get_info();
        log::info!(
            "Selected GPU: {} ({:?} backend)",
            adapter_info.name,
            adapter_info.backend
        );

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Render Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults()
                        .using_resolution(adapter.limits()),
                },
                None,
            )
            .await
            .map_err(|e| BackendError::DeviceCreationFailed(e.to_string()))?;

        let uniform_layout = |label: &str| {
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(label),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            })
        };
        let frame_layout = uniform_layout("Frame Layout");
        let object_layout = uniform_layout("Object Layout");
        let pipeline = create_pipeline(&device, &frame_layout, &object_layout);

        Ok(Self {
            device,
            queue,
            pipeline,
            frame_layout,
            object_layout,
            attachments: None,
            meshes: HashMap::new(),
        })
    }

    fn uniform_bind_group(
        &self,
        layout: &wgpu::BindGroupLayout,
        label: &str,
        contents: &[u8],
    ) -> wgpu::BindGroup {
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage: wgpu::BufferUsages::UNIFORM,
            });
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        })
    }

    /// Upload meshes that are new this frame and drop the ones no longer drawn.
    fn sync_meshes(&mut self, frame: &FrameSnapshot) {
        let mut used = HashSet::new();
        for item in &frame.items {
            let key = Arc::as_ptr(&item.mesh) as usize;
            used.insert(key);
            if self.meshes.contains_key(&key) || item.mesh.indices.is_empty() {
                continue;
            }
            let vertices = self
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(item.mesh.name.as_str()),
                    contents: item.mesh.vertex_bytes(),
                    usage: wgpu::BufferUsages::VERTEX,
                });
            let indices = self
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(item.mesh.name.as_str()),
                    contents: item.mesh.index_bytes(),
                    usage: wgpu::BufferUsages::INDEX,
                });
            self.meshes.insert(
                key,
                MeshBuffers {
                    _mesh: item.mesh.clone(),
                    vertices,
                    indices,
                    index_count: item.mesh.indices.len() as u32,
                },
            );
        }
        self.meshes.retain(|key, _| used.contains(key));
    }

    fn render(
        &mut self,
        frame: &FrameSnapshot,
        view: &ViewSetup,
        target: &mut RenderTarget,
    ) -> BackendResult<()> {
        let (width, height) = (target.width(), target.height());
        if width == 0 || height == 0 {
            return Ok(());
        }
        if self
            .attachments
            .as_ref()
            .map_or(true, |a| a.width != width || a.height != height)
        {
            log::debug!("WgpuBackend: allocating {width}x{height} attachments");
            self.attachments = Some(Attachments::new(&self.device, width, height));
        }
        self.sync_meshes(frame);

        let frame_uniforms = FrameUniforms::new(frame, view);
        let frame_group = self.uniform_bind_group(
            &self.frame_layout,
            "Frame Uniforms",
            bytemuck::bytes_of(&frame_uniforms),
        );
        let draws: Vec<(wgpu::BindGroup, &MeshBuffers)> = frame
            .items
            .iter()
            .filter_map(|item| {
                let mesh = self.meshes.get(&(Arc::as_ptr(&item.mesh) as usize))?;
                let uniforms = ObjectUniforms::new(item);
                let group = self.uniform_bind_group(
                    &self.object_layout,
                    "Object Uniforms",
                    bytemuck::bytes_of(&uniforms),
                );
                Some((group, mesh))
            })
            .collect();

        let attachments = self
            .attachments
            .as_ref()
            .ok_or(BackendError::NotInitialized)?;
        let views = attachments
            .textures()
            .map(|t| t.create_view(&wgpu::TextureViewDescriptor::default()));

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Scene Encoder"),
            });
        {
            let background = frame.background;
            let attachment = |view, clear| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear),
                        store: wgpu::StoreOp::Store,
                    },
                })
            };
            let color_attachments = [
                attachment(
                    &views[0],
                    wgpu::Color {
                        r: background.r as f64,
                        g: background.g as f64,
                        b: background.b as f64,
                        a: 1.0,
                    },
                ),
                attachment(&views[1], wgpu::Color::TRANSPARENT),
                attachment(&views[2], wgpu::Color::TRANSPARENT),
            ];
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Pass"),
                color_attachments: &color_attachments,
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &attachments.depth_buffer,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Discard,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &frame_group, &[]);
            for (group, mesh) in &draws {
                pass.set_bind_group(1, group, &[]);
                pass.set_vertex_buffer(0, mesh.vertices.slice(..));
                pass.set_index_buffer(mesh.indices.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..mesh.index_count, 0, 0..1);
            }
        }

        let padded = padded_bytes_per_row(width);
        for (texture, buffer) in attachments.textures().into_iter().zip(&attachments.readback) {
            encoder.copy_texture_to_buffer(
                wgpu::ImageCopyTexture {
                    texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::ImageCopyBuffer {
                    buffer,
                    layout: wgpu::ImageDataLayout {
                        offset: 0,
                        bytes_per_row: Some(padded),
                        rows_per_image: Some(height),
                    },
                },
                wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
            );
        }
        self.queue.submit(std::iter::once(encoder.finish()));

        let [color, depth, ids] = read_back(&self.device, &attachments.readback, width, height)?;
        write_target(target, view, frame, &color, &depth, &ids);
        Ok(())
    }
}

fn create_pipeline(
    device: &wgpu::Device,
    frame_layout: &wgpu::BindGroupLayout,
    object_layout: &wgpu::BindGroupLayout,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Scene Shader"),
        source: wgpu::ShaderSource::Wgsl(SHADER.into()),
    });
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Scene Pipeline Layout"),
        bind_group_layouts: &[frame_layout, object_layout],
        push_constant_ranges: &[],
    });
    let target = |format| {
        Some(wgpu::ColorTargetState {
            format,
            blend: None,
            write_mask: wgpu::ColorWrites::ALL,
        })
    };

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("Scene Pipeline"),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: "vs_main",
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &VERTEX_ATTRIBUTES,
            }],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: "fs_main",
            targets: &[target(COLOR_FORMAT), target(DEPTH_FORMAT), target(ID_FORMAT)],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        // Meshes are not consistently wound; both faces are drawn and the
        // shader flips normals toward the viewer.
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: None,
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_BUFFER_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
    })
}

/// Map the readback buffers and strip row padding.
fn read_back(
    device: &wgpu::Device,
    buffers: &[wgpu::Buffer; 3],
    width: u32,
    height: u32,
) -> BackendResult<[Vec<u8>; 3]> {
    let (sender, receiver) = mpsc::channel();
    for (i, buffer) in buffers.iter().enumerate() {
        let sender = sender.clone();
        buffer
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                let _ = sender.send((i, result));
            });
    }
    drop(sender);
    device.poll(wgpu::Maintain::Wait);

    for _ in 0..buffers.len() {
        let (i, result) = receiver
            .recv()
            .map_err(|e| BackendError::ReadbackFailed(e.to_string()))?;
        result.map_err(|e| BackendError::ReadbackFailed(format!("buffer {i}: {e}")))?;
    }

    let padded = padded_bytes_per_row(width) as usize;
    let row = (width * TEXEL_BYTES) as usize;
    let unpad = |buffer: &wgpu::Buffer| {
        let mapped = buffer.slice(..).get_mapped_range();
        let mut texels = Vec::with_capacity(row * height as usize);
        for y in 0..height as usize {
            texels.extend_from_slice(&mapped[y * padded..y * padded + row]);
        }
        drop(mapped);
        buffer.unmap();
        texels
    };
    Ok([unpad(&buffers[0]), unpad(&buffers[1]), unpad(&buffers[2])])
}

/// Copy tightly packed attachment texels into the target, honouring the
/// requested outputs.
fn write_target(
    target: &mut RenderTarget,
    view: &ViewSetup,
    frame: &FrameSnapshot,
    color: &[u8],
    depth: &[u8],
    ids: &[u8],
) {
    target.clear(frame.background);
    let texels = color
        .chunks_exact(4)
        .zip(depth.chunks_exact(4))
        .zip(ids.chunks_exact(4))
        .enumerate();
    for (i, ((rgba, depth), id)) in texels {
        let id = u32::from_le_bytes([id[0], id[1], id[2], id[3]]);
        if id == 0 {
            continue;
        }
        if view.outputs.color {
            target.color[i * 3..i * 3 + 3].copy_from_slice(&rgba[..3]);
        }
        if view.outputs.depth {
            target.depth[i] = f32::from_le_bytes([depth[0], depth[1], depth[2], depth[3]]);
        }
        if view.outputs.ids {
            target.ids[i] = id;
        }
    }
}

/// Offscreen GPU rasterizer.
#[derive(Default)]
pub struct WgpuBackend {
    context: Option<GpuContext>,
}

impl WgpuBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RenderBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn init(&mut self, config: &EngineConfig) -> BackendResult<()> {
        if self.context.is_some() {
            return Ok(());
        }
        self.context = Some(pollster::block_on(GpuContext::new(config))?);
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.context.is_some()
    }

    fn render(
        &mut self,
        frame: &FrameSnapshot,
        view: &ViewSetup,
        target: &mut RenderTarget,
    ) -> BackendResult<()> {
        let context = self.context.as_mut().ok_or(BackendError::NotInitialized)?;
        context.render(frame, view, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::extract::ExtractedMaterial;
    use crate::math::{Color, Pose};
    use crate::resources::Material;
    use crate::scene::light::Light;
    use crate::scene::object::ObjectId;
    use glam::DVec3;

    /// A device, or `None` on machines without a usable adapter.
    fn gpu_backend() -> Option<WgpuBackend> {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut backend = WgpuBackend::new();
        match backend.init(&EngineConfig::default()) {
            Ok(()) => Some(backend),
            Err(err) => {
                log::warn!("Skipping GPU test: {err}");
                None
            }
        }
    }

    fn cube_frame(material: Material) -> FrameSnapshot {
        FrameSnapshot {
            items: vec![ExtractedItem {
                visual: ObjectId(7),
                mesh: Arc::new(Mesh::cube()),
                world: Pose::from_xyz(3.0, 0.0, 0.0),
                material: Arc::new(ExtractedMaterial::from_material(&material)),
                is_static: false,
            }],
            lights: vec![ExtractedLight {
                id: ObjectId(1),
                light: Light::directional(DVec3::new(1.0, 0.0, -0.2)),
                pose: Pose::IDENTITY,
            }],
            ambient: Color::rgb(0.1, 0.1, 0.1),
            background: Color::BLUE,
            ..Default::default()
        }
    }

    #[test]
    fn test_shader_validates() {
        let module = naga::front::wgsl::parse_str(SHADER).unwrap();
        let mut validator = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        );
        validator.validate(&module).unwrap();
        let stages: Vec<_> = module.entry_points.iter().map(|ep| ep.stage).collect();
        assert!(stages.contains(&naga::ShaderStage::Vertex));
        assert!(stages.contains(&naga::ShaderStage::Fragment));
    }

    #[test]
    fn test_uniform_layout_matches_shader() {
        assert_eq!(std::mem::size_of::<GpuLight>(), 96);
        assert_eq!(std::mem::size_of::<FrameUniforms>(), 128 + 96 * MAX_LIGHTS);
        assert_eq!(std::mem::size_of::<ObjectUniforms>(), 208);
    }

    #[test]
    fn test_rows_are_padded_to_copy_alignment() {
        assert_eq!(padded_bytes_per_row(1), 256);
        assert_eq!(padded_bytes_per_row(64), 256);
        assert_eq!(padded_bytes_per_row(65), 512);
    }

    #[test]
    fn test_render_requires_init() {
        let mut backend = WgpuBackend::new();
        let view = ViewSetup::new(Pose::IDENTITY, 4, 4, 1.0);
        let mut target = RenderTarget::new(4, 4);
        assert_eq!(
            backend.render(&FrameSnapshot::default(), &view, &mut target),
            Err(BackendError::NotInitialized)
        );
    }

    #[test]
    fn test_background_pixels_are_misses() {
        let frame = cube_frame(Material::default());
        let view = ViewSetup::new(Pose::IDENTITY, 4, 4, 1.0);
        let mut target = RenderTarget::new(4, 4);
        let color = vec![9u8; 64];
        let depth = vec![0u8; 64];
        let ids = vec![0u8; 64];
        write_target(&mut target, &view, &frame, &color, &depth, &ids);
        assert_eq!(target.color_at(2, 2), [0, 0, 255]);
        assert!(target.depth_at(2, 2).is_infinite());
        assert_eq!(target.id_at(2, 2), 0);
    }

    #[test]
    fn test_center_pixel_sees_cube() {
        let Some(mut backend) = gpu_backend() else {
            return;
        };
        let frame = cube_frame(Material::plastic(Color::RED));
        let view = ViewSetup::new(Pose::IDENTITY, 9, 9, std::f64::consts::FRAC_PI_2);
        let mut target = RenderTarget::new(9, 9);
        backend.render(&frame, &view, &mut target).unwrap();

        assert_eq!(target.id_at(4, 4), 7);
        assert!((target.depth_at(4, 4) - 2.5).abs() < 1e-3);
        let [r, g, b] = target.color_at(4, 4);
        assert!(r > g && r > b);
        assert_eq!(target.id_at(0, 0), 0);
        assert!(target.depth_at(0, 0).is_infinite());
        assert_eq!(target.color_at(0, 0), [0, 0, 255]);
    }

    #[test]
    fn test_resize_reallocates_attachments() {
        let Some(mut backend) = gpu_backend() else {
            return;
        };
        let frame = cube_frame(Material::emissive(Color::GREEN));
        for (width, height) in [(9, 9), (33, 17)] {
            let view = ViewSetup::new(Pose::IDENTITY, width, height, 1.0);
            let mut target = RenderTarget::new(width, height);
            backend.render(&frame, &view, &mut target).unwrap();
            assert_eq!(target.id_at(width / 2, height / 2), 7);
            assert_eq!(target.color_at(width / 2, height / 2), [0, 255, 0]);
        }
    }
}
