//! wgpu backend implementation
//!
//! wgpu has no immediate context, so this backend tracks the bound state itself
//! and turns every draw into a buffered [`DrawCall`] with a resolved pipeline
//! and bind groups. Buffered draws are encoded into a single render pass and
//! submitted on flush. A flush happens before a buffer referenced by a pending
//! draw is overwritten, before a clear or a render-target change, and at present.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::backend::{
    GpuBlendState, GpuBuffer, GpuDepthState, GpuRasterizerState, GpuSampler, GpuShader,
    GpuTexture,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Number of constant-buffer slots exposed to shaders (bindings 0..N of group 0)
const CONSTANT_SLOTS: usize = 4;
/// Size of the uniform buffer bound to slots nothing was bound to
const PLACEHOLDER_UNIFORM_SIZE: u64 = 256;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Pipeline cache key: shader, blend, rasterizer and depth state ids
type PipelineKey = (u64, u64, u64, u64);

/// Raised by the device-lost callback, checked at frame boundaries
#[derive(Debug, Clone, Default)]
struct DeviceLostFlag(Arc<AtomicBool>);

impl DeviceLostFlag {
    fn mark_lost(&self) {
        self.0.store(true, Ordering::Release);
    }

    fn check(&self) -> BackendResult<()> {
        if self.0.load(Ordering::Acquire) {
            Err(BackendError::DeviceLost)
        } else {
            Ok(())
        }
    }
}

/// Render pipelines by key
///
/// A failed creation is cached too, so a combination the layout rejects is
/// reported once and then skipped.
struct PipelineCache<P> {
    entries: HashMap<PipelineKey, Option<Arc<P>>>,
}

impl<P> PipelineCache<P> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    fn get_or_create(&mut self, key: PipelineKey, create: impl FnOnce() -> Option<P>) -> Option<Arc<P>> {
        self.entries
            .entry(key)
            .or_insert_with(|| create().map(Arc::new))
            .clone()
    }
}

struct BoundShader {
    id: u64,
    module: Arc<wgpu::ShaderModule>,
    vertex_entry: String,
    pixel_entry: String,
    vertex_layout: VertexBufferLayout,
}

/// State currently bound to the emulated immediate context
#[derive(Default)]
struct BoundState {
    shader: Option<BoundShader>,
    blend: Option<(u64, Option<wgpu::BlendState>)>,
    rasterizer: Option<(u64, wgpu::PrimitiveState)>,
    depth: Option<(u64, bool, wgpu::CompareFunction)>,
    sampler: Option<(u64, Arc<wgpu::Sampler>)>,
    vertex_buffer: Option<(u64, Arc<wgpu::Buffer>, u32)>,
    index_buffer: Option<(u64, Arc<wgpu::Buffer>)>,
    constant_buffers: [Option<(u64, Arc<wgpu::Buffer>)>; CONSTANT_SLOTS],
    texture: Option<(u64, Arc<wgpu::TextureView>)>,
    viewport: Option<Viewport>,
}

enum DrawKind {
    Vertices {
        count: u32,
        first: u32,
    },
    Indexed {
        count: u32,
        first: u32,
        base_vertex: i32,
    },
}

/// A draw with everything it needs resolved
struct DrawCall {
    pipeline: Arc<wgpu::RenderPipeline>,
    uniforms: Arc<wgpu::BindGroup>,
    textures: Arc<wgpu::BindGroup>,
    vertex_buffer: Arc<wgpu::Buffer>,
    index_buffer: Option<Arc<wgpu::Buffer>>,
    viewport: Viewport,
    buffer_ids: Vec<u64>,
    kind: DrawKind,
}

/// wgpu backend implementation
pub struct WgpuBackend {
    #[allow(dead_code)]
    instance: wgpu::Instance,
    surface: wgpu::Surface<'static>,
    #[allow(dead_code)]
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface_config: wgpu::SurfaceConfiguration,
    polygon_mode_line: bool,
    device_lost: DeviceLostFlag,

    current_texture: Option<wgpu::SurfaceTexture>,
    current_view: Option<wgpu::TextureView>,
    depth_view: Option<(u64, Arc<wgpu::TextureView>)>,

    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    placeholder_uniform: Arc<wgpu::Buffer>,
    placeholder_texture: Arc<wgpu::TextureView>,
    placeholder_sampler: Arc<wgpu::Sampler>,

    pipelines: PipelineCache<wgpu::RenderPipeline>,
    uniform_groups: HashMap<[u64; CONSTANT_SLOTS], Arc<wgpu::BindGroup>>,
    texture_groups: HashMap<(u64, u64), Arc<wgpu::BindGroup>>,

    bound: BoundState,
    pending_draws: Vec<DrawCall>,
    pending_clear_color: Option<[f32; 4]>,
    pending_clear_depth: Option<f32>,

    next_object_id: u64,
}

impl WgpuBackend {
    fn convert_texture_format(format: TextureFormat) -> wgpu::TextureFormat {
        match format {
            TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            TextureFormat::Depth32Float => DEPTH_FORMAT,
        }
    }

    fn convert_buffer_usage(usage: BufferUsage) -> wgpu::BufferUsages {
        let bind = match usage {
            BufferUsage::Vertex => wgpu::BufferUsages::VERTEX,
            BufferUsage::Index => wgpu::BufferUsages::INDEX,
            BufferUsage::Constant => wgpu::BufferUsages::UNIFORM,
        };
        bind | wgpu::BufferUsages::COPY_DST
    }

    fn convert_vertex_format(format: VertexFormat) -> wgpu::VertexFormat {
        match format {
            VertexFormat::Float32x2 => wgpu::VertexFormat::Float32x2,
            VertexFormat::Float32x3 => wgpu::VertexFormat::Float32x3,
            VertexFormat::Unorm8x4 => wgpu::VertexFormat::Unorm8x4,
        }
    }

    fn convert_compare_function(func: CompareFunction) -> wgpu::CompareFunction {
        match func {
            CompareFunction::LessEqual => wgpu::CompareFunction::LessEqual,
            CompareFunction::Always => wgpu::CompareFunction::Always,
        }
    }

    fn convert_blend_factor(factor: BlendFactor) -> wgpu::BlendFactor {
        match factor {
            BlendFactor::One => wgpu::BlendFactor::One,
            BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
            BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
        }
    }

    fn convert_blend_component(component: &BlendComponent) -> wgpu::BlendComponent {
        wgpu::BlendComponent {
            src_factor: Self::convert_blend_factor(component.src_factor),
            dst_factor: Self::convert_blend_factor(component.dst_factor),
            operation: wgpu::BlendOperation::Add,
        }
    }

    fn convert_filter_mode(mode: FilterMode) -> wgpu::FilterMode {
        match mode {
            FilterMode::Nearest => wgpu::FilterMode::Nearest,
            FilterMode::Linear => wgpu::FilterMode::Linear,
        }
    }

    fn convert_address_mode(mode: AddressMode) -> wgpu::AddressMode {
        match mode {
            AddressMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
            AddressMode::Repeat => wgpu::AddressMode::Repeat,
        }
    }

    fn next_id(&mut self) -> u64 {
        self.next_object_id += 1;
        self.next_object_id
    }
}

impl WgpuBackend {
    /// Create the device, swap chain and shared binding layouts for `window`
    pub fn new(window: Arc<winit::window::Window>, vsync: bool) -> BackendResult<Self> {
        pollster::block_on(Self::new_async(window, vsync))
    }

    pub async fn new_async(window: Arc<winit::window::Window>, vsync: bool) -> BackendResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .map_err(|e| BackendError::SurfaceCreationFailed(e.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| BackendError::InitializationFailed("No suitable adapter found".into()))?;

        let adapter_info = adapter.get_info();
        log::info!(
            "Selected GPU: {} ({:?} backend)",
            adapter_info.name,
            adapter_info.backend
        );

        let polygon_mode_line = adapter
            .features()
            .contains(wgpu::Features::POLYGON_MODE_LINE);
        if !polygon_mode_line {
            log::warn!("Adapter lacks POLYGON_MODE_LINE; wireframe fill falls back to solid");
        }
        let required_features = if polygon_mode_line {
            wgpu::Features::POLYGON_MODE_LINE
        } else {
            wgpu::Features::empty()
        };

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Renderer Device"),
                    required_features,
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .map_err(|e| BackendError::DeviceCreationFailed(e.to_string()))?;

        device.on_uncaptured_error(Box::new(|error: wgpu::Error| {
            log::error!("wgpu error: {}", error);
        }));
        let device_lost = DeviceLostFlag::default();
        let lost = device_lost.clone();
        device.set_device_lost_callback(move |reason, message| {
            log::error!("wgpu device lost ({:?}): {}", reason, message);
            lost.mark_lost();
        });

        let size = window.inner_size();
        let surface_caps = surface.get_capabilities(&adapter);
        // The renderer writes final colors itself, so prefer a linear swap chain
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| {
                BackendError::SurfaceCreationFailed("Surface reports no formats".into())
            })?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let present_mode = if vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        };

        let (width, height) = Self::clamp_size(&device, size.width, size.height);
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width,
            height,
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let uniform_entries: Vec<wgpu::BindGroupLayoutEntry> = (0..CONSTANT_SLOTS as u32)
            .map(|binding| wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            })
            .collect();
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Constant Buffers"),
            entries: &uniform_entries,
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Texture + Sampler"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Renderer Pipeline Layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let placeholder_uniform = Arc::new(device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Placeholder Constants"),
            size: PLACEHOLDER_UNIFORM_SIZE,
            usage: wgpu::BufferUsages::UNIFORM,
            mapped_at_creation: false,
        }));

        let white = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Placeholder Texture"),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        Self::upload_rgba8(&queue, &white, &[255, 255, 255, 255], 1, 1);
        let placeholder_texture =
            Arc::new(white.create_view(&wgpu::TextureViewDescriptor::default()));
        let placeholder_sampler =
            Arc::new(device.create_sampler(&wgpu::SamplerDescriptor::default()));

        Ok(Self {
            instance,
            surface,
            adapter,
            device,
            queue,
            surface_config,
            polygon_mode_line,
            device_lost,
            current_texture: None,
            current_view: None,
            depth_view: None,
            uniform_layout,
            texture_layout,
            pipeline_layout,
            placeholder_uniform,
            placeholder_texture,
            placeholder_sampler,
            pipelines: PipelineCache::new(),
            uniform_groups: HashMap::new(),
            texture_groups: HashMap::new(),
            bound: BoundState::default(),
            pending_draws: Vec::new(),
            pending_clear_color: None,
            pending_clear_depth: None,
            next_object_id: 0,
        })
    }

    /// Clamp to device limits while maintaining aspect ratio
    fn clamp_size(device: &wgpu::Device, width: u32, height: u32) -> (u32, u32) {
        let max_size = device.limits().max_texture_dimension_2d;
        if width > max_size || height > max_size {
            let scale = (max_size as f32 / width as f32).min(max_size as f32 / height as f32);
            (
                ((width as f32 * scale) as u32).max(1),
                ((height as f32 * scale) as u32).max(1),
            )
        } else {
            (width.max(1), height.max(1))
        }
    }

    fn upload_rgba8(queue: &wgpu::Queue, texture: &wgpu::Texture, data: &[u8], width: u32, height: u32) {
        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }

    /// Device handle, for callers that render extra content
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Swap chain format
    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.surface_config.format
    }

    fn acquire_surface_texture(&mut self) -> BackendResult<wgpu::SurfaceTexture> {
        match self.surface.get_current_texture() {
            Ok(texture) => Ok(texture),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::debug!("Swap chain lost or outdated; reconfiguring");
                self.surface.configure(&self.device, &self.surface_config);
                self.surface
                    .get_current_texture()
                    .map_err(|e| Self::convert_surface_error(&e))
            }
            Err(e) => Err(Self::convert_surface_error(&e)),
        }
    }

    fn convert_surface_error(error: &wgpu::SurfaceError) -> BackendError {
        match error {
            wgpu::SurfaceError::OutOfMemory => BackendError::DeviceLost,
            _ => BackendError::AcquireImageFailed(error.to_string()),
        }
    }

    /// Pipeline for `shader` under the bound states, or `None` if wgpu rejected it
    fn pipeline_for(&mut self, shader: &BoundShader) -> Option<Arc<wgpu::RenderPipeline>> {
        let (blend_id, blend) = self.bound.blend.unwrap_or((0, None));
        let (raster_id, primitive) = self
            .bound
            .rasterizer
            .unwrap_or((0, wgpu::PrimitiveState::default()));
        let (depth_id, depth_write_enabled, depth_compare) = self
            .bound
            .depth
            .unwrap_or((0, true, wgpu::CompareFunction::LessEqual));
        let key = (shader.id, blend_id, raster_id, depth_id);

        let device = &self.device;
        let pipeline_layout = &self.pipeline_layout;
        let surface_format = self.surface_config.format;
        self.pipelines.get_or_create(key, || {
            log::debug!("Creating pipeline for {:?}", key);
            Self::create_pipeline(
                device,
                pipeline_layout,
                surface_format,
                shader,
                blend,
                primitive,
                (depth_write_enabled, depth_compare),
            )
        })
    }

    fn create_pipeline(
        device: &wgpu::Device,
        pipeline_layout: &wgpu::PipelineLayout,
        surface_format: wgpu::TextureFormat,
        shader: &BoundShader,
        blend: Option<wgpu::BlendState>,
        primitive: wgpu::PrimitiveState,
        (depth_write_enabled, depth_compare): (bool, wgpu::CompareFunction),
    ) -> Option<wgpu::RenderPipeline> {
        let attributes: Vec<wgpu::VertexAttribute> = shader
            .vertex_layout
            .attributes
            .iter()
            .map(|a| wgpu::VertexAttribute {
                format: Self::convert_vertex_format(a.format),
                offset: a.offset,
                shader_location: a.location,
            })
            .collect();
        let vertex_buffers = [wgpu::VertexBufferLayout {
            array_stride: shader.vertex_layout.array_stride,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &attributes,
        }];
        let color_targets = [Some(wgpu::ColorTargetState {
            format: surface_format,
            blend,
            write_mask: wgpu::ColorWrites::ALL,
        })];

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: None,
                layout: Some(pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader.module,
                    entry_point: &shader.vertex_entry,
                    buffers: &vertex_buffers,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader.module,
                    entry_point: &shader.pixel_entry,
                    targets: &color_targets,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive,
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled,
                    depth_compare,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            });

        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            log::error!(
                "Shader {} does not fit the renderer's pipeline layout: {}",
                shader.id,
                error
            );
            return None;
        }
        Some(pipeline)
    }

    fn uniform_group(&mut self) -> Arc<wgpu::BindGroup> {
        let mut key = [0u64; CONSTANT_SLOTS];
        for (slot, bound) in self.bound.constant_buffers.iter().enumerate() {
            key[slot] = bound.as_ref().map_or(0, |(id, _)| *id);
        }
        if let Some(group) = self.uniform_groups.get(&key) {
            return Arc::clone(group);
        }

        let entries: Vec<wgpu::BindGroupEntry> = self
            .bound
            .constant_buffers
            .iter()
            .enumerate()
            .map(|(slot, bound)| wgpu::BindGroupEntry {
                binding: slot as u32,
                resource: bound
                    .as_ref()
                    .map_or(&self.placeholder_uniform, |(_, buffer)| buffer)
                    .as_entire_binding(),
            })
            .collect();
        let group = Arc::new(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Constant Buffers"),
            layout: &self.uniform_layout,
            entries: &entries,
        }));
        self.uniform_groups.insert(key, Arc::clone(&group));
        group
    }

    fn texture_group(&mut self) -> Arc<wgpu::BindGroup> {
        let (texture_id, view) = self
            .bound
            .texture
            .clone()
            .unwrap_or_else(|| (0, Arc::clone(&self.placeholder_texture)));
        let (sampler_id, sampler) = self
            .bound
            .sampler
            .clone()
            .unwrap_or_else(|| (0, Arc::clone(&self.placeholder_sampler)));
        let key = (texture_id, sampler_id);
        if let Some(group) = self.texture_groups.get(&key) {
            return Arc::clone(group);
        }

        let group = Arc::new(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Texture + Sampler"),
            layout: &self.texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(view.as_ref()),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler.as_ref()),
                },
            ],
        }));
        self.texture_groups.insert(key, Arc::clone(&group));
        group
    }

    /// Viewport clamped to the swap chain, or `None` if nothing is left
    fn clamped_viewport(&self) -> Option<Viewport> {
        let target_w = self.surface_config.width as f32;
        let target_h = self.surface_config.height as f32;
        let vp = self
            .bound
            .viewport
            .unwrap_or_else(|| Viewport::full(self.surface_config.width, self.surface_config.height));
        let x = vp.x.clamp(0.0, target_w);
        let y = vp.y.clamp(0.0, target_h);
        let width = vp.width.min(target_w - x);
        let height = vp.height.min(target_h - y);
        (width > 0.0 && height > 0.0).then_some(Viewport {
            x,
            y,
            width,
            height,
            ..vp
        })
    }

    fn queue_draw(&mut self, kind: DrawKind) {
        let Some(shader) = self.bound.shader.take() else {
            log::warn!("Draw skipped: no shader bound");
            return;
        };
        let pipeline = self.pipeline_for(&shader);
        let stride = shader.vertex_layout.array_stride;
        let shader_id = shader.id;
        self.bound.shader = Some(shader);
        let Some(pipeline) = pipeline else {
            log::debug!("Draw skipped: shader {} has no valid pipeline", shader_id);
            return;
        };

        let Some((vertex_id, vertex_buffer, bound_stride)) = self.bound.vertex_buffer.clone() else {
            log::warn!("Draw skipped: no vertex buffer bound");
            return;
        };
        if u64::from(bound_stride) != stride {
            log::warn!(
                "Vertex stride {} does not match the bound shader's input layout ({})",
                bound_stride,
                stride
            );
        }
        let Some(viewport) = self.clamped_viewport() else {
            log::debug!("Draw skipped: viewport lies outside the render target");
            return;
        };

        let mut buffer_ids = vec![vertex_id];
        let index_buffer = match kind {
            DrawKind::Indexed { .. } => {
                let Some((index_id, buffer)) = self.bound.index_buffer.clone() else {
                    log::warn!("Indexed draw skipped: no index buffer bound");
                    return;
                };
                buffer_ids.push(index_id);
                Some(buffer)
            }
            DrawKind::Vertices { .. } => None,
        };
        buffer_ids.extend(self.bound.constant_buffers.iter().flatten().map(|(id, _)| *id));

        let uniforms = self.uniform_group();
        let textures = self.texture_group();

        self.pending_draws.push(DrawCall {
            pipeline,
            uniforms,
            textures,
            vertex_buffer,
            index_buffer,
            viewport,
            buffer_ids,
            kind,
        });
    }

    /// Encode pending clears and draws into one render pass and submit it
    fn flush(&mut self) {
        if self.pending_draws.is_empty()
            && self.pending_clear_color.is_none()
            && self.pending_clear_depth.is_none()
        {
            return;
        }

        let draws = std::mem::take(&mut self.pending_draws);
        let clear_color = self.pending_clear_color.take();
        let clear_depth = self.pending_clear_depth.take();

        let Some(color_view) = self.current_view.as_ref() else {
            log::warn!("Dropping {} draw(s) issued outside a frame", draws.len());
            return;
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Immediate Encoder"),
            });

        {
            let color_attachments = [Some(wgpu::RenderPassColorAttachment {
                view: color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: match clear_color {
                        Some(color) => wgpu::LoadOp::Clear(wgpu::Color {
                            r: color[0] as f64,
                            g: color[1] as f64,
                            b: color[2] as f64,
                            a: color[3] as f64,
                        }),
                        None => wgpu::LoadOp::Load,
                    },
                    store: wgpu::StoreOp::Store,
                },
            })];

            let depth_attachment =
                self.depth_view
                    .as_ref()
                    .map(|(_, view)| wgpu::RenderPassDepthStencilAttachment {
                        view,
                        depth_ops: Some(wgpu::Operations {
                            load: match clear_depth {
                                Some(depth) => wgpu::LoadOp::Clear(depth),
                                None => wgpu::LoadOp::Load,
                            },
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    });

            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Immediate Pass"),
                color_attachments: &color_attachments,
                depth_stencil_attachment: depth_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            for draw in &draws {
                render_pass.set_pipeline(&draw.pipeline);
                render_pass.set_bind_group(0, &draw.uniforms, &[]);
                render_pass.set_bind_group(1, &draw.textures, &[]);
                render_pass.set_vertex_buffer(0, draw.vertex_buffer.slice(..));
                let vp = &draw.viewport;
                render_pass.set_viewport(vp.x, vp.y, vp.width, vp.height, vp.min_depth, vp.max_depth);
                match draw.kind {
                    DrawKind::Vertices { count, first } => {
                        render_pass.draw(first..first + count, 0..1);
                    }
                    DrawKind::Indexed {
                        count,
                        first,
                        base_vertex,
                    } => {
                        if let Some(index_buffer) = &draw.index_buffer {
                            render_pass
                                .set_index_buffer(index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                            render_pass.draw_indexed(first..first + count, base_vertex, 0..1);
                        }
                    }
                }
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn references_pending(&self, buffer_id: u64) -> bool {
        self.pending_draws
            .iter()
            .any(|draw| draw.buffer_ids.contains(&buffer_id))
    }
}

impl GraphicsBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn client_size(&self) -> (u32, u32) {
        (self.surface_config.width, self.surface_config.height)
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.flush();
            let (width, height) = Self::clamp_size(&self.device, width, height);
            self.surface_config.width = width;
            self.surface_config.height = height;
            self.surface.configure(&self.device, &self.surface_config);
        }
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<GpuBuffer> {
        let size = desc.size.max(4).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: desc.label.as_deref(),
            size,
            usage: Self::convert_buffer_usage(desc.usage),
            mapped_at_creation: false,
        });
        Ok(GpuBuffer::Wgpu {
            id: self.next_id(),
            buffer: Arc::new(buffer),
        })
    }

    fn write_buffer(&mut self, buffer: &GpuBuffer, data: &[u8]) {
        let GpuBuffer::Wgpu { id, buffer } = buffer else {
            log::error!("wgpu backend handed a foreign buffer");
            return;
        };
        if data.is_empty() {
            return;
        }
        if self.references_pending(*id) {
            self.flush();
        }

        let aligned = (data.len() as u64) % wgpu::COPY_BUFFER_ALIGNMENT == 0;
        if aligned {
            self.queue.write_buffer(buffer, 0, data);
        } else {
            let mut padded = data.to_vec();
            padded.resize(
                (data.len() as u64).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT) as usize,
                0,
            );
            self.queue.write_buffer(buffer, 0, &padded);
        }
    }

    fn create_texture(
        &mut self,
        desc: &TextureDescriptor,
        data: Option<&[u8]>,
    ) -> BackendResult<GpuTexture> {
        let usage = if desc.format.is_depth() {
            wgpu::TextureUsages::RENDER_ATTACHMENT
        } else {
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: desc.label.as_deref(),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::convert_texture_format(desc.format),
            usage,
            view_formats: &[],
        });

        if let Some(data) = data {
            let expected = (desc.width * desc.height * desc.format.bytes_per_pixel()) as usize;
            if data.len() < expected {
                return Err(BackendError::TextureCreationFailed(format!(
                    "{:?}: {} bytes of texel data, {} expected",
                    desc.label,
                    data.len(),
                    expected
                )));
            }
            Self::upload_rgba8(&self.queue, &texture, data, desc.width, desc.height);
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(GpuTexture::Wgpu {
            id: self.next_id(),
            texture: Arc::new(texture),
            view: Arc::new(view),
        })
    }

    fn create_shader(&mut self, desc: &ShaderDescriptor) -> BackendResult<GpuShader> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&desc.name),
                source: wgpu::ShaderSource::Wgsl(desc.source.as_str().into()),
            });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(BackendError::ShaderCreationFailed(format!(
                "{}: {}",
                desc.name, error
            )));
        }

        Ok(GpuShader::Wgpu {
            id: self.next_id(),
            module: Arc::new(module),
            vertex_entry: desc.vertex_entry.clone(),
            pixel_entry: desc.pixel_entry.clone(),
            vertex_layout: desc.vertex_layout.clone(),
        })
    }

    fn create_blend_state(&mut self, desc: &BlendDescriptor) -> BackendResult<GpuBlendState> {
        let blend = desc.blend.as_ref().map(|b| wgpu::BlendState {
            color: Self::convert_blend_component(&b.color),
            alpha: Self::convert_blend_component(&b.alpha),
        });
        Ok(GpuBlendState::Wgpu {
            id: self.next_id(),
            blend,
        })
    }

    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> BackendResult<GpuSampler> {
        let address_mode = Self::convert_address_mode(desc.address_mode);
        let filter = Self::convert_filter_mode(desc.filter);
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: desc.label.as_deref(),
            address_mode_u: address_mode,
            address_mode_v: address_mode,
            address_mode_w: address_mode,
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter: filter,
            lod_min_clamp: 0.0,
            lod_max_clamp: f32::MAX,
            compare: None,
            anisotropy_clamp: 1,
            border_color: None,
        });
        Ok(GpuSampler::Wgpu {
            id: self.next_id(),
            sampler: Arc::new(sampler),
        })
    }

    fn create_rasterizer_state(
        &mut self,
        desc: &RasterizerDescriptor,
    ) -> BackendResult<GpuRasterizerState> {
        let polygon_mode = match desc.fill_mode {
            FillMode::Wireframe if self.polygon_mode_line => wgpu::PolygonMode::Line,
            _ => wgpu::PolygonMode::Fill,
        };
        let primitive = wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: match desc.cull_mode {
                CullMode::None => None,
                CullMode::Back => Some(wgpu::Face::Back),
            },
            polygon_mode,
            ..Default::default()
        };
        Ok(GpuRasterizerState::Wgpu {
            id: self.next_id(),
            primitive,
        })
    }

    fn create_depth_state(&mut self, desc: &DepthStateDescriptor) -> BackendResult<GpuDepthState> {
        Ok(GpuDepthState::Wgpu {
            id: self.next_id(),
            depth_write_enabled: desc.depth_write_enabled,
            depth_compare: Self::convert_compare_function(desc.depth_compare),
        })
    }

    fn begin_frame(&mut self) -> BackendResult<()> {
        self.device_lost.check()?;
        if self.current_texture.is_some() {
            log::warn!("Frame already open; keeping the acquired back buffer");
            return Ok(());
        }
        let output = self.acquire_surface_texture()?;
        self.current_view = Some(
            output
                .texture
                .create_view(&wgpu::TextureViewDescriptor::default()),
        );
        self.current_texture = Some(output);
        Ok(())
    }

    fn set_render_targets(&mut self, depth_target: &GpuTexture) {
        let GpuTexture::Wgpu { id, view, .. } = depth_target else {
            log::error!("wgpu backend handed a foreign depth target");
            return;
        };
        if self.depth_view.as_ref().map(|(bound, _)| *bound) != Some(*id) {
            self.flush();
            self.depth_view = Some((*id, Arc::clone(view)));
        }
    }

    fn clear_render_target(&mut self, color: [f32; 4]) {
        if !self.pending_draws.is_empty() {
            self.flush();
        }
        self.pending_clear_color = Some(color);
    }

    fn clear_depth(&mut self, depth: f32) {
        if !self.pending_draws.is_empty() {
            self.flush();
        }
        self.pending_clear_depth = Some(depth);
    }

    fn present(&mut self) -> BackendResult<()> {
        self.flush();
        self.current_view = None;
        if let Some(texture) = self.current_texture.take() {
            texture.present();
        }
        // Bind groups hold their buffers alive; rebuild them each frame
        self.uniform_groups.clear();
        self.texture_groups.clear();
        self.device_lost.check()
    }

    fn set_viewport(&mut self, viewport: &Viewport) {
        self.bound.viewport = Some(*viewport);
    }

    fn set_blend_state(&mut self, state: &GpuBlendState) {
        if let GpuBlendState::Wgpu { id, blend } = state {
            self.bound.blend = Some((*id, *blend));
        }
    }

    fn set_sampler(&mut self, _slot: u32, sampler: &GpuSampler) {
        if let GpuSampler::Wgpu { id, sampler } = sampler {
            self.bound.sampler = Some((*id, Arc::clone(sampler)));
        }
    }

    fn set_rasterizer_state(&mut self, state: &GpuRasterizerState) {
        if let GpuRasterizerState::Wgpu { id, primitive } = state {
            self.bound.rasterizer = Some((*id, *primitive));
        }
    }

    fn set_depth_state(&mut self, state: &GpuDepthState) {
        if let GpuDepthState::Wgpu {
            id,
            depth_write_enabled,
            depth_compare,
        } = state
        {
            self.bound.depth = Some((*id, *depth_write_enabled, *depth_compare));
        }
    }

    fn bind_shader(&mut self, shader: &GpuShader) {
        if let GpuShader::Wgpu {
            id,
            module,
            vertex_entry,
            pixel_entry,
            vertex_layout,
        } = shader
        {
            if self.bound.shader.as_ref().map(|s| s.id) == Some(*id) {
                return;
            }
            self.bound.shader = Some(BoundShader {
                id: *id,
                module: Arc::clone(module),
                vertex_entry: vertex_entry.clone(),
                pixel_entry: pixel_entry.clone(),
                vertex_layout: vertex_layout.clone(),
            });
        }
    }

    fn bind_vertex_buffer(&mut self, buffer: &GpuBuffer, stride: u32) {
        if let GpuBuffer::Wgpu { id, buffer } = buffer {
            self.bound.vertex_buffer = Some((*id, Arc::clone(buffer), stride));
        }
    }

    fn bind_index_buffer(&mut self, buffer: &GpuBuffer) {
        if let GpuBuffer::Wgpu { id, buffer } = buffer {
            self.bound.index_buffer = Some((*id, Arc::clone(buffer)));
        }
    }

    fn bind_constant_buffer(&mut self, slot: u32, buffer: &GpuBuffer) {
        let GpuBuffer::Wgpu { id, buffer } = buffer else {
            return;
        };
        match self.bound.constant_buffers.get_mut(slot as usize) {
            Some(bound) => *bound = Some((*id, Arc::clone(buffer))),
            None => log::error!("Constant slot {} out of range", slot),
        }
    }

    fn bind_texture(&mut self, _slot: u32, texture: &GpuTexture) {
        if let GpuTexture::Wgpu { id, view, .. } = texture {
            self.bound.texture = Some((*id, Arc::clone(view)));
        }
    }

    fn draw(&mut self, vertex_count: u32, first_vertex: u32) {
        self.queue_draw(DrawKind::Vertices {
            count: vertex_count,
            first: first_vertex,
        });
    }

    fn draw_indexed(&mut self, index_count: u32, first_index: u32, base_vertex: i32) {
        self.queue_draw(DrawKind::Indexed {
            count: index_count,
            first: first_index,
            base_vertex,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_lost_flag_fails_frame_boundaries() {
        let flag = DeviceLostFlag::default();
        let callback_side = flag.clone();
        assert_eq!(flag.check(), Ok(()));

        callback_side.mark_lost();
        assert_eq!(flag.check(), Err(BackendError::DeviceLost));
    }

    #[test]
    fn test_rejected_pipeline_is_cached_and_not_rebuilt() {
        let mut cache: PipelineCache<&str> = PipelineCache::new();
        let key = (7, 1, 2, 3);
        let mut attempts = 0;

        assert_eq!(cache.get_or_create(key, || { attempts += 1; None }), None);
        assert_eq!(cache.get_or_create(key, || { attempts += 1; Some("late") }), None);
        assert_eq!(attempts, 1);

        let other = (8, 1, 2, 3);
        let built = cache.get_or_create(other, || Some("pipeline"));
        assert_eq!(built.as_deref(), Some(&"pipeline"));
    }
}
