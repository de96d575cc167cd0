//! Core backend abstraction traits
//!
//! The [`GraphicsBackend`] trait is the native seam of the renderer: it models a
//! device with a single immediate context and a swap chain. Both the wgpu and
//! the recording backend implement it.

use crate::backend::types::*;
use crate::backend::{
    GpuBlendState, GpuBuffer, GpuDepthState, GpuRasterizerState, GpuSampler, GpuShader,
    GpuTexture,
};
use thiserror::Error;

/// Backend error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Failed to initialize backend: {0}")]
    InitializationFailed(String),
    #[error("Failed to create surface: {0}")]
    SurfaceCreationFailed(String),
    #[error("Failed to create device: {0}")]
    DeviceCreationFailed(String),
    #[error("Failed to acquire next image: {0}")]
    AcquireImageFailed(String),
    #[error("Failed to create buffer: {0}")]
    BufferCreationFailed(String),
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to create shader: {0}")]
    ShaderCreationFailed(String),
    #[error("Failed to create state object: {0}")]
    StateCreationFailed(String),
    #[error("Out of memory")]
    OutOfMemory,
    #[error("Device lost")]
    DeviceLost,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Main graphics backend trait
///
/// Creation calls return owning native objects; dropping them releases the
/// native allocation. Binding and draw calls act on the immediate context and
/// never fail: a backend handed an object from another backend logs and skips.
pub trait GraphicsBackend {
    /// Backend name, for logging
    fn name(&self) -> &'static str;

    /// Current window client-area size in pixels
    fn client_size(&self) -> (u32, u32);

    /// Resize the swap chain
    fn resize(&mut self, width: u32, height: u32);

    // Resource creation

    /// Create a dynamic (CPU-writable) buffer
    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<GpuBuffer>;

    /// Discard-write `data` at the start of `buffer`
    fn write_buffer(&mut self, buffer: &GpuBuffer, data: &[u8]);

    /// Create a 2D texture and its shader-read view, optionally with initial RGBA8 data
    fn create_texture(
        &mut self,
        desc: &TextureDescriptor,
        data: Option<&[u8]>,
    ) -> BackendResult<GpuTexture>;

    /// Create the vertex and pixel programs plus the input layout of a shader
    fn create_shader(&mut self, desc: &ShaderDescriptor) -> BackendResult<GpuShader>;

    /// Create an immutable blend state object
    fn create_blend_state(&mut self, desc: &BlendDescriptor) -> BackendResult<GpuBlendState>;

    /// Create an immutable sampler state object
    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> BackendResult<GpuSampler>;

    /// Create an immutable rasterizer state object
    fn create_rasterizer_state(
        &mut self,
        desc: &RasterizerDescriptor,
    ) -> BackendResult<GpuRasterizerState>;

    /// Create an immutable depth-stencil state object
    fn create_depth_state(&mut self, desc: &DepthStateDescriptor) -> BackendResult<GpuDepthState>;

    // Frame boundaries

    /// Acquire the next back buffer
    fn begin_frame(&mut self) -> BackendResult<()>;

    /// Bind the back buffer and `depth_target` as the active render targets
    fn set_render_targets(&mut self, depth_target: &GpuTexture);

    /// Clear the active color target
    fn clear_render_target(&mut self, color: [f32; 4]);

    /// Clear the active depth target
    fn clear_depth(&mut self, depth: f32);

    /// Present the back buffer
    fn present(&mut self) -> BackendResult<()>;

    // Immediate context

    /// Set the viewport
    fn set_viewport(&mut self, viewport: &Viewport);

    /// Activate a blend state object
    fn set_blend_state(&mut self, state: &GpuBlendState);

    /// Activate a sampler on the given pixel-stage slot
    fn set_sampler(&mut self, slot: u32, sampler: &GpuSampler);

    /// Activate a rasterizer state object
    fn set_rasterizer_state(&mut self, state: &GpuRasterizerState);

    /// Activate a depth-stencil state object
    fn set_depth_state(&mut self, state: &GpuDepthState);

    /// Bind vertex and pixel programs and the input layout
    fn bind_shader(&mut self, shader: &GpuShader);

    /// Bind a vertex buffer with the given stride
    fn bind_vertex_buffer(&mut self, buffer: &GpuBuffer, stride: u32);

    /// Bind an index buffer of 32-bit indices
    fn bind_index_buffer(&mut self, buffer: &GpuBuffer);

    /// Bind a constant buffer to a slot of both shader stages
    fn bind_constant_buffer(&mut self, slot: u32, buffer: &GpuBuffer);

    /// Bind a texture's read view to a pixel-stage slot
    fn bind_texture(&mut self, slot: u32, texture: &GpuTexture);

    /// Draw non-indexed primitives
    fn draw(&mut self, vertex_count: u32, first_vertex: u32);

    /// Draw indexed primitives
    fn draw_indexed(&mut self, index_count: u32, first_index: u32, base_vertex: i32);
}
