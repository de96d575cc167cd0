//! Immediate Renderer - an immediate-mode 3D renderer core
//!
//! The renderer sits on a [`GraphicsBackend`] and provides:
//! - Owned GPU resources (vertex/index/constant buffers, textures, shaders)
//! - Render state families (blend, sampler, rasterizer, depth) with lazy
//!   reconciliation before each draw
//! - A frame/camera bracketing protocol
//! - Immediate-mode vertex submission through growable scratch buffers
//!
//! Two backends ship with the crate:
//! - **wgpu** (feature `wgpu-backend`): cross-platform GPU backend
//! - **Recording**: no GPU; journals every native call, used by tests
//!
//! ```no_run
//! use immediate_renderer::{Camera, Renderer, RendererConfig, RecordingBackend, Rgba8, VertexPcu};
//! use glam::{Vec2, Vec3};
//!
//! let backend = Box::new(RecordingBackend::new(1280, 720));
//! let mut renderer = Renderer::startup(backend, RendererConfig::default())?;
//! let camera = Camera::orthographic(Vec2::ZERO, Vec2::new(1280.0, 720.0));
//!
//! renderer.begin_frame()?;
//! renderer.clear_screen(Rgba8::BLACK);
//! renderer.begin_camera(&camera);
//! renderer.draw_vertex_array(&[
//!     VertexPcu::new(Vec3::new(0.0, 0.0, 0.0), Rgba8::RED, Vec2::ZERO),
//!     VertexPcu::new(Vec3::new(100.0, 0.0, 0.0), Rgba8::GREEN, Vec2::X),
//!     VertexPcu::new(Vec3::new(0.0, 100.0, 0.0), Rgba8::BLUE, Vec2::Y),
//! ])?;
//! renderer.end_camera(&camera);
//! renderer.end_frame()?;
//! renderer.shutdown();
//! # Ok::<(), immediate_renderer::RendererError>(())
//! ```

pub mod backend;
pub mod error;
pub mod renderer;
pub mod resources;
pub mod scene;

use std::path::PathBuf;

pub use backend::{GraphicsBackend, RecordingBackend};
#[cfg(feature = "wgpu-backend")]
pub use backend::wgpu_backend::WgpuBackend;
pub use error::{RendererError, RendererResult};
pub use renderer::constants::{CameraConstants, LightConstants, ModelConstants};
pub use renderer::states::{BlendMode, DepthMode, ParseModeError, RasterizerMode, RenderMode, SamplerMode};
pub use renderer::{FontId, FrameStats, Renderer, ShaderId, TextureId};
pub use resources::{
    add_verts_for_aabb2, Aabb2, BitmapFont, ConstantBuffer, GrowableBuffer, ImageData, IndexBuffer,
    Rgba8, Shader, Texture, Vertex, VertexBuffer, VertexLayout, VertexPcu, VertexPcutbn,
    DEFAULT_SHADER_NAME, DEFAULT_SHADER_SOURCE,
};
pub use scene::{Camera, Projection, ViewportRect};

/// Configuration for starting the renderer
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Blend mode active after startup
    pub blend_mode: BlendMode,
    /// Sampler mode active after startup
    pub sampler_mode: SamplerMode,
    /// Rasterizer mode active after startup
    pub rasterizer_mode: RasterizerMode,
    /// Depth mode active after startup
    pub depth_mode: DepthMode,
    /// Directory searched by `create_or_get_shader_from_file`
    pub shader_directory: PathBuf,
    /// Vertex-stage entry point of user shaders
    pub vertex_entry: String,
    /// Pixel-stage entry point of user shaders
    pub pixel_entry: String,
    /// Run every shader validation check; on by default in debug builds
    pub strict_shader_validation: bool,
    /// Color applications clear to at the start of a frame
    pub clear_color: Rgba8,
    /// Initial capacity of each immediate-mode scratch buffer, in vertices
    pub immediate_vertex_capacity: usize,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            blend_mode: BlendMode::Alpha,
            sampler_mode: SamplerMode::PointClamp,
            rasterizer_mode: RasterizerMode::SolidCullBack,
            depth_mode: DepthMode::Enabled,
            shader_directory: PathBuf::from("Data/Shaders"),
            vertex_entry: resources::shader::DEFAULT_VERTEX_ENTRY.to_string(),
            pixel_entry: resources::shader::DEFAULT_PIXEL_ENTRY.to_string(),
            strict_shader_validation: cfg!(debug_assertions),
            clear_color: Rgba8::BLACK,
            immediate_vertex_capacity: 1024,
        }
    }
}

impl RendererConfig {
    pub fn with_blend_mode(mut self, mode: BlendMode) -> Self {
        self.blend_mode = mode;
        self
    }

    pub fn with_sampler_mode(mut self, mode: SamplerMode) -> Self {
        self.sampler_mode = mode;
        self
    }

    pub fn with_rasterizer_mode(mut self, mode: RasterizerMode) -> Self {
        self.rasterizer_mode = mode;
        self
    }

    pub fn with_depth_mode(mut self, mode: DepthMode) -> Self {
        self.depth_mode = mode;
        self
    }

    pub fn with_shader_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.shader_directory = directory.into();
        self
    }

    pub fn with_clear_color(mut self, color: Rgba8) -> Self {
        self.clear_color = color;
        self
    }

    pub fn with_immediate_vertex_capacity(mut self, vertices: usize) -> Self {
        self.immediate_vertex_capacity = vertices;
        self
    }
}
