//! The renderer: device/context manager, resource factory and caches
//!
//! A [`Renderer`] owns its backend and every resource it created. There is no
//! global instance; callers hold the value and pass it where drawing happens.

pub mod constants;
mod draw;
mod frame;
pub mod states;

use std::path::Path;

use crate::backend::GraphicsBackend;
use crate::error::{RendererError, RendererResult};
use crate::resources::buffer::write_constants;
use crate::resources::shader::{DEFAULT_PIXEL_ENTRY, DEFAULT_SHADER_NAME, DEFAULT_SHADER_SOURCE, DEFAULT_VERTEX_ENTRY};
use crate::resources::*;
use crate::RendererConfig;

use constants::*;
use states::{BlendMode, DepthMode, RasterizerMode, RenderStates, SamplerMode};

/// Cached shader handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderId(pub(crate) usize);

/// Cached texture handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub(crate) usize);

/// Cached bitmap font handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FontId(pub(crate) usize);

/// Counters for the frame in progress, reset by `begin_frame`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub draw_calls: u32,
    pub vertices: u64,
    pub indices: u64,
    pub state_changes: u32,
}

/// Where the caller is in the frame/camera bracketing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Bracket {
    Idle,
    InFrame,
    InCamera,
}

const DEFAULT_TEXTURE_NAME: &str = "White";

/// Immediate-mode renderer
///
/// Fields are declared in release order: dropping a renderer (or calling
/// [`Renderer::shutdown`]) releases caches first and the device last.
pub struct Renderer {
    shaders: Vec<Shader>,
    textures: Vec<Texture>,
    fonts: Vec<BitmapFont>,
    light_constants: ConstantBuffer,
    camera_constants: ConstantBuffer,
    model_constants: ConstantBuffer,
    immediate_pcu: VertexBuffer,
    immediate_pcutbn: VertexBuffer,
    states: RenderStates,
    depth_target: Texture,

    default_shader: ShaderId,
    default_texture: TextureId,
    current_shader: ShaderId,
    current_texture: TextureId,
    bracket: Bracket,
    stats: FrameStats,
    config: RendererConfig,

    backend: Box<dyn GraphicsBackend>,
}

impl Renderer {
    /// Build every startup resource on `backend` and bind the defaults
    ///
    /// Any failure is returned; the renderer cannot run without these.
    pub fn startup(mut backend: Box<dyn GraphicsBackend>, config: RendererConfig) -> RendererResult<Self> {
        let (width, height) = backend.client_size();
        log::info!("Renderer startup: {} backend, {}x{}", backend.name(), width, height);
        let native = backend.as_mut();

        let default_shader = Shader::create(
            native,
            DEFAULT_SHADER_NAME,
            DEFAULT_SHADER_SOURCE,
            Some(VertexLayout::Pcu),
            (DEFAULT_VERTEX_ENTRY, DEFAULT_PIXEL_ENTRY),
            config.strict_shader_validation,
        )?;
        native.bind_shader(default_shader.native());

        let capacity = config.immediate_vertex_capacity.max(1);
        let immediate_pcu = VertexBuffer::create(
            native,
            capacity * VertexLayout::Pcu.stride() as usize,
            VertexLayout::Pcu.stride(),
        )?;
        let immediate_pcutbn = VertexBuffer::create(
            native,
            capacity * VertexLayout::Pcutbn.stride() as usize,
            VertexLayout::Pcutbn.stride(),
        )?;

        let mut states = RenderStates::create(native, &config)?;
        states.reconcile(native);

        let white = Texture::create(
            native,
            DEFAULT_TEXTURE_NAME,
            &ImageData::solid_color(2, 2, [255, 255, 255, 255]),
        )?;
        native.bind_texture(0, white.native());

        let light_constants = ConstantBuffer::create(native, std::mem::size_of::<LightConstants>())?;
        let camera_constants = ConstantBuffer::create(native, std::mem::size_of::<CameraConstants>())?;
        let model_constants = ConstantBuffer::create(native, std::mem::size_of::<ModelConstants>())?;
        write_constants(native, bytemuck::bytes_of(&LightConstants::default()), &light_constants);
        write_constants(native, bytemuck::bytes_of(&ModelConstants::default()), &model_constants);
        native.bind_constant_buffer(LIGHT_CONSTANTS_SLOT, light_constants.native());
        native.bind_constant_buffer(CAMERA_CONSTANTS_SLOT, camera_constants.native());
        native.bind_constant_buffer(MODEL_CONSTANTS_SLOT, model_constants.native());

        let depth_target = Texture::create_depth_target(native, width, height)?;

        log::info!("Renderer ready");
        Ok(Self {
            shaders: vec![default_shader],
            textures: vec![white],
            fonts: Vec::new(),
            light_constants,
            camera_constants,
            model_constants,
            immediate_pcu,
            immediate_pcutbn,
            states,
            depth_target,
            default_shader: ShaderId(0),
            default_texture: TextureId(0),
            current_shader: ShaderId(0),
            current_texture: TextureId(0),
            bracket: Bracket::Idle,
            stats: FrameStats::default(),
            config,
            backend,
        })
    }

    /// Release everything, caches first and the device last
    pub fn shutdown(self) {
        log::info!(
            "Renderer shutdown: {} shader(s), {} texture(s), {} font(s)",
            self.shaders.len(),
            self.textures.len(),
            self.fonts.len()
        );
        if self.bracket != Bracket::Idle {
            log::warn!("Shutdown inside an open {:?} bracket", self.bracket);
        }

        let Renderer {
            shaders,
            textures,
            fonts,
            light_constants,
            camera_constants,
            model_constants,
            immediate_pcu,
            immediate_pcutbn,
            states,
            depth_target,
            backend,
            ..
        } = self;

        drop(shaders);
        drop(fonts);
        drop(textures);
        drop((camera_constants, model_constants, light_constants));
        drop((immediate_pcu, immediate_pcutbn));
        drop(states);
        drop(depth_target);
        log::debug!("Releasing {} backend", backend.name());
        drop(backend);
    }

    /// Rebuild the swap chain and depth target for a new client size
    pub fn resize(&mut self, width: u32, height: u32) -> RendererResult<()> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.backend.resize(width, height);
        let (width, height) = self.backend.client_size();
        if (self.depth_target.width(), self.depth_target.height()) == (width, height) {
            return Ok(());
        }
        log::debug!("Resizing depth target to {}x{}", width, height);
        self.depth_target = Texture::create_depth_target(self.backend.as_mut(), width, height)?;
        if self.bracket != Bracket::Idle {
            self.backend.set_render_targets(self.depth_target.native());
        }
        Ok(())
    }

    // Resource factory

    /// Caller-owned dynamic vertex buffer
    pub fn create_vertex_buffer(&mut self, size: usize, stride: u32) -> RendererResult<VertexBuffer> {
        Ok(VertexBuffer::create(self.backend.as_mut(), size, stride)?)
    }

    /// Caller-owned dynamic index buffer of `u32` indices
    pub fn create_index_buffer(&mut self, size: usize) -> RendererResult<IndexBuffer> {
        Ok(IndexBuffer::create(self.backend.as_mut(), size)?)
    }

    /// Caller-owned fixed-size constant buffer
    pub fn create_constant_buffer(&mut self, size: usize) -> RendererResult<ConstantBuffer> {
        Ok(ConstantBuffer::create(self.backend.as_mut(), size)?)
    }

    /// Cached texture decoded from an image file
    pub fn create_or_get_texture_from_file<P: AsRef<Path>>(&mut self, path: P) -> RendererResult<TextureId> {
        let path = path.as_ref();
        let key = path.to_string_lossy();
        if let Some(id) = self.find_texture(&key) {
            return Ok(id);
        }
        let image = ImageData::from_file(path)?;
        self.add_texture(&key, &image)
    }

    /// Cached texture from already-decoded pixels, keyed by `name`
    pub fn create_or_get_texture_from_image(&mut self, name: &str, image: &ImageData) -> RendererResult<TextureId> {
        if let Some(id) = self.find_texture(name) {
            return Ok(id);
        }
        self.add_texture(name, image)
    }

    fn add_texture(&mut self, name: &str, image: &ImageData) -> RendererResult<TextureId> {
        let texture = Texture::create(self.backend.as_mut(), name, image)?;
        self.textures.push(texture);
        Ok(TextureId(self.textures.len() - 1))
    }

    /// Cached bitmap font whose glyph sheet is `<path_no_ext>.png`
    pub fn create_or_get_bitmap_font(&mut self, path_no_ext: &str) -> RendererResult<FontId> {
        if let Some(index) = self.fonts.iter().position(|f| f.name() == path_no_ext) {
            return Ok(FontId(index));
        }
        let texture = self.create_or_get_texture_from_file(format!("{path_no_ext}.png"))?;
        self.fonts.push(BitmapFont::new(path_no_ext, texture));
        Ok(FontId(self.fonts.len() - 1))
    }

    /// Cached shader compiled from WGSL source
    ///
    /// With `layout` unset, the layout is inferred from the vertex stage inputs.
    pub fn create_shader(
        &mut self,
        name: &str,
        source: &str,
        layout: Option<VertexLayout>,
    ) -> RendererResult<ShaderId> {
        if let Some(id) = self.find_shader(name) {
            return Ok(id);
        }
        let shader = Shader::create(
            self.backend.as_mut(),
            name,
            source,
            layout,
            (self.config.vertex_entry.as_str(), self.config.pixel_entry.as_str()),
            self.config.strict_shader_validation,
        )?;
        self.shaders.push(shader);
        Ok(ShaderId(self.shaders.len() - 1))
    }

    /// Cached shader loaded from `<shader_directory>/<name>.wgsl`
    pub fn create_or_get_shader_from_file(&mut self, name: &str) -> RendererResult<ShaderId> {
        if let Some(id) = self.find_shader(name) {
            return Ok(id);
        }
        let path = self.config.shader_directory.join(format!("{name}.wgsl"));
        let source = std::fs::read_to_string(&path)
            .map_err(|source| RendererError::ShaderSourceUnavailable { path, source })?;
        self.create_shader(name, &source, None)
    }

    // Cache lookup

    pub fn find_texture(&self, name: &str) -> Option<TextureId> {
        self.textures.iter().position(|t| t.name() == name).map(TextureId)
    }

    pub fn find_shader(&self, name: &str) -> Option<ShaderId> {
        self.shaders.iter().position(|s| s.name() == name).map(ShaderId)
    }

    pub fn texture(&self, id: TextureId) -> Option<&Texture> {
        self.textures.get(id.0)
    }

    pub fn shader(&self, id: ShaderId) -> Option<&Shader> {
        self.shaders.get(id.0)
    }

    pub fn font(&self, id: FontId) -> Option<&BitmapFont> {
        self.fonts.get(id.0)
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn shader_count(&self) -> usize {
        self.shaders.len()
    }

    pub fn font_count(&self) -> usize {
        self.fonts.len()
    }

    pub fn default_shader(&self) -> ShaderId {
        self.default_shader
    }

    pub fn default_texture(&self) -> TextureId {
        self.default_texture
    }

    pub fn current_shader(&self) -> ShaderId {
        self.current_shader
    }

    pub fn current_texture(&self) -> TextureId {
        self.current_texture
    }

    // State

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Window client-area size in pixels
    pub fn client_size(&self) -> (u32, u32) {
        self.backend.client_size()
    }

    pub fn depth_target(&self) -> &Texture {
        &self.depth_target
    }

    pub fn backend(&self) -> &dyn GraphicsBackend {
        self.backend.as_ref()
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.states.blend.desired()
    }

    pub fn sampler_mode(&self) -> SamplerMode {
        self.states.sampler.desired()
    }

    pub fn rasterizer_mode(&self) -> RasterizerMode {
        self.states.rasterizer.desired()
    }

    pub fn depth_mode(&self) -> DepthMode {
        self.states.depth.desired()
    }

    /// Blend mode currently active on the context
    pub fn active_blend_mode(&self) -> Option<BlendMode> {
        self.states.blend.active()
    }

    pub fn active_sampler_mode(&self) -> Option<SamplerMode> {
        self.states.sampler.active()
    }

    pub fn active_rasterizer_mode(&self) -> Option<RasterizerMode> {
        self.states.rasterizer.active()
    }

    pub fn active_depth_mode(&self) -> Option<DepthMode> {
        self.states.depth.active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{JournalHandle, ObjectKind, RecordingBackend};

    fn renderer() -> (Renderer, JournalHandle) {
        let backend = RecordingBackend::new(320, 240);
        let journal = backend.journal();
        let renderer = Renderer::startup(Box::new(backend), RendererConfig::default()).unwrap();
        (renderer, journal)
    }

    #[test]
    fn test_startup_creates_defaults() {
        let (renderer, journal) = renderer();
        let journal = journal.lock();

        assert_eq!(renderer.shader_count(), 1);
        assert_eq!(renderer.texture_count(), 1);
        assert_eq!(renderer.texture(renderer.default_texture()).map(|t| t.width()), Some(2));
        assert_eq!(journal.live_count(ObjectKind::Shader), 1);
        // white texture + depth target
        assert_eq!(journal.live_count(ObjectKind::Texture), 2);
        // two scratch vertex buffers + three constant buffers
        assert_eq!(journal.live_count(ObjectKind::Buffer), 5);
        assert_eq!(renderer.active_blend_mode(), Some(BlendMode::Alpha));
        assert_eq!(renderer.active_depth_mode(), Some(DepthMode::Enabled));
    }

    #[test]
    fn test_startup_failure_is_returned() {
        let backend = RecordingBackend::new(320, 240);
        let journal = backend.journal();
        journal.lock().fail_next_creation(ObjectKind::Sampler);

        let result = Renderer::startup(Box::new(backend), RendererConfig::default());
        assert!(matches!(result, Err(RendererError::Backend(_))));
        // everything created before the failure was released
        assert_eq!(journal.lock().total_live(), 0);
    }

    #[test]
    fn test_shader_cache_returns_same_id() {
        let (mut renderer, _journal) = renderer();
        let a = renderer.create_shader("Copy", DEFAULT_SHADER_SOURCE, None).unwrap();
        let b = renderer.create_shader("Copy", "not even wgsl", None).unwrap();
        assert_eq!(a, b);
        assert_eq!(renderer.shader_count(), 2);
        assert_eq!(renderer.find_shader("Default"), Some(renderer.default_shader()));
    }

    #[test]
    fn test_missing_shader_file() {
        let (mut renderer, _journal) = renderer();
        let err = renderer.create_or_get_shader_from_file("Nope").unwrap_err();
        assert!(matches!(err, RendererError::ShaderSourceUnavailable { .. }));
    }

    #[test]
    fn test_resize_recreates_depth_target() {
        let (mut renderer, journal) = renderer();
        let old = renderer.depth_target().native_id();

        renderer.resize(640, 480).unwrap();

        assert_eq!(renderer.client_size(), (640, 480));
        assert_eq!((renderer.depth_target().width(), renderer.depth_target().height()), (640, 480));
        assert_eq!(journal.lock().release_count(old), 1);
    }
}
