//! Draw submission, constant uploads, binds and render-state selection

use glam::Mat4;

use super::constants::*;
use super::states::{BlendMode, DepthMode, RasterizerMode, RenderMode, SamplerMode};
use super::{Renderer, ShaderId, TextureId};
use crate::error::RendererResult;
use crate::resources::buffer::{grow_and_write, write_constants};
use crate::resources::*;

impl Renderer {
    // Render state selection. These only record the desired mode.

    pub fn set_blend_mode(&mut self, mode: BlendMode) {
        self.states.blend.desire(mode);
    }

    pub fn set_sampler_mode(&mut self, mode: SamplerMode) {
        self.states.sampler.desire(mode);
    }

    pub fn set_rasterizer_mode(&mut self, mode: RasterizerMode) {
        self.states.rasterizer.desire(mode);
    }

    pub fn set_depth_mode(&mut self, mode: DepthMode) {
        self.states.depth.desire(mode);
    }

    /// Select a blend mode by name; unknown names leave the mode unchanged
    pub fn set_blend_mode_by_name(&mut self, name: &str) {
        if let Some(mode) = parse_mode_or_warn(name, self.blend_mode()) {
            self.set_blend_mode(mode);
        }
    }

    pub fn set_sampler_mode_by_name(&mut self, name: &str) {
        if let Some(mode) = parse_mode_or_warn(name, self.sampler_mode()) {
            self.set_sampler_mode(mode);
        }
    }

    pub fn set_rasterizer_mode_by_name(&mut self, name: &str) {
        if let Some(mode) = parse_mode_or_warn(name, self.rasterizer_mode()) {
            self.set_rasterizer_mode(mode);
        }
    }

    pub fn set_depth_mode_by_name(&mut self, name: &str) {
        if let Some(mode) = parse_mode_or_warn(name, self.depth_mode()) {
            self.set_depth_mode(mode);
        }
    }

    /// Activate every desired state that isn't active yet
    ///
    /// Runs before every draw; calling it directly is only useful to push
    /// state changes ahead of a draw issued elsewhere.
    pub fn reconcile_states(&mut self) {
        let activations = self.states.reconcile(self.backend.as_mut());
        self.stats.state_changes += activations;
    }

    /// Forget which modes are active so the next draw re-activates all four
    pub fn invalidate_states(&mut self) {
        self.states.invalidate();
    }

    // Buffer uploads

    /// Discard-write `data` into a vertex or index buffer, growing it when needed
    ///
    /// Growth replaces the native buffer and keeps the stride.
    pub fn copy_cpu_to_gpu<B: GrowableBuffer>(&mut self, data: &[u8], buffer: &mut B) -> RendererResult<()> {
        grow_and_write(self.backend.as_mut(), data, buffer)?;
        Ok(())
    }

    /// Discard-write `data` into a constant buffer
    ///
    /// Constant buffers never grow; `data` must fit (checked in debug builds).
    pub fn copy_cpu_to_gpu_constants(&mut self, data: &[u8], buffer: &ConstantBuffer) {
        write_constants(self.backend.as_mut(), data, buffer);
    }

    /// Bind a caller-owned constant buffer to `slot` of both shader stages
    pub fn bind_constant_buffer(&mut self, slot: u32, buffer: &ConstantBuffer) {
        self.backend.bind_constant_buffer(slot, buffer.native());
    }

    /// Upload and bind the model constants
    pub fn set_model_constants(&mut self, model: Mat4, color: Rgba8) {
        let constants = ModelConstants::new(model, color);
        write_constants(
            self.backend.as_mut(),
            bytemuck::bytes_of(&constants),
            &self.model_constants,
        );
        self.backend
            .bind_constant_buffer(MODEL_CONSTANTS_SLOT, self.model_constants.native());
    }

    /// Upload and bind the lighting constants
    pub fn set_light_constants(&mut self, constants: &LightConstants) {
        write_constants(
            self.backend.as_mut(),
            bytemuck::bytes_of(constants),
            &self.light_constants,
        );
        self.backend
            .bind_constant_buffer(LIGHT_CONSTANTS_SLOT, self.light_constants.native());
    }

    // Binds

    /// Bind a cached shader, or the default shader for `None`
    pub fn bind_shader(&mut self, shader: Option<ShaderId>) {
        let mut id = shader.unwrap_or(self.default_shader);
        if self.shaders.get(id.0).is_none() {
            log::error!("Unknown {:?}; binding the default shader", id);
            id = self.default_shader;
        }
        if id == self.current_shader {
            return;
        }
        self.current_shader = id;
        if let Some(shader) = self.shaders.get(id.0) {
            self.backend.bind_shader(shader.native());
        }
    }

    /// Bind a cached texture, or the default white texture for `None`
    pub fn bind_texture(&mut self, texture: Option<TextureId>) {
        let mut id = texture.unwrap_or(self.default_texture);
        if self.textures.get(id.0).is_none() {
            log::error!("Unknown {:?}; binding the default texture", id);
            id = self.default_texture;
        }
        if id == self.current_texture {
            return;
        }
        self.current_texture = id;
        if let Some(texture) = self.textures.get(id.0) {
            self.backend.bind_texture(0, texture.native());
        }
    }

    // Draws

    /// Copy `vertices` into the scratch buffer of their layout and draw them
    ///
    /// An empty slice draws nothing. Fails only if the scratch buffer had to
    /// grow and the reallocation failed.
    pub fn draw_vertex_array<V: Vertex>(&mut self, vertices: &[V]) -> RendererResult<()> {
        if vertices.is_empty() {
            return Ok(());
        }
        let scratch = match V::LAYOUT {
            VertexLayout::Pcu => &mut self.immediate_pcu,
            VertexLayout::Pcutbn => &mut self.immediate_pcutbn,
        };
        grow_and_write(self.backend.as_mut(), bytemuck::cast_slice(vertices), scratch)?;
        self.backend.bind_vertex_buffer(scratch.native(), V::LAYOUT.stride());

        self.check_vertex_layout(V::LAYOUT.stride());
        self.reconcile_states();
        let count = vertices.len() as u32;
        self.backend.draw(count, 0);
        self.stats.draw_calls += 1;
        self.stats.vertices += u64::from(count);
        Ok(())
    }

    /// Draw the first `vertex_count` vertices of a caller-owned buffer
    pub fn draw_vertex_buffer(&mut self, vbo: &VertexBuffer, vertex_count: usize) {
        if vertex_count == 0 {
            return;
        }
        self.backend.bind_vertex_buffer(vbo.native(), vbo.stride());
        self.check_vertex_layout(vbo.stride());
        self.reconcile_states();
        self.backend.draw(vertex_count as u32, 0);
        self.stats.draw_calls += 1;
        self.stats.vertices += vertex_count as u64;
    }

    /// Draw `index_count` indices of `ibo` over the vertices of `vbo`
    pub fn draw_vertex_buffer_indexed(&mut self, vbo: &VertexBuffer, ibo: &IndexBuffer, index_count: usize) {
        if index_count == 0 {
            return;
        }
        self.backend.bind_vertex_buffer(vbo.native(), vbo.stride());
        self.backend.bind_index_buffer(ibo.native());
        self.check_vertex_layout(vbo.stride());
        self.reconcile_states();
        self.backend.draw_indexed(index_count as u32, 0, 0);
        self.stats.draw_calls += 1;
        self.stats.indices += index_count as u64;
    }

    /// Warn in debug builds when vertex data doesn't match the bound shader
    fn check_vertex_layout(&self, stride: u32) {
        if !cfg!(debug_assertions) {
            return;
        }
        if let Some(shader) = self.shaders.get(self.current_shader.0) {
            if shader.layout().stride() != stride {
                log::warn!(
                    "Shader '{}' expects {:?} vertices ({} bytes) but the bound stride is {}",
                    shader.name(),
                    shader.layout(),
                    shader.layout().stride(),
                    stride
                );
            }
        }
    }
}

fn parse_mode_or_warn<M: RenderMode>(name: &str, current: M) -> Option<M>
where
    M::Err: std::fmt::Display,
{
    match name.parse::<M>() {
        Ok(mode) => Some(mode),
        Err(err) => {
            log::warn!("{}; keeping {}", err, current);
            None
        }
    }
}
