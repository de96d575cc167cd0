//! Bitmap fonts laid out as a 16x16 glyph sheet

use glam::Vec2;

use crate::resources::vertex::{add_verts_for_aabb2, Aabb2, Rgba8, VertexPcu};
use crate::TextureId;

const GLYPHS_PER_ROW: u32 = 16;

/// A font whose glyphs are cells of a 16x16 texture sheet, indexed by byte value
#[derive(Debug, Clone)]
pub struct BitmapFont {
    name: String,
    texture: TextureId,
}

impl BitmapFont {
    pub(crate) fn new(name: &str, texture: TextureId) -> Self {
        Self {
            name: name.to_string(),
            texture,
        }
    }

    /// Base path without extension; the cache key
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Glyph sheet texture, for [`crate::Renderer::bind_texture`]
    pub fn texture(&self) -> TextureId {
        self.texture
    }

    /// Texture-space bounds of a glyph cell
    pub fn glyph_uvs(&self, glyph: u8) -> Aabb2 {
        let cell = 1.0 / GLYPHS_PER_ROW as f32;
        let column = (u32::from(glyph) % GLYPHS_PER_ROW) as f32;
        let row = (u32::from(glyph) / GLYPHS_PER_ROW) as f32;
        Aabb2::new(
            Vec2::new(column * cell, row * cell),
            Vec2::new((column + 1.0) * cell, (row + 1.0) * cell),
        )
    }

    /// Width of `text` drawn with the given cell size
    pub fn text_width(&self, cell_height: f32, text: &str, cell_aspect: f32) -> f32 {
        text.len() as f32 * cell_height * cell_aspect
    }

    /// Append one quad per byte of `text`, starting at `text_mins` (bottom left)
    pub fn add_verts_for_text_2d(
        &self,
        verts: &mut Vec<VertexPcu>,
        text_mins: Vec2,
        cell_height: f32,
        text: &str,
        tint: Rgba8,
        cell_aspect: f32,
    ) {
        let cell_width = cell_height * cell_aspect;
        for (i, glyph) in text.bytes().enumerate() {
            let mins = text_mins + Vec2::new(i as f32 * cell_width, 0.0);
            let bounds = Aabb2::new(mins, mins + Vec2::new(cell_width, cell_height));
            add_verts_for_aabb2(verts, bounds, tint, self.glyph_uvs(glyph));
        }
    }
}
