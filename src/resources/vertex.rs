//! Vertex layouts and CPU-side geometry helpers

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

use crate::backend::{VertexAttribute, VertexBufferLayout, VertexFormat};

/// 8-bit RGBA color, the vertex color and tint format
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const WHITE: Self = Self::new(255, 255, 255, 255);
    pub const BLACK: Self = Self::new(0, 0, 0, 255);
    pub const RED: Self = Self::new(255, 0, 0, 255);
    pub const GREEN: Self = Self::new(0, 255, 0, 255);
    pub const BLUE: Self = Self::new(0, 0, 255, 255);
    pub const TRANSPARENT: Self = Self::new(0, 0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Normalized `[r, g, b, a]` floats
    pub fn to_f32_array(self) -> [f32; 4] {
        [
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
            self.a as f32 / 255.0,
        ]
    }
}

impl Default for Rgba8 {
    fn default() -> Self {
        Self::WHITE
    }
}

/// The two vertex layouts the renderer supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexLayout {
    /// Position, color, uv
    Pcu,
    /// Position, color, uv, tangent, bitangent, normal
    Pcutbn,
}

impl VertexLayout {
    /// Bytes per vertex
    pub fn stride(self) -> u32 {
        match self {
            VertexLayout::Pcu => std::mem::size_of::<VertexPcu>() as u32,
            VertexLayout::Pcutbn => std::mem::size_of::<VertexPcutbn>() as u32,
        }
    }

    /// Input layout description for shader creation
    pub fn buffer_layout(self) -> VertexBufferLayout {
        let mut attributes = vec![
            VertexAttribute {
                location: 0,
                format: VertexFormat::Float32x3,
                offset: 0,
            },
            VertexAttribute {
                location: 1,
                format: VertexFormat::Unorm8x4,
                offset: 12,
            },
            VertexAttribute {
                location: 2,
                format: VertexFormat::Float32x2,
                offset: 16,
            },
        ];
        if self == VertexLayout::Pcutbn {
            for (i, offset) in [24, 36, 48].into_iter().enumerate() {
                attributes.push(VertexAttribute {
                    location: 3 + i as u32,
                    format: VertexFormat::Float32x3,
                    offset,
                });
            }
        }
        VertexBufferLayout {
            array_stride: u64::from(self.stride()),
            attributes,
        }
    }
}

/// A vertex type that can be submitted to the draw pipeline
pub trait Vertex: Pod {
    const LAYOUT: VertexLayout;
}

/// Position, color, uv vertex (24 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct VertexPcu {
    pub position: Vec3,
    pub color: Rgba8,
    pub uv: Vec2,
}

impl VertexPcu {
    pub fn new(position: Vec3, color: Rgba8, uv: Vec2) -> Self {
        Self {
            position,
            color,
            uv,
        }
    }
}

impl Vertex for VertexPcu {
    const LAYOUT: VertexLayout = VertexLayout::Pcu;
}

/// Position, color, uv, tangent, bitangent, normal vertex (60 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct VertexPcutbn {
    pub position: Vec3,
    pub color: Rgba8,
    pub uv: Vec2,
    pub tangent: Vec3,
    pub bitangent: Vec3,
    pub normal: Vec3,
}

impl Vertex for VertexPcutbn {
    const LAYOUT: VertexLayout = VertexLayout::Pcutbn;
}

/// Axis-aligned 2D box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb2 {
    pub mins: Vec2,
    pub maxs: Vec2,
}

impl Aabb2 {
    pub const ZERO_TO_ONE: Self = Self {
        mins: Vec2::ZERO,
        maxs: Vec2::ONE,
    };

    pub fn new(mins: Vec2, maxs: Vec2) -> Self {
        Self { mins, maxs }
    }

    pub fn dimensions(&self) -> Vec2 {
        self.maxs - self.mins
    }
}

/// Append two counter-clockwise triangles covering `bounds` at z = 0
///
/// `uvs` is in texture space (v grows downward), so the image appears upright
/// in a y-up view.
pub fn add_verts_for_aabb2(verts: &mut Vec<VertexPcu>, bounds: Aabb2, color: Rgba8, uvs: Aabb2) {
    let bl = VertexPcu::new(
        bounds.mins.extend(0.0),
        color,
        Vec2::new(uvs.mins.x, uvs.maxs.y),
    );
    let br = VertexPcu::new(
        Vec3::new(bounds.maxs.x, bounds.mins.y, 0.0),
        color,
        uvs.maxs,
    );
    let tr = VertexPcu::new(
        bounds.maxs.extend(0.0),
        color,
        Vec2::new(uvs.maxs.x, uvs.mins.y),
    );
    let tl = VertexPcu::new(
        Vec3::new(bounds.mins.x, bounds.maxs.y, 0.0),
        color,
        uvs.mins,
    );
    verts.extend_from_slice(&[bl, br, tr, bl, tr, tl]);
}
