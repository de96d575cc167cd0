//! GPU resource handles
//!
//! Each resource owns exactly one native object and releases it on drop.
//! Constructors are crate-private: resources are created through
//! [`crate::Renderer`].

pub mod buffer;
pub mod font;
pub mod shader;
pub mod texture;
pub mod vertex;

pub use buffer::{ConstantBuffer, GrowableBuffer, IndexBuffer, VertexBuffer};
pub use font::BitmapFont;
pub use shader::{Shader, DEFAULT_SHADER_NAME, DEFAULT_SHADER_SOURCE};
pub use texture::{ImageData, Texture};
pub use vertex::{add_verts_for_aabb2, Aabb2, Rgba8, Vertex, VertexLayout, VertexPcu, VertexPcutbn};
