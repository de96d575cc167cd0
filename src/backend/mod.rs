//! Backend abstraction layer
//!
//! Provides the [`GraphicsBackend`] trait and the native object types both
//! backends hand out.
//!
//! # Available Backends
//!
//! - [`RecordingBackend`]: no GPU; journals every call and tracks object lifetimes
//! - `WgpuBackend` (feature `wgpu-backend`): cross-platform GPU backend using wgpu
//!
//! # Native objects
//!
//! Each native object kind is an enum with one variant per backend. Objects are
//! owned: dropping one releases the native allocation (wgpu reference counting,
//! or a release entry in the recording journal). None of them is `Clone`.

pub mod recording;
pub mod traits;
pub mod types;

#[cfg(feature = "wgpu-backend")]
pub mod wgpu_backend;

pub use recording::{Journal, JournalHandle, ObjectKind, RecordedCommand, RecordedObject, RecordingBackend};
pub use traits::*;
pub use types::*;

#[cfg(feature = "wgpu-backend")]
use std::sync::Arc;

/// Native GPU buffer
#[derive(Debug)]
pub enum GpuBuffer {
    Recording(RecordedObject),
    #[cfg(feature = "wgpu-backend")]
    Wgpu { id: u64, buffer: Arc<wgpu::Buffer> },
}

/// Native 2D texture together with its shader-read (or depth) view
#[derive(Debug)]
pub enum GpuTexture {
    Recording(RecordedObject),
    #[cfg(feature = "wgpu-backend")]
    Wgpu {
        id: u64,
        texture: Arc<wgpu::Texture>,
        view: Arc<wgpu::TextureView>,
    },
}

/// Native vertex + pixel programs with their input layout
#[derive(Debug)]
pub enum GpuShader {
    Recording(RecordedObject),
    #[cfg(feature = "wgpu-backend")]
    Wgpu {
        id: u64,
        module: Arc<wgpu::ShaderModule>,
        vertex_entry: String,
        pixel_entry: String,
        vertex_layout: VertexBufferLayout,
    },
}

/// Native sampler state object
#[derive(Debug)]
pub enum GpuSampler {
    Recording(RecordedObject),
    #[cfg(feature = "wgpu-backend")]
    Wgpu { id: u64, sampler: Arc<wgpu::Sampler> },
}

/// Native blend state object
#[derive(Debug)]
pub enum GpuBlendState {
    Recording(RecordedObject),
    #[cfg(feature = "wgpu-backend")]
    Wgpu {
        id: u64,
        blend: Option<wgpu::BlendState>,
    },
}

/// Native rasterizer state object
#[derive(Debug)]
pub enum GpuRasterizerState {
    Recording(RecordedObject),
    #[cfg(feature = "wgpu-backend")]
    Wgpu {
        id: u64,
        primitive: wgpu::PrimitiveState,
    },
}

/// Native depth-stencil state object
#[derive(Debug)]
pub enum GpuDepthState {
    Recording(RecordedObject),
    #[cfg(feature = "wgpu-backend")]
    Wgpu {
        id: u64,
        depth_write_enabled: bool,
        depth_compare: wgpu::CompareFunction,
    },
}

macro_rules! native_object_id {
    ($($ty:ident),* $(,)?) => {
        $(
            impl $ty {
                /// Backend-unique id of the native object
                pub fn id(&self) -> u64 {
                    match self {
                        Self::Recording(object) => object.id(),
                        #[cfg(feature = "wgpu-backend")]
                        Self::Wgpu { id, .. } => *id,
                    }
                }
            }
        )*
    };
}

native_object_id!(
    GpuBuffer,
    GpuTexture,
    GpuShader,
    GpuSampler,
    GpuBlendState,
    GpuRasterizerState,
    GpuDepthState,
);
