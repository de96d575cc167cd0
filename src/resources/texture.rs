//! Texture loading and management

use crate::backend::*;
use crate::error::{RendererError, RendererResult};
use image::{DynamicImage, GenericImageView};
use std::path::Path;

/// Decoded RGBA8 pixels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl ImageData {
    /// Load and decode an image file
    pub fn from_file<P: AsRef<Path>>(path: P) -> RendererResult<Self> {
        let path = path.as_ref();
        let img = image::open(path).map_err(|e| RendererError::ImageDecodeFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(Self::from_image(img))
    }

    /// Decode an in-memory encoded image
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, image::ImageError> {
        image::load_from_memory(bytes).map(Self::from_image)
    }

    fn from_image(img: DynamicImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            pixels: img.to_rgba8().into_raw(),
        }
    }

    /// A `width` x `height` image of a single color
    pub fn solid_color(width: u32, height: u32, color: [u8; 4]) -> Self {
        let pixels = color
            .iter()
            .copied()
            .cycle()
            .take((width * height * 4) as usize)
            .collect();
        Self {
            width,
            height,
            pixels,
        }
    }

    /// RGBA8 at (x, y), or `None` out of bounds
    pub fn texel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let start = ((y * self.width + x) * 4) as usize;
        let mut texel = [0u8; 4];
        texel.copy_from_slice(&self.pixels[start..start + 4]);
        Some(texel)
    }
}

/// Immutable 2D texture and its shader-read view
#[derive(Debug)]
pub struct Texture {
    native: GpuTexture,
    width: u32,
    height: u32,
    name: String,
}

impl Texture {
    pub(crate) fn create(
        backend: &mut dyn GraphicsBackend,
        name: &str,
        image: &ImageData,
    ) -> BackendResult<Self> {
        let native = backend.create_texture(
            &TextureDescriptor {
                label: Some(name.to_string()),
                width: image.width,
                height: image.height,
                format: TextureFormat::Rgba8Unorm,
            },
            Some(&image.pixels),
        )?;
        log::debug!("Created texture '{}' ({}x{})", name, image.width, image.height);
        Ok(Self {
            native,
            width: image.width,
            height: image.height,
            name: name.to_string(),
        })
    }

    /// Depth-stencil target sized to the window client area
    pub(crate) fn create_depth_target(
        backend: &mut dyn GraphicsBackend,
        width: u32,
        height: u32,
    ) -> BackendResult<Self> {
        let native = backend.create_texture(
            &TextureDescriptor {
                label: Some("DepthStencil".into()),
                width,
                height,
                format: TextureFormat::Depth32Float,
            },
            None,
        )?;
        Ok(Self {
            native,
            width,
            height,
            name: "DepthStencil".into(),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Source path or synthetic name; the cache key
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn native_id(&self) -> u64 {
        self.native.id()
    }

    pub(crate) fn native(&self) -> &GpuTexture {
        &self.native
    }
}
