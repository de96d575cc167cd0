//! Owned GPU buffers

use crate::backend::{BackendResult, BufferDescriptor, BufferUsage, GpuBuffer, GraphicsBackend};

mod sealed {
    pub trait Sealed {}
}

/// A buffer that reallocates itself when written past its capacity
///
/// Implemented by [`VertexBuffer`] and [`IndexBuffer`]. Growth swaps the native
/// buffer, so [`GrowableBuffer::native_id`] may change across an upload.
pub trait GrowableBuffer: sealed::Sealed {
    /// Capacity in bytes
    fn size(&self) -> usize;

    /// Id of the native buffer currently backing this handle
    fn native_id(&self) -> u64;

    #[doc(hidden)]
    fn native(&self) -> &GpuBuffer;

    #[doc(hidden)]
    fn usage(&self) -> BufferUsage;

    #[doc(hidden)]
    fn replace_native(&mut self, native: GpuBuffer, size: usize);
}

/// Dynamic vertex buffer
#[derive(Debug)]
pub struct VertexBuffer {
    native: GpuBuffer,
    size: usize,
    stride: u32,
}

impl VertexBuffer {
    pub(crate) fn create(
        backend: &mut dyn GraphicsBackend,
        size: usize,
        stride: u32,
    ) -> BackendResult<Self> {
        let native = backend.create_buffer(&BufferDescriptor {
            label: Some("Vertex Buffer".into()),
            size: size as u64,
            usage: BufferUsage::Vertex,
        })?;
        Ok(Self {
            native,
            size,
            stride,
        })
    }

    /// Bytes per vertex
    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Number of whole vertices that fit
    pub fn vertex_capacity(&self) -> usize {
        self.size / self.stride.max(1) as usize
    }
}

impl sealed::Sealed for VertexBuffer {}

impl GrowableBuffer for VertexBuffer {
    fn size(&self) -> usize {
        self.size
    }

    fn native_id(&self) -> u64 {
        self.native.id()
    }

    fn native(&self) -> &GpuBuffer {
        &self.native
    }

    fn usage(&self) -> BufferUsage {
        BufferUsage::Vertex
    }

    fn replace_native(&mut self, native: GpuBuffer, size: usize) {
        self.native = native;
        self.size = size;
    }
}

/// Dynamic index buffer of `u32` indices
#[derive(Debug)]
pub struct IndexBuffer {
    native: GpuBuffer,
    size: usize,
}

impl IndexBuffer {
    pub(crate) fn create(backend: &mut dyn GraphicsBackend, size: usize) -> BackendResult<Self> {
        let native = backend.create_buffer(&BufferDescriptor {
            label: Some("Index Buffer".into()),
            size: size as u64,
            usage: BufferUsage::Index,
        })?;
        Ok(Self { native, size })
    }

    /// Number of whole indices that fit
    pub fn index_capacity(&self) -> usize {
        self.size / std::mem::size_of::<u32>()
    }
}

impl sealed::Sealed for IndexBuffer {}

impl GrowableBuffer for IndexBuffer {
    fn size(&self) -> usize {
        self.size
    }

    fn native_id(&self) -> u64 {
        self.native.id()
    }

    fn native(&self) -> &GpuBuffer {
        &self.native
    }

    fn usage(&self) -> BufferUsage {
        BufferUsage::Index
    }

    fn replace_native(&mut self, native: GpuBuffer, size: usize) {
        self.native = native;
        self.size = size;
    }
}

/// Fixed-size constant buffer
#[derive(Debug)]
pub struct ConstantBuffer {
    native: GpuBuffer,
    size: usize,
}

impl ConstantBuffer {
    pub(crate) fn create(backend: &mut dyn GraphicsBackend, size: usize) -> BackendResult<Self> {
        let native = backend.create_buffer(&BufferDescriptor {
            label: Some("Constant Buffer".into()),
            size: size as u64,
            usage: BufferUsage::Constant,
        })?;
        Ok(Self { native, size })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn native_id(&self) -> u64 {
        self.native.id()
    }

    pub(crate) fn native(&self) -> &GpuBuffer {
        &self.native
    }
}

/// Discard-write `data` into `buffer`, reallocating it first if `data` is larger
/// than its capacity
///
/// The old native buffer is dropped as soon as the new one replaces it.
pub(crate) fn grow_and_write<B: GrowableBuffer + ?Sized>(
    backend: &mut dyn GraphicsBackend,
    data: &[u8],
    buffer: &mut B,
) -> BackendResult<()> {
    if data.len() > buffer.size() {
        log::debug!(
            "Growing {:?} buffer from {} to {} bytes",
            buffer.usage(),
            buffer.size(),
            data.len()
        );
        let native = backend.create_buffer(&BufferDescriptor {
            label: Some(format!("{:?} Buffer", buffer.usage())),
            size: data.len() as u64,
            usage: buffer.usage(),
        })?;
        buffer.replace_native(native, data.len());
    }
    backend.write_buffer(buffer.native(), data);
    Ok(())
}

/// Discard-write `data` into a constant buffer; never grows
pub(crate) fn write_constants(backend: &mut dyn GraphicsBackend, data: &[u8], buffer: &ConstantBuffer) {
    debug_assert!(
        data.len() <= buffer.size(),
        "constant upload of {} bytes exceeds buffer size {}",
        data.len(),
        buffer.size()
    );
    let len = data.len().min(buffer.size());
    backend.write_buffer(buffer.native(), &data[..len]);
}
