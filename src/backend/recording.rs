//! Recording backend for tests and headless runs.
//!
//! This backend doesn't touch a GPU. Every native call is appended to a shared
//! [`Journal`], and every native object it hands out reports its own release
//! when dropped, so callers can check creation/release balance and the exact
//! sequence of context calls.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::backend::{
    GpuBlendState, GpuBuffer, GpuDepthState, GpuRasterizerState, GpuSampler, GpuShader,
    GpuTexture,
};

/// Shared handle to a recording journal
pub type JournalHandle = Arc<Mutex<Journal>>;

/// Kind of a native object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Buffer,
    Texture,
    Shader,
    Sampler,
    BlendState,
    RasterizerState,
    DepthState,
}

/// One journaled backend call
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    Create {
        kind: ObjectKind,
        id: u64,
        label: Option<String>,
    },
    Release {
        kind: ObjectKind,
        id: u64,
    },
    Resize {
        width: u32,
        height: u32,
    },
    WriteBuffer {
        id: u64,
        data: Vec<u8>,
    },
    BeginFrame,
    SetRenderTargets {
        depth_target: u64,
    },
    ClearRenderTarget([f32; 4]),
    ClearDepth(f32),
    Present,
    SetViewport(Viewport),
    SetBlendState(u64),
    SetSampler {
        slot: u32,
        id: u64,
    },
    SetRasterizerState(u64),
    SetDepthState(u64),
    BindShader(u64),
    BindVertexBuffer {
        id: u64,
        stride: u32,
    },
    BindIndexBuffer(u64),
    BindConstantBuffer {
        slot: u32,
        id: u64,
    },
    BindTexture {
        slot: u32,
        id: u64,
    },
    Draw {
        vertex_count: u32,
        first_vertex: u32,
    },
    DrawIndexed {
        index_count: u32,
        first_index: u32,
        base_vertex: i32,
    },
}

impl RecordedCommand {
    /// True for the four state-object activation calls
    pub fn is_state_activation(&self) -> bool {
        matches!(
            self,
            RecordedCommand::SetBlendState(_)
                | RecordedCommand::SetSampler { .. }
                | RecordedCommand::SetRasterizerState(_)
                | RecordedCommand::SetDepthState(_)
        )
    }

    /// True for non-indexed and indexed draws
    pub fn is_draw(&self) -> bool {
        matches!(
            self,
            RecordedCommand::Draw { .. } | RecordedCommand::DrawIndexed { .. }
        )
    }
}

/// Journal of backend calls and native object lifetimes
#[derive(Debug, Default)]
pub struct Journal {
    commands: Vec<RecordedCommand>,
    live: HashMap<u64, ObjectKind>,
    created: HashMap<ObjectKind, usize>,
    release_counts: HashMap<u64, u32>,
    next_id: u64,
    fail_next: Option<ObjectKind>,
    device_lost: bool,
}

impl Journal {
    /// All calls recorded since creation or the last [`Journal::clear_commands`]
    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    /// Forget recorded calls; lifetime tracking is kept
    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// Number of recorded calls matching `predicate`
    pub fn count(&self, predicate: impl Fn(&RecordedCommand) -> bool) -> usize {
        self.commands.iter().filter(|c| predicate(c)).count()
    }

    /// Number of live native objects of `kind`
    pub fn live_count(&self, kind: ObjectKind) -> usize {
        self.live.values().filter(|k| **k == kind).count()
    }

    /// Number of live native objects of any kind
    pub fn total_live(&self) -> usize {
        self.live.len()
    }

    /// Number of native objects of `kind` ever created
    pub fn created_count(&self, kind: ObjectKind) -> usize {
        self.created.get(&kind).copied().unwrap_or(0)
    }

    /// How many times the object `id` was released
    pub fn release_count(&self, id: u64) -> u32 {
        self.release_counts.get(&id).copied().unwrap_or(0)
    }

    /// Whether the object `id` is still alive
    pub fn is_live(&self, id: u64) -> bool {
        self.live.contains_key(&id)
    }

    /// Ids released more than once
    pub fn double_releases(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .release_counts
            .iter()
            .filter(|(_, count)| **count > 1)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Make the next creation of `kind` fail
    pub fn fail_next_creation(&mut self, kind: ObjectKind) {
        self.fail_next = Some(kind);
    }

    /// Make every following frame acquire and present report a lost device
    pub fn set_device_lost(&mut self, lost: bool) {
        self.device_lost = lost;
    }

    fn record(&mut self, command: RecordedCommand) {
        self.commands.push(command);
    }

    fn allocate(&mut self, kind: ObjectKind, label: Option<String>) -> Option<u64> {
        if self.fail_next == Some(kind) {
            self.fail_next = None;
            return None;
        }
        self.next_id += 1;
        let id = self.next_id;
        self.live.insert(id, kind);
        *self.created.entry(kind).or_insert(0) += 1;
        self.record(RecordedCommand::Create { kind, id, label });
        Some(id)
    }

    fn release(&mut self, id: u64, kind: ObjectKind) {
        *self.release_counts.entry(id).or_insert(0) += 1;
        if self.live.remove(&id).is_none() {
            log::error!("RecordingBackend: {:?} {} released twice", kind, id);
        }
        self.record(RecordedCommand::Release { kind, id });
    }
}

/// A native object handed out by [`RecordingBackend`]
///
/// Dropping it records the release in the journal it came from.
pub struct RecordedObject {
    id: u64,
    kind: ObjectKind,
    journal: JournalHandle,
}

impl RecordedObject {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }
}

impl fmt::Debug for RecordedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordedObject")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl Drop for RecordedObject {
    fn drop(&mut self) {
        self.journal.lock().release(self.id, self.kind);
    }
}

/// Recording GPU backend
pub struct RecordingBackend {
    journal: JournalHandle,
    client_size: (u32, u32),
}

impl RecordingBackend {
    /// Create a backend whose window client area is `width` x `height`
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            journal: Arc::new(Mutex::new(Journal::default())),
            client_size: (width, height),
        }
    }

    /// Shared handle to this backend's journal
    pub fn journal(&self) -> JournalHandle {
        Arc::clone(&self.journal)
    }

    fn create(
        &mut self,
        kind: ObjectKind,
        label: Option<String>,
    ) -> Option<RecordedObject> {
        let id = self.journal.lock().allocate(kind, label)?;
        Some(RecordedObject {
            id,
            kind,
            journal: Arc::clone(&self.journal),
        })
    }

    fn record(&mut self, command: RecordedCommand) {
        log::trace!("RecordingBackend: {:?}", command);
        self.journal.lock().record(command);
    }
}

impl GraphicsBackend for RecordingBackend {
    fn name(&self) -> &'static str {
        "Recording"
    }

    fn client_size(&self) -> (u32, u32) {
        self.client_size
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.client_size = (width, height);
            self.record(RecordedCommand::Resize { width, height });
        }
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<GpuBuffer> {
        self.create(ObjectKind::Buffer, desc.label.clone())
            .map(GpuBuffer::Recording)
            .ok_or_else(|| {
                BackendError::BufferCreationFailed(format!("{:?} ({} bytes)", desc.label, desc.size))
            })
    }

    fn write_buffer(&mut self, buffer: &GpuBuffer, data: &[u8]) {
        self.record(RecordedCommand::WriteBuffer {
            id: buffer.id(),
            data: data.to_vec(),
        });
    }

    fn create_texture(
        &mut self,
        desc: &TextureDescriptor,
        _data: Option<&[u8]>,
    ) -> BackendResult<GpuTexture> {
        self.create(ObjectKind::Texture, desc.label.clone())
            .map(GpuTexture::Recording)
            .ok_or_else(|| {
                BackendError::TextureCreationFailed(format!(
                    "{:?} ({}x{})",
                    desc.label, desc.width, desc.height
                ))
            })
    }

    fn create_shader(&mut self, desc: &ShaderDescriptor) -> BackendResult<GpuShader> {
        self.create(ObjectKind::Shader, Some(desc.name.clone()))
            .map(GpuShader::Recording)
            .ok_or_else(|| BackendError::ShaderCreationFailed(desc.name.clone()))
    }

    fn create_blend_state(&mut self, desc: &BlendDescriptor) -> BackendResult<GpuBlendState> {
        self.create(ObjectKind::BlendState, desc.label.clone())
            .map(GpuBlendState::Recording)
            .ok_or_else(|| BackendError::StateCreationFailed(format!("{:?}", desc.label)))
    }

    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> BackendResult<GpuSampler> {
        self.create(ObjectKind::Sampler, desc.label.clone())
            .map(GpuSampler::Recording)
            .ok_or_else(|| BackendError::StateCreationFailed(format!("{:?}", desc.label)))
    }

    fn create_rasterizer_state(
        &mut self,
        desc: &RasterizerDescriptor,
    ) -> BackendResult<GpuRasterizerState> {
        self.create(ObjectKind::RasterizerState, desc.label.clone())
            .map(GpuRasterizerState::Recording)
            .ok_or_else(|| BackendError::StateCreationFailed(format!("{:?}", desc.label)))
    }

    fn create_depth_state(&mut self, desc: &DepthStateDescriptor) -> BackendResult<GpuDepthState> {
        self.create(ObjectKind::DepthState, desc.label.clone())
            .map(GpuDepthState::Recording)
            .ok_or_else(|| BackendError::StateCreationFailed(format!("{:?}", desc.label)))
    }

    fn begin_frame(&mut self) -> BackendResult<()> {
        if self.journal.lock().device_lost {
            return Err(BackendError::DeviceLost);
        }
        self.record(RecordedCommand::BeginFrame);
        Ok(())
    }

    fn set_render_targets(&mut self, depth_target: &GpuTexture) {
        self.record(RecordedCommand::SetRenderTargets {
            depth_target: depth_target.id(),
        });
    }

    fn clear_render_target(&mut self, color: [f32; 4]) {
        self.record(RecordedCommand::ClearRenderTarget(color));
    }

    fn clear_depth(&mut self, depth: f32) {
        self.record(RecordedCommand::ClearDepth(depth));
    }

    fn present(&mut self) -> BackendResult<()> {
        if self.journal.lock().device_lost {
            return Err(BackendError::DeviceLost);
        }
        self.record(RecordedCommand::Present);
        Ok(())
    }

    fn set_viewport(&mut self, viewport: &Viewport) {
        self.record(RecordedCommand::SetViewport(*viewport));
    }

    fn set_blend_state(&mut self, state: &GpuBlendState) {
        self.record(RecordedCommand::SetBlendState(state.id()));
    }

    fn set_sampler(&mut self, slot: u32, sampler: &GpuSampler) {
        self.record(RecordedCommand::SetSampler {
            slot,
            id: sampler.id(),
        });
    }

    fn set_rasterizer_state(&mut self, state: &GpuRasterizerState) {
        self.record(RecordedCommand::SetRasterizerState(state.id()));
    }

    fn set_depth_state(&mut self, state: &GpuDepthState) {
        self.record(RecordedCommand::SetDepthState(state.id()));
    }

    fn bind_shader(&mut self, shader: &GpuShader) {
        self.record(RecordedCommand::BindShader(shader.id()));
    }

    fn bind_vertex_buffer(&mut self, buffer: &GpuBuffer, stride: u32) {
        self.record(RecordedCommand::BindVertexBuffer {
            id: buffer.id(),
            stride,
        });
    }

    fn bind_index_buffer(&mut self, buffer: &GpuBuffer) {
        self.record(RecordedCommand::BindIndexBuffer(buffer.id()));
    }

    fn bind_constant_buffer(&mut self, slot: u32, buffer: &GpuBuffer) {
        self.record(RecordedCommand::BindConstantBuffer {
            slot,
            id: buffer.id(),
        });
    }

    fn bind_texture(&mut self, slot: u32, texture: &GpuTexture) {
        self.record(RecordedCommand::BindTexture {
            slot,
            id: texture.id(),
        });
    }

    fn draw(&mut self, vertex_count: u32, first_vertex: u32) {
        self.record(RecordedCommand::Draw {
            vertex_count,
            first_vertex,
        });
    }

    fn draw_indexed(&mut self, index_count: u32, first_index: u32, base_vertex: i32) {
        self.record(RecordedCommand::DrawIndexed {
            index_count,
            first_index,
            base_vertex,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer_desc(size: u64) -> BufferDescriptor {
        BufferDescriptor {
            label: Some("test".into()),
            size,
            usage: BufferUsage::Vertex,
        }
    }

    #[test]
    fn test_dropping_an_object_records_its_release() {
        let mut backend = RecordingBackend::new(64, 64);
        let journal = backend.journal();

        let buffer = backend.create_buffer(&buffer_desc(16)).unwrap();
        let id = buffer.id();
        assert!(journal.lock().is_live(id));
        assert_eq!(journal.lock().live_count(ObjectKind::Buffer), 1);

        drop(buffer);
        let journal = journal.lock();
        assert!(!journal.is_live(id));
        assert_eq!(journal.release_count(id), 1);
        assert!(journal.double_releases().is_empty());
    }

    #[test]
    fn test_ids_are_unique_across_kinds() {
        let mut backend = RecordingBackend::new(64, 64);
        let buffer = backend.create_buffer(&buffer_desc(16)).unwrap();
        let texture = backend
            .create_texture(&TextureDescriptor::default(), None)
            .unwrap();
        assert_ne!(buffer.id(), texture.id());
    }

    #[test]
    fn test_injected_failure_affects_only_next_creation() {
        let mut backend = RecordingBackend::new(64, 64);
        backend.journal().lock().fail_next_creation(ObjectKind::Buffer);

        let err = backend.create_buffer(&buffer_desc(16)).unwrap_err();
        assert!(matches!(err, BackendError::BufferCreationFailed(_)));
        assert_eq!(backend.journal().lock().created_count(ObjectKind::Buffer), 0);

        let _buffer = backend.create_buffer(&buffer_desc(16)).unwrap();
        assert_eq!(backend.journal().lock().created_count(ObjectKind::Buffer), 1);
    }

    #[test]
    fn test_device_lost_on_acquire_and_present() {
        let mut backend = RecordingBackend::new(64, 64);
        backend.journal().lock().set_device_lost(true);
        assert_eq!(backend.begin_frame(), Err(BackendError::DeviceLost));
        assert_eq!(backend.present(), Err(BackendError::DeviceLost));
        assert!(backend.journal().lock().commands().is_empty());
    }

    #[test]
    fn test_resize_ignores_zero_area() {
        let mut backend = RecordingBackend::new(64, 32);
        backend.resize(0, 10);
        assert_eq!(backend.client_size(), (64, 32));
        backend.resize(128, 96);
        assert_eq!(backend.client_size(), (128, 96));
    }
}
