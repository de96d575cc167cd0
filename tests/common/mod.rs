//! Shared setup for renderer integration tests
//!
//! Every test runs against the recording backend, so no GPU or window is needed.

use std::path::PathBuf;

use glam::{Vec2, Vec3};
use immediate_renderer::backend::JournalHandle;
use immediate_renderer::{
    Renderer, RendererConfig, RecordingBackend, Rgba8, VertexPcu, VertexPcutbn,
};

pub const CLIENT_WIDTH: u32 = 1280;
pub const CLIENT_HEIGHT: u32 = 720;

/// A started renderer plus the journal of its backend
pub struct TestContext {
    pub renderer: Renderer,
    pub journal: JournalHandle,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(RendererConfig::default())
    }

    pub fn with_config(config: RendererConfig) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let backend = RecordingBackend::new(CLIENT_WIDTH, CLIENT_HEIGHT);
        let journal = backend.journal();
        let renderer = Renderer::startup(Box::new(backend), config).expect("startup failed");
        journal.lock().clear_commands();
        Self { renderer, journal }
    }
}

/// Directory unique to one test, emptied on creation
pub fn scratch_dir(test_name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "immediate-renderer-{}-{}",
        std::process::id(),
        test_name
    ));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}

/// Write a solid-color PNG and return its path
pub fn write_png(dir: &std::path::Path, name: &str, size: u32, color: [u8; 4]) -> PathBuf {
    let path = dir.join(format!("{name}.png"));
    image::RgbaImage::from_pixel(size, size, image::Rgba(color))
        .save(&path)
        .expect("write png");
    path
}

pub fn pcu_strip(count: usize) -> Vec<VertexPcu> {
    (0..count)
        .map(|i| VertexPcu::new(Vec3::new(i as f32, 0.0, 0.0), Rgba8::WHITE, Vec2::ZERO))
        .collect()
}

pub fn pcutbn_strip(count: usize) -> Vec<VertexPcutbn> {
    (0..count)
        .map(|i| VertexPcutbn {
            position: Vec3::new(i as f32, 0.0, 0.0),
            color: Rgba8::WHITE,
            uv: Vec2::ZERO,
            tangent: Vec3::X,
            bitangent: Vec3::Y,
            normal: Vec3::Z,
        })
        .collect()
}
