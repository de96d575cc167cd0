//! Renderer integration tests
//!
//! Exercise the public renderer API end to end and check the native calls it
//! issues through the recording backend's journal.
//!
//! ```bash
//! cargo test --test renderer_tests
//! ```

mod common;

use glam::{Mat4, Vec2};
use rstest::rstest;

use common::{pcu_strip, pcutbn_strip, scratch_dir, write_png, TestContext, CLIENT_HEIGHT, CLIENT_WIDTH};
use immediate_renderer::backend::{BackendError, ObjectKind, RecordedCommand, Viewport};
use immediate_renderer::{
    BlendMode, Camera, DepthMode, GrowableBuffer, ImageData, RasterizerMode, RendererError,
    Rgba8, SamplerMode, ViewportRect, DEFAULT_SHADER_SOURCE,
};

fn count_draws(ctx: &TestContext) -> Vec<u32> {
    ctx.journal
        .lock()
        .commands()
        .iter()
        .filter_map(|c| match c {
            RecordedCommand::Draw { vertex_count, .. } => Some(*vertex_count),
            _ => None,
        })
        .collect()
}

fn count_all_draws(ctx: &TestContext) -> usize {
    ctx.journal.lock().count(RecordedCommand::is_draw)
}

fn count_activations(ctx: &TestContext) -> usize {
    ctx.journal.lock().count(RecordedCommand::is_state_activation)
}

// ============================================================================
// Render state reconciliation
// ============================================================================

/// Setting a mode and drawing twice activates the state at most once.
#[rstest]
#[case::opaque(BlendMode::Opaque)]
#[case::alpha(BlendMode::Alpha)]
#[case::additive(BlendMode::Additive)]
fn test_blend_reconcile_is_idempotent(#[case] mode: BlendMode) {
    let mut ctx = TestContext::new();
    let quad = pcu_strip(6);

    ctx.renderer.set_blend_mode(mode);
    ctx.renderer.draw_vertex_array(&quad).unwrap();
    let expected = usize::from(mode != BlendMode::Alpha);
    assert_eq!(count_activations(&ctx), expected);
    assert_eq!(ctx.renderer.active_blend_mode(), Some(mode));

    ctx.journal.lock().clear_commands();
    ctx.renderer.draw_vertex_array(&quad).unwrap();
    assert_eq!(count_activations(&ctx), 0);
}

#[rstest]
#[case::point_clamp(SamplerMode::PointClamp)]
#[case::point_wrap(SamplerMode::PointWrap)]
#[case::bilinear_wrap(SamplerMode::BilinearWrap)]
#[case::bilinear_clamp(SamplerMode::BilinearClamp)]
fn test_sampler_reconcile_is_idempotent(#[case] mode: SamplerMode) {
    let mut ctx = TestContext::new();
    let quad = pcu_strip(6);

    ctx.renderer.set_sampler_mode(mode);
    ctx.renderer.draw_vertex_array(&quad).unwrap();
    let sampler_sets = ctx
        .journal
        .lock()
        .count(|c| matches!(c, RecordedCommand::SetSampler { slot: 0, .. }));
    assert_eq!(sampler_sets, usize::from(mode != SamplerMode::PointClamp));
    assert_eq!(ctx.renderer.active_sampler_mode(), Some(mode));

    ctx.journal.lock().clear_commands();
    ctx.renderer.draw_vertex_array(&quad).unwrap();
    assert_eq!(count_activations(&ctx), 0);
}

#[rstest]
#[case::solid_cull_back(RasterizerMode::SolidCullBack)]
#[case::solid_cull_none(RasterizerMode::SolidCullNone)]
#[case::wireframe_cull_back(RasterizerMode::WireframeCullBack)]
#[case::wireframe_cull_none(RasterizerMode::WireframeCullNone)]
fn test_rasterizer_reconcile_is_idempotent(#[case] mode: RasterizerMode) {
    let mut ctx = TestContext::new();
    let quad = pcu_strip(6);

    ctx.renderer.set_rasterizer_mode(mode);
    ctx.renderer.draw_vertex_array(&quad).unwrap();
    assert_eq!(
        count_activations(&ctx),
        usize::from(mode != RasterizerMode::SolidCullBack)
    );

    ctx.journal.lock().clear_commands();
    ctx.renderer.draw_vertex_array(&quad).unwrap();
    assert_eq!(count_activations(&ctx), 0);
}

#[rstest]
#[case::enabled(DepthMode::Enabled)]
#[case::disabled(DepthMode::Disabled)]
fn test_depth_reconcile_is_idempotent(#[case] mode: DepthMode) {
    let mut ctx = TestContext::new();
    let quad = pcu_strip(6);

    ctx.renderer.set_depth_mode(mode);
    ctx.renderer.draw_vertex_array(&quad).unwrap();
    assert_eq!(
        count_activations(&ctx),
        usize::from(mode != DepthMode::Enabled)
    );

    ctx.journal.lock().clear_commands();
    ctx.renderer.draw_vertex_array(&quad).unwrap();
    assert_eq!(count_activations(&ctx), 0);
}

#[test]
fn test_setters_without_draw_issue_nothing() {
    let mut ctx = TestContext::new();
    ctx.renderer.set_blend_mode(BlendMode::Additive);
    ctx.renderer.set_rasterizer_mode(RasterizerMode::WireframeCullNone);
    ctx.renderer.set_blend_mode(BlendMode::Alpha);

    assert!(ctx.journal.lock().commands().is_empty());
    assert_eq!(ctx.renderer.active_blend_mode(), Some(BlendMode::Alpha));
    assert_eq!(
        ctx.renderer.active_rasterizer_mode(),
        Some(RasterizerMode::SolidCullBack)
    );
}

#[test]
fn test_invalidate_reactivates_every_family() {
    let mut ctx = TestContext::new();
    ctx.renderer.invalidate_states();
    ctx.renderer.draw_vertex_array(&pcu_strip(3)).unwrap();
    assert_eq!(count_activations(&ctx), 4);
}

#[rstest]
#[case::exact("additive", BlendMode::Additive)]
#[case::mixed_case("Opaque", BlendMode::Opaque)]
#[case::padded(" alpha ", BlendMode::Alpha)]
#[case::unknown("multiply", BlendMode::Additive)]
#[case::empty("", BlendMode::Additive)]
fn test_blend_mode_by_name(#[case] text: &str, #[case] expected: BlendMode) {
    let mut ctx = TestContext::new();
    ctx.renderer.set_blend_mode(BlendMode::Additive);
    ctx.renderer.set_blend_mode_by_name(text);
    assert_eq!(ctx.renderer.blend_mode(), expected);
}

#[test]
fn test_configured_defaults_are_active_after_startup() {
    let config = immediate_renderer::RendererConfig::default()
        .with_blend_mode(BlendMode::Opaque)
        .with_depth_mode(DepthMode::Disabled);
    let ctx = TestContext::with_config(config);
    assert_eq!(ctx.renderer.active_blend_mode(), Some(BlendMode::Opaque));
    assert_eq!(ctx.renderer.active_depth_mode(), Some(DepthMode::Disabled));
}

// ============================================================================
// Resource caches
// ============================================================================

#[test]
fn test_texture_cache_identity() {
    let dir = scratch_dir("texture_cache_identity");
    let red = write_png(&dir, "red", 4, [255, 0, 0, 255]);
    let blue = write_png(&dir, "blue", 8, [0, 0, 255, 255]);

    let mut ctx = TestContext::new();
    let before = ctx.renderer.texture_count();

    let a = ctx.renderer.create_or_get_texture_from_file(&red).unwrap();
    let b = ctx.renderer.create_or_get_texture_from_file(&red).unwrap();
    assert_eq!(a, b);
    assert_eq!(ctx.renderer.texture_count(), before + 1);

    let c = ctx.renderer.create_or_get_texture_from_file(&blue).unwrap();
    assert_ne!(a, c);
    assert_eq!(ctx.renderer.texture_count(), before + 2);
    assert_eq!(ctx.renderer.texture(c).map(|t| t.width()), Some(8));

    let created = ctx
        .journal
        .lock()
        .count(|cmd| matches!(cmd, RecordedCommand::Create { kind: ObjectKind::Texture, .. }));
    assert_eq!(created, 2);
}

#[test]
fn test_undecodable_texture_is_an_error() {
    let dir = scratch_dir("undecodable_texture");
    let path = dir.join("garbage.png");
    std::fs::write(&path, b"definitely not a png").unwrap();

    let mut ctx = TestContext::new();
    let before = ctx.renderer.texture_count();
    let err = ctx.renderer.create_or_get_texture_from_file(&path).unwrap_err();
    assert!(matches!(err, RendererError::ImageDecodeFailed { .. }));
    assert_eq!(ctx.renderer.texture_count(), before);
}

#[test]
fn test_bitmap_font_cache_shares_its_texture() {
    let dir = scratch_dir("bitmap_font_cache");
    write_png(&dir, "SquirrelFixedFont", 256, [255, 255, 255, 255]);
    let base = dir.join("SquirrelFixedFont");
    let base = base.to_string_lossy();

    let mut ctx = TestContext::new();
    let before = ctx.renderer.texture_count();
    let a = ctx.renderer.create_or_get_bitmap_font(&base).unwrap();
    let b = ctx.renderer.create_or_get_bitmap_font(&base).unwrap();

    assert_eq!(a, b);
    assert_eq!(ctx.renderer.font_count(), 1);
    assert_eq!(ctx.renderer.texture_count(), before + 1);
    let texture = ctx.renderer.font(a).map(|f| f.texture());
    assert_eq!(texture, ctx.renderer.find_texture(&format!("{base}.png")));
}

#[test]
fn test_shader_from_file_uses_shader_directory() {
    let dir = scratch_dir("shader_from_file");
    std::fs::write(dir.join("Unlit.wgsl"), DEFAULT_SHADER_SOURCE).unwrap();

    let config = immediate_renderer::RendererConfig::default().with_shader_directory(&dir);
    let mut ctx = TestContext::with_config(config);
    let a = ctx.renderer.create_or_get_shader_from_file("Unlit").unwrap();
    let b = ctx.renderer.create_or_get_shader_from_file("Unlit").unwrap();

    assert_eq!(a, b);
    assert_eq!(ctx.renderer.shader(a).map(|s| s.name()), Some("Unlit"));
    assert_eq!(ctx.renderer.shader_count(), 2);
}

#[test]
fn test_shader_compile_failure_is_an_error() {
    let mut ctx = TestContext::new();
    let err = ctx
        .renderer
        .create_shader("Broken", "@vertex fn VertexMain( {", None)
        .unwrap_err();
    assert!(matches!(err, RendererError::ShaderCompilationFailed { .. }));
    assert_eq!(ctx.renderer.find_shader("Broken"), None);
}

// ============================================================================
// Buffer growth
// ============================================================================

#[rstest]
#[case::vertices(24, 48, 240)]
#[case::extended_vertices(60, 60, 600)]
fn test_vertex_buffer_growth_keeps_stride(#[case] stride: u32, #[case] initial: usize, #[case] upload: usize) {
    let mut ctx = TestContext::new();
    let mut vbo = ctx.renderer.create_vertex_buffer(initial, stride).unwrap();
    let old_native = vbo.native_id();

    ctx.renderer.copy_cpu_to_gpu(&vec![7u8; upload], &mut vbo).unwrap();

    assert!(vbo.size() >= upload);
    assert_eq!(vbo.stride(), stride);
    assert_ne!(vbo.native_id(), old_native);
    let journal = ctx.journal.lock();
    assert_eq!(journal.release_count(old_native), 1);
    assert!(journal.is_live(vbo.native_id()));
}

#[test]
fn test_write_within_capacity_keeps_native_buffer() {
    let mut ctx = TestContext::new();
    let mut ibo = ctx.renderer.create_index_buffer(64).unwrap();
    let native = ibo.native_id();

    let indices: [u32; 6] = [0, 1, 2, 0, 2, 3];
    ctx.renderer
        .copy_cpu_to_gpu(bytemuck::cast_slice(&indices), &mut ibo)
        .unwrap();

    assert_eq!(ibo.native_id(), native);
    assert_eq!(ibo.size(), 64);
    assert_eq!(ibo.index_capacity(), 16);
}

#[test]
fn test_failed_growth_is_returned() {
    let mut ctx = TestContext::new();
    let mut vbo = ctx.renderer.create_vertex_buffer(24, 24).unwrap();
    ctx.journal.lock().fail_next_creation(ObjectKind::Buffer);

    let err = ctx.renderer.copy_cpu_to_gpu(&[0u8; 48], &mut vbo).unwrap_err();
    assert!(matches!(err, RendererError::Backend(BackendError::BufferCreationFailed(_))));
    assert_eq!(vbo.size(), 24);
}

// ============================================================================
// Frame and camera protocol
// ============================================================================

#[rstest]
#[case::full_window_sentinel(ViewportRect::FULL_WINDOW, Viewport::full(CLIENT_WIDTH, CLIENT_HEIGHT))]
#[case::sentinel_origin(
    ViewportRect::new(Vec2::new(-1.0, -1.0), Vec2::new(64.0, 64.0)),
    Viewport::full(CLIENT_WIDTH, CLIENT_HEIGHT)
)]
#[case::sentinel_size(
    ViewportRect::new(Vec2::new(10.0, 10.0), Vec2::new(-1.0, -1.0)),
    Viewport::full(CLIENT_WIDTH, CLIENT_HEIGHT)
)]
#[case::explicit(
    ViewportRect::new(Vec2::new(640.0, 0.0), Vec2::new(640.0, 360.0)),
    Viewport { x: 640.0, y: 0.0, width: 640.0, height: 360.0, min_depth: 0.0, max_depth: 1.0 }
)]
fn test_camera_viewport(#[case] rect: ViewportRect, #[case] expected: Viewport) {
    let mut ctx = TestContext::new();
    let camera = Camera::orthographic(Vec2::ZERO, Vec2::new(16.0, 9.0)).with_viewport(rect);

    ctx.renderer.begin_frame().unwrap();
    ctx.renderer.begin_camera(&camera);
    ctx.renderer.end_camera(&camera);
    ctx.renderer.end_frame().unwrap();

    let journal = ctx.journal.lock();
    let viewports: Vec<Viewport> = journal
        .commands()
        .iter()
        .filter_map(|c| match c {
            RecordedCommand::SetViewport(vp) => Some(*vp),
            _ => None,
        })
        .collect();
    assert_eq!(viewports, vec![expected]);
}

#[test]
fn test_camera_constants_bound_to_camera_slot() {
    let mut ctx = TestContext::new();
    let camera = Camera::orthographic(Vec2::ZERO, Vec2::new(2.0, 2.0));

    ctx.renderer.begin_frame().unwrap();
    ctx.renderer.begin_camera(&camera);

    let expected = immediate_renderer::CameraConstants {
        projection: camera.projection_matrix(),
        view: camera.view_matrix(),
    };
    let journal = ctx.journal.lock();
    let uploaded = journal.commands().iter().any(|c| {
        matches!(c, RecordedCommand::WriteBuffer { data, .. } if data.as_slice() == bytemuck::bytes_of(&expected))
    });
    assert!(uploaded);
    assert_eq!(
        journal.count(|c| matches!(c, RecordedCommand::BindConstantBuffer { slot: 2, .. })),
        1
    );
}

#[test]
fn test_device_lost_on_present_is_returned() {
    let mut ctx = TestContext::new();
    ctx.renderer.begin_frame().unwrap();
    ctx.journal.lock().set_device_lost(true);

    let err = ctx.renderer.end_frame().unwrap_err();
    assert!(matches!(err, RendererError::Backend(BackendError::DeviceLost)));
}

#[test]
fn test_device_lost_on_begin_frame_is_returned() {
    let mut ctx = TestContext::new();
    ctx.journal.lock().set_device_lost(true);

    let err = ctx.renderer.begin_frame().unwrap_err();
    assert!(matches!(err, RendererError::Backend(BackendError::DeviceLost)));
    assert_eq!(ctx.journal.lock().count(|c| matches!(c, RecordedCommand::BeginFrame)), 0);
}

/// A second begin_frame without end_frame warns but keeps the frame usable.
#[test]
fn test_begin_frame_twice_keeps_going() {
    let mut ctx = TestContext::new();
    ctx.renderer.begin_frame().unwrap();
    ctx.renderer.begin_frame().unwrap();
    ctx.renderer.draw_vertex_array(&pcu_strip(3)).unwrap();
    ctx.renderer.end_frame().unwrap();

    let journal = ctx.journal.lock();
    assert_eq!(journal.count(|c| matches!(c, RecordedCommand::BeginFrame)), 2);
    assert_eq!(journal.count(|c| matches!(c, RecordedCommand::Present)), 1);
    assert_eq!(journal.count(RecordedCommand::is_draw), 1);
}

#[test]
fn test_stats_reset_each_frame() {
    let mut ctx = TestContext::new();
    ctx.renderer.begin_frame().unwrap();
    ctx.renderer.draw_vertex_array(&pcu_strip(6)).unwrap();
    ctx.renderer.draw_vertex_array(&pcu_strip(3)).unwrap();
    assert_eq!(ctx.renderer.stats().draw_calls, 2);
    assert_eq!(count_all_draws(&ctx), 2);
    assert_eq!(ctx.renderer.stats().vertices, 9);
    ctx.renderer.end_frame().unwrap();

    ctx.renderer.begin_frame().unwrap();
    assert_eq!(ctx.renderer.stats(), immediate_renderer::FrameStats::default());
}

// ============================================================================
// Draw submission
// ============================================================================

#[rstest]
#[case::single(1)]
#[case::triangle(3)]
#[case::beyond_scratch_capacity(5000)]
fn test_vertex_count_round_trip_basic(#[case] count: usize) {
    let mut ctx = TestContext::new();
    ctx.renderer.set_model_constants(Mat4::IDENTITY, Rgba8::WHITE);
    ctx.renderer.draw_vertex_array(&pcu_strip(count)).unwrap();
    assert_eq!(count_draws(&ctx), vec![count as u32]);
}

#[rstest]
#[case::single(1)]
#[case::triangle(3)]
#[case::beyond_scratch_capacity(5000)]
fn test_vertex_count_round_trip_extended(#[case] count: usize) {
    let mut ctx = TestContext::new();
    ctx.renderer.draw_vertex_array(&pcutbn_strip(count)).unwrap();
    assert_eq!(count_draws(&ctx), vec![count as u32]);

    let strides = ctx.journal.lock().count(|c| {
        matches!(c, RecordedCommand::BindVertexBuffer { stride: 60, .. })
    });
    assert_eq!(strides, 1);
}

#[test]
fn test_scratch_growth_survives_later_draws() {
    let mut ctx = TestContext::new();
    ctx.renderer.draw_vertex_array(&pcu_strip(5000)).unwrap();
    ctx.renderer.draw_vertex_array(&pcu_strip(6)).unwrap();
    assert_eq!(count_draws(&ctx), vec![5000, 6]);

    // only the first draw needed a bigger scratch buffer
    let created = ctx
        .journal
        .lock()
        .count(|c| matches!(c, RecordedCommand::Create { kind: ObjectKind::Buffer, .. }));
    assert_eq!(created, 1);
}

#[test]
fn test_bind_texture_falls_back_to_default() {
    let mut ctx = TestContext::new();
    let checker = ImageData::solid_color(4, 4, [0, 0, 0, 255]);
    let id = ctx
        .renderer
        .create_or_get_texture_from_image("Checker", &checker)
        .unwrap();

    ctx.renderer.bind_texture(Some(id));
    assert_eq!(ctx.renderer.current_texture(), id);
    ctx.renderer.bind_texture(None);
    assert_eq!(ctx.renderer.current_texture(), ctx.renderer.default_texture());

    let binds = ctx
        .journal
        .lock()
        .count(|c| matches!(c, RecordedCommand::BindTexture { slot: 0, .. }));
    assert_eq!(binds, 2);
}

// ============================================================================
// Shutdown
// ============================================================================

#[rstest]
#[case::empty_caches(0)]
#[case::one_entry(1)]
#[case::many_entries(5)]
fn test_shutdown_releases_everything_once(#[case] entries: usize) {
    let mut ctx = TestContext::new();
    let mut natives = vec![ctx.renderer.depth_target().native_id()];

    for i in 0..entries {
        let image = ImageData::solid_color(2, 2, [i as u8, 0, 0, 255]);
        let texture = ctx
            .renderer
            .create_or_get_texture_from_image(&format!("Texture{i}"), &image)
            .unwrap();
        let shader = ctx
            .renderer
            .create_shader(&format!("Shader{i}"), DEFAULT_SHADER_SOURCE, None)
            .unwrap();
        natives.extend(ctx.renderer.texture(texture).map(|t| t.native_id()));
        natives.extend(ctx.renderer.shader(shader).map(|s| s.native_id()));
    }
    natives.extend(ctx.renderer.texture(ctx.renderer.default_texture()).map(|t| t.native_id()));
    natives.extend(ctx.renderer.shader(ctx.renderer.default_shader()).map(|s| s.native_id()));
    assert_eq!(natives.len(), 3 + 2 * entries);

    let TestContext { renderer, journal } = ctx;
    renderer.shutdown();

    let journal = journal.lock();
    for id in natives {
        assert_eq!(journal.release_count(id), 1, "native {id}");
    }
    assert_eq!(journal.total_live(), 0);
    assert!(journal.double_releases().is_empty());
}

/// Dependents go before what they depend on; the depth target goes last.
#[test]
fn test_shutdown_releases_in_dependency_order() {
    let TestContext { renderer, journal } = TestContext::new();
    renderer.shutdown();

    let released: Vec<ObjectKind> = journal
        .lock()
        .commands()
        .iter()
        .filter_map(|c| match c {
            RecordedCommand::Release { kind, .. } => Some(*kind),
            _ => None,
        })
        .collect();

    let mut expected = vec![ObjectKind::Shader, ObjectKind::Texture];
    expected.extend([ObjectKind::Buffer; 5]);
    expected.extend([ObjectKind::BlendState; 3]);
    expected.extend([ObjectKind::Sampler; 4]);
    expected.extend([ObjectKind::RasterizerState; 4]);
    expected.extend([ObjectKind::DepthState; 2]);
    expected.push(ObjectKind::Texture);
    assert_eq!(released, expected);
}

#[test]
fn test_drop_without_shutdown_releases_everything() {
    let TestContext { renderer, journal } = TestContext::new();
    drop(renderer);

    let journal = journal.lock();
    assert_eq!(journal.total_live(), 0);
    assert!(journal.double_releases().is_empty());
}
