//! # Spinning Quad Demo
//!
//! Demonstrates:
//! - Renderer startup on the wgpu backend
//! - Frame and camera bracketing with a perspective world camera and an
//!   orthographic screen camera
//! - Immediate-mode quads with per-draw model constants
//! - Render modes selected from the command line by name
//! - Optional bitmap-font text overlay
//!
//! ```bash
//! cargo run --example spinning_quad -- --blend additive --rasterizer wireframe_cull_none
//! ```

use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use glam::{Mat4, Quat, Vec2, Vec3};
use immediate_renderer::{
    add_verts_for_aabb2, Aabb2, BlendMode, Camera, RasterizerMode, Renderer, RendererConfig,
    RendererResult, Rgba8, VertexPcu, WgpuBackend,
};
use winit::dpi::PhysicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::WindowBuilder;

#[derive(Parser, Debug)]
#[command(about = "Spin a few immediate-mode quads")]
struct Args {
    /// Window width in pixels
    #[arg(long, default_value = "1280")]
    width: u32,

    /// Window height in pixels
    #[arg(long, default_value = "720")]
    height: u32,

    /// Present without waiting for vertical sync
    #[arg(long)]
    no_vsync: bool,

    /// Blend mode for the quads (opaque, alpha, additive)
    #[arg(long, default_value = "alpha")]
    blend: String,

    /// Rasterizer mode for the quads (solid_cull_back, wireframe_cull_none, ...)
    #[arg(long, default_value = "solid_cull_none")]
    rasterizer: String,

    /// Bitmap font path without the .png extension
    #[arg(long)]
    font: Option<String>,

    /// Exit after this many frames
    #[arg(long)]
    frames: Option<u64>,
}

struct Demo {
    renderer: Renderer,
    world_camera: Camera,
    screen_camera: Camera,
    font: Option<immediate_renderer::FontId>,
    blend: BlendMode,
    rasterizer: RasterizerMode,
    started: Instant,
    frame: u64,
}

impl Demo {
    fn new(renderer: Renderer, args: &Args) -> Self {
        let (width, height) = renderer.client_size();
        let mut world_camera = Camera::perspective(60.0, width as f32 / height.max(1) as f32, 0.1, 100.0);
        world_camera.set_position(Vec3::new(0.0, 0.0, 4.0));
        world_camera.look_at(Vec3::ZERO, Vec3::Y);
        let screen_camera = Camera::orthographic(Vec2::ZERO, Vec2::new(width as f32, height as f32));

        let mut renderer = renderer;
        let font = args.font.as_deref().and_then(|path| {
            renderer
                .create_or_get_bitmap_font(path)
                .map_err(|e| log::warn!("No text overlay: {}", e))
                .ok()
        });

        let blend = args.blend.parse().unwrap_or_else(|e| {
            log::warn!("{}; using alpha blending", e);
            BlendMode::Alpha
        });
        let rasterizer = args.rasterizer.parse().unwrap_or_else(|e| {
            log::warn!("{}; using solid fill without culling", e);
            RasterizerMode::SolidCullNone
        });

        Self {
            renderer,
            world_camera,
            screen_camera,
            font,
            blend,
            rasterizer,
            started: Instant::now(),
            frame: 0,
        }
    }

    fn resize(&mut self, width: u32, height: u32) -> RendererResult<()> {
        self.renderer.resize(width, height)?;
        self.world_camera.set_aspect(width as f32, height as f32);
        self.screen_camera = Camera::orthographic(Vec2::ZERO, Vec2::new(width as f32, height as f32));
        Ok(())
    }

    fn render(&mut self) -> RendererResult<()> {
        let seconds = self.started.elapsed().as_secs_f32();
        let renderer = &mut self.renderer;

        renderer.begin_frame()?;
        renderer.clear_screen(renderer.config().clear_color);

        renderer.begin_camera(&self.world_camera);
        renderer.set_blend_mode(self.blend);
        renderer.set_rasterizer_mode(self.rasterizer);
        renderer.bind_texture(None);

        let mut quad = Vec::with_capacity(6);
        add_verts_for_aabb2(
            &mut quad,
            Aabb2::new(Vec2::splat(-0.5), Vec2::splat(0.5)),
            Rgba8::WHITE,
            Aabb2::ZERO_TO_ONE,
        );
        let tints = [Rgba8::RED, Rgba8::GREEN, Rgba8::BLUE];
        for (i, tint) in tints.into_iter().enumerate() {
            let offset = (i as f32 - 1.0) * 1.25;
            let model = Mat4::from_rotation_translation(
                Quat::from_rotation_y(seconds * (1.0 + i as f32 * 0.5)),
                Vec3::new(offset, 0.0, 0.0),
            );
            renderer.set_model_constants(model, tint);
            renderer.draw_vertex_array(&quad)?;
        }
        renderer.end_camera(&self.world_camera);

        if let Some(font_id) = self.font {
            renderer.begin_camera(&self.screen_camera);
            renderer.set_blend_mode(immediate_renderer::BlendMode::Alpha);
            renderer.set_rasterizer_mode(immediate_renderer::RasterizerMode::SolidCullNone);
            renderer.set_model_constants(Mat4::IDENTITY, Rgba8::WHITE);

            let line = format!("frame {}  draws {}", self.frame, renderer.stats().draw_calls);
            let mut text_verts: Vec<VertexPcu> = Vec::new();
            let glyphs = renderer.font(font_id).map(|font| {
                font.add_verts_for_text_2d(&mut text_verts, Vec2::new(16.0, 16.0), 24.0, &line, Rgba8::WHITE, 1.0);
                font.texture()
            });
            renderer.bind_texture(glyphs);
            renderer.draw_vertex_array(&text_verts)?;
            renderer.end_camera(&self.screen_camera);
        }

        renderer.end_frame()?;
        self.frame += 1;
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let event_loop = EventLoop::new()?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("Spinning Quad")
            .with_inner_size(PhysicalSize::new(args.width, args.height))
            .build(&event_loop)?,
    );

    let backend = WgpuBackend::new(Arc::clone(&window), !args.no_vsync)?;
    let config = RendererConfig::default().with_clear_color(Rgba8::new(20, 20, 32, 255));
    let renderer = Renderer::startup(Box::new(backend), config)?;
    let mut demo = Some(Demo::new(renderer, &args));

    event_loop.run(move |event, elwt| {
        elwt.set_control_flow(ControlFlow::Poll);
        if let Event::LoopExiting = event {
            if let Some(state) = demo.take() {
                log::info!("Exiting after {} frame(s)", state.frame);
                state.renderer.shutdown();
            }
            return;
        }
        let Some(state) = demo.as_mut() else {
            return;
        };

        match event {
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::CloseRequested => elwt.exit(),
                WindowEvent::Resized(size) => {
                    if let Err(e) = state.resize(size.width, size.height) {
                        log::error!("Resize failed: {}", e);
                        elwt.exit();
                    }
                }
                WindowEvent::RedrawRequested => {
                    if let Err(e) = state.render() {
                        log::error!("Frame failed: {}", e);
                        elwt.exit();
                    }
                    if args.frames.is_some_and(|limit| state.frame >= limit) {
                        elwt.exit();
                    }
                }
                _ => {}
            },
            Event::AboutToWait => window.request_redraw(),
            _ => {}
        }
    })?;

    Ok(())
}
