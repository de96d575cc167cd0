//! Frame and camera bracketing

use super::constants::{CameraConstants, CAMERA_CONSTANTS_SLOT};
use super::{Bracket, FrameStats, Renderer};
use crate::error::RendererResult;
use crate::resources::buffer::write_constants;
use crate::resources::Rgba8;
use crate::scene::Camera;

impl Renderer {
    fn expect_bracket(&self, expected: Bracket, operation: &str) {
        if self.bracket != expected {
            log::warn!(
                "{} called in {:?} state, expected {:?}",
                operation,
                self.bracket,
                expected
            );
        }
    }

    /// Acquire the back buffer and bind it with the depth target
    pub fn begin_frame(&mut self) -> RendererResult<()> {
        self.expect_bracket(Bracket::Idle, "begin_frame");
        self.stats = FrameStats::default();
        self.backend.begin_frame()?;
        self.backend.set_render_targets(self.depth_target.native());
        self.bracket = Bracket::InFrame;
        Ok(())
    }

    /// Present the back buffer
    ///
    /// A lost device comes back as an error and is not retried.
    pub fn end_frame(&mut self) -> RendererResult<()> {
        self.expect_bracket(Bracket::InFrame, "end_frame");
        self.bracket = Bracket::Idle;
        log::trace!(
            "Frame done: {} draw(s), {} state change(s)",
            self.stats.draw_calls,
            self.stats.state_changes
        );
        self.backend.present()?;
        Ok(())
    }

    /// Clear the back buffer to `color` and the depth target to the far plane
    pub fn clear_screen(&mut self, color: Rgba8) {
        self.backend.clear_render_target(color.to_f32_array());
        self.backend.clear_depth(1.0);
    }

    /// Upload the camera's matrices and set its viewport
    pub fn begin_camera(&mut self, camera: &Camera) {
        self.expect_bracket(Bracket::InFrame, "begin_camera");
        let constants = CameraConstants {
            projection: camera.projection_matrix(),
            view: camera.view_matrix(),
        };
        write_constants(
            self.backend.as_mut(),
            bytemuck::bytes_of(&constants),
            &self.camera_constants,
        );
        self.backend
            .bind_constant_buffer(CAMERA_CONSTANTS_SLOT, self.camera_constants.native());

        let viewport = camera.viewport.resolve(self.backend.client_size());
        self.backend.set_viewport(&viewport);
        self.bracket = Bracket::InCamera;
    }

    /// Close the camera bracket opened by [`Renderer::begin_camera`]
    pub fn end_camera(&mut self, _camera: &Camera) {
        self.expect_bracket(Bracket::InCamera, "end_camera");
        self.bracket = Bracket::InFrame;
    }
}

#[cfg(test)]
mod tests {
    use crate::backend::{RecordedCommand, RecordingBackend, Viewport};
    use crate::{Camera, Renderer, RendererConfig, ViewportRect};
    use glam::Vec2;

    #[test]
    fn test_frame_binds_targets_and_presents() {
        let backend = RecordingBackend::new(800, 600);
        let journal = backend.journal();
        let mut renderer = Renderer::startup(Box::new(backend), RendererConfig::default()).unwrap();
        let depth = renderer.depth_target().native_id();
        journal.lock().clear_commands();

        renderer.begin_frame().unwrap();
        renderer.end_frame().unwrap();

        let journal = journal.lock();
        assert_eq!(
            journal.commands(),
            &[
                RecordedCommand::BeginFrame,
                RecordedCommand::SetRenderTargets { depth_target: depth },
                RecordedCommand::Present,
            ]
        );
    }

    #[test]
    fn test_camera_sets_explicit_viewport() {
        let backend = RecordingBackend::new(800, 600);
        let journal = backend.journal();
        let mut renderer = Renderer::startup(Box::new(backend), RendererConfig::default()).unwrap();
        let camera = Camera::orthographic(Vec2::ZERO, Vec2::new(4.0, 3.0))
            .with_viewport(ViewportRect::new(Vec2::new(100.0, 50.0), Vec2::new(200.0, 150.0)));

        renderer.begin_frame().unwrap();
        renderer.begin_camera(&camera);
        renderer.end_camera(&camera);
        renderer.end_frame().unwrap();

        let journal = journal.lock();
        let viewport = journal.commands().iter().find_map(|c| match c {
            RecordedCommand::SetViewport(vp) => Some(*vp),
            _ => None,
        });
        assert_eq!(
            viewport,
            Some(Viewport {
                x: 100.0,
                y: 50.0,
                width: 200.0,
                height: 150.0,
                min_depth: 0.0,
                max_depth: 1.0,
            })
        );
    }

    #[test]
    fn test_clear_screen_clears_color_and_depth() {
        let backend = RecordingBackend::new(8, 8);
        let journal = backend.journal();
        let mut renderer = Renderer::startup(Box::new(backend), RendererConfig::default()).unwrap();

        renderer.begin_frame().unwrap();
        renderer.clear_screen(crate::Rgba8::WHITE);

        let journal = journal.lock();
        let tail = &journal.commands()[journal.commands().len() - 2..];
        assert_eq!(
            tail,
            &[
                RecordedCommand::ClearRenderTarget([1.0; 4]),
                RecordedCommand::ClearDepth(1.0),
            ]
        );
    }
}
