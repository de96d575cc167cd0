//! Camera system

use glam::{Mat4, Quat, Vec2, Vec3};

use crate::backend::Viewport;

/// Camera projection type
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Perspective {
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    },
    Orthographic {
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    },
}

impl Default for Projection {
    fn default() -> Self {
        Projection::Perspective {
            fov_y: std::f32::consts::FRAC_PI_4, // 45 degrees
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Projection {
    pub fn perspective(fov_y_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Projection::Perspective {
            fov_y: fov_y_degrees.to_radians(),
            aspect,
            near,
            far,
        }
    }

    /// Orthographic projection mapping `mins..maxs` onto the viewport
    pub fn orthographic(mins: Vec2, maxs: Vec2, near: f32, far: f32) -> Self {
        Projection::Orthographic {
            left: mins.x,
            right: maxs.x,
            bottom: mins.y,
            top: maxs.y,
            near,
            far,
        }
    }

    pub fn matrix(&self) -> Mat4 {
        match self {
            Projection::Perspective {
                fov_y,
                aspect,
                near,
                far,
            } => Mat4::perspective_rh(*fov_y, *aspect, *near, *far),
            Projection::Orthographic {
                left,
                right,
                bottom,
                top,
                near,
                far,
            } => Mat4::orthographic_rh(*left, *right, *bottom, *top, *near, *far),
        }
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        if let Projection::Perspective { aspect: a, .. } = self {
            *a = aspect;
        }
    }
}

/// Viewport rectangle in window pixels
///
/// An origin or size equal to `(-1, -1)` means "the whole window".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportRect {
    pub origin: Vec2,
    pub size: Vec2,
}

impl ViewportRect {
    const SENTINEL: Vec2 = Vec2::new(-1.0, -1.0);

    pub const FULL_WINDOW: Self = Self {
        origin: Self::SENTINEL,
        size: Self::SENTINEL,
    };

    pub fn new(origin: Vec2, size: Vec2) -> Self {
        Self { origin, size }
    }

    pub fn is_full_window(&self) -> bool {
        self.origin == Self::SENTINEL || self.size == Self::SENTINEL
    }

    /// Native viewport for a window of `client_size` pixels
    pub fn resolve(&self, client_size: (u32, u32)) -> Viewport {
        if self.is_full_window() {
            return Viewport::full(client_size.0, client_size.1);
        }
        Viewport {
            x: self.origin.x,
            y: self.origin.y,
            width: self.size.x,
            height: self.size.y,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

impl Default for ViewportRect {
    fn default() -> Self {
        Self::FULL_WINDOW
    }
}

/// Camera for viewing the scene
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    pub orientation: Quat,
    pub projection: Projection,
    /// Change of basis from the camera's axes to render axes
    pub camera_to_render: Mat4,
    pub viewport: ViewportRect,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            projection: Projection::default(),
            camera_to_render: Mat4::IDENTITY,
            viewport: ViewportRect::FULL_WINDOW,
        }
    }
}

impl Camera {
    /// 2D camera showing `mins..maxs` in world units
    pub fn orthographic(mins: Vec2, maxs: Vec2) -> Self {
        Self {
            projection: Projection::orthographic(mins, maxs, 0.0, 1.0),
            ..Self::default()
        }
    }

    pub fn perspective(fov_y_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            projection: Projection::perspective(fov_y_degrees, aspect, near, far),
            ..Self::default()
        }
    }

    pub fn with_viewport(mut self, viewport: ViewportRect) -> Self {
        self.viewport = viewport;
        self
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    /// Orient the camera so it looks at `target`
    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        let view = Mat4::look_at_rh(self.position, target, up);
        self.orientation = Quat::from_mat4(&view.inverse());
    }

    /// Get the view (world to camera) matrix
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.orientation, self.position).inverse()
    }

    /// Get the projection matrix, including the camera-to-render basis change
    pub fn projection_matrix(&self) -> Mat4 {
        self.projection.matrix() * self.camera_to_render
    }

    /// Update aspect ratio for perspective projection
    pub fn set_aspect(&mut self, width: f32, height: f32) {
        self.projection.set_aspect(width / height);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_window_sentinel() {
        assert!(ViewportRect::FULL_WINDOW.is_full_window());
        assert!(ViewportRect::new(Vec2::new(-1.0, -1.0), Vec2::new(100.0, 100.0)).is_full_window());
        assert!(ViewportRect::new(Vec2::ZERO, Vec2::new(-1.0, -1.0)).is_full_window());
        assert!(!ViewportRect::new(Vec2::new(-1.0, 0.0), Vec2::new(10.0, 10.0)).is_full_window());
    }

    #[test]
    fn test_resolve_explicit_rect() {
        let rect = ViewportRect::new(Vec2::new(10.0, 20.0), Vec2::new(300.0, 200.0));
        let vp = rect.resolve((1280, 720));
        assert_eq!((vp.x, vp.y, vp.width, vp.height), (10.0, 20.0, 300.0, 200.0));
    }

    #[test]
    fn test_view_matrix_inverts_camera_transform() {
        let mut camera = Camera::default();
        camera.set_position(Vec3::new(1.0, 2.0, 3.0));
        let p = camera.view_matrix().transform_point3(Vec3::new(1.0, 2.0, 3.0));
        assert!(p.length() < 1e-5);
    }

    #[test]
    fn test_look_at_faces_target() {
        let mut camera = Camera::default();
        camera.set_position(Vec3::new(0.0, 0.0, 5.0));
        camera.look_at(Vec3::ZERO, Vec3::Y);
        // Right-handed view space looks down -Z
        let p = camera.view_matrix().transform_point3(Vec3::ZERO);
        assert!((p - Vec3::new(0.0, 0.0, -5.0)).length() < 1e-4);
    }

    #[test]
    fn test_orthographic_maps_bounds_to_clip_space() {
        let camera = Camera::orthographic(Vec2::ZERO, Vec2::new(200.0, 100.0));
        let clip = camera.projection_matrix().project_point3(Vec3::new(200.0, 100.0, 0.0));
        assert!((clip.x - 1.0).abs() < 1e-5);
        assert!((clip.y - 1.0).abs() < 1e-5);
    }
}
