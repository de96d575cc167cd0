//! Constant-buffer layouts and their shader slots

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::resources::Rgba8;

pub const LIGHT_CONSTANTS_SLOT: u32 = 1;
pub const CAMERA_CONSTANTS_SLOT: u32 = 2;
pub const MODEL_CONSTANTS_SLOT: u32 = 3;

/// Per-camera constants, `@binding(2)`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CameraConstants {
    pub projection: Mat4,
    pub view: Mat4,
}

/// Per-draw model constants, `@binding(3)`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ModelConstants {
    pub model: Mat4,
    pub color: [f32; 4],
}

impl ModelConstants {
    pub fn new(model: Mat4, color: Rgba8) -> Self {
        Self {
            model,
            color: color.to_f32_array(),
        }
    }
}

impl Default for ModelConstants {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Rgba8::WHITE)
    }
}

/// Directional sun plus ambient term, `@binding(1)`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LightConstants {
    pub sun_direction: Vec3,
    pub sun_intensity: f32,
    pub ambient_intensity: f32,
    _padding: [f32; 3],
}

impl LightConstants {
    pub fn new(sun_direction: Vec3, sun_intensity: f32, ambient_intensity: f32) -> Self {
        Self {
            sun_direction: sun_direction.normalize_or_zero(),
            sun_intensity,
            ambient_intensity,
            _padding: [0.0; 3],
        }
    }
}

impl Default for LightConstants {
    fn default() -> Self {
        Self::new(Vec3::new(2.0, 1.0, -1.0), 0.85, 0.15)
    }
}
