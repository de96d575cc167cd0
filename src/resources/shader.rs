//! Shader compilation, validation and input-layout selection

use crate::backend::{GpuShader, GraphicsBackend, ShaderDescriptor};
use crate::error::{RendererError, RendererResult};
use crate::resources::vertex::VertexLayout;

/// Name of the built-in shader
pub const DEFAULT_SHADER_NAME: &str = "Default";
pub const DEFAULT_VERTEX_ENTRY: &str = "VertexMain";
pub const DEFAULT_PIXEL_ENTRY: &str = "PixelMain";

/// Built-in shader: model/camera transform and alpha-tested texture sampling
pub const DEFAULT_SHADER_SOURCE: &str = r#"
struct CameraConstants {
    projection: mat4x4<f32>,
    view: mat4x4<f32>,
};

struct ModelConstants {
    model: mat4x4<f32>,
    color: vec4<f32>,
};

@group(0) @binding(2) var<uniform> camera: CameraConstants;
@group(0) @binding(3) var<uniform> model: ModelConstants;
@group(1) @binding(0) var diffuse_texture: texture_2d<f32>;
@group(1) @binding(1) var diffuse_sampler: sampler;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) color: vec4<f32>,
    @location(2) uv: vec2<f32>,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) color: vec4<f32>,
    @location(1) uv: vec2<f32>,
};

@vertex
fn VertexMain(input: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let world_position = model.model * vec4<f32>(input.position, 1.0);
    out.clip_position = camera.projection * camera.view * world_position;
    out.color = input.color * model.color;
    out.uv = input.uv;
    return out;
}

@fragment
fn PixelMain(input: VertexOutput) -> @location(0) vec4<f32> {
    let texel = textureSample(diffuse_texture, diffuse_sampler, input.uv);
    let color = texel * input.color;
    if (color.a <= 0.001) {
        discard;
    }
    return color;
}
"#;

/// Compiled vertex + pixel programs bound to one vertex layout
#[derive(Debug)]
pub struct Shader {
    native: GpuShader,
    name: String,
    layout: VertexLayout,
}

impl Shader {
    pub(crate) fn create(
        backend: &mut dyn GraphicsBackend,
        name: &str,
        source: &str,
        layout: Option<VertexLayout>,
        entry_points: (&str, &str),
        strict: bool,
    ) -> RendererResult<Self> {
        let (vertex_entry, pixel_entry) = entry_points;
        let module = validate(name, source, strict)?;

        let has_entry = |entry: &str, stage: naga::ShaderStage| {
            module
                .entry_points
                .iter()
                .any(|ep| ep.name == entry && ep.stage == stage)
        };
        for (entry, stage) in [
            (vertex_entry, naga::ShaderStage::Vertex),
            (pixel_entry, naga::ShaderStage::Fragment),
        ] {
            if !has_entry(entry, stage) {
                return Err(RendererError::ShaderCompilationFailed {
                    name: name.to_string(),
                    message: format!("missing {:?} entry point '{}'", stage, entry),
                });
            }
        }

        let layout = layout.unwrap_or_else(|| infer_vertex_layout(&module, vertex_entry));
        let native = backend.create_shader(&ShaderDescriptor {
            name: name.to_string(),
            source: source.to_string(),
            vertex_entry: vertex_entry.to_string(),
            pixel_entry: pixel_entry.to_string(),
            vertex_layout: layout.buffer_layout(),
        })?;

        log::debug!("Created shader '{}' ({:?} layout)", name, layout);
        Ok(Self {
            native,
            name: name.to_string(),
            layout,
        })
    }

    /// Shader name; the cache key
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Vertex layout the input layout was built for
    pub fn layout(&self) -> VertexLayout {
        self.layout
    }

    pub fn native_id(&self) -> u64 {
        self.native.id()
    }

    pub(crate) fn native(&self) -> &GpuShader {
        &self.native
    }
}

/// Parse and validate WGSL source
///
/// Strict mode enables every validation check, the same bar debug builds hold
/// shader warnings to.
fn validate(name: &str, source: &str, strict: bool) -> RendererResult<naga::Module> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| {
        RendererError::ShaderCompilationFailed {
            name: name.to_string(),
            message: e.emit_to_string(source),
        }
    })?;

    let flags = if strict {
        naga::valid::ValidationFlags::all()
    } else {
        naga::valid::ValidationFlags::empty()
    };
    naga::valid::Validator::new(flags, naga::valid::Capabilities::all())
        .validate(&module)
        .map_err(|e| RendererError::ShaderCompilationFailed {
            name: name.to_string(),
            message: e.as_inner().to_string(),
        })?;

    Ok(module)
}

/// Pick the vertex layout a vertex entry point consumes
///
/// Inputs at location 3 and above are the tangent/bitangent/normal attributes,
/// which only the extended layout provides.
pub(crate) fn infer_vertex_layout(module: &naga::Module, vertex_entry: &str) -> VertexLayout {
    let Some(entry) = module
        .entry_points
        .iter()
        .find(|ep| ep.name == vertex_entry && ep.stage == naga::ShaderStage::Vertex)
    else {
        return VertexLayout::Pcu;
    };

    let mut locations = Vec::new();
    for argument in &entry.function.arguments {
        match &argument.binding {
            Some(naga::Binding::Location { location, .. }) => locations.push(*location),
            Some(naga::Binding::BuiltIn(_)) => {}
            None => {
                if let naga::TypeInner::Struct { members, .. } = &module.types[argument.ty].inner {
                    locations.extend(members.iter().filter_map(|m| match m.binding {
                        Some(naga::Binding::Location { location, .. }) => Some(location),
                        _ => None,
                    }));
                }
            }
        }
    }

    if locations.iter().any(|location| *location >= 3) {
        VertexLayout::Pcutbn
    } else {
        VertexLayout::Pcu
    }
}
