//! Render state registry
//!
//! Four independent families of render states. Each mode maps to one native
//! state object created at startup and never changed. Setters only record the
//! desired mode; [`RenderStates::reconcile`] activates the desired object of
//! every family whose active mode differs, right before a draw.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::backend::*;

/// Text that names no mode of a family
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {family} mode '{text}'")]
pub struct ParseModeError {
    pub family: &'static str,
    pub text: String,
}

/// A render mode enumerator usable as a table index
pub trait RenderMode: Copy + Eq + fmt::Debug + fmt::Display + FromStr + 'static {
    /// Every mode, in table order
    const ALL: &'static [Self];

    fn index(self) -> usize;
}

macro_rules! render_mode {
    ($(#[$meta:meta])* $name:ident, $family:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl RenderMode for $name {
            const ALL: &'static [Self] = &[$(Self::$variant),+];

            fn index(self) -> usize {
                self as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(match self {
                    $(Self::$variant => $text),+
                })
            }
        }

        impl FromStr for $name {
            type Err = ParseModeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(ParseModeError {
                        family: $family,
                        text: s.to_string(),
                    }),
                }
            }
        }
    };
}

render_mode!(
    /// Color blending
    BlendMode, "blend" {
        Opaque => "opaque",
        Alpha => "alpha",
        Additive => "additive",
    }
);

render_mode!(
    /// Texture filtering and addressing
    SamplerMode, "sampler" {
        PointClamp => "point_clamp",
        PointWrap => "point_wrap",
        BilinearWrap => "bilinear_wrap",
        BilinearClamp => "bilinear_clamp",
    }
);

render_mode!(
    /// Fill and culling
    RasterizerMode, "rasterizer" {
        SolidCullBack => "solid_cull_back",
        SolidCullNone => "solid_cull_none",
        WireframeCullBack => "wireframe_cull_back",
        WireframeCullNone => "wireframe_cull_none",
    }
);

render_mode!(
    /// Depth test and write
    DepthMode, "depth" {
        Enabled => "enabled",
        Disabled => "disabled",
    }
);

impl BlendMode {
    pub fn descriptor(self) -> BlendDescriptor {
        let blend = match self {
            BlendMode::Opaque => None,
            BlendMode::Alpha => Some(BlendState::alpha_blending()),
            BlendMode::Additive => Some(BlendState::additive()),
        };
        BlendDescriptor {
            label: Some(format!("Blend {self}")),
            blend,
        }
    }
}

impl SamplerMode {
    pub fn descriptor(self) -> SamplerDescriptor {
        let (filter, address_mode) = match self {
            SamplerMode::PointClamp => (FilterMode::Nearest, AddressMode::ClampToEdge),
            SamplerMode::PointWrap => (FilterMode::Nearest, AddressMode::Repeat),
            SamplerMode::BilinearWrap => (FilterMode::Linear, AddressMode::Repeat),
            SamplerMode::BilinearClamp => (FilterMode::Linear, AddressMode::ClampToEdge),
        };
        SamplerDescriptor {
            label: Some(format!("Sampler {self}")),
            filter,
            address_mode,
        }
    }
}

impl RasterizerMode {
    pub fn descriptor(self) -> RasterizerDescriptor {
        let (fill_mode, cull_mode) = match self {
            RasterizerMode::SolidCullBack => (FillMode::Solid, CullMode::Back),
            RasterizerMode::SolidCullNone => (FillMode::Solid, CullMode::None),
            RasterizerMode::WireframeCullBack => (FillMode::Wireframe, CullMode::Back),
            RasterizerMode::WireframeCullNone => (FillMode::Wireframe, CullMode::None),
        };
        RasterizerDescriptor {
            label: Some(format!("Rasterizer {self}")),
            fill_mode,
            cull_mode,
        }
    }
}

impl DepthMode {
    pub fn descriptor(self) -> DepthStateDescriptor {
        let (depth_write_enabled, depth_compare) = match self {
            DepthMode::Enabled => (true, CompareFunction::LessEqual),
            DepthMode::Disabled => (false, CompareFunction::Always),
        };
        DepthStateDescriptor {
            label: Some(format!("Depth {self}")),
            depth_write_enabled,
            depth_compare,
        }
    }
}

/// One family's state objects plus its desired and active selection
#[derive(Debug)]
pub(crate) struct StateFamily<M: RenderMode, S> {
    objects: Vec<S>,
    desired: M,
    active: Option<M>,
}

impl<M: RenderMode, S> StateFamily<M, S> {
    /// Build one object per mode, in table order
    pub(crate) fn create(
        desired: M,
        mut build: impl FnMut(M) -> BackendResult<S>,
    ) -> BackendResult<Self> {
        let objects = M::ALL.iter().map(|mode| build(*mode)).collect::<BackendResult<_>>()?;
        Ok(Self {
            objects,
            desired,
            active: None,
        })
    }

    pub(crate) fn desire(&mut self, mode: M) {
        self.desired = mode;
    }

    pub(crate) fn desired(&self) -> M {
        self.desired
    }

    pub(crate) fn active(&self) -> Option<M> {
        self.active
    }

    /// Mark the desired mode active; returns its object if that changed anything
    pub(crate) fn reconcile(&mut self) -> Option<&S> {
        if self.active == Some(self.desired) {
            return None;
        }
        self.active = Some(self.desired);
        self.objects.get(self.desired.index())
    }

    /// Forget the active selection so the next reconcile reactivates
    pub(crate) fn invalidate(&mut self) {
        self.active = None;
    }
}

/// All four state families
#[derive(Debug)]
pub(crate) struct RenderStates {
    pub(crate) blend: StateFamily<BlendMode, GpuBlendState>,
    pub(crate) sampler: StateFamily<SamplerMode, GpuSampler>,
    pub(crate) rasterizer: StateFamily<RasterizerMode, GpuRasterizerState>,
    pub(crate) depth: StateFamily<DepthMode, GpuDepthState>,
}

impl RenderStates {
    pub(crate) fn create(
        backend: &mut dyn GraphicsBackend,
        defaults: &crate::RendererConfig,
    ) -> BackendResult<Self> {
        let blend = StateFamily::create(defaults.blend_mode, |mode| {
            backend.create_blend_state(&mode.descriptor())
        })?;
        let sampler = StateFamily::create(defaults.sampler_mode, |mode| {
            backend.create_sampler(&mode.descriptor())
        })?;
        let rasterizer = StateFamily::create(defaults.rasterizer_mode, |mode| {
            backend.create_rasterizer_state(&mode.descriptor())
        })?;
        let depth = StateFamily::create(defaults.depth_mode, |mode| {
            backend.create_depth_state(&mode.descriptor())
        })?;
        log::debug!(
            "Created {} render state objects",
            BlendMode::ALL.len() + SamplerMode::ALL.len() + RasterizerMode::ALL.len() + DepthMode::ALL.len()
        );
        Ok(Self {
            blend,
            sampler,
            rasterizer,
            depth,
        })
    }

    /// Activate every family's desired object that isn't already active
    ///
    /// Returns the number of activation calls issued.
    pub(crate) fn reconcile(&mut self, backend: &mut dyn GraphicsBackend) -> u32 {
        let mut activations = 0;
        if let Some(state) = self.blend.reconcile() {
            backend.set_blend_state(state);
            activations += 1;
        }
        if let Some(sampler) = self.sampler.reconcile() {
            backend.set_sampler(0, sampler);
            activations += 1;
        }
        if let Some(state) = self.rasterizer.reconcile() {
            backend.set_rasterizer_state(state);
            activations += 1;
        }
        if let Some(state) = self.depth.reconcile() {
            backend.set_depth_state(state);
            activations += 1;
        }
        if activations > 0 {
            log::trace!("Reconciled {} render state(s)", activations);
        }
        activations
    }

    pub(crate) fn invalidate(&mut self) {
        self.blend.invalidate();
        self.sampler.invalidate();
        self.rasterizer.invalidate();
        self.depth.invalidate();
    }
}
