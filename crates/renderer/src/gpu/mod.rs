//! wgpu plumbing behind the layered compositor.
//!
//! - `context` negotiates the adapter, device and window swapchain.
//! - `canvas` owns the offscreen texture each surface draws into.
//! - `uniforms` and `textures` reflect a program's inputs from its WGSL and
//!   keep the CPU-side tables the layer writes through.
//! - `layer` is the [`ShaderLayer`] itself.
//! - `compositor` blends the canvases onto the swapchain in order.

mod canvas;
mod compositor;
mod context;
mod layer;
mod textures;
mod uniforms;

pub use canvas::Canvas;
pub use compositor::Compositor;
pub use context::{GpuContext, GpuHandles};
pub use layer::{ShaderLayer, RESOLUTION_UNIFORM};

pub const QUAD_VERTEX_WGSL: &str = include_str!("../shaders/quad.wgsl");
pub const WATER_BACK_WGSL: &str = include_str!("../shaders/water_back.wgsl");
pub const WATER_FRONT_WGSL: &str = include_str!("../shaders/water_front.wgsl");
pub(crate) const COMPOSITOR_WGSL: &str = include_str!("../shaders/compositor.wgsl");
