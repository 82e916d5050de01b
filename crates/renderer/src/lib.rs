//! Renderer crate for rainglass, the rain-on-glass editor backdrop.
//!
//! Two refracting water layers sit behind a host text editor, with a fog
//! overlay and a card connection graph on top. The flow is:
//!
//! ```text
//!   rainglass CLI
//!          │ RuntimeConfig + HostBindings
//!          ▼
//!   window::run ──▶ winit event loop ──▶ AmbientTracker (timers, input)
//!                          │
//!                          └─▶ FrameScheduler::tick ──▶ simulator step
//!                                     │                 water map rebind
//!                                     │                 shield clears
//!                                     ▼
//!                 ShaderLayers + overlays ──▶ Compositor ──▶ swapchain
//! ```
//!
//! Every surface renders into its own offscreen canvas. The compositor blends
//! the canvases back to front, so surfaces never share GPU state. The water
//! simulation itself is host-provided through the [`Simulator`] trait; the
//! renderer only feeds it ambient parameters and shield requests.

pub mod assets;
pub mod compile;
pub mod coords;
pub mod frame;
pub mod gpu;
pub mod host;
pub mod overlay;
pub mod pixels;
pub mod simulator;
pub mod surface;
pub mod window;

pub use assets::{AssetEvent, AssetHandle, AssetLoader};
pub use compile::{ShaderError, Stage as ShaderStage};
pub use coords::{
    CoordinateMapper, GeometrySource, Point, Rect, ShieldRequest, SurfaceCircle, SurfaceGeometry,
};
pub use frame::{
    FrameInput, FrameReport, FrameScheduler, LayerId, SchedulerError, SchedulerState, Stage,
    PIPELINE,
};
pub use gpu::ShaderLayer;
pub use host::{ContentChange, HostEditor};
pub use pixels::{ImageSource, PixelSurface, PixelView};
pub use simulator::{SimParams, Simulator, SimulatorFactory};
pub use surface::{
    AlphaMode, FrameContext, Interaction, RenderSurface, SurfaceOutput, TextureLayer,
    UniformValue,
};
pub use window::{run, HostBindings, RuntimeConfig};
