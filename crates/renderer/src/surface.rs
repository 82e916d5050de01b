use std::time::{Duration, Instant};

use ambient::AmbientSnapshot;

use crate::coords::{Point, Rect, SurfaceGeometry};
use crate::pixels::ImageSource;

/// Pointer interaction collected since the previous frame, in viewport pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Interaction {
    Hover { at: Point },
    Drag { at: Point },
    Tap { at: Point },
}

impl Interaction {
    pub fn position(&self) -> Point {
        match *self {
            Interaction::Hover { at } | Interaction::Drag { at } | Interaction::Tap { at } => at,
        }
    }
}

/// Everything a surface may read while rendering one frame.
pub struct FrameContext<'a> {
    pub now: Instant,
    /// Wall-clock time since the scheduler started running.
    pub time: Duration,
    pub ambient: &'a AmbientSnapshot,
    pub pointer: Option<Point>,
    pub interactions: &'a [Interaction],
    /// Pointer offset normalised to `[-1, 1]` over the editor.
    pub parallax: [f32; 2],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlphaMode {
    Straight,
    Premultiplied,
}

/// What the compositor needs to place a surface on screen.
pub struct SurfaceOutput<'a> {
    pub view: &'a wgpu::TextureView,
    pub rect: Rect,
    pub opacity: f32,
    pub alpha: AlphaMode,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Scalar(f32),
    Vec2([f32; 2]),
}

/// Shape shared by shader layers and overlays so the scheduler can drive
/// them uniformly.
pub trait RenderSurface {
    fn label(&self) -> &str;
    fn resize(&mut self, geometry: SurfaceGeometry);
    fn render(&mut self, frame: &FrameContext<'_>) -> anyhow::Result<()>;
    fn set_visible(&mut self, visible: bool);
    fn is_visible(&self) -> bool;
    /// Releases render resources. Later `render` calls do nothing.
    fn destroy(&mut self);
    fn is_destroyed(&self) -> bool;
    /// `None` while hidden, destroyed or never rendered.
    fn output(&self) -> Option<SurfaceOutput<'_>>;
}

/// A surface driven by a shader program with named inputs.
pub trait TextureLayer: RenderSurface {
    /// Uploads `source` under `name`, returning its stable texture unit, or
    /// `None` when the source has nothing decodable yet.
    fn bind_texture(&mut self, name: &str, source: &dyn ImageSource) -> Option<usize>;
    fn set_uniform(&mut self, name: &str, value: UniformValue);
}
