use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use tiny_skia::{BlendMode, Color, FillRule, Paint, PathBuilder, Pixmap, Rect as SkRect, Transform};

use crate::coords::{CoordinateMapper, SurfaceGeometry};
use crate::gpu::{Canvas, GpuHandles};
use crate::surface::{AlphaMode, FrameContext, RenderSurface, SurfaceOutput};

/// Share of the remaining clear glass that fogs over per 1/60 s.
const CONDENSE_PER_TICK: f32 = 0.008;
const TICKS_PER_SECOND: f32 = 60.0;
const INITIAL_FOG_ALPHA: f32 = 0.9;
const RING_SCALE: f32 = 1.2;
const RING_ALPHA: f32 = 0.5;

/// CPU-side fog layer. Condensation builds at a wall-clock rate and wipes
/// punch holes into it.
pub struct FogCanvas {
    pixmap: Pixmap,
}

impl FogCanvas {
    pub fn new(width: u32, height: u32) -> Option<Self> {
        let mut pixmap = Pixmap::new(width.max(1), height.max(1))?;
        pixmap.fill(Color::from_rgba(1.0, 1.0, 1.0, INITIAL_FOG_ALPHA)?);
        Some(Self { pixmap })
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// Premultiplied RGBA8.
    pub fn data(&self) -> &[u8] {
        self.pixmap.data()
    }

    /// Adds the condensation accumulated over `elapsed`.
    pub fn condense(&mut self, elapsed: Duration) {
        let ticks = elapsed.as_secs_f32() * TICKS_PER_SECOND;
        let alpha = 1.0 - (1.0 - CONDENSE_PER_TICK).powf(ticks);
        if alpha <= 0.0 {
            return;
        }
        let Some(rect) = SkRect::from_xywh(
            0.0,
            0.0,
            self.pixmap.width() as f32,
            self.pixmap.height() as f32,
        ) else {
            return;
        };
        let mut paint = Paint::default();
        paint.set_color_rgba8(240, 245, 255, (alpha.clamp(0.0, 1.0) * 255.0).round() as u8);
        paint.blend_mode = BlendMode::SourceOver;
        self.pixmap.fill_rect(rect, &paint, Transform::identity(), None);
    }

    /// Clears a disc at canvas pixel `(x, y)` plus a softer ring around it.
    pub fn wipe(&mut self, x: f32, y: f32, radius: f32) {
        if radius <= 0.0 {
            return;
        }
        self.erase_disc(x, y, radius * RING_SCALE, RING_ALPHA);
        self.erase_disc(x, y, radius, 1.0);
    }

    /// Mean fog alpha in `[0, 1]`.
    pub fn coverage(&self) -> f32 {
        let data = self.pixmap.data();
        let texels = data.len() / 4;
        if texels == 0 {
            return 0.0;
        }
        let total: u64 = data.chunks_exact(4).map(|px| px[3] as u64).sum();
        total as f32 / (texels as f32 * 255.0)
    }

    pub fn alpha_at(&self, x: u32, y: u32) -> Option<u8> {
        self.pixmap.pixel(x, y).map(|px| px.alpha())
    }

    fn erase_disc(&mut self, x: f32, y: f32, radius: f32, strength: f32) {
        let Some(path) = PathBuilder::from_circle(x, y, radius) else {
            return;
        };
        let mut paint = Paint::default();
        paint.set_color_rgba8(0, 0, 0, (strength.clamp(0.0, 1.0) * 255.0).round() as u8);
        paint.blend_mode = BlendMode::DestinationOut;
        paint.anti_alias = true;
        self.pixmap
            .fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
    }
}

/// Full-viewport fog overlay wiped by the pointer.
pub struct FogOverlay {
    gpu: GpuHandles,
    canvas: Canvas,
    fog: FogCanvas,
    wipe_radius: f32,
    last_condensed: Option<Instant>,
    opacity: f32,
    destroyed: bool,
    frames_drawn: u64,
}

impl FogOverlay {
    pub fn new(gpu: &GpuHandles, geometry: SurfaceGeometry, wipe_radius: f32) -> Result<Self> {
        let canvas = Canvas::new(gpu, "fog", geometry);
        let (width, height) = canvas.physical_size();
        let fog = FogCanvas::new(width, height)
            .ok_or_else(|| anyhow!("failed to allocate {width}x{height} fog pixmap"))?;
        Ok(Self {
            gpu: gpu.clone(),
            canvas,
            fog,
            wipe_radius,
            last_condensed: None,
            opacity: 1.0,
            destroyed: false,
            frames_drawn: 0,
        })
    }

    pub fn fog(&self) -> &FogCanvas {
        &self.fog
    }
}

impl RenderSurface for FogOverlay {
    fn label(&self) -> &str {
        self.canvas.label()
    }

    fn resize(&mut self, geometry: SurfaceGeometry) {
        if self.canvas.resize(&self.gpu, geometry) {
            let (width, height) = self.canvas.physical_size();
            match FogCanvas::new(width, height) {
                Some(fog) => self.fog = fog,
                None => tracing::warn!(width, height, "failed to reallocate fog pixmap"),
            }
        }
    }

    fn render(&mut self, frame: &FrameContext<'_>) -> Result<()> {
        if self.destroyed {
            return Ok(());
        }
        if let Some(last) = self.last_condensed {
            self.fog.condense(frame.now.saturating_duration_since(last));
        }
        self.last_condensed = Some(frame.now);

        let geometry = self.canvas.geometry();
        for interaction in frame.interactions {
            let circle =
                CoordinateMapper::map_circle(interaction.position(), self.wipe_radius, &geometry);
            self.fog.wipe(circle.x, circle.y, circle.radius);
        }

        self.opacity = 0.35 + 0.65 * frame.ambient.fog_opacity;
        if self.canvas.is_visible() {
            self.canvas.upload(&self.gpu, self.fog.data());
            self.frames_drawn += 1;
        }
        Ok(())
    }

    fn set_visible(&mut self, visible: bool) {
        self.canvas.set_visible(visible);
    }

    fn is_visible(&self) -> bool {
        self.canvas.is_visible()
    }

    fn destroy(&mut self) {
        self.destroyed = true;
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    fn output(&self) -> Option<SurfaceOutput<'_>> {
        if self.destroyed || !self.canvas.is_visible() || self.frames_drawn == 0 {
            return None;
        }
        Some(self.canvas.output(self.opacity, AlphaMode::Premultiplied))
    }
}
