use std::collections::BTreeSet;

use anyhow::{anyhow, Result};
use tiny_skia::{Color, FillRule, Paint, PathBuilder, Pixmap, Rect as SkRect, Stroke, Transform};

use crate::coords::{CoordinateMapper, Point, Rect, SurfaceGeometry};
use crate::gpu::{Canvas, GpuHandles};
use crate::surface::{AlphaMode, FrameContext, RenderSurface, SurfaceOutput};

use super::blur::box_blur;

const PROXIMITY: f32 = 300.0;
const PARALLAX_TRAVEL: f32 = 30.0;
const PACKET_CYCLE: f32 = 4.0;
const PACKET_RADIUS: f32 = 2.0;
const MIN_KEYWORD_LEN: usize = 5;

/// Lowercased words longer than four characters.
pub fn keywords(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.chars().count() >= MIN_KEYWORD_LEN)
        .map(str::to_lowercase)
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct CardNode {
    pub rect: Rect,
    pub depth: f32,
    pub keywords: BTreeSet<String>,
}

impl CardNode {
    pub fn new(rect: Rect, depth: f32, text: &str) -> Self {
        Self {
            rect,
            depth,
            keywords: keywords(text),
        }
    }

    pub fn from_config(card: &glassconfig::CardConfig) -> Self {
        Self::new(
            Rect::new(card.x, card.y, card.width, card.height),
            card.depth.unwrap_or(1.0),
            &card.text,
        )
    }

    /// Card centre after the parallax shift; deeper cards travel further.
    pub fn centre(&self, parallax: [f32; 2]) -> Point {
        let centre = self.rect.center();
        Point::new(
            centre.x - parallax[0] * PARALLAX_TRAVEL * self.depth,
            centre.y - parallax[1] * PARALLAX_TRAVEL * self.depth,
        )
    }

    fn shifted_rect(&self, parallax: [f32; 2]) -> Rect {
        self.rect.translate(
            -parallax[0] * PARALLAX_TRAVEL * self.depth,
            -parallax[1] * PARALLAX_TRAVEL * self.depth,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub from: usize,
    pub to: usize,
    /// Shared keywords plus one when the cards sit close together.
    pub strength: u32,
}

impl Edge {
    pub fn opacity(&self, time: f32) -> f32 {
        let base = (0.15 * self.strength as f32).min(0.4);
        let pulse = (time * 2.0 + self.from as f32 * 13.0 + self.to as f32 * 7.0).sin() * 0.3 + 0.7;
        base * pulse
    }

    /// Progress in `[0, 1)` of the packet travelling this edge, during the
    /// first second of every cycle.
    pub fn packet(&self, time: f32) -> Option<f32> {
        let phase = (time + self.from as f32 + self.to as f32).rem_euclid(PACKET_CYCLE);
        (phase < 1.0).then_some(phase)
    }

    pub fn touches(&self, node: usize) -> bool {
        self.from == node || self.to == node
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConnectionGraph {
    nodes: Vec<CardNode>,
}

impl ConnectionGraph {
    pub fn new(nodes: Vec<CardNode>) -> Self {
        Self { nodes }
    }

    pub fn nodes(&self) -> &[CardNode] {
        &self.nodes
    }

    pub fn edges(&self, parallax: [f32; 2]) -> Vec<Edge> {
        let mut edges = Vec::new();
        for (i, a) in self.nodes.iter().enumerate() {
            for (j, b) in self.nodes.iter().enumerate().skip(i + 1) {
                let shared = a.keywords.intersection(&b.keywords).count() as u32;
                let close = a.centre(parallax).distance(b.centre(parallax)) < PROXIMITY;
                let strength = shared + u32::from(close);
                if strength > 0 {
                    edges.push(Edge {
                        from: i,
                        to: j,
                        strength,
                    });
                }
            }
        }
        edges
    }

    /// Topmost card under `pointer`, compared in the surface's pixel space.
    pub fn hovered(
        &self,
        pointer: Point,
        geometry: &SurfaceGeometry,
        parallax: [f32; 2],
    ) -> Option<usize> {
        let at = CoordinateMapper::map_to(pointer, geometry);
        self.nodes.iter().rposition(|node| {
            let rect = node.shifted_rect(parallax);
            let origin = CoordinateMapper::map(
                Point::new(rect.left, rect.top),
                &geometry.rect,
                geometry.scale,
            );
            let mapped = Rect::new(
                origin.x,
                origin.y,
                CoordinateMapper::map_radius(rect.width, geometry.scale),
                CoordinateMapper::map_radius(rect.height, geometry.scale),
            );
            mapped.contains(at)
        })
    }

    /// Draws cards, edges and packets into `pixmap`, whose pixels cover
    /// `geometry`.
    pub fn draw(
        &self,
        pixmap: &mut Pixmap,
        geometry: &SurfaceGeometry,
        time: f32,
        parallax: [f32; 2],
        hovered: Option<usize>,
    ) {
        pixmap.fill(Color::TRANSPARENT);
        let scale = geometry.scale;
        let to_canvas = |point: Point| CoordinateMapper::map(point, &geometry.rect, scale);

        for node in &self.nodes {
            let rect = node.shifted_rect(parallax);
            let origin = to_canvas(Point::new(rect.left, rect.top));
            if let Some(card) =
                SkRect::from_xywh(origin.x, origin.y, rect.width * scale, rect.height * scale)
            {
                let mut paint = Paint::default();
                paint.set_color_rgba8(220, 230, 255, 20);
                pixmap.fill_rect(card, &paint, Transform::identity(), None);
            }
        }

        for edge in self.edges(parallax) {
            let a = to_canvas(self.nodes[edge.from].centre(parallax));
            let b = to_canvas(self.nodes[edge.to].centre(parallax));
            let highlighted = hovered.is_some_and(|node| edge.touches(node));
            let mut opacity = edge.opacity(time);
            if highlighted {
                opacity = (opacity * 2.0).min(0.8);
            }

            let mut builder = PathBuilder::new();
            builder.move_to(a.x, a.y);
            builder.line_to(b.x, b.y);
            if let Some(line) = builder.finish() {
                let mut paint = Paint::default();
                paint.set_color_rgba8(180, 200, 255, alpha_u8(opacity));
                paint.anti_alias = true;
                let stroke = Stroke {
                    width: (if highlighted { 2.0 } else { 1.0 }) * scale,
                    ..Stroke::default()
                };
                pixmap.stroke_path(&line, &paint, &stroke, Transform::identity(), None);
            }

            if let Some(progress) = edge.packet(time) {
                let x = a.x + (b.x - a.x) * progress;
                let y = a.y + (b.y - a.y) * progress;
                if let Some(dot) = PathBuilder::from_circle(x, y, PACKET_RADIUS * scale) {
                    let mut paint = Paint::default();
                    paint.set_color_rgba8(255, 255, 255, alpha_u8(0.8));
                    paint.anti_alias = true;
                    pixmap.fill_path(&dot, &paint, FillRule::Winding, Transform::identity(), None);
                }
            }
        }
    }
}

fn alpha_u8(opacity: f32) -> u8 {
    (opacity.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Connection graph between note cards, blurred as the user idles.
pub struct ConnectionOverlay {
    gpu: GpuHandles,
    canvas: Canvas,
    pixmap: Pixmap,
    graph: ConnectionGraph,
    destroyed: bool,
    frames_drawn: u64,
}

impl ConnectionOverlay {
    pub fn new(gpu: &GpuHandles, geometry: SurfaceGeometry, graph: ConnectionGraph) -> Result<Self> {
        let canvas = Canvas::new(gpu, "connections", geometry);
        let pixmap = allocate(canvas.physical_size())?;
        Ok(Self {
            gpu: gpu.clone(),
            canvas,
            pixmap,
            graph,
            destroyed: false,
            frames_drawn: 0,
        })
    }

    pub fn graph(&self) -> &ConnectionGraph {
        &self.graph
    }
}

fn allocate((width, height): (u32, u32)) -> Result<Pixmap> {
    Pixmap::new(width, height).ok_or_else(|| anyhow!("failed to allocate {width}x{height} pixmap"))
}

impl RenderSurface for ConnectionOverlay {
    fn label(&self) -> &str {
        self.canvas.label()
    }

    fn resize(&mut self, geometry: SurfaceGeometry) {
        if self.canvas.resize(&self.gpu, geometry) {
            match allocate(self.canvas.physical_size()) {
                Ok(pixmap) => self.pixmap = pixmap,
                Err(err) => tracing::warn!("{err:#}"),
            }
        }
    }

    fn render(&mut self, frame: &FrameContext<'_>) -> Result<()> {
        if self.destroyed || !self.canvas.is_visible() {
            return Ok(());
        }
        let geometry = self.canvas.geometry();
        let hovered = frame
            .pointer
            .and_then(|pointer| self.graph.hovered(pointer, &geometry, frame.parallax));
        self.graph.draw(
            &mut self.pixmap,
            &geometry,
            frame.time.as_secs_f32(),
            frame.parallax,
            hovered,
        );

        let radius = (frame.ambient.blur_px * geometry.scale).round() as usize;
        let (width, height) = (self.pixmap.width() as usize, self.pixmap.height() as usize);
        box_blur(self.pixmap.data_mut(), width, height, radius);

        self.canvas.upload(&self.gpu, self.pixmap.data());
        self.frames_drawn += 1;
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
        Some(self.canvas.output(1.0, AlphaMode::Premultiplied))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(left: f32, top: f32, text: &str) -> CardNode {
        CardNode::new(Rect::new(left, top, 100.0, 60.0), 1.0, text)
    }

    #[test]
    fn keywords_skip_short_words() {
        let words = keywords("The Storm over Harbour lights, storm!");
        let expected: BTreeSet<String> = ["storm", "harbour", "lights"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(words, expected);
    }

    #[test]
    fn shared_keywords_and_proximity_add_up() {
        let graph = ConnectionGraph::new(vec![
            card(0.0, 0.0, "harbour lights"),
            card(120.0, 0.0, "harbour fog"),
            card(2000.0, 2000.0, "unrelated notes"),
        ]);
        let edges = graph.edges([0.0, 0.0]);
        assert_eq!(
            edges,
            vec![Edge {
                from: 0,
                to: 1,
                strength: 2
            }]
        );
    }

    #[test]
    fn distant_strangers_stay_unconnected() {
        let graph = ConnectionGraph::new(vec![
            card(0.0, 0.0, "alpha"),
            card(1000.0, 0.0, "omega"),
        ]);
        assert!(graph.edges([0.0, 0.0]).is_empty());
    }

    #[test]
    fn opacity_is_capped() {
        let edge = Edge {
            from: 0,
            to: 1,
            strength: 10,
        };
        for step in 0..40 {
            let opacity = edge.opacity(step as f32 * 0.1);
            assert!(opacity <= 0.4 + f32::EPSILON);
            assert!(opacity >= 0.4 * 0.4 - f32::EPSILON);
        }
    }

    #[test]
    fn packet_runs_first_second_of_cycle() {
        let edge = Edge {
            from: 0,
            to: 1,
            strength: 1,
        };
        assert_eq!(edge.packet(3.5), Some(0.5));
        assert_eq!(edge.packet(0.5), None);
        assert_eq!(edge.packet(7.25), Some(0.25));
    }

    #[test]
    fn hover_hit_test_uses_surface_space() {
        let graph = ConnectionGraph::new(vec![card(100.0, 100.0, "first"), card(150.0, 120.0, "second")]);
        let geometry = SurfaceGeometry::new(Rect::new(0.0, 0.0, 800.0, 600.0), 2.0);
        assert_eq!(graph.hovered(Point::new(160.0, 130.0), &geometry, [0.0, 0.0]), Some(1));
        assert_eq!(graph.hovered(Point::new(110.0, 110.0), &geometry, [0.0, 0.0]), Some(0));
        assert_eq!(graph.hovered(Point::new(10.0, 10.0), &geometry, [0.0, 0.0]), None);
    }

    #[test]
    fn parallax_shifts_by_depth() {
        let near = CardNode::new(Rect::new(0.0, 0.0, 100.0, 100.0), 0.5, "");
        let far = CardNode::new(Rect::new(0.0, 0.0, 100.0, 100.0), 2.0, "");
        assert_eq!(near.centre([1.0, 0.0]), Point::new(35.0, 50.0));
        assert_eq!(far.centre([1.0, 0.0]), Point::new(-10.0, 50.0));
    }

    #[test]
    fn draw_marks_pixels_along_edges() {
        let graph = ConnectionGraph::new(vec![card(0.0, 0.0, "harbour"), card(200.0, 0.0, "harbour")]);
        let geometry = SurfaceGeometry::new(Rect::new(0.0, 0.0, 400.0, 100.0), 1.0);
        let mut pixmap = Pixmap::new(400, 100).expect("pixmap");
        graph.draw(&mut pixmap, &geometry, 2.0, [0.0, 0.0], Some(0));
        // Midpoint between the two card centres, outside both cards.
        let midpoint = pixmap.pixel(150, 30).expect("in bounds");
        assert!(midpoint.alpha() > 0);
    }
}
