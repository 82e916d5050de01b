use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use ambient::{AmbientEvent, AmbientSignal, AmbientTracker, InputKind};
use anyhow::{anyhow, Context, Result};
use glassconfig::GlassConfig;
use image::{Rgba, RgbaImage};
use winit::dpi::{LogicalSize, PhysicalPosition};
use winit::event::{ElementState, Event, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoopBuilder, EventLoopWindowTarget};
use winit::keyboard::{Key, ModifiersState, NamedKey};
use winit::window::{Window, WindowBuilder};

use crate::assets::{AssetEvent, AssetHandle, AssetLoader};
use crate::coords::{Point, Rect, SurfaceGeometry};
use crate::frame::{FrameInput, FrameScheduler, LayerId, SchedulerError, SchedulerState};
use crate::gpu::{
    Compositor, GpuContext, ShaderLayer, QUAD_VERTEX_WGSL, WATER_BACK_WGSL, WATER_FRONT_WGSL,
};
use crate::host::HostEditor;
use crate::overlay::{CardNode, ConnectionGraph, ConnectionOverlay, FogOverlay};
use crate::simulator::{SimParams, SimulatorFactory};
use crate::surface::{Interaction, TextureLayer, UniformValue};

/// Height of the title strip above the editor, in logical pixels.
const TOP_BAR: f32 = 32.0;
/// Pixels scrolled per wheel notch when the platform reports lines.
const WHEEL_LINE_PX: f32 = 40.0;
const BACK_PARALLAX: f32 = 0.4;
const FRONT_PARALLAX: f32 = 1.0;
const BACKGROUND_FALLBACK: [u8; 4] = [22, 30, 44, 255];
const FOREGROUND_FALLBACK: [u8; 4] = [70, 86, 110, 255];
/// Pointer interactions kept between frames; older ones are dropped first.
const MAX_PENDING_INTERACTIONS: usize = 256;

/// Everything the window runtime needs besides the host's own objects.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub title: String,
    /// Logical window size.
    pub initial_size: (u32, u32),
    pub config: GlassConfig,
    /// Seeds the lightning roll.
    pub seed: u64,
}

/// Host-provided collaborators.
pub struct HostBindings {
    pub editor: Box<dyn HostEditor>,
    pub simulator: SimulatorFactory,
}

/// Opens the window and drives the compositor until it closes. Blocks the
/// calling thread, which must be the main thread.
pub fn run(runtime: RuntimeConfig, host: HostBindings) -> Result<()> {
    let event_loop = EventLoopBuilder::new()
        .build()
        .map_err(|err| anyhow!("failed to create event loop: {err}"))?;
    let (width, height) = runtime.initial_size;
    let window = WindowBuilder::new()
        .with_title(runtime.title.clone())
        .with_inner_size(LogicalSize::new(width, height))
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create window: {err}"))?;
    let window = Arc::new(window);

    let mut state = WindowState::new(window, &runtime, host)?;
    state.window.request_redraw();

    let run_result = event_loop.run(|event, elwt| state.handle_event(event, elwt));
    if let Err(err) = run_result {
        return Err(anyhow!("window event loop error: {err}"));
    }
    match state.fatal.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

struct LayerIds {
    back: LayerId,
    front: LayerId,
}

struct WindowState {
    window: Arc<Window>,
    gpu: GpuContext,
    compositor: Compositor,
    scheduler: FrameScheduler,
    tracker: AmbientTracker,
    editor: Box<dyn HostEditor>,
    loader: AssetLoader,
    layers: LayerIds,
    pointer: PointerState,
    modifiers: ModifiersState,
    occluded: bool,
    fatal: Option<anyhow::Error>,
}

impl WindowState {
    fn new(window: Arc<Window>, runtime: &RuntimeConfig, host: HostBindings) -> Result<Self> {
        let config = &runtime.config;
        let gpu = GpuContext::new(window.clone()).context("failed to initialise GPU")?;
        let compositor = Compositor::new(&gpu);
        let handles = gpu.handles().clone();

        let viewport = viewport_geometry(&window);
        let editor_geometry = editor_geometry(viewport);

        let mut back = ShaderLayer::new(
            &handles,
            "water-back",
            editor_geometry,
            QUAD_VERTEX_WGSL,
            WATER_BACK_WGSL,
        )
        .context("failed to build background water layer")?;
        let mut front = ShaderLayer::new(
            &handles,
            "water-front",
            editor_geometry,
            QUAD_VERTEX_WGSL,
            WATER_FRONT_WGSL,
        )
        .context("failed to build foreground water layer")?;
        for layer in [&mut back, &mut front] {
            layer.set_uniform("u_brightness", UniformValue::Scalar(config.rain.brightness));
        }

        let fog = FogOverlay::new(&handles, viewport, config.interaction.fog_wipe_radius)?;
        let graph = ConnectionGraph::new(config.cards.iter().map(CardNode::from_config).collect());
        let connections = ConnectionOverlay::new(&handles, viewport, graph)?;

        let now = Instant::now();
        let mut scheduler = FrameScheduler::new(
            host.simulator,
            now + config.rain.startup_timeout,
            SimParams::from_config(config),
            config.interaction.wipe_radius,
        );
        let layers = LayerIds {
            back: scheduler.add_layer(Box::new(back), BACK_PARALLAX),
            front: scheduler.add_layer(Box::new(front), FRONT_PARALLAX),
        };
        scheduler.add_overlay(Box::new(fog));
        scheduler.add_overlay(Box::new(connections));

        let loader = AssetLoader::new();
        let background = image_asset(
            &loader,
            "background",
            config.rain.background.as_deref(),
            BACKGROUND_FALLBACK,
        )?;
        let foreground = image_asset(
            &loader,
            "foreground",
            config.rain.foreground.as_deref(),
            FOREGROUND_FALLBACK,
        )?;
        scheduler.bind_asset(layers.back, "u_textureBg", background);
        scheduler.bind_asset(layers.front, "u_textureFg", foreground);

        let mut editor = host.editor;
        editor.layout(editor_geometry.rect);

        tracing::info!(
            width = viewport.rect.width,
            height = viewport.rect.height,
            scale = viewport.scale,
            cards = config.cards.len(),
            "rain glass window ready"
        );

        Ok(Self {
            window,
            gpu,
            compositor,
            scheduler,
            tracker: AmbientTracker::from_config(config, runtime.seed, now),
            editor,
            loader,
            layers,
            pointer: PointerState::default(),
            modifiers: ModifiersState::empty(),
            occluded: false,
            fatal: None,
        })
    }

    fn handle_event(&mut self, event: Event<()>, elwt: &EventLoopWindowTarget<()>) {
        match event {
            Event::WindowEvent { window_id, event } if window_id == self.window.id() => {
                self.handle_window_event(event, elwt);
            }
            Event::AboutToWait => self.about_to_wait(elwt),
            _ => {}
        }
    }

    fn handle_window_event(&mut self, event: WindowEvent, elwt: &EventLoopWindowTarget<()>) {
        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => self.shutdown(elwt),
            WindowEvent::ModifiersChanged(modifiers) => {
                let alt_before = self.modifiers.alt_key();
                self.modifiers = modifiers.state();
                let alt_now = self.modifiers.alt_key();
                if alt_before != alt_now {
                    self.record(AmbientEvent::Peek(alt_now));
                }
            }
            WindowEvent::KeyboardInput { event, .. } => self.handle_key(&event),
            WindowEvent::MouseWheel { delta, .. } => {
                // Positive winit deltas scroll up; the focus gesture counts
                // downward scrolling as positive.
                let pixels = match delta {
                    MouseScrollDelta::LineDelta(_, y) => -y * WHEEL_LINE_PX,
                    MouseScrollDelta::PixelDelta(position) => -position.y as f32,
                };
                self.record(AmbientEvent::Input(InputKind::Wheel));
                if self.modifiers.alt_key() {
                    self.record(AmbientEvent::FocusScroll { delta: pixels });
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                let at = self.logical_point(position);
                self.pointer.moved(at);
                self.record(AmbientEvent::Input(InputKind::PointerMove));
            }
            WindowEvent::CursorLeft { .. } => self.pointer.left(),
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                self.pointer.button(state);
                if state == ElementState::Pressed {
                    self.record(AmbientEvent::Input(InputKind::PointerDown));
                }
            }
            WindowEvent::Occluded(occluded) => {
                tracing::debug!(occluded, "window visibility changed");
                self.occluded = occluded;
                if occluded {
                    self.pointer.discard();
                } else {
                    self.window.request_redraw();
                }
            }
            WindowEvent::Resized(size) => {
                self.gpu.resize(size);
                self.relayout();
            }
            WindowEvent::ScaleFactorChanged { .. } => {
                self.gpu.resize(self.window.inner_size());
                self.relayout();
            }
            WindowEvent::RedrawRequested => self.redraw(elwt),
            _ => {}
        }
    }

    fn handle_key(&mut self, event: &KeyEvent) {
        if event.state != ElementState::Pressed {
            return;
        }
        self.record(AmbientEvent::Input(InputKind::KeyPress));

        if self.modifiers.control_key() {
            if let Key::Character(value) = &event.logical_key {
                let layer = match value.as_str() {
                    "1" => Some(self.layers.back),
                    "2" => Some(self.layers.front),
                    _ => None,
                };
                if let Some(layer) = layer {
                    let visible = !self.scheduler.layer_visible(layer);
                    self.scheduler.set_layer_visible(layer, visible);
                    tracing::info!(?layer, visible, "toggled water layer");
                }
            }
            return;
        }

        match &event.logical_key {
            Key::Named(NamedKey::Backspace) => self.editor.delete_backward(),
            _ => {
                if let Some(text) = event.text.as_ref().filter(|text| !text.is_empty()) {
                    self.editor.insert(text.as_str());
                }
            }
        }
        for change in self.editor.take_changes() {
            self.record(AmbientEvent::Edit { chars: change.chars });
        }
    }

    fn about_to_wait(&mut self, elwt: &EventLoopWindowTarget<()>) {
        let now = Instant::now();
        for signal in self.tracker.poll_timers(now) {
            log_signal(signal);
        }
        for event in self.loader.drain() {
            match event {
                AssetEvent::Loaded { label } => tracing::info!(%label, "image asset loaded"),
                AssetEvent::Failed { label, reason } => {
                    tracing::warn!(%label, %reason, "image asset failed to load")
                }
            }
        }

        let animating = !self.occluded && self.scheduler.state() != SchedulerState::Halted;
        if animating {
            self.window.request_redraw();
        }
        match self.tracker.next_deadline() {
            Some(deadline) => elwt.set_control_flow(ControlFlow::WaitUntil(deadline)),
            None => elwt.set_control_flow(ControlFlow::Wait),
        }
    }

    fn redraw(&mut self, elwt: &EventLoopWindowTarget<()>) {
        if self.occluded {
            self.pointer.discard();
            return;
        }
        let now = Instant::now();
        let ambient = self.tracker.snapshot(now);
        let viewport = viewport_geometry(&self.window);
        let editor = editor_geometry(viewport);
        let interactions = self.pointer.take_interactions();
        let input = FrameInput {
            now,
            editor: &editor,
            focus: self.editor.cursor_rect(),
            pointer: self.pointer.position,
            interactions: &interactions,
            ambient: &ambient,
        };

        match self.scheduler.tick(&input) {
            Ok(report) => {
                tracing::trace!(stages = report.stages.len(), shield = ?report.shield, "frame ticked");
            }
            Err(err @ SchedulerError::Simulator(_)) => {
                self.fatal = Some(anyhow::Error::new(err));
                self.shutdown(elwt);
                return;
            }
            Err(err) => tracing::error!("frame failed: {err:#}"),
        }

        let outputs = self.scheduler.outputs();
        let size = (viewport.rect.width, viewport.rect.height);
        if let Err(err) = self.compositor.present(&self.gpu, size, &outputs) {
            match err {
                wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
                    self.gpu.reconfigure();
                }
                wgpu::SurfaceError::OutOfMemory => {
                    self.fatal = Some(anyhow!("surface out of memory"));
                    self.shutdown(elwt);
                }
                wgpu::SurfaceError::Timeout => {
                    tracing::debug!("surface timeout; retrying next frame");
                }
                other => {
                    tracing::warn!("surface error: {other:?}; retrying next frame");
                }
            }
        }
    }

    fn relayout(&mut self) {
        let viewport = viewport_geometry(&self.window);
        let editor = editor_geometry(viewport);
        self.scheduler.resize(editor, viewport);
        self.editor.layout(editor.rect);
        self.window.request_redraw();
    }

    fn record(&mut self, event: AmbientEvent) {
        if let Some(signal) = self.tracker.record(event, Instant::now()) {
            log_signal(signal);
        }
    }

    fn logical_point(&self, position: PhysicalPosition<f64>) -> Point {
        let scale = self.window.scale_factor();
        Point::new((position.x / scale) as f32, (position.y / scale) as f32)
    }

    fn shutdown(&mut self, elwt: &EventLoopWindowTarget<()>) {
        self.scheduler.destroy();
        self.tracker.cancel();
        elwt.exit();
    }
}

/// Pointer position plus interactions collected since the last frame.
#[derive(Default)]
struct PointerState {
    position: Option<Point>,
    pressed: bool,
    pending: Vec<Interaction>,
}

impl PointerState {
    fn moved(&mut self, at: Point) {
        self.position = Some(at);
        self.push(if self.pressed {
            Interaction::Drag { at }
        } else {
            Interaction::Hover { at }
        });
    }

    fn left(&mut self) {
        self.position = None;
        self.pressed = false;
    }

    fn button(&mut self, state: ElementState) {
        self.pressed = state == ElementState::Pressed;
        if let (true, Some(at)) = (self.pressed, self.position) {
            self.push(Interaction::Tap { at });
        }
    }

    fn push(&mut self, interaction: Interaction) {
        if self.pending.len() >= MAX_PENDING_INTERACTIONS {
            let excess = self.pending.len() + 1 - MAX_PENDING_INTERACTIONS;
            self.pending.drain(..excess);
        }
        self.pending.push(interaction);
    }

    /// Drops queued interactions without applying them, e.g. while hidden.
    fn discard(&mut self) {
        self.pending.clear();
    }

    fn take_interactions(&mut self) -> Vec<Interaction> {
        std::mem::take(&mut self.pending)
    }
}

fn viewport_geometry(window: &Window) -> SurfaceGeometry {
    let scale = window.scale_factor() as f32;
    let size = window.inner_size();
    SurfaceGeometry::new(
        Rect::new(0.0, 0.0, size.width as f32 / scale, size.height as f32 / scale),
        scale,
    )
}

/// The editor fills the viewport below the top bar.
fn editor_geometry(viewport: SurfaceGeometry) -> SurfaceGeometry {
    let rect = viewport.rect;
    let top = TOP_BAR.min(rect.height - 1.0).max(0.0);
    SurfaceGeometry::new(
        Rect::new(rect.left, rect.top + top, rect.width, (rect.height - top).max(1.0)),
        viewport.scale,
    )
}

fn image_asset(
    loader: &AssetLoader,
    label: &str,
    path: Option<&Path>,
    fallback: [u8; 4],
) -> Result<AssetHandle> {
    match path {
        Some(path) => loader
            .spawn(label, path)
            .with_context(|| format!("failed to start loading {label} image")),
        None => Ok(AssetHandle::ready(
            label,
            RgbaImage::from_pixel(1, 1, Rgba(fallback)),
        )),
    }
}

fn log_signal(signal: AmbientSignal) {
    match signal {
        AmbientSignal::StormLevelChanged { from, to } => {
            tracing::info!(?from, ?to, "storm level changed");
        }
        AmbientSignal::Lightning => tracing::debug!("lightning strike"),
    }
}
