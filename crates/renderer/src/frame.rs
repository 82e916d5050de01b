use std::time::Instant;

use ambient::{AmbientSnapshot, StormLevel};
use thiserror::Error;

use crate::assets::AssetHandle;
use crate::coords::{CoordinateMapper, GeometrySource, Point, Rect, ShieldRequest, SurfaceCircle, SurfaceGeometry};
use crate::pixels::PixelSurface;
use crate::simulator::{SimParams, Simulator, SimulatorFactory};
use crate::surface::{FrameContext, Interaction, RenderSurface, SurfaceOutput, TextureLayer, UniformValue};

pub const WATER_MAP_UNIFORM: &str = "u_waterMap";
const SPLASH_STRENGTH: f32 = 1.0;

/// One step of the per-frame pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    StepSimulation,
    RebindWaterMap,
    Shield,
    RenderLayers,
    RenderOverlays,
}

/// Every tick runs these in order. The water map must be rebound and the
/// shield applied before any layer renders.
pub const PIPELINE: [Stage; 5] = [
    Stage::StepSimulation,
    Stage::RebindWaterMap,
    Stage::Shield,
    Stage::RenderLayers,
    Stage::RenderOverlays,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Waiting on startup assets and the simulator.
    Idle,
    Running,
    /// Simulator construction failed or the scheduler was destroyed.
    Halted,
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("simulator construction failed")]
    Simulator(#[source] anyhow::Error),
    #[error("surface `{label}` failed to render")]
    Render {
        label: String,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerId(usize);

/// Per-tick inputs gathered by the window runtime.
pub struct FrameInput<'a> {
    pub now: Instant,
    /// The surface the simulator covers. Queried afresh on every mapping.
    pub editor: &'a dyn GeometrySource,
    /// Bounding rectangle of the focused element, in viewport pixels.
    pub focus: Option<Rect>,
    pub pointer: Option<Point>,
    pub interactions: &'a [Interaction],
    pub ambient: &'a AmbientSnapshot,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct FrameReport {
    pub stages: Vec<Stage>,
    /// Shield clear issued this frame, in simulator pixels.
    pub shield: Option<SurfaceCircle>,
}

enum Phase {
    Idle {
        deadline: Instant,
        build: Option<SimulatorFactory>,
    },
    Running {
        simulator: Box<dyn Simulator>,
        started: Instant,
    },
    Halted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BindState {
    Pending,
    Bound,
    Failed,
}

struct AssetBinding {
    layer: usize,
    uniform: String,
    asset: AssetHandle,
    state: BindState,
}

struct LayerEntry {
    layer: Box<dyn TextureLayer>,
    parallax_scale: f32,
}

/// Viewport-to-simulator mapping. The simulator keeps its startup size while
/// layers stretch it over the current editor rectangle, so each axis gets its
/// own scale.
#[derive(Debug, Clone, Copy)]
struct SimulatorSpace {
    rect: Rect,
    scale_x: f32,
    scale_y: f32,
}

impl SimulatorSpace {
    fn new(editor: &dyn GeometrySource, surface: &PixelSurface) -> Self {
        let geometry = editor.geometry();
        let rect = geometry.rect;
        let axis = |pixels: u32, logical: f32| {
            if logical > 0.0 {
                pixels as f32 / logical
            } else {
                geometry.scale
            }
        };
        Self {
            rect,
            scale_x: axis(surface.width(), rect.width),
            scale_y: axis(surface.height(), rect.height),
        }
    }

    fn point(&self, at: Point) -> Point {
        CoordinateMapper::map_axes(at, &self.rect, self.scale_x, self.scale_y)
    }

    /// Radii use the tighter axis so a clear never spills past the stretched area.
    fn circle(&self, center: Point, radius: f32) -> SurfaceCircle {
        let mapped = self.point(center);
        SurfaceCircle {
            x: mapped.x,
            y: mapped.y,
            radius: CoordinateMapper::map_radius(radius, self.scale_x.min(self.scale_y)),
        }
    }
}

/// Single per-frame entry point sequencing simulation, texture rebinding,
/// shielding and the draws of every registered surface.
pub struct FrameScheduler {
    phase: Phase,
    layers: Vec<LayerEntry>,
    overlays: Vec<Box<dyn RenderSurface>>,
    assets: Vec<AssetBinding>,
    sim_params: SimParams,
    applied_multiplier: Option<f32>,
    wipe_radius: f32,
}

impl FrameScheduler {
    pub fn new(
        build: SimulatorFactory,
        startup_deadline: Instant,
        sim_params: SimParams,
        wipe_radius: f32,
    ) -> Self {
        Self {
            phase: Phase::Idle {
                deadline: startup_deadline,
                build: Some(build),
            },
            layers: Vec::new(),
            overlays: Vec::new(),
            assets: Vec::new(),
            sim_params,
            applied_multiplier: None,
            wipe_radius,
        }
    }

    pub fn state(&self) -> SchedulerState {
        match self.phase {
            Phase::Idle { .. } => SchedulerState::Idle,
            Phase::Running { .. } => SchedulerState::Running,
            Phase::Halted => SchedulerState::Halted,
        }
    }

    /// Registers a layer behind every later one. `parallax_scale` weights the
    /// pointer parallax the layer receives.
    pub fn add_layer(&mut self, layer: Box<dyn TextureLayer>, parallax_scale: f32) -> LayerId {
        self.layers.push(LayerEntry {
            layer,
            parallax_scale,
        });
        LayerId(self.layers.len() - 1)
    }

    pub fn add_overlay(&mut self, overlay: Box<dyn RenderSurface>) {
        self.overlays.push(overlay);
    }

    /// Binds `asset` under `uniform` once it decodes. Pending assets hold the
    /// scheduler in Idle until they settle or the startup deadline passes.
    pub fn bind_asset(&mut self, layer: LayerId, uniform: impl Into<String>, asset: AssetHandle) {
        self.assets.push(AssetBinding {
            layer: layer.0,
            uniform: uniform.into(),
            asset,
            state: BindState::Pending,
        });
    }

    pub fn set_layer_visible(&mut self, layer: LayerId, visible: bool) {
        if let Some(entry) = self.layers.get_mut(layer.0) {
            entry.layer.set_visible(visible);
        }
    }

    pub fn layer_visible(&self, layer: LayerId) -> bool {
        self.layers
            .get(layer.0)
            .is_some_and(|entry| entry.layer.is_visible())
    }

    /// Layers cover the editor; overlays cover the whole viewport.
    pub fn resize(&mut self, editor: SurfaceGeometry, viewport: SurfaceGeometry) {
        for entry in &mut self.layers {
            entry.layer.resize(editor);
        }
        for overlay in &mut self.overlays {
            overlay.resize(viewport);
        }
    }

    /// Surfaces ready for compositing, back to front.
    pub fn outputs(&self) -> Vec<SurfaceOutput<'_>> {
        self.layers
            .iter()
            .filter_map(|entry| entry.layer.output())
            .chain(self.overlays.iter().filter_map(|overlay| overlay.output()))
            .collect()
    }

    /// Destroys every surface and halts. Later ticks do nothing.
    pub fn destroy(&mut self) {
        for entry in &mut self.layers {
            entry.layer.destroy();
        }
        for overlay in &mut self.overlays {
            overlay.destroy();
        }
        self.phase = Phase::Halted;
        tracing::debug!("frame scheduler destroyed");
    }

    pub fn tick(&mut self, input: &FrameInput<'_>) -> Result<FrameReport, SchedulerError> {
        let mut report = FrameReport::default();
        let Some(started) = self.ensure_running(input)? else {
            return Ok(report);
        };

        let parallax = input
            .pointer
            .map(|pointer| {
                let [x, y] = input.editor.geometry().normalized(pointer);
                [x.clamp(-1.0, 1.0), y.clamp(-1.0, 1.0)]
            })
            .unwrap_or([0.0, 0.0]);
        let frame = FrameContext {
            now: input.now,
            time: input.now.saturating_duration_since(started),
            ambient: input.ambient,
            pointer: input.pointer,
            interactions: input.interactions,
            parallax,
        };

        for stage in PIPELINE {
            self.run_stage(stage, input, &frame, &mut report)?;
            report.stages.push(stage);
        }
        Ok(report)
    }

    /// Moves Idle to Running when allowed. Returns the run start time when
    /// the pipeline should execute this tick.
    fn ensure_running(&mut self, input: &FrameInput<'_>) -> Result<Option<Instant>, SchedulerError> {
        let deadline = match &self.phase {
            Phase::Running { started, .. } => return Ok(Some(*started)),
            Phase::Halted => return Ok(None),
            Phase::Idle { deadline, .. } => *deadline,
        };

        let settled = self.assets.iter().all(|binding| binding.asset.is_settled());
        if !settled && input.now < deadline {
            return Ok(None);
        }
        if !settled {
            let pending: Vec<&str> = self
                .assets
                .iter()
                .filter(|binding| !binding.asset.is_settled())
                .map(|binding| binding.asset.label())
                .collect();
            tracing::warn!(?pending, "startup deadline passed; rendering with placeholders");
        }

        let build = match std::mem::replace(&mut self.phase, Phase::Halted) {
            Phase::Idle { build, .. } => build,
            _ => None,
        };
        let Some(build) = build else {
            return Ok(None);
        };
        match build(input.editor.geometry()) {
            Ok(simulator) => {
                tracing::info!(
                    width = simulator.surface().width(),
                    height = simulator.surface().height(),
                    "simulator ready; rendering started"
                );
                self.phase = Phase::Running {
                    simulator,
                    started: input.now,
                };
                Ok(Some(input.now))
            }
            Err(err) => {
                tracing::error!("simulator construction failed: {err:#}");
                Err(SchedulerError::Simulator(err))
            }
        }
    }

    fn run_stage(
        &mut self,
        stage: Stage,
        input: &FrameInput<'_>,
        frame: &FrameContext<'_>,
        report: &mut FrameReport,
    ) -> Result<(), SchedulerError> {
        let Phase::Running { simulator, .. } = &mut self.phase else {
            return Ok(());
        };

        match stage {
            Stage::StepSimulation => {
                let multiplier = input.ambient.multiplier;
                if self.applied_multiplier != Some(multiplier) {
                    let params = self.sim_params.scaled(multiplier);
                    tracing::debug!(multiplier, ?params, "reconfiguring simulator");
                    simulator.configure(params);
                    self.applied_multiplier = Some(multiplier);
                }
                simulator.step(input.now);
            }
            Stage::RebindWaterMap => {
                rebind_water_map(&mut self.layers, &**simulator);
                bind_pending_assets(&mut self.layers, &mut self.assets);
            }
            Stage::Shield => {
                let space = SimulatorSpace::new(input.editor, simulator.surface());
                let mut touched = false;
                if let Some(focus) = input.focus {
                    let shield = ShieldRequest::around(&focus);
                    let circle = space.circle(shield.center, shield.radius);
                    simulator.clear_area(circle.x, circle.y, circle.radius);
                    report.shield = Some(circle);
                    touched = true;
                }
                for interaction in input.interactions {
                    match *interaction {
                        Interaction::Drag { at } => {
                            let circle = space.circle(at, self.wipe_radius);
                            simulator.clear_area(circle.x, circle.y, circle.radius);
                            touched = true;
                        }
                        Interaction::Tap { at } => {
                            let point = space.point(at);
                            simulator.splash(point.x, point.y, SPLASH_STRENGTH);
                            touched = true;
                        }
                        Interaction::Hover { .. } => {}
                    }
                }
                // Layers hold a copy of the water map; refresh it so this
                // frame already shows the clear.
                if touched {
                    rebind_water_map(&mut self.layers, &**simulator);
                }
            }
            Stage::RenderLayers => {
                let ambient = input.ambient;
                let storm = match ambient.storm_level {
                    StormLevel::Calm => 0.0,
                    StormLevel::Heavy => 1.0,
                    StormLevel::Intense => 2.0,
                };
                for entry in &mut self.layers {
                    let layer = entry.layer.as_mut();
                    let [x, y] = frame.parallax;
                    layer.set_uniform(
                        "u_parallax",
                        UniformValue::Vec2([x * entry.parallax_scale, y * entry.parallax_scale]),
                    );
                    layer.set_uniform("u_flash", UniformValue::Scalar(ambient.flash));
                    layer.set_uniform("u_focus_depth", UniformValue::Scalar(ambient.focus_depth));
                    layer.set_uniform("u_storm", UniformValue::Scalar(storm));
                    render_surface(layer, frame)?;
                }
            }
            Stage::RenderOverlays => {
                for overlay in &mut self.overlays {
                    render_surface(overlay.as_mut(), frame)?;
                }
            }
        }
        Ok(())
    }
}

fn rebind_water_map(layers: &mut [LayerEntry], simulator: &dyn Simulator) {
    for entry in layers {
        entry.layer.bind_texture(WATER_MAP_UNIFORM, simulator.surface());
    }
}

fn bind_pending_assets(layers: &mut [LayerEntry], assets: &mut [AssetBinding]) {
    for binding in assets.iter_mut().filter(|b| b.state == BindState::Pending) {
        let Some(entry) = layers.get_mut(binding.layer) else {
            binding.state = BindState::Failed;
            continue;
        };
        if let Some(reason) = binding.asset.error() {
            tracing::warn!(
                asset = binding.asset.label(),
                uniform = %binding.uniform,
                %reason,
                "image failed to load; keeping placeholder"
            );
            binding.state = BindState::Failed;
            continue;
        }
        if let Some(unit) = entry.layer.bind_texture(&binding.uniform, &binding.asset) {
            tracing::debug!(
                asset = binding.asset.label(),
                layer = entry.layer.label(),
                unit,
                "bound image texture"
            );
            binding.state = BindState::Bound;
        }
    }
}

fn render_surface<S: RenderSurface + ?Sized>(
    surface: &mut S,
    frame: &FrameContext<'_>,
) -> Result<(), SchedulerError> {
    surface
        .render(frame)
        .map_err(|source| SchedulerError::Render {
            label: surface.label().to_string(),
            source,
        })
}
