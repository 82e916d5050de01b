use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use renderer::{PixelSurface, SimParams, Simulator, SimulatorFactory, SurfaceGeometry};

const MAX_STEP: Duration = Duration::from_millis(100);
const MAX_TEXELS: u64 = 8192 * 8192;
const MAX_DROPS: usize = 900;
/// Radius range of spawned drops in logical pixels.
const MIN_RADIUS: f32 = 2.0;
const MAX_RADIUS: f32 = 8.0;
/// Drops at least this large (logical) start sliding.
const SLIDE_RADIUS: f32 = 5.0;
const GRAVITY: f32 = 220.0;
const SPLASH_DROPS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Droplet {
    x: f32,
    y: f32,
    radius: f32,
    velocity: f32,
}

/// Builds the droplet simulator once the scheduler knows the editor size.
pub fn factory(seed: u64) -> SimulatorFactory {
    Box::new(move |geometry: SurfaceGeometry| {
        let field = DropletField::new(geometry, seed)?;
        Ok(Box::new(field) as Box<dyn Simulator>)
    })
}

/// Raindrops on a pane, rasterised as a water map: RG carry the surface
/// normal offset by one half, alpha carries thickness.
pub struct DropletField {
    surface: PixelSurface,
    scale: f32,
    drops: Vec<Droplet>,
    params: SimParams,
    rng: StdRng,
    spawn_carry: f32,
    last_step: Option<Instant>,
}

impl DropletField {
    pub fn new(geometry: SurfaceGeometry, seed: u64) -> Result<Self> {
        let (width, height) = geometry.physical_size();
        if width as u64 * height as u64 > MAX_TEXELS {
            bail!("droplet surface {width}x{height} exceeds the supported size");
        }
        tracing::debug!(width, height, seed, "creating droplet field");
        Ok(Self {
            surface: PixelSurface::new(width, height),
            scale: geometry.scale,
            drops: Vec::new(),
            params: SimParams {
                rain_chance: 0.0,
                droplets_rate: 0.0,
            },
            rng: StdRng::seed_from_u64(seed),
            spawn_carry: 0.0,
            last_step: None,
        })
    }

    fn spawn(&mut self, x: f32, y: f32, radius: f32) {
        if self.drops.len() >= MAX_DROPS {
            return;
        }
        self.drops.push(Droplet {
            x,
            y,
            radius,
            velocity: 0.0,
        });
    }

    fn spawn_random(&mut self, min: f32, max: f32) {
        let x = self.rng.gen_range(0.0..self.surface.width() as f32);
        let y = self.rng.gen_range(0.0..self.surface.height() as f32);
        let radius = self.rng.gen_range(min..=max) * self.scale;
        self.spawn(x, y, radius);
    }

    fn advance(&mut self, dt: f32) {
        let slide = SLIDE_RADIUS * self.scale;
        let height = self.surface.height() as f32;
        let mut trails = Vec::new();
        for drop in &mut self.drops {
            if drop.radius < slide {
                continue;
            }
            drop.velocity += GRAVITY * self.scale * dt * (drop.radius / slide);
            drop.y += drop.velocity * dt;
            if self.rng.gen_bool(0.1) {
                drop.radius *= 0.97;
                trails.push(Droplet {
                    x: drop.x,
                    y: drop.y - drop.radius,
                    radius: drop.radius * 0.35,
                    velocity: 0.0,
                });
            }
        }
        self.drops
            .retain(|drop| drop.y - drop.radius < height && drop.radius >= 0.5);
        for trail in trails {
            self.spawn(trail.x, trail.y, trail.radius);
        }
        self.merge();
    }

    /// Overlapping drops coalesce into the larger one, preserving area.
    fn merge(&mut self) {
        self.drops
            .sort_by(|a, b| b.radius.total_cmp(&a.radius));
        let mut kept: Vec<Droplet> = Vec::with_capacity(self.drops.len());
        for drop in self.drops.drain(..) {
            let host = kept.iter_mut().find(|big| {
                let dx = big.x - drop.x;
                let dy = big.y - drop.y;
                (dx * dx + dy * dy).sqrt() < (big.radius + drop.radius) * 0.8
            });
            match host {
                Some(big) => {
                    big.radius = (big.radius * big.radius + drop.radius * drop.radius).sqrt();
                    big.velocity = big.velocity.max(drop.velocity);
                }
                None => kept.push(drop),
            }
        }
        self.drops = kept;
    }

    fn rasterise(&mut self) {
        self.surface.clear();
        for drop in &self.drops {
            let r = drop.radius.max(0.5);
            let min_x = (drop.x - r).floor() as i64;
            let max_x = (drop.x + r).ceil() as i64;
            let min_y = (drop.y - r).floor() as i64;
            let max_y = (drop.y + r).ceil() as i64;
            for py in min_y..=max_y {
                for px in min_x..=max_x {
                    let nx = (px as f32 + 0.5 - drop.x) / r;
                    let ny = (py as f32 + 0.5 - drop.y) / r;
                    let d2 = nx * nx + ny * ny;
                    if d2 > 1.0 {
                        continue;
                    }
                    let Some(offset) = self.surface.offset(px, py) else {
                        continue;
                    };
                    let thickness = ((1.0 - d2).sqrt() * 255.0) as u8;
                    let texel = &mut self.surface.data_mut()[offset..offset + 4];
                    if thickness > texel[3] {
                        texel[0] = ((nx * 0.5 + 0.5) * 255.0) as u8;
                        texel[1] = ((ny * 0.5 + 0.5) * 255.0) as u8;
                        texel[2] = 0;
                        texel[3] = thickness;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
impl DropletField {
    fn len(&self) -> usize {
        self.drops.len()
    }
}

impl Simulator for DropletField {
    fn step(&mut self, now: Instant) {
        let dt = match self.last_step {
            Some(last) => now.saturating_duration_since(last).min(MAX_STEP),
            None => Duration::ZERO,
        };
        self.last_step = Some(now);
        let dt = dt.as_secs_f32();

        self.spawn_carry += self.params.droplets_rate * dt;
        while self.spawn_carry >= 1.0 {
            self.spawn_carry -= 1.0;
            self.spawn_random(MIN_RADIUS, MAX_RADIUS);
        }
        if dt > 0.0 && self.rng.gen_bool(self.params.rain_chance.clamp(0.0, 1.0) as f64) {
            self.spawn_random(MIN_RADIUS * 0.5, MIN_RADIUS);
        }

        self.advance(dt);
        self.rasterise();
    }

    fn surface(&self) -> &PixelSurface {
        &self.surface
    }

    fn clear_area(&mut self, x: f32, y: f32, radius: f32) {
        let before = self.drops.len();
        self.drops.retain(|drop| {
            let dx = drop.x - x;
            let dy = drop.y - y;
            (dx * dx + dy * dy).sqrt() > radius
        });
        if self.drops.len() != before {
            self.rasterise();
        }
    }

    fn splash(&mut self, x: f32, y: f32, strength: f32) {
        let count = (SPLASH_DROPS as f32 * strength.max(0.0)).round() as usize;
        for _ in 0..count {
            let angle = self.rng.gen_range(0.0..std::f32::consts::TAU);
            let distance = self.rng.gen_range(4.0..24.0) * self.scale;
            let radius = self.rng.gen_range(MIN_RADIUS * 0.5..MIN_RADIUS * 1.5) * self.scale;
            self.spawn(x + angle.cos() * distance, y + angle.sin() * distance, radius);
        }
        self.rasterise();
    }

    fn configure(&mut self, params: SimParams) {
        tracing::debug!(?params, "droplet parameters updated");
        self.params = params;
    }
}

#[cfg(test)]
mod tests {
    use renderer::Rect;

    use super::*;

    fn field(seed: u64) -> DropletField {
        let geometry = SurfaceGeometry::new(Rect::new(0.0, 0.0, 200.0, 100.0), 2.0);
        DropletField::new(geometry, seed).expect("field")
    }

    fn run_for(field: &mut DropletField, steps: u32) {
        let start = Instant::now();
        for i in 0..=steps {
            field.step(start + Duration::from_millis(50) * i);
        }
    }

    #[test]
    fn surface_matches_device_pixels() {
        let field = field(1);
        assert_eq!(field.surface().width(), 400);
        assert_eq!(field.surface().height(), 200);
    }

    #[test]
    fn quiet_sky_spawns_nothing() {
        let mut field = field(7);
        run_for(&mut field, 20);
        assert_eq!(field.len(), 0);
        assert!(field.surface().data().iter().all(|&v| v == 0));
    }

    #[test]
    fn rate_spawns_drops_and_writes_thickness() {
        let mut field = field(7);
        field.configure(SimParams {
            rain_chance: 0.0,
            droplets_rate: 40.0,
        });
        run_for(&mut field, 20);
        assert!(field.len() > 0);
        assert!(field.surface().data().chunks_exact(4).any(|px| px[3] > 0));
    }

    #[test]
    fn clear_area_removes_drops_inside() {
        let mut field = field(3);
        field.spawn(100.0, 100.0, 6.0);
        field.spawn(300.0, 100.0, 6.0);
        field.clear_area(100.0, 100.0, 20.0);
        assert_eq!(field.len(), 1);
        let offset = field.surface().offset(100, 100).expect("in bounds");
        assert_eq!(field.surface().data()[offset + 3], 0);
    }

    #[test]
    fn splash_scatters_small_drops() {
        let mut field = field(5);
        field.splash(200.0, 100.0, 1.0);
        assert!(field.len() > 0);
        assert!(field.len() <= SPLASH_DROPS);
    }

    #[test]
    fn same_seed_same_rain() {
        let params = SimParams {
            rain_chance: 0.5,
            droplets_rate: 30.0,
        };
        let mut a = field(11);
        let mut b = field(11);
        a.configure(params);
        b.configure(params);
        let start = Instant::now();
        for i in 0..10 {
            let now = start + Duration::from_millis(40) * i;
            a.step(now);
            b.step(now);
        }
        assert_eq!(a.surface(), b.surface());
    }

    #[test]
    fn oversized_surfaces_fail() {
        let geometry = SurfaceGeometry::new(Rect::new(0.0, 0.0, 20000.0, 20000.0), 1.0);
        assert!(DropletField::new(geometry, 0).is_err());
    }
}
