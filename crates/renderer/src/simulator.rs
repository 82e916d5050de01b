use std::time::Instant;

use crate::coords::SurfaceGeometry;
use crate::pixels::PixelSurface;

/// Rain knobs pushed into the simulator, already scaled by the storm
/// multiplier when they come from the scheduler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimParams {
    pub rain_chance: f32,
    pub droplets_rate: f32,
}

impl SimParams {
    pub fn from_config(config: &glassconfig::GlassConfig) -> Self {
        Self {
            rain_chance: config.rain.rain_chance,
            droplets_rate: config.rain.droplets_rate,
        }
    }

    pub fn scaled(&self, multiplier: f32) -> Self {
        Self {
            rain_chance: (self.rain_chance * multiplier).clamp(0.0, 1.0),
            droplets_rate: self.droplets_rate * multiplier,
        }
    }
}

/// Opaque droplet simulation driven once per frame.
///
/// Coordinates and radii passed in are in the simulator surface's own pixel
/// space; the scheduler does the mapping.
pub trait Simulator {
    /// Advances one step. Pacing is the simulator's business and must follow
    /// `now`, not the call count.
    fn step(&mut self, now: Instant);
    fn surface(&self) -> &PixelSurface;
    fn clear_area(&mut self, x: f32, y: f32, radius: f32);
    fn splash(&mut self, x: f32, y: f32, strength: f32);
    fn configure(&mut self, params: SimParams);
}

/// Deferred simulator construction, run once the scheduler leaves Idle.
pub type SimulatorFactory =
    Box<dyn FnOnce(SurfaceGeometry) -> anyhow::Result<Box<dyn Simulator>>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaling_clamps_probability() {
        let params = SimParams {
            rain_chance: 0.3,
            droplets_rate: 50.0,
        };
        let heavy = params.scaled(2.0);
        assert!((heavy.rain_chance - 0.6).abs() < 1e-6);
        assert_eq!(heavy.droplets_rate, 100.0);
        assert_eq!(params.scaled(4.0).rain_chance, 1.0);
    }
}
