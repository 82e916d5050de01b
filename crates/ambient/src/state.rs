use std::time::Duration;

use glassconfig::GlassConfig;
use rand::Rng;

/// Editor opacity lost per unit of focus depth; depth 1 leaves a faint ghost.
const EDITOR_FADE_PER_DEPTH: f32 = 0.98;

#[derive(Debug, Clone, PartialEq)]
pub struct AmbientParams {
    pub heavy_threshold: f32,
    pub intense_threshold: f32,
    pub decay_per_tick: f32,
    pub lightning_chance: f64,
    pub flash_duration: Duration,
    pub fog_after: Duration,
    pub fog_rate: f32,
    pub fog_max: f32,
    pub blur_after: Duration,
    pub blur_per_second: f32,
    pub blur_cap: f32,
    pub preferred_depth: f32,
    pub scroll_step: f32,
}

impl AmbientParams {
    pub fn from_config(config: &GlassConfig) -> Self {
        Self {
            heavy_threshold: config.storm.heavy_threshold,
            intense_threshold: config.storm.intense_threshold,
            decay_per_tick: config.storm.decay_per_tick,
            lightning_chance: config.storm.lightning_chance,
            flash_duration: config.storm.flash_duration,
            fog_after: config.idle.fog_after,
            fog_rate: config.idle.fog_rate,
            fog_max: config.idle.fog_max,
            blur_after: config.idle.blur_after,
            blur_per_second: config.idle.blur_per_second,
            blur_cap: config.idle.blur_cap,
            preferred_depth: config.focus.preferred,
            scroll_step: config.focus.scroll_step,
        }
    }
}

impl Default for AmbientParams {
    fn default() -> Self {
        Self::from_config(&GlassConfig::default())
    }
}

/// Input events that count as user activity and reset the idle clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    PointerMove,
    KeyPress,
    PointerDown,
    Wheel,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AmbientEvent {
    /// A text edit touching `chars` characters.
    Edit { chars: usize },
    Input(InputKind),
    /// One period of the storm-decay interval elapsed.
    DecayTick,
    /// Momentary focus toggle (held modifier) pressed or released.
    Peek(bool),
    /// Modifier+scroll gesture, in scrolled pixels.
    FocusScroll { delta: f32 },
    Lightning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StormLevel {
    Calm,
    Heavy,
    Intense,
}

impl StormLevel {
    pub fn from_intensity(intensity: f32, params: &AmbientParams) -> Self {
        if intensity > params.intense_threshold {
            StormLevel::Intense
        } else if intensity > params.heavy_threshold {
            StormLevel::Heavy
        } else {
            StormLevel::Calm
        }
    }

    pub fn multiplier(self) -> f32 {
        match self {
            StormLevel::Calm => 1.0,
            StormLevel::Heavy => 2.0,
            StormLevel::Intense => 4.0,
        }
    }
}

/// Focus depth knob: a sticky preferred value plus a momentary toggle.
///
/// Releasing the toggle drops the effective depth to zero but keeps the
/// preferred value, so engaging again restores the last explicitly chosen depth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FocusDepth {
    preferred: f32,
    engaged: bool,
}

impl FocusDepth {
    pub const MIN: f32 = 0.1;
    pub const MAX: f32 = 1.0;

    pub fn new(preferred: f32) -> Self {
        Self {
            preferred: preferred.clamp(Self::MIN, Self::MAX),
            engaged: false,
        }
    }

    pub fn value(&self) -> f32 {
        if self.engaged {
            self.preferred
        } else {
            0.0
        }
    }

    pub fn preferred(&self) -> f32 {
        self.preferred
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged
    }

    fn nudge(&mut self, delta: f32) {
        self.preferred = (self.preferred + delta).clamp(Self::MIN, Self::MAX);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientState {
    pub storm_intensity: f32,
    /// Time since the last qualifying input event.
    pub idle: Duration,
    pub fog_opacity: f32,
    pub focus: FocusDepth,
    /// Time since the last lightning flash, while it is still fading.
    pub flash_age: Option<Duration>,
}

impl AmbientState {
    pub fn new(params: &AmbientParams) -> Self {
        Self {
            storm_intensity: 0.0,
            idle: Duration::ZERO,
            fog_opacity: 0.0,
            focus: FocusDepth::new(params.preferred_depth),
            flash_age: None,
        }
    }

    pub fn storm_level(&self, params: &AmbientParams) -> StormLevel {
        StormLevel::from_intensity(self.storm_intensity, params)
    }

    pub fn multiplier(&self, params: &AmbientParams) -> f32 {
        self.storm_level(params).multiplier()
    }

    /// Blur radius in pixels: linear in idle time past `blur_after`, clamped to the cap.
    pub fn blur_px(&self, params: &AmbientParams) -> f32 {
        let past = self.idle.saturating_sub(params.blur_after).as_secs_f32();
        (past * params.blur_per_second).clamp(0.0, params.blur_cap)
    }

    pub fn flash_intensity(&self, params: &AmbientParams) -> f32 {
        match self.flash_age {
            Some(age) if !params.flash_duration.is_zero() => {
                1.0 - (age.as_secs_f32() / params.flash_duration.as_secs_f32()).min(1.0)
            }
            _ => 0.0,
        }
    }

    pub fn editor_opacity(&self) -> f32 {
        1.0 - self.focus.value() * EDITOR_FADE_PER_DEPTH
    }
}

/// Advances `prev` by `delta` of wall-clock time, then applies `events` in order.
///
/// Events are treated as happening at the end of the interval.
pub fn update(
    prev: &AmbientState,
    delta: Duration,
    events: &[AmbientEvent],
    params: &AmbientParams,
) -> AmbientState {
    let mut next = *prev;

    let idle_before = prev.idle;
    next.idle = prev.idle.saturating_add(delta);
    let fog_start = idle_before.max(params.fog_after);
    let fogging = next.idle.saturating_sub(fog_start);
    if !fogging.is_zero() {
        next.fog_opacity =
            (next.fog_opacity + fogging.as_secs_f32() * params.fog_rate).min(params.fog_max);
    }

    next.flash_age = prev
        .flash_age
        .map(|age| age.saturating_add(delta))
        .filter(|age| *age < params.flash_duration);

    for event in events {
        match *event {
            AmbientEvent::Edit { chars } => {
                next.storm_intensity += chars as f32;
            }
            AmbientEvent::Input(_) => {
                next.idle = Duration::ZERO;
                next.fog_opacity = 0.0;
            }
            AmbientEvent::DecayTick => {
                next.storm_intensity = (next.storm_intensity - params.decay_per_tick).max(0.0);
            }
            AmbientEvent::Peek(engaged) => {
                next.focus.engaged = engaged;
            }
            AmbientEvent::FocusScroll { delta } => {
                if next.focus.engaged {
                    next.focus.nudge(delta * params.scroll_step);
                }
            }
            AmbientEvent::Lightning => {
                next.flash_age = Some(Duration::ZERO);
            }
        }
    }

    next
}

/// Rolls the per-tick lightning chance; only an intense storm can strike.
pub fn roll_lightning<R: Rng>(
    state: &AmbientState,
    params: &AmbientParams,
    rng: &mut R,
) -> bool {
    state.storm_level(params) == StormLevel::Intense
        && rng.gen_bool(params.lightning_chance.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn params() -> AmbientParams {
        AmbientParams::default()
    }

    #[test]
    fn storm_decays_monotonically_to_zero() {
        let params = params();
        let mut state = AmbientState::new(&params);
        state = update(&state, Duration::ZERO, &[AmbientEvent::Edit { chars: 12 }], &params);
        let mut previous = state.storm_intensity;
        for _ in 0..5 {
            state = update(
                &state,
                Duration::from_secs(1),
                &[AmbientEvent::DecayTick],
                &params,
            );
            if previous > 0.0 {
                assert!(state.storm_intensity < previous);
            } else {
                assert_eq!(state.storm_intensity, 0.0);
            }
            assert!(state.storm_intensity >= 0.0);
            previous = state.storm_intensity;
        }
        assert_eq!(state.storm_intensity, 0.0);
    }

    #[test]
    fn storm_does_not_change_without_events() {
        let params = params();
        let mut state = AmbientState::new(&params);
        state = update(&state, Duration::ZERO, &[AmbientEvent::Edit { chars: 20 }], &params);
        let later = update(&state, Duration::from_secs(30), &[], &params);
        assert_eq!(later.storm_intensity, 20.0);
    }

    #[test]
    fn typing_burst_crosses_heavy_then_decays_back() {
        let params = AmbientParams {
            heavy_threshold: 30.0,
            intense_threshold: 80.0,
            decay_per_tick: 5.0,
            ..params()
        };
        let mut state = AmbientState::new(&params);
        state = update(&state, Duration::ZERO, &[AmbientEvent::Edit { chars: 30 }], &params);
        assert_eq!(state.multiplier(&params), 1.0);

        state = update(&state, Duration::ZERO, &[AmbientEvent::Edit { chars: 5 }], &params);
        assert_eq!(state.storm_intensity, 35.0);
        assert_eq!(state.multiplier(&params), 2.0);

        state = update(&state, Duration::from_secs(1), &[AmbientEvent::DecayTick], &params);
        state = update(&state, Duration::from_secs(1), &[AmbientEvent::DecayTick], &params);
        assert!(state.storm_intensity < 30.0);
        assert_eq!(state.multiplier(&params), 1.0);
    }

    #[test]
    fn intense_storm_quadruples() {
        let params = params();
        let state = update(
            &AmbientState::new(&params),
            Duration::ZERO,
            &[AmbientEvent::Edit { chars: 81 }],
            &params,
        );
        assert_eq!(state.storm_level(&params), StormLevel::Intense);
        assert_eq!(state.multiplier(&params), 4.0);
    }

    #[test]
    fn blur_clamps_at_cap() {
        let params = AmbientParams {
            blur_after: Duration::from_millis(2000),
            blur_per_second: 2.0,
            blur_cap: 5.0,
            ..params()
        };
        let state = update(
            &AmbientState::new(&params),
            Duration::from_millis(5000),
            &[],
            &params,
        );
        assert_eq!(state.blur_px(&params), 5.0);

        let early = update(
            &AmbientState::new(&params),
            Duration::from_millis(2500),
            &[],
            &params,
        );
        assert!((early.blur_px(&params) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn fog_grows_after_threshold_and_resets_on_input() {
        let params = AmbientParams {
            fog_after: Duration::from_secs(1),
            fog_rate: 0.1,
            fog_max: 0.25,
            ..params()
        };
        let mut state = AmbientState::new(&params);
        state = update(&state, Duration::from_millis(900), &[], &params);
        assert_eq!(state.fog_opacity, 0.0);

        state = update(&state, Duration::from_millis(1100), &[], &params);
        assert!((state.fog_opacity - 0.1).abs() < 1e-4);

        state = update(&state, Duration::from_secs(60), &[], &params);
        assert_eq!(state.fog_opacity, 0.25);

        state = update(
            &state,
            Duration::from_millis(16),
            &[AmbientEvent::Input(InputKind::PointerMove)],
            &params,
        );
        assert_eq!(state.fog_opacity, 0.0);
        assert_eq!(state.idle, Duration::ZERO);
    }

    #[test]
    fn fog_growth_is_independent_of_step_size() {
        let params = params();
        let coarse = update(
            &AmbientState::new(&params),
            Duration::from_secs(4),
            &[],
            &params,
        );
        let mut fine = AmbientState::new(&params);
        for _ in 0..240 {
            fine = update(&fine, Duration::from_micros(16_667), &[], &params);
        }
        assert!((coarse.fog_opacity - fine.fog_opacity).abs() < 1e-3);
    }

    #[test]
    fn focus_depth_restored_after_toggle() {
        let params = params();
        let mut state = AmbientState::new(&params);
        state = update(&state, Duration::ZERO, &[AmbientEvent::Peek(true)], &params);
        state = update(
            &state,
            Duration::ZERO,
            &[AmbientEvent::FocusScroll { delta: -400.0 }],
            &params,
        );
        let chosen = state.focus.value();
        assert!((chosen - 0.6).abs() < 1e-4);

        state = update(&state, Duration::ZERO, &[AmbientEvent::Peek(false)], &params);
        assert_eq!(state.focus.value(), 0.0);
        state = update(&state, Duration::ZERO, &[AmbientEvent::Peek(true)], &params);
        assert_eq!(state.focus.value(), chosen);
    }

    #[test]
    fn focus_scroll_clamps_and_needs_engagement() {
        let params = params();
        let mut state = AmbientState::new(&params);
        state = update(
            &state,
            Duration::ZERO,
            &[AmbientEvent::FocusScroll { delta: -5000.0 }],
            &params,
        );
        assert_eq!(state.focus.preferred(), 1.0);

        state = update(
            &state,
            Duration::ZERO,
            &[
                AmbientEvent::Peek(true),
                AmbientEvent::FocusScroll { delta: -5000.0 },
            ],
            &params,
        );
        assert_eq!(state.focus.value(), FocusDepth::MIN);
        assert!((state.editor_opacity() - (1.0 - 0.1 * 0.98)).abs() < 1e-5);
    }

    #[test]
    fn flash_fades_out() {
        let params = AmbientParams {
            flash_duration: Duration::from_millis(200),
            ..params()
        };
        let mut state = update(
            &AmbientState::new(&params),
            Duration::ZERO,
            &[AmbientEvent::Lightning],
            &params,
        );
        assert_eq!(state.flash_intensity(&params), 1.0);
        state = update(&state, Duration::from_millis(100), &[], &params);
        assert!((state.flash_intensity(&params) - 0.5).abs() < 1e-3);
        state = update(&state, Duration::from_millis(150), &[], &params);
        assert_eq!(state.flash_age, None);
        assert_eq!(state.flash_intensity(&params), 0.0);
    }

    #[test]
    fn lightning_requires_intense_storm() {
        let params = AmbientParams {
            lightning_chance: 1.0,
            ..params()
        };
        let mut rng = StdRng::seed_from_u64(7);
        let calm = AmbientState::new(&params);
        assert!(!roll_lightning(&calm, &params, &mut rng));

        let stormy = update(&calm, Duration::ZERO, &[AmbientEvent::Edit { chars: 200 }], &params);
        assert!(roll_lightning(&stormy, &params, &mut rng));
    }
}
