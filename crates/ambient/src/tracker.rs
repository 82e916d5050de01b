use std::time::{Duration, Instant};

use rand::prelude::*;

use crate::state::{
    roll_lightning, update, AmbientEvent, AmbientParams, AmbientState, StormLevel,
};
use crate::timer::IntervalTimer;

/// Read-only view of the ambient state handed to renderers once per frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientSnapshot {
    pub storm_intensity: f32,
    pub storm_level: StormLevel,
    pub multiplier: f32,
    pub fog_opacity: f32,
    pub blur_px: f32,
    pub focus_depth: f32,
    pub editor_opacity: f32,
    pub flash: f32,
}

impl Default for AmbientSnapshot {
    fn default() -> Self {
        Self {
            storm_intensity: 0.0,
            storm_level: StormLevel::Calm,
            multiplier: 1.0,
            fog_opacity: 0.0,
            blur_px: 0.0,
            focus_depth: 0.0,
            editor_opacity: 1.0,
            flash: 0.0,
        }
    }
}

impl AmbientSnapshot {
    pub fn from_state(state: &AmbientState, params: &AmbientParams) -> Self {
        let storm_level = state.storm_level(params);
        Self {
            storm_intensity: state.storm_intensity,
            storm_level,
            multiplier: storm_level.multiplier(),
            fog_opacity: state.fog_opacity,
            blur_px: state.blur_px(params),
            focus_depth: state.focus.value(),
            editor_opacity: state.editor_opacity(),
            flash: state.flash_intensity(params),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AmbientSignal {
    StormLevelChanged { from: StormLevel, to: StormLevel },
    Lightning,
}

pub struct AmbientTracker {
    params: AmbientParams,
    state: AmbientState,
    last_update: Instant,
    decay: IntervalTimer,
    lightning: IntervalTimer,
    rng: StdRng,
}

impl AmbientTracker {
    pub fn new(
        params: AmbientParams,
        decay_interval: Duration,
        lightning_interval: Duration,
        seed: u64,
        now: Instant,
    ) -> Self {
        let state = AmbientState::new(&params);
        Self {
            params,
            state,
            last_update: now,
            decay: IntervalTimer::new(decay_interval, now),
            lightning: IntervalTimer::new(lightning_interval, now),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_config(config: &glassconfig::GlassConfig, seed: u64, now: Instant) -> Self {
        Self::new(
            AmbientParams::from_config(config),
            config.storm.decay_interval,
            config.storm.lightning_interval,
            seed,
            now,
        )
    }

    pub fn params(&self) -> &AmbientParams {
        &self.params
    }

    pub fn state(&self) -> &AmbientState {
        &self.state
    }

    /// Applies one discrete event at `now`, returning any storm-level transition.
    pub fn record(&mut self, event: AmbientEvent, now: Instant) -> Option<AmbientSignal> {
        let before = self.state.storm_level(&self.params);
        self.apply(now, &[event]);
        self.level_transition(before)
    }

    /// Advances wall-clock driven fields without any event.
    pub fn advance(&mut self, now: Instant) {
        self.apply(now, &[]);
    }

    /// Runs any due decay and lightning ticks.
    ///
    /// Safe to call at any time; it never assumes a frame was rendered since
    /// the previous poll.
    pub fn poll_timers(&mut self, now: Instant) -> Vec<AmbientSignal> {
        let mut signals = Vec::new();
        let before = self.state.storm_level(&self.params);

        let decay_ticks = self.decay.poll(now);
        if decay_ticks > 0 {
            let ticks = vec![AmbientEvent::DecayTick; decay_ticks as usize];
            self.apply(now, &ticks);
        }
        if let Some(signal) = self.level_transition(before) {
            signals.push(signal);
        }

        // Missed lightning rolls are not replayed.
        if self.lightning.poll(now) > 0 && roll_lightning(&self.state, &self.params, &mut self.rng)
        {
            self.apply(now, &[AmbientEvent::Lightning]);
            tracing::debug!(
                storm = self.state.storm_intensity,
                "lightning flash triggered"
            );
            signals.push(AmbientSignal::Lightning);
        }

        signals
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.decay.next_due(), self.lightning.next_due()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Stops both interval timers; later polls are no-ops.
    pub fn cancel(&mut self) {
        self.decay.cancel();
        self.lightning.cancel();
        tracing::debug!("ambient timers cancelled");
    }

    pub fn is_cancelled(&self) -> bool {
        self.decay.is_cancelled() && self.lightning.is_cancelled()
    }

    pub fn snapshot(&mut self, now: Instant) -> AmbientSnapshot {
        self.advance(now);
        AmbientSnapshot::from_state(&self.state, &self.params)
    }

    fn apply(&mut self, now: Instant, events: &[AmbientEvent]) {
        let delta = now.saturating_duration_since(self.last_update);
        self.state = update(&self.state, delta, events, &self.params);
        if now > self.last_update {
            self.last_update = now;
        }
    }

    fn level_transition(&self, before: StormLevel) -> Option<AmbientSignal> {
        let after = self.state.storm_level(&self.params);
        if after == before {
            return None;
        }
        tracing::debug!(
            from = ?before,
            to = ?after,
            storm = self.state.storm_intensity,
            "storm level changed"
        );
        Some(AmbientSignal::StormLevelChanged {
            from: before,
            to: after,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::InputKind;

    fn tracker(now: Instant) -> AmbientTracker {
        AmbientTracker::new(
            AmbientParams::default(),
            Duration::from_secs(1),
            Duration::from_secs(1),
            42,
            now,
        )
    }

    #[test]
    fn typing_raises_level_and_timers_lower_it() {
        let start = Instant::now();
        let mut tracker = tracker(start);
        let signal = tracker.record(AmbientEvent::Edit { chars: 35 }, start);
        assert_eq!(
            signal,
            Some(AmbientSignal::StormLevelChanged {
                from: StormLevel::Calm,
                to: StormLevel::Heavy,
            })
        );
        assert_eq!(tracker.snapshot(start).multiplier, 2.0);

        let signals = tracker.poll_timers(start + Duration::from_secs(1));
        assert!(signals.contains(&AmbientSignal::StormLevelChanged {
            from: StormLevel::Heavy,
            to: StormLevel::Calm,
        }));
        assert_eq!(
            tracker.snapshot(start + Duration::from_secs(1)).multiplier,
            1.0
        );
    }

    #[test]
    fn timers_keep_running_without_snapshots() {
        let start = Instant::now();
        let mut tracker = tracker(start);
        tracker.record(AmbientEvent::Edit { chars: 20 }, start);
        tracker.poll_timers(start + Duration::from_millis(3200));
        assert_eq!(tracker.state().storm_intensity, 5.0);
    }

    #[test]
    fn idle_blur_from_snapshot() {
        let start = Instant::now();
        let mut tracker = tracker(start);
        tracker.record(AmbientEvent::Input(InputKind::KeyPress), start);
        let snapshot = tracker.snapshot(start + Duration::from_millis(5000));
        assert_eq!(snapshot.blur_px, 5.0);
        assert!(snapshot.fog_opacity > 0.0);
    }

    #[test]
    fn intense_storm_eventually_strikes() {
        let start = Instant::now();
        let mut tracker = AmbientTracker::new(
            AmbientParams {
                lightning_chance: 1.0,
                decay_per_tick: 1.0,
                ..AmbientParams::default()
            },
            Duration::from_secs(1),
            Duration::from_secs(1),
            3,
            start,
        );
        tracker.record(AmbientEvent::Edit { chars: 500 }, start);
        let signals = tracker.poll_timers(start + Duration::from_secs(1));
        assert!(signals.contains(&AmbientSignal::Lightning));
        assert_eq!(tracker.snapshot(start + Duration::from_secs(1)).flash, 1.0);
    }

    #[test]
    fn cancel_stops_decay() {
        let start = Instant::now();
        let mut tracker = tracker(start);
        tracker.record(AmbientEvent::Edit { chars: 40 }, start);
        tracker.cancel();
        assert!(tracker.is_cancelled());
        assert!(tracker.poll_timers(start + Duration::from_secs(5)).is_empty());
        assert_eq!(tracker.state().storm_intensity, 40.0);
        assert_eq!(tracker.next_deadline(), None);
    }
}
