//! Wall-clock driven ambient state shared by every visual layer.
//!
//! [`update`] is the pure transition function: previous state, elapsed
//! wall-clock time and a batch of discrete events in, next state out. The
//! [`AmbientTracker`] wraps it with the storm-decay and lightning interval
//! timers and hands out per-frame [`AmbientSnapshot`]s. Nothing here depends on
//! frame count, so the result is identical at any refresh rate and keeps
//! advancing while rendering is paused.

mod state;
mod timer;
mod tracker;

pub use state::{
    roll_lightning, update, AmbientEvent, AmbientParams, AmbientState, FocusDepth, InputKind,
    StormLevel,
};
pub use timer::IntervalTimer;
pub use tracker::{AmbientSignal, AmbientSnapshot, AmbientTracker};
