//! Operating mode selection.
//!
//! The tracker runs in one of three modes. Which one is chosen from smoothed
//! telemetry and the user's location, with a hysteresis dwell so the mode
//! does not flap while the balloon hovers around a threshold.
//!
//! | Mode | Prediction refresh | Routing / camera follow | Polling hint |
//! |------|--------------------|-------------------------|--------------|
//! | Explore | 300s | off | 60s |
//! | Follow | 120s | on | 30s |
//! | FinalApproach | 30s | on | 10s |
//!
//! Mode changes are published on a broadcast channel; see
//! [`ModeStateMachine::subscribe`].

mod context;
mod machine;
mod types;

pub use context::ModeContext;
pub use machine::{ModeMachineConfig, ModeStateMachine};
pub use types::{Mode, ModeChange, ModeConfig, TransitionCause, TransitionRecord, UpdateFrequency};
