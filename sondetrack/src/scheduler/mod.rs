//! Keyed scheduling coordinator.
//!
//! Provides the rate-limiting primitives every other component relies on:
//! debounce, throttle (leading / trailing), cooldown, coalesce, latest-wins
//! and per-key exponential backoff, all with cooperative cancellation.
//!
//! # Module Structure
//!
//! ```text
//! scheduler/
//! ├── mod.rs          # This file - module exports
//! ├── decision.rs     # ScheduleKind and the explicit decision enums
//! ├── backoff.rs      # Per-key backoff multiplier bookkeeping
//! └── coordinator.rs  # Scheduler (mutex-guarded table + deferred tasks)
//! ```
//!
//! # Keys
//!
//! Keys are free-form strings. Components prefix their keys (`policy.`,
//! `mode.`, `camera.`) so a mode change can cancel a whole family with
//! [`Scheduler::cancel_all`].

mod backoff;
mod coordinator;
mod decision;

pub use backoff::{BackoffState, DEFAULT_BACKOFF_BASE, DEFAULT_MAX_MULTIPLIER};
pub use coordinator::{Scheduler, SchedulerConfig};
pub use decision::{BackoffDecision, CooldownDecision, ScheduleKind, ThrottleDecision, ThrottleEdge};
