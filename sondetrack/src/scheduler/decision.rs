//! Scheduling kinds and the explicit decisions returned to callers.
//!
//! A rejected request is never an error: cooldown, throttle and backoff all
//! report why nothing ran, with enough detail for the caller to retry later.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

/// Which primitive last touched a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleKind {
    Debounce,
    Throttle,
    Cooldown,
    Coalesce,
    LatestWins,
    Backoff,
}

impl ScheduleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleKind::Debounce => "debounce",
            ScheduleKind::Throttle => "throttle",
            ScheduleKind::Cooldown => "cooldown",
            ScheduleKind::Coalesce => "coalesce",
            ScheduleKind::LatestWins => "latest-wins",
            ScheduleKind::Backoff => "backoff",
        }
    }
}

impl fmt::Display for ScheduleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which edge of the interval a throttled call fires on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleEdge {
    /// Run immediately if outside the interval window, otherwise skip.
    Leading,
    /// Always (re)schedule one run at the end of the interval.
    Trailing,
}

/// Outcome of [`Scheduler::cooldown`](super::Scheduler::cooldown).
#[derive(Debug, Clone, PartialEq)]
pub enum CooldownDecision<T> {
    /// The operation ran and produced this value.
    Executed(T),
    /// The key ran too recently.
    Skipped { remaining: Duration },
}

impl<T> CooldownDecision<T> {
    pub fn is_executed(&self) -> bool {
        matches!(self, CooldownDecision::Executed(_))
    }
}

/// Outcome of [`Scheduler::throttle`](super::Scheduler::throttle).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// Leading edge: the operation ran inline.
    Executed,
    /// Trailing edge: a deferred run is pending.
    Scheduled,
    /// Leading edge inside the window.
    Skipped { remaining: Duration },
}

/// Outcome of [`Scheduler::with_backoff`](super::Scheduler::with_backoff).
#[derive(Debug)]
pub enum BackoffDecision<T, E> {
    /// The operation ran; its own result is passed through untouched.
    Executed(Result<T, E>),
    /// Called before the key's next eligible attempt.
    Rejected {
        next_attempt: Instant,
        multiplier: f64,
    },
}

impl<T, E> BackoffDecision<T, E> {
    pub fn is_rejected(&self) -> bool {
        matches!(self, BackoffDecision::Rejected { .. })
    }

    /// The operation's result, if it ran.
    pub fn into_result(self) -> Option<Result<T, E>> {
        match self {
            BackoffDecision::Executed(result) => Some(result),
            BackoffDecision::Rejected { .. } => None,
        }
    }
}
