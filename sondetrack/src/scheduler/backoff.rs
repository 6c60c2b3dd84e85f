//! Per-key exponential backoff bookkeeping.

use std::time::Duration;

use tokio::time::Instant;

/// Default base interval scaled by the multiplier (1 second).
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Default cap on the backoff multiplier.
pub const DEFAULT_MAX_MULTIPLIER: f64 = 32.0;

/// Factor applied to the multiplier after each failure.
const BACKOFF_FACTOR: f64 = 2.0;

/// Backoff state for one key.
///
/// The multiplier starts at 1× and doubles on every failure up to the cap.
/// After a failure the key is locked out for `base × multiplier`; a success
/// resets the multiplier and clears the lockout.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffState {
    multiplier: f64,
    next_attempt: Option<Instant>,
}

impl BackoffState {
    pub fn new() -> Self {
        Self {
            multiplier: 1.0,
            next_attempt: None,
        }
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn next_attempt(&self) -> Option<Instant> {
        self.next_attempt
    }

    /// `Err(next_attempt)` if `now` is still inside the lockout.
    pub fn check(&self, now: Instant) -> Result<(), Instant> {
        match self.next_attempt {
            Some(next) if now < next => Err(next),
            _ => Ok(()),
        }
    }

    /// Record a failed attempt at `now`, returning the next eligible instant.
    pub fn record_failure(&mut self, now: Instant, base: Duration, max_multiplier: f64) -> Instant {
        self.multiplier = (self.multiplier * BACKOFF_FACTOR).min(max_multiplier.max(1.0));
        let next = now + base.mul_f64(self.multiplier);
        self.next_attempt = Some(next);
        next
    }

    pub fn record_success(&mut self) {
        self.multiplier = 1.0;
        self.next_attempt = None;
    }
}

impl Default for BackoffState {
    fn default() -> Self {
        Self::new()
    }
}
