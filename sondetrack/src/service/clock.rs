//! Wall-clock time derived from the Tokio clock.

use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Maps Tokio's monotonic clock onto UTC.
///
/// Anchored to the wall clock once at creation, then advanced by Tokio's
/// clock. With a paused runtime (`tokio::time::pause`) it advances only
/// when Tokio time does, which keeps service tests deterministic.
#[derive(Debug, Clone, Copy)]
pub struct ServiceClock {
    origin_utc: DateTime<Utc>,
    origin: Instant,
}

impl ServiceClock {
    pub fn new() -> Self {
        Self::anchored_at(Utc::now())
    }

    /// A clock reading `origin_utc` right now.
    pub fn anchored_at(origin_utc: DateTime<Utc>) -> Self {
        Self {
            origin_utc,
            origin: Instant::now(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        let elapsed = Instant::now().saturating_duration_since(self.origin);
        match chrono::Duration::from_std(elapsed) {
            Ok(elapsed) => self.origin_utc + elapsed,
            Err(_) => Utc::now(),
        }
    }
}

impl Default for ServiceClock {
    fn default() -> Self {
        Self::new()
    }
}
