//! Minimum-interval admission and version counter shared by both policies.

use std::time::Duration;

use tokio::time::Instant;

/// Admits update requests no more often than `min_interval` unless forced.
///
/// Each admitted request gets the next version number. Versions are never
/// reused or decremented.
#[derive(Debug)]
pub struct UpdateGate {
    min_interval: Duration,
    last_accepted: Option<Instant>,
    version: u64,
}

impl UpdateGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_accepted: None,
            version: 0,
        }
    }

    /// Admit a request at `now`, returning its version.
    pub fn admit(&mut self, force: bool, now: Instant) -> Option<u64> {
        if !force {
            if let Some(last) = self.last_accepted {
                if now.saturating_duration_since(last) < self.min_interval {
                    return None;
                }
            }
        }

        self.last_accepted = Some(now);
        self.version += 1;
        Some(self.version)
    }

    /// Version of the most recently admitted request (0 before the first).
    pub fn version(&self) -> u64 {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_request_admitted() {
        let mut gate = UpdateGate::new(Duration::from_secs(1));
        assert_eq!(gate.version(), 0);
        assert_eq!(gate.admit(false, Instant::now()), Some(1));
    }

    #[test]
    fn test_requests_inside_interval_skipped() {
        let mut gate = UpdateGate::new(Duration::from_secs(1));
        let t = Instant::now();

        assert_eq!(gate.admit(false, t), Some(1));
        assert_eq!(gate.admit(false, t + Duration::from_millis(300)), None);
        assert_eq!(gate.admit(false, t + Duration::from_millis(999)), None);
        assert_eq!(gate.admit(false, t + Duration::from_millis(1000)), Some(2));
        assert_eq!(gate.version(), 2);
    }

    #[test]
    fn test_forced_requests_bypass_interval() {
        let mut gate = UpdateGate::new(Duration::from_secs(1));
        let t = Instant::now();

        assert_eq!(gate.admit(false, t), Some(1));
        assert_eq!(gate.admit(true, t), Some(2));
        assert_eq!(gate.admit(true, t), Some(3));
        // A forced admission restarts the interval.
        assert_eq!(gate.admit(false, t + Duration::from_millis(500)), None);
    }
}
