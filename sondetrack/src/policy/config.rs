//! Policy configuration.

use std::time::Duration;

use crate::mode::Mode;

/// Shared configuration for the annotation and camera policies.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyConfig {
    /// Minimum time between accepted (non-forced) update requests.
    pub min_update_interval: Duration,
    pub annotation_debounce: Duration,
    pub camera_debounce: Duration,
    /// How long a manual pan suppresses automatic camera follow.
    pub pan_suppression: Duration,
    pub recenter_explore_m: f64,
    pub recenter_follow_m: f64,
    pub recenter_final_approach_m: f64,
    /// Padding (fraction of span per side) for fitted regions.
    pub region_padding: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            min_update_interval: Duration::from_secs(1),
            annotation_debounce: Duration::from_millis(500),
            camera_debounce: Duration::from_millis(250),
            pan_suppression: Duration::from_secs(10),
            recenter_explore_m: 100.0,
            recenter_follow_m: 50.0,
            recenter_final_approach_m: 20.0,
            region_padding: 0.1,
        }
    }
}

impl PolicyConfig {
    /// Distance the target must move before the camera recentres.
    pub fn recenter_threshold(&self, mode: Mode) -> f64 {
        match mode {
            Mode::Explore => self.recenter_explore_m,
            Mode::Follow => self.recenter_follow_m,
            Mode::FinalApproach => self.recenter_final_approach_m,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recenter_thresholds() {
        let config = PolicyConfig::default();
        assert_eq!(config.recenter_threshold(Mode::Explore), 100.0);
        assert_eq!(config.recenter_threshold(Mode::Follow), 50.0);
        assert_eq!(config.recenter_threshold(Mode::FinalApproach), 20.0);
    }
}
