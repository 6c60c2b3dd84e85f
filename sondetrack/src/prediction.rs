//! Landing predictions supplied by the prediction collaborator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::Coordinate;

/// Where and when the balloon is expected to come down.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LandingPrediction {
    pub landing: Coordinate,
    /// Predicted burst point, present while the balloon is still ascending.
    pub burst: Option<Coordinate>,
    pub landing_time: Option<DateTime<Utc>>,
}

impl LandingPrediction {
    pub fn new(landing: Coordinate) -> Self {
        Self {
            landing,
            burst: None,
            landing_time: None,
        }
    }

    pub fn with_burst(mut self, burst: Coordinate) -> Self {
        self.burst = Some(burst);
        self
    }

    pub fn with_landing_time(mut self, landing_time: DateTime<Utc>) -> Self {
        self.landing_time = Some(landing_time);
        self
    }

    /// Predictions with invalid or 0/0 coordinates are discarded.
    pub fn is_valid(&self) -> bool {
        let usable = |c: &Coordinate| c.is_valid() && !c.is_null_island();
        usable(&self.landing) && self.burst.as_ref().map_or(true, usable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let p = LandingPrediction::new(Coordinate::new(48.0, 11.0))
            .with_burst(Coordinate::new(48.2, 11.3));
        assert_eq!(p.burst, Some(Coordinate::new(48.2, 11.3)));
        assert!(p.landing_time.is_none());
        assert!(p.is_valid());
    }

    #[test]
    fn test_invalid_predictions() {
        assert!(!LandingPrediction::new(Coordinate::new(0.0, 0.0)).is_valid());
        let bad_burst = LandingPrediction::new(Coordinate::new(48.0, 11.0))
            .with_burst(Coordinate::new(f64::NAN, 11.0));
        assert!(!bad_burst.is_valid());
    }
}
