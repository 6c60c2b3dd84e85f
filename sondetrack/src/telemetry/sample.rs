//! Raw telemetry samples and their validity checks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo::Coordinate;

/// One position/speed report from the radiosonde.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    /// Identity (serial) of the sonde that sent this report.
    pub sonde_name: String,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Altitude above mean sea level in metres.
    pub altitude: f64,
    /// Vertical speed in m/s (negative while descending).
    pub vertical_speed: f64,
    /// Horizontal speed in km/h.
    pub horizontal_speed: f64,
    /// Received signal strength in dBm.
    pub signal_strength: f64,
    /// When the sample was taken.
    pub timestamp: DateTime<Utc>,
}

/// Why a sample was dropped before reaching any buffer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SampleRejection {
    #[error("sample has no sonde name")]
    EmptyName,

    #[error("position is 0/0 (no GPS fix)")]
    NullIsland,

    #[error("field `{0}` is not a finite number")]
    NonFinite(&'static str),

    #[error("position {0} is out of range")]
    OutOfRange(Coordinate),
}

impl TelemetrySample {
    pub fn position(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }

    pub fn is_descending(&self) -> bool {
        self.vertical_speed < 0.0
    }

    pub fn is_ascending(&self) -> bool {
        self.vertical_speed > 0.0
    }

    /// Basic validity checks applied before a sample is accepted.
    pub fn validate(&self) -> Result<(), SampleRejection> {
        if self.sonde_name.trim().is_empty() {
            return Err(SampleRejection::EmptyName);
        }

        let fields = [
            ("latitude", self.latitude),
            ("longitude", self.longitude),
            ("altitude", self.altitude),
            ("vertical_speed", self.vertical_speed),
            ("horizontal_speed", self.horizontal_speed),
            ("signal_strength", self.signal_strength),
        ];
        if let Some((name, _)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(SampleRejection::NonFinite(name));
        }

        let position = self.position();
        if position.is_null_island() {
            return Err(SampleRejection::NullIsland);
        }
        if !position.is_valid() {
            return Err(SampleRejection::OutOfRange(position));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TelemetrySample {
        TelemetrySample {
            sonde_name: "S1234567".to_string(),
            latitude: 48.1,
            longitude: 11.6,
            altitude: 12_000.0,
            vertical_speed: 5.0,
            horizontal_speed: 40.0,
            signal_strength: -70.0,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_valid_sample() {
        assert_eq!(sample().validate(), Ok(()));
        assert!(sample().is_ascending());
        assert!(!sample().is_descending());
    }

    #[test]
    fn test_zero_zero_rejected() {
        let s = TelemetrySample {
            latitude: 0.0,
            longitude: 0.0,
            ..sample()
        };
        assert_eq!(s.validate(), Err(SampleRejection::NullIsland));
    }

    #[test]
    fn test_non_finite_rejected() {
        let s = TelemetrySample {
            altitude: f64::NAN,
            ..sample()
        };
        assert_eq!(s.validate(), Err(SampleRejection::NonFinite("altitude")));
    }

    #[test]
    fn test_empty_name_rejected() {
        let s = TelemetrySample {
            sonde_name: "  ".to_string(),
            ..sample()
        };
        assert_eq!(s.validate(), Err(SampleRejection::EmptyName));
    }

    #[test]
    fn test_out_of_range_rejected() {
        let s = TelemetrySample {
            latitude: 123.0,
            ..sample()
        };
        assert!(matches!(s.validate(), Err(SampleRejection::OutOfRange(_))));
    }
}
