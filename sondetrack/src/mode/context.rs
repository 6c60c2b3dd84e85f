//! Inputs the mode decision rules are evaluated against.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::machine::ModeMachineConfig;
use crate::geo::Coordinate;
use crate::telemetry::TelemetrySample;

/// Snapshot of everything the decision rules look at.
///
/// Updated on every telemetry and location event, including events that
/// arrive inside the hysteresis dwell.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModeContext {
    pub balloon_altitude: Option<f64>,
    pub vertical_speed: Option<f64>,
    pub signal_strength: Option<f64>,
    pub balloon_position: Option<Coordinate>,
    pub user_location: Option<Coordinate>,
    /// Metres between user and balloon, when both are known.
    pub distance_to_balloon: Option<f64>,
    /// When telemetry was last received.
    pub last_telemetry: Option<DateTime<Utc>>,
    pub is_balloon_flying: bool,
    /// Start of the current run of good-signal telemetry.
    pub continuous_telemetry_start: Option<DateTime<Utc>>,
    /// Start of the current run of low vertical speed.
    pub low_speed_start: Option<DateTime<Utc>>,
}

fn seconds_since(start: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - start).num_milliseconds() as f64 / 1000.0
}

impl ModeContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a telemetry sample received at `now` into the context.
    pub fn record_telemetry(
        &mut self,
        sample: &TelemetrySample,
        now: DateTime<Utc>,
        config: &ModeMachineConfig,
    ) {
        // A long silence breaks the good-signal run even if both ends are strong.
        if let Some(last) = self.last_telemetry {
            if seconds_since(last, now) > config.telemetry_gap.as_secs_f64() {
                self.continuous_telemetry_start = None;
            }
        }

        self.balloon_altitude = Some(sample.altitude);
        self.vertical_speed = Some(sample.vertical_speed);
        self.signal_strength = Some(sample.signal_strength);
        self.balloon_position = Some(sample.position());
        self.last_telemetry = Some(now);

        self.is_balloon_flying = sample.altitude > config.flying_altitude_m;

        if sample.signal_strength > config.follow_signal_dbm {
            self.continuous_telemetry_start.get_or_insert(now);
        } else {
            self.continuous_telemetry_start = None;
        }

        if sample.vertical_speed.abs() < config.low_speed_threshold {
            self.low_speed_start.get_or_insert(now);
        } else {
            self.low_speed_start = None;
        }

        self.update_distance();
    }

    /// Record the user's position.
    pub fn record_location(&mut self, location: Coordinate) {
        self.user_location = Some(location);
        self.update_distance();
    }

    /// Seconds since telemetry was last received.
    pub fn telemetry_age(&self, now: DateTime<Utc>) -> Option<f64> {
        self.last_telemetry.map(|t| seconds_since(t, now))
    }

    /// How long the good-signal run has lasted at `now`.
    pub fn signal_held_for(&self, now: DateTime<Utc>) -> Option<f64> {
        self.continuous_telemetry_start.map(|t| seconds_since(t, now))
    }

    /// How long the low-vertical-speed run has lasted at `now`.
    pub fn low_speed_held_for(&self, now: DateTime<Utc>) -> Option<f64> {
        self.low_speed_start.map(|t| seconds_since(t, now))
    }

    fn update_distance(&mut self) {
        self.distance_to_balloon = match (self.user_location, self.balloon_position) {
            (Some(user), Some(balloon)) => Some(user.distance_to(&balloon)),
            _ => None,
        };
    }
}
