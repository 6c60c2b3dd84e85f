//! Track persistence collaborator.
//!
//! The pipeline only talks to a [`TrackStore`]; where and how points are kept
//! is up to the implementation. Store failures are logged by the caller and
//! never interrupt tracking.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::sample::TelemetrySample;
use crate::geo::Coordinate;

/// The persisted unit of a flight track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub vertical_speed: f64,
    pub horizontal_speed: f64,
    pub timestamp: DateTime<Utc>,
}

impl TrackPoint {
    pub fn position(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

impl From<&TelemetrySample> for TrackPoint {
    fn from(sample: &TelemetrySample) -> Self {
        Self {
            latitude: sample.latitude,
            longitude: sample.longitude,
            altitude: sample.altitude,
            vertical_speed: sample.vertical_speed,
            horizontal_speed: sample.horizontal_speed,
            timestamp: sample.timestamp,
        }
    }
}

/// Errors reported by a [`TrackStore`].
#[derive(Debug, Error)]
pub enum TrackStoreError {
    #[error("track store unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode track: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Loads and saves flight tracks by sonde identity.
pub trait TrackStore: Send + Sync {
    /// Previously saved track for `sonde_name`, if any.
    fn load_track(&self, sonde_name: &str) -> Result<Option<Vec<TrackPoint>>, TrackStoreError>;

    /// Replace the saved track for `sonde_name`.
    fn save_track(&self, sonde_name: &str, track: &[TrackPoint]) -> Result<(), TrackStoreError>;
}

/// A store that keeps nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTrackStore;

impl TrackStore for NullTrackStore {
    fn load_track(&self, _sonde_name: &str) -> Result<Option<Vec<TrackPoint>>, TrackStoreError> {
        Ok(None)
    }

    fn save_track(&self, _sonde_name: &str, _track: &[TrackPoint]) -> Result<(), TrackStoreError> {
        Ok(())
    }
}

/// Process-local store, used by the replay command and tests.
///
/// Tracks are held as JSON documents so what is saved is exactly what a
/// durable backend would receive.
#[derive(Debug, Default)]
pub struct InMemoryTrackStore {
    tracks: Mutex<HashMap<String, String>>,
    saves: AtomicUsize,
    failing: AtomicBool,
}

impl InMemoryTrackStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Seed a track as if it had been saved earlier.
    pub fn insert(&self, sonde_name: &str, track: &[TrackPoint]) -> Result<(), TrackStoreError> {
        let encoded = serde_json::to_string(track)?;
        self.tracks.lock().insert(sonde_name.to_string(), encoded);
        Ok(())
    }

    fn check_available(&self) -> Result<(), TrackStoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TrackStoreError::Unavailable("store marked failing".to_string()));
        }
        Ok(())
    }
}

impl TrackStore for InMemoryTrackStore {
    fn load_track(&self, sonde_name: &str) -> Result<Option<Vec<TrackPoint>>, TrackStoreError> {
        self.check_available()?;
        let tracks = self.tracks.lock();
        match tracks.get(sonde_name) {
            Some(encoded) => Ok(Some(serde_json::from_str(encoded)?)),
            None => Ok(None),
        }
    }

    fn save_track(&self, sonde_name: &str, track: &[TrackPoint]) -> Result<(), TrackStoreError> {
        self.check_available()?;
        self.insert(sonde_name, track)?;
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
