//! Telemetry smoothing, descent rate and landing detection.
//!
//! Every accepted sample flows through the same fixed sequence:
//!
//! 1. identity switch (reset buffers, reload any persisted track)
//! 2. recent-telemetry window
//! 3. descent rate against a point at least 60s older
//! 4. track append and periodic checkpoint save
//! 5. landing evaluation (fresh samples only)
//!
//! Malformed samples are dropped before step 1 and leave no trace.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::sample::TelemetrySample;
use super::store::{TrackPoint, TrackStore};
use super::window::SlidingWindow;
use crate::geo::Coordinate;

/// Samples kept for the "is flying" predicate.
pub const DEFAULT_RECENT_WINDOW: usize = 5;

/// Samples averaged for smoothed vertical / horizontal speed.
pub const DEFAULT_SPEED_WINDOW: usize = 20;

/// Descent-rate values averaged.
pub const DEFAULT_DESCENT_WINDOW: usize = 20;

/// Positions averaged for the landed position.
pub const DEFAULT_LANDED_WINDOW: usize = 100;

/// Minimum age of the historical point used for descent rate.
pub const DEFAULT_DESCENT_LOOKBACK: Duration = Duration::from_secs(60);

/// Descent-rate values needed before the window mean is published.
pub const DEFAULT_MIN_DESCENT_SAMPLES: usize = 3;

/// Maximum sample age for landing evaluation and "is flying".
pub const DEFAULT_FRESHNESS: Duration = Duration::from_secs(3);

/// Below this smoothed |vertical speed| (m/s) the sonde may be landed.
pub const DEFAULT_LANDED_VERTICAL_SPEED: f64 = 2.0;

/// Below this smoothed horizontal speed (km/h) the sonde may be landed.
pub const DEFAULT_LANDED_HORIZONTAL_SPEED: f64 = 2.0;

/// Accepted samples between checkpoint saves.
pub const DEFAULT_CHECKPOINT_INTERVAL: u64 = 100;

/// Configuration for the telemetry pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryConfig {
    pub recent_window: usize,
    pub speed_window: usize,
    pub descent_window: usize,
    pub landed_window: usize,
    pub descent_lookback: Duration,
    pub min_descent_samples: usize,
    pub freshness: Duration,
    /// Vertical threshold (m/s) shared by the landing verdict and "is flying".
    pub landed_vertical_speed: f64,
    /// Horizontal threshold (km/h) shared by the landing verdict and "is flying".
    pub landed_horizontal_speed: f64,
    pub checkpoint_interval: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            recent_window: DEFAULT_RECENT_WINDOW,
            speed_window: DEFAULT_SPEED_WINDOW,
            descent_window: DEFAULT_DESCENT_WINDOW,
            landed_window: DEFAULT_LANDED_WINDOW,
            descent_lookback: DEFAULT_DESCENT_LOOKBACK,
            min_descent_samples: DEFAULT_MIN_DESCENT_SAMPLES,
            freshness: DEFAULT_FRESHNESS,
            landed_vertical_speed: DEFAULT_LANDED_VERTICAL_SPEED,
            landed_horizontal_speed: DEFAULT_LANDED_HORIZONTAL_SPEED,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
        }
    }
}

/// Smoothed motion state after a sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MotionMetrics {
    /// Mean |vertical speed| over the speed window (m/s).
    pub smoothed_vertical: Option<f64>,
    /// Mean horizontal speed over the speed window (km/h).
    pub smoothed_horizontal: Option<f64>,
    /// Descent rate (m/s, negative while falling).
    pub smoothed_descent_rate: Option<f64>,
    /// Mean of recent positions while landed. Kept after the verdict flips.
    pub landed_position: Option<Coordinate>,
    pub is_landed: bool,
}

/// Seconds from `earlier` to `later` (negative if `later` is before).
fn seconds_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    (later - earlier).num_milliseconds() as f64 / 1000.0
}

/// Turns a raw sample stream into [`MotionMetrics`].
pub struct TelemetryPipeline {
    config: TelemetryConfig,
    store: Arc<dyn TrackStore>,

    current_sonde: Option<String>,
    recent: SlidingWindow<TelemetrySample>,
    vertical: SlidingWindow<f64>,
    horizontal: SlidingWindow<f64>,
    descent: SlidingWindow<f64>,
    landed_positions: SlidingWindow<Coordinate>,
    track: Vec<TrackPoint>,
    accepted: u64,
    metrics: MotionMetrics,
}

impl std::fmt::Debug for TelemetryPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryPipeline")
            .field("current_sonde", &self.current_sonde)
            .field("accepted", &self.accepted)
            .field("track_len", &self.track.len())
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl TelemetryPipeline {
    pub fn new(config: TelemetryConfig, store: Arc<dyn TrackStore>) -> Self {
        Self {
            recent: SlidingWindow::new(config.recent_window),
            vertical: SlidingWindow::new(config.speed_window),
            horizontal: SlidingWindow::new(config.speed_window),
            descent: SlidingWindow::new(config.descent_window),
            landed_positions: SlidingWindow::new(config.landed_window),
            config,
            store,
            current_sonde: None,
            track: Vec::new(),
            accepted: 0,
            metrics: MotionMetrics::default(),
        }
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    pub fn current_sonde(&self) -> Option<&str> {
        self.current_sonde.as_deref()
    }

    /// Latest published metrics.
    pub fn metrics(&self) -> MotionMetrics {
        self.metrics
    }

    pub fn latest_sample(&self) -> Option<&TelemetrySample> {
        self.recent.latest()
    }

    /// Accumulated track for the current sonde (including any reloaded points).
    pub fn track(&self) -> &[TrackPoint] {
        &self.track
    }

    /// Samples accepted since the last identity switch.
    pub fn accepted_count(&self) -> u64 {
        self.accepted
    }

    /// Process a sample against the wall clock.
    pub fn process(&mut self, sample: TelemetrySample) -> Option<MotionMetrics> {
        self.process_at(sample, Utc::now())
    }

    /// Process a sample, judging freshness against `now`.
    ///
    /// Returns `None` if the sample was malformed and dropped.
    pub fn process_at(&mut self, sample: TelemetrySample, now: DateTime<Utc>) -> Option<MotionMetrics> {
        if let Err(reason) = sample.validate() {
            tracing::debug!(sonde = %sample.sonde_name, %reason, "Dropping malformed sample");
            return None;
        }

        if self.current_sonde.as_deref() != Some(sample.sonde_name.as_str()) {
            self.switch_identity(&sample.sonde_name);
        }

        self.recent.push(sample.clone());

        if sample.is_descending() {
            self.update_descent_rate(&sample);
        }

        self.track.push(TrackPoint::from(&sample));
        self.accepted += 1;
        if self.config.checkpoint_interval > 0 && self.accepted % self.config.checkpoint_interval == 0 {
            self.checkpoint();
        }

        let age = seconds_between(sample.timestamp, now).abs();
        if age <= self.config.freshness.as_secs_f64() {
            self.evaluate_landing(&sample);
        } else {
            tracing::trace!(age_secs = age, "Stale sample, landing evaluation skipped");
        }

        Some(self.metrics)
    }

    /// Whether the sonde is currently in the air.
    ///
    /// Requires a sample younger than the freshness window, then compares the
    /// recent-window means (or the latest instantaneous values while the
    /// window is still filling) against the landing thresholds.
    pub fn is_flying(&self, now: DateTime<Utc>) -> bool {
        let Some(latest) = self.recent.latest() else {
            return false;
        };

        if seconds_between(latest.timestamp, now) >= self.config.freshness.as_secs_f64() {
            return false;
        }

        let (vertical, horizontal) = if self.recent.is_full() {
            let n = self.recent.len() as f64;
            let v = self.recent.iter().map(|s| s.vertical_speed.abs()).sum::<f64>() / n;
            let h = self.recent.iter().map(|s| s.horizontal_speed).sum::<f64>() / n;
            (v, h)
        } else {
            (latest.vertical_speed.abs(), latest.horizontal_speed)
        };

        vertical >= self.config.landed_vertical_speed || horizontal >= self.config.landed_horizontal_speed
    }

    /// Clear all per-flight state.
    pub fn reset(&mut self) {
        self.recent.clear();
        self.vertical.clear();
        self.horizontal.clear();
        self.descent.clear();
        self.landed_positions.clear();
        self.track.clear();
        self.accepted = 0;
        self.metrics = MotionMetrics::default();
    }

    fn switch_identity(&mut self, sonde_name: &str) {
        tracing::info!(
            previous = self.current_sonde.as_deref().unwrap_or("none"),
            sonde = sonde_name,
            "Tracking new sonde"
        );

        self.reset();
        self.current_sonde = Some(sonde_name.to_string());

        match self.store.load_track(sonde_name) {
            Ok(Some(track)) => {
                tracing::info!(sonde = sonde_name, points = track.len(), "Restored saved track");
                self.track = track;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(sonde = sonde_name, error = %e, "Failed to load saved track");
            }
        }
    }

    fn update_descent_rate(&mut self, sample: &TelemetrySample) {
        let lookback = self.config.descent_lookback.as_secs_f64();

        // Track is in arrival order; the first match from the back is the
        // most recent qualifying point.
        let historical = self
            .track
            .iter()
            .rev()
            .find(|p| seconds_between(p.timestamp, sample.timestamp) >= lookback);

        let Some(historical) = historical else {
            return;
        };

        let elapsed = seconds_between(historical.timestamp, sample.timestamp);
        if elapsed <= 0.0 {
            return;
        }

        let rate = (sample.altitude - historical.altitude) / elapsed;
        self.descent.push(rate);

        let published = if self.descent.len() >= self.config.min_descent_samples {
            self.descent.mean().unwrap_or(rate)
        } else {
            rate
        };
        self.metrics.smoothed_descent_rate = Some(published);

        tracing::trace!(rate, published, elapsed_secs = elapsed, "Descent rate updated");
    }

    fn evaluate_landing(&mut self, sample: &TelemetrySample) {
        self.vertical.push(sample.vertical_speed);
        self.horizontal.push(sample.horizontal_speed);

        let smoothed_vertical = self.vertical.mean_abs();
        let smoothed_horizontal = self.horizontal.mean();
        self.metrics.smoothed_vertical = smoothed_vertical;
        self.metrics.smoothed_horizontal = smoothed_horizontal;

        let landed = matches!(
            (smoothed_vertical, smoothed_horizontal),
            (Some(v), Some(h))
                if v < self.config.landed_vertical_speed && h < self.config.landed_horizontal_speed
        );

        if landed {
            self.landed_positions.push(sample.position());
            self.metrics.landed_position = self.landed_positions.mean_position();
        }

        if landed != self.metrics.is_landed {
            tracing::info!(
                sonde = %sample.sonde_name,
                landed,
                smoothed_vertical = smoothed_vertical.unwrap_or_default(),
                smoothed_horizontal = smoothed_horizontal.unwrap_or_default(),
                "Landing verdict changed"
            );
        }
        self.metrics.is_landed = landed;
    }

    /// Fire-and-forget save of the accumulated track.
    fn checkpoint(&self) {
        let Some(sonde) = self.current_sonde.clone() else {
            return;
        };
        let store = Arc::clone(&self.store);
        let track = self.track.clone();
        let accepted = self.accepted;

        let save = move || match store.save_track(&sonde, &track) {
            Ok(()) => tracing::debug!(sonde = %sonde, points = track.len(), accepted, "Track checkpoint saved"),
            Err(e) => tracing::warn!(sonde = %sonde, error = %e, "Track checkpoint failed"),
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(save);
            }
            Err(_) => save(),
        }
    }
}
