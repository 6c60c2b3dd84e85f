//! Telemetry smoothing and landing detection.
//!
//! Raw radiosonde reports are noisy: positions jitter, speeds spike, and
//! packets arrive late or not at all. This module turns that stream into
//! stable [`MotionMetrics`] and a landing verdict.
//!
//! # Architecture
//!
//! ```text
//! TelemetrySample ──► TelemetryPipeline ──► MotionMetrics ──► mode / policies
//!                      │  SlidingWindow × 5
//!                      └► TrackStore (reload on identity switch, checkpoint saves)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use sondetrack::telemetry::{InMemoryTrackStore, TelemetryConfig, TelemetryPipeline};
//! use std::sync::Arc;
//!
//! let store = Arc::new(InMemoryTrackStore::new());
//! let mut pipeline = TelemetryPipeline::new(TelemetryConfig::default(), store);
//!
//! if let Some(metrics) = pipeline.process(sample) {
//!     println!("landed: {}", metrics.is_landed);
//! }
//! ```

mod pipeline;
mod sample;
mod store;
mod window;

pub use pipeline::{
    MotionMetrics, TelemetryConfig, TelemetryPipeline, DEFAULT_CHECKPOINT_INTERVAL,
    DEFAULT_DESCENT_LOOKBACK, DEFAULT_FRESHNESS, DEFAULT_LANDED_HORIZONTAL_SPEED,
    DEFAULT_LANDED_VERTICAL_SPEED,
};
pub use sample::{SampleRejection, TelemetrySample};
pub use store::{InMemoryTrackStore, NullTrackStore, TrackPoint, TrackStore, TrackStoreError};
pub use window::SlidingWindow;
