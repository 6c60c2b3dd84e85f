//! Sondetrack - radiosonde tracking core
//!
//! Turns a noisy radiosonde telemetry stream into smoothed motion metrics
//! and a landing verdict, picks an operating mode (Explore, Follow,
//! FinalApproach) from that and the user's location, and publishes
//! rate-limited map state (annotations and camera) for a UI to render.
//!
//! # Module Structure
//!
//! ```text
//! sondetrack/
//! ├── scheduler/   - Keyed debounce, throttle, cooldown, coalesce, latest-wins, backoff
//! ├── telemetry/   - Sliding windows, TelemetryPipeline, landing detection, TrackStore
//! ├── mode/        - ModeStateMachine with hysteresis and change notifications
//! ├── policy/      - AnnotationPolicy and CameraPolicy producing MapStateSnapshot
//! ├── service/     - TrackerService event loop tying it all together
//! ├── config/      - config.ini loading and saving
//! ├── geo.rs       - Coordinates, distances, map regions
//! ├── prediction.rs - Landing predictions
//! └── logging.rs   - tracing setup
//! ```

pub mod config;
pub mod geo;
pub mod logging;
pub mod mode;
pub mod policy;
pub mod prediction;
pub mod scheduler;
pub mod service;
pub mod telemetry;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
