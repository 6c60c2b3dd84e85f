//! Tracker service: wires telemetry, mode selection and map policies into
//! one event loop.
//!
//! # Module Structure
//!
//! ```text
//! service/
//! ├── mod.rs      - Re-exports
//! ├── clock.rs    - ServiceClock (UTC anchored to the Tokio clock)
//! ├── event.rs    - TrackerEvent, UiCommand
//! └── tracker.rs  - TrackerService run loop, TrackerStatus
//! ```
//!
//! # Data Flow
//!
//! ```text
//! TrackerEvent ──► TelemetryPipeline ──► ModeStateMachine ──► ModeChange (broadcast)
//!      │                 │                      │
//!      │                 ▼                      ▼ cancel policy.* / forced update
//!      └──────────► AnnotationPolicy, CameraPolicy ──► MapStateSnapshot (mpsc)
//! ```
//!
//! # Example
//!
//! ```ignore
//! let (snapshot_tx, mut snapshot_rx) = mpsc::unbounded_channel();
//! let (service, events) = TrackerService::new(config, store, snapshot_tx);
//! let shutdown = CancellationToken::new();
//! tokio::spawn(service.run(shutdown.clone()));
//!
//! events.send(TrackerEvent::Telemetry(sample)).await?;
//! ```

mod clock;
mod event;
mod tracker;

pub use clock::ServiceClock;
pub use event::{TrackerEvent, UiCommand};
pub use tracker::{
    StatusHandle, TrackerService, TrackerStatus, DEFAULT_EVENT_CAPACITY, REEVALUATE_KEY,
};
