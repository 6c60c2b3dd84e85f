//! Policy orchestrators.
//!
//! Both policies follow the same pattern:
//!
//! ```text
//! event ──► cache latest input ──► UpdateGate (≥1s unless forced, version++)
//!                                      │
//!                                      ▼
//!                       Scheduler::debounce(policy.<name>)
//!                                      │
//!                                      ▼
//!                     recompute from cache ──► MapStateSnapshot
//! ```
//!
//! The recompute never looks at the triggering event, so a late trigger with
//! a fresh cache still publishes correct state.

mod annotation;
mod camera;
mod config;
mod gate;
mod snapshot;

pub use annotation::{AnnotationInputs, AnnotationPolicy, AppPhase, ANNOTATION_UPDATE_KEY};
pub use camera::{CameraPolicy, CAMERA_PAN_RESUME_KEY, CAMERA_UPDATE_KEY};
pub use config::PolicyConfig;
pub use gate::UpdateGate;
pub use snapshot::{
    Annotation, AnnotationKind, CameraDirective, HeadingMode, MapStateSnapshot, SnapshotSource,
};

/// Scheduler key prefix shared by all policy recomputes.
pub const POLICY_KEY_PREFIX: &str = "policy.";
