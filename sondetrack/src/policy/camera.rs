//! Camera policy: where the map looks.
//!
//! # Behaviour by mode
//!
//! - Follow / FinalApproach: centre on the balloon, recentring only once it
//!   has moved past the mode's threshold (50 m / 20 m).
//! - Explore: no follow; publish a region fitting balloon, user and
//!   predicted landing.
//!
//! A manual pan hands the camera to the user for the suppression period.
//! Follow resumes afterwards if the active mode still enables it.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::config::PolicyConfig;
use super::gate::UpdateGate;
use super::snapshot::{CameraDirective, HeadingMode, MapStateSnapshot, SnapshotSource};
use crate::geo::{Coordinate, MapRegion};
use crate::mode::Mode;
use crate::prediction::LandingPrediction;
use crate::scheduler::Scheduler;

/// Scheduler key for debounced camera recomputes.
pub const CAMERA_UPDATE_KEY: &str = "policy.camera";

/// Scheduler key for the deferred follow re-enable after a manual pan.
pub const CAMERA_PAN_RESUME_KEY: &str = "camera.pan-resume";

#[derive(Debug)]
struct CameraState {
    mode: Mode,
    balloon: Option<Coordinate>,
    user: Option<Coordinate>,
    prediction: Option<LandingPrediction>,
    heading: HeadingMode,
    zoom: Option<f64>,
    follow_suppressed: bool,
    /// Centre of the last published directive.
    last_center: Option<Coordinate>,
    /// Set by forced requests, consumed by the next recompute.
    pending_force: bool,
    gate: UpdateGate,
}

struct Inner {
    config: PolicyConfig,
    scheduler: Scheduler,
    state: Mutex<CameraState>,
    snapshots: mpsc::UnboundedSender<MapStateSnapshot>,
}

/// Decides and publishes the camera portion of the map.
///
/// Cheap to clone; clones share state. Must be used from within a Tokio
/// runtime.
#[derive(Clone)]
pub struct CameraPolicy {
    inner: Arc<Inner>,
}

impl fmt::Debug for CameraPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("CameraPolicy")
            .field("mode", &state.mode)
            .field("heading", &state.heading)
            .field("follow_suppressed", &state.follow_suppressed)
            .field("version", &state.gate.version())
            .finish_non_exhaustive()
    }
}

impl CameraPolicy {
    pub fn new(
        config: PolicyConfig,
        scheduler: Scheduler,
        snapshots: mpsc::UnboundedSender<MapStateSnapshot>,
    ) -> Self {
        let gate = UpdateGate::new(config.min_update_interval);
        Self {
            inner: Arc::new(Inner {
                config,
                scheduler,
                state: Mutex::new(CameraState {
                    mode: Mode::Explore,
                    balloon: None,
                    user: None,
                    prediction: None,
                    heading: HeadingMode::NorthUp,
                    zoom: None,
                    follow_suppressed: false,
                    last_center: None,
                    pending_force: false,
                    gate,
                }),
                snapshots,
            }),
        }
    }

    pub fn version(&self) -> u64 {
        self.inner.state.lock().gate.version()
    }

    pub fn heading(&self) -> HeadingMode {
        self.inner.state.lock().heading
    }

    pub fn is_follow_suppressed(&self) -> bool {
        self.inner.state.lock().follow_suppressed
    }

    pub fn on_balloon_position(&self, position: Coordinate) -> bool {
        self.inner.state.lock().balloon = Some(position);
        self.request_update("telemetry", false)
    }

    pub fn on_location(&self, location: Coordinate) -> bool {
        self.inner.state.lock().user = Some(location);
        self.request_update("location", false)
    }

    pub fn on_prediction(&self, prediction: LandingPrediction) -> bool {
        self.inner.state.lock().prediction = Some(prediction);
        self.request_update("prediction", false)
    }

    pub fn on_mode_change(&self, mode: Mode) -> bool {
        self.inner.state.lock().mode = mode;
        self.request_update("mode-change", true)
    }

    /// The user dragged the map: stop following for the suppression period.
    ///
    /// Repeated pans extend the period.
    pub fn on_user_pan(&self) {
        self.inner.state.lock().follow_suppressed = true;
        tracing::debug!(
            suppression_s = self.inner.config.pan_suppression.as_secs_f64(),
            "Manual pan, camera follow suppressed"
        );

        let policy = self.clone();
        self.inner.scheduler.debounce(
            CAMERA_PAN_RESUME_KEY,
            self.inner.config.pan_suppression,
            move || async move { policy.resume_follow() },
        );
    }

    /// The user zoomed; later directives carry this zoom level.
    pub fn on_user_zoom(&self, zoom: f64) {
        if zoom.is_finite() && zoom > 0.0 {
            self.inner.state.lock().zoom = Some(zoom);
        }
    }

    /// Switch between north-up and balloon-up.
    pub fn toggle_heading(&self) -> HeadingMode {
        let heading = {
            let mut state = self.inner.state.lock();
            state.heading = state.heading.toggled();
            state.heading
        };
        tracing::debug!(?heading, "Heading mode toggled");
        self.request_update("heading", true);
        heading
    }

    /// Ask for a recompute; see [`AnnotationPolicy::request_update`](super::AnnotationPolicy::request_update).
    pub fn request_update(&self, reason: &'static str, force: bool) -> bool {
        let admitted = {
            let mut state = self.inner.state.lock();
            let admitted = state.gate.admit(force, Instant::now());
            if admitted.is_some() && force {
                state.pending_force = true;
            }
            admitted
        };

        let Some(version) = admitted else {
            tracing::trace!(reason, "Camera update skipped (min interval)");
            return false;
        };

        let policy = self.clone();
        self.inner.scheduler.debounce(
            CAMERA_UPDATE_KEY,
            self.inner.config.camera_debounce,
            move || async move { policy.publish(version, reason) },
        );
        true
    }

    fn resume_follow(&self) {
        let follow_enabled = {
            let mut state = self.inner.state.lock();
            state.follow_suppressed = false;
            state.mode.config().camera_follow_enabled
        };

        tracing::debug!(follow_enabled, "Pan suppression elapsed");
        if follow_enabled {
            self.request_update("pan-resume", true);
        }
    }

    fn publish(&self, version: u64, reason: &'static str) {
        let snapshot = {
            let mut state = self.inner.state.lock();
            let force = std::mem::take(&mut state.pending_force);

            if state.follow_suppressed {
                tracing::trace!(reason, "Camera under manual control, publish skipped");
                return;
            }

            let built = if state.mode.config().camera_follow_enabled {
                self.follow_snapshot(&mut state, force)
            } else {
                self.region_snapshot(&state)
            };

            let Some((camera, region)) = built else {
                return;
            };

            MapStateSnapshot {
                source: SnapshotSource::Camera,
                version,
                reason,
                annotations: None,
                camera,
                region,
            }
        };

        tracing::debug!(version, reason, "Publishing camera update");
        if self.inner.snapshots.send(snapshot).is_err() {
            tracing::debug!("Snapshot receiver dropped");
        }
    }

    fn follow_snapshot(
        &self,
        state: &mut CameraState,
        force: bool,
    ) -> Option<(Option<CameraDirective>, Option<MapRegion>)> {
        let Some(target) = state.balloon else {
            tracing::debug!("No balloon position yet, camera publish skipped");
            return None;
        };

        if !force {
            if let Some(last) = state.last_center {
                let moved = last.distance_to(&target);
                let threshold = self.inner.config.recenter_threshold(state.mode);
                if moved < threshold {
                    tracing::trace!(moved_m = moved, threshold_m = threshold, "Below recentre threshold");
                    return None;
                }
            }
        }

        let bearing = match state.heading {
            HeadingMode::BalloonUp => state.user.map(|u| u.bearing_to(&target)),
            HeadingMode::NorthUp => None,
        };

        state.last_center = Some(target);
        let directive = CameraDirective {
            center: target,
            zoom: state.zoom,
            heading: state.heading,
            bearing,
        };
        Some((Some(directive), None))
    }

    fn region_snapshot(
        &self,
        state: &CameraState,
    ) -> Option<(Option<CameraDirective>, Option<MapRegion>)> {
        let points: Vec<Coordinate> = [state.balloon, state.user, state.prediction.map(|p| p.landing)]
            .into_iter()
            .flatten()
            .collect();

        let Some(region) = MapRegion::fitting(&points, self.inner.config.region_padding) else {
            tracing::debug!("Nothing to frame yet, camera publish skipped");
            return None;
        };
        Some((None, Some(region)))
    }
}
