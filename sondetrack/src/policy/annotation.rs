//! Annotation policy: which markers are on the map.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::config::PolicyConfig;
use super::gate::UpdateGate;
use super::snapshot::{Annotation, AnnotationKind, MapStateSnapshot, SnapshotSource};
use crate::geo::Coordinate;
use crate::mode::Mode;
use crate::prediction::LandingPrediction;
use crate::scheduler::Scheduler;
use crate::telemetry::{MotionMetrics, TelemetrySample};

/// Scheduler key for debounced annotation recomputes.
pub const ANNOTATION_UPDATE_KEY: &str = "policy.annotation";

/// Coarse application phase tracked by the annotation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AppPhase {
    /// Waiting for telemetry and a landing prediction.
    #[default]
    Startup,
    /// Both telemetry and a prediction are available.
    LongRangeTracking,
}

impl fmt::Display for AppPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppPhase::Startup => write!(f, "startup"),
            AppPhase::LongRangeTracking => write!(f, "long-range-tracking"),
        }
    }
}

/// Latest inputs cached by the annotation policy.
#[derive(Debug, Clone, Default)]
pub struct AnnotationInputs {
    pub balloon: Option<TelemetrySample>,
    pub metrics: MotionMetrics,
    pub user: Option<Coordinate>,
    pub mode: Mode,
    pub prediction: Option<LandingPrediction>,
}

impl AnnotationInputs {
    /// Marker set for these inputs, or `None` while the balloon is unknown.
    pub fn annotations(&self) -> Option<Vec<Annotation>> {
        let balloon = self.balloon.as_ref()?;
        let position = balloon.position();

        let mut annotations = vec![
            Annotation::new(AnnotationKind::Balloon, position).with_label(balloon.sonde_name.clone()),
        ];

        if let Some(user) = self.user {
            annotations.push(Annotation::new(AnnotationKind::User, user));
        }

        if balloon.is_ascending() {
            if let Some(burst) = self.prediction.and_then(|p| p.burst) {
                annotations.push(Annotation::new(AnnotationKind::BurstPoint, burst));
            }
        }

        if self.metrics.is_landed {
            annotations.push(Annotation::new(AnnotationKind::Landed, position));
        } else if let Some(prediction) = self.prediction {
            annotations.push(Annotation::new(AnnotationKind::PredictedLanding, prediction.landing));
        }

        Some(annotations)
    }
}

#[derive(Debug)]
struct AnnotationState {
    inputs: AnnotationInputs,
    phase: AppPhase,
    gate: UpdateGate,
}

struct Inner {
    config: PolicyConfig,
    scheduler: Scheduler,
    state: Mutex<AnnotationState>,
    snapshots: mpsc::UnboundedSender<MapStateSnapshot>,
}

/// Decides and publishes the annotation portion of the map.
///
/// Cheap to clone; clones share state. Update requests must be made from
/// within a Tokio runtime.
#[derive(Clone)]
pub struct AnnotationPolicy {
    inner: Arc<Inner>,
}

impl fmt::Debug for AnnotationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("AnnotationPolicy")
            .field("phase", &state.phase)
            .field("version", &state.gate.version())
            .finish_non_exhaustive()
    }
}

impl AnnotationPolicy {
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
                state: Mutex::new(AnnotationState {
                    inputs: AnnotationInputs::default(),
                    phase: AppPhase::Startup,
                    gate,
                }),
                snapshots,
            }),
        }
    }

    pub fn phase(&self) -> AppPhase {
        self.inner.state.lock().phase
    }

    /// Version of the most recently accepted request.
    pub fn version(&self) -> u64 {
        self.inner.state.lock().gate.version()
    }

    pub fn inputs(&self) -> AnnotationInputs {
        self.inner.state.lock().inputs.clone()
    }

    pub fn on_telemetry(&self, sample: &TelemetrySample, metrics: MotionMetrics) -> bool {
        {
            let mut state = self.inner.state.lock();
            state.inputs.balloon = Some(sample.clone());
            state.inputs.metrics = metrics;
            Self::update_phase(&mut state);
        }
        self.request_update("telemetry", false)
    }

    pub fn on_location(&self, location: Coordinate) -> bool {
        self.inner.state.lock().inputs.user = Some(location);
        self.request_update("location", false)
    }

    pub fn on_prediction(&self, prediction: LandingPrediction) -> bool {
        {
            let mut state = self.inner.state.lock();
            state.inputs.prediction = Some(prediction);
            Self::update_phase(&mut state);
        }
        self.request_update("prediction", false)
    }

    pub fn on_mode_change(&self, mode: Mode) -> bool {
        self.inner.state.lock().inputs.mode = mode;
        self.request_update("mode-change", true)
    }

    /// Ask for a recompute.
    ///
    /// Unless `force`d, a request within the minimum interval of the last
    /// accepted one is dropped. Accepted requests are debounced; the
    /// recompute reads the cache at the time it runs.
    pub fn request_update(&self, reason: &'static str, force: bool) -> bool {
        let admitted = self.inner.state.lock().gate.admit(force, Instant::now());
        let Some(version) = admitted else {
            tracing::trace!(reason, "Annotation update skipped (min interval)");
            return false;
        };

        let policy = self.clone();
        self.inner.scheduler.debounce(
            ANNOTATION_UPDATE_KEY,
            self.inner.config.annotation_debounce,
            move || async move { policy.publish(version, reason) },
        );
        true
    }

    fn publish(&self, version: u64, reason: &'static str) {
        let annotations = self.inner.state.lock().inputs.annotations();
        let Some(annotations) = annotations else {
            tracing::debug!(reason, version, "No balloon position yet, annotation publish skipped");
            return;
        };

        let snapshot = MapStateSnapshot {
            source: SnapshotSource::Annotation,
            version,
            reason,
            annotations: Some(annotations),
            camera: None,
            region: None,
        };

        tracing::debug!(version, reason, count = snapshot.annotations.as_ref().map_or(0, Vec::len), "Publishing annotations");
        if self.inner.snapshots.send(snapshot).is_err() {
            tracing::debug!("Snapshot receiver dropped");
        }
    }

    fn update_phase(state: &mut AnnotationState) {
        if state.phase == AppPhase::Startup
            && state.inputs.balloon.is_some()
            && state.inputs.prediction.is_some()
        {
            state.phase = AppPhase::LongRangeTracking;
            tracing::info!(phase = %state.phase, "Application phase changed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;

    fn sample(vertical_speed: f64) -> TelemetrySample {
        TelemetrySample {
            sonde_name: "S1".to_string(),
            latitude: 48.0,
            longitude: 11.0,
            altitude: 10_000.0,
            vertical_speed,
            horizontal_speed: 40.0,
            signal_strength: -70.0,
            timestamp: Utc::now(),
        }
    }

    fn prediction() -> LandingPrediction {
        LandingPrediction::new(Coordinate::new(48.3, 11.5)).with_burst(Coordinate::new(48.1, 11.2))
    }

    fn policy() -> (AnnotationPolicy, mpsc::UnboundedReceiver<MapStateSnapshot>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let policy = AnnotationPolicy::new(PolicyConfig::default(), Scheduler::with_defaults(), tx);
        (policy, rx)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Marker rules
    // ─────────────────────────────────────────────────────────────────────────

    fn kinds(inputs: &AnnotationInputs) -> Vec<AnnotationKind> {
        inputs
            .annotations()
            .unwrap_or_default()
            .into_iter()
            .map(|a| a.kind)
            .collect()
    }

    #[test]
    fn test_no_balloon_no_annotations() {
        let inputs = AnnotationInputs {
            user: Some(Coordinate::new(48.0, 11.0)),
            ..AnnotationInputs::default()
        };
        assert!(inputs.annotations().is_none());
    }

    #[test]
    fn test_burst_marker_only_while_ascending() {
        let mut inputs = AnnotationInputs {
            balloon: Some(sample(5.0)),
            prediction: Some(prediction()),
            ..AnnotationInputs::default()
        };
        assert_eq!(
            kinds(&inputs),
            vec![
                AnnotationKind::Balloon,
                AnnotationKind::BurstPoint,
                AnnotationKind::PredictedLanding
            ]
        );

        inputs.balloon = Some(sample(-8.0));
        assert_eq!(
            kinds(&inputs),
            vec![AnnotationKind::Balloon, AnnotationKind::PredictedLanding]
        );
    }

    #[test]
    fn test_landed_marker_replaces_prediction() {
        let balloon = sample(0.1);
        let inputs = AnnotationInputs {
            balloon: Some(balloon.clone()),
            metrics: MotionMetrics {
                is_landed: true,
                ..MotionMetrics::default()
            },
            user: Some(Coordinate::new(48.01, 11.01)),
            prediction: Some(prediction()),
            ..AnnotationInputs::default()
        };

        let annotations = inputs.annotations().unwrap();
        let landed: Vec<_> = annotations
            .iter()
            .filter(|a| a.kind == AnnotationKind::Landed)
            .collect();
        assert_eq!(landed.len(), 1);
        assert_eq!(landed[0].position, balloon.position());
        assert!(!annotations
            .iter()
            .any(|a| a.kind == AnnotationKind::PredictedLanding));
        assert!(annotations.iter().any(|a| a.kind == AnnotationKind::User));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Phase
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_phase_requires_telemetry_and_prediction() {
        let (policy, _rx) = policy();
        assert_eq!(policy.phase(), AppPhase::Startup);

        policy.on_prediction(prediction());
        assert_eq!(policy.phase(), AppPhase::Startup);

        policy.on_telemetry(&sample(5.0), MotionMetrics::default());
        assert_eq!(policy.phase(), AppPhase::LongRangeTracking);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Rate limiting
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_event_storm_produces_single_snapshot() {
        let (policy, mut rx) = policy();

        assert!(policy.on_telemetry(&sample(5.0), MotionMetrics::default()));
        for _ in 0..10 {
            assert!(!policy.on_telemetry(&sample(5.0), MotionMetrics::default()));
        }

        tokio::time::sleep(Duration::from_millis(600)).await;
        let snapshot = rx.try_recv().unwrap();
        assert_eq!(snapshot.version, 1);
        assert_eq!(snapshot.source, SnapshotSource::Annotation);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_burst_debounced_with_latest_version_and_cache() {
        let (policy, mut rx) = policy();
        policy.on_telemetry(&sample(5.0), MotionMetrics::default());

        policy.request_update("a", true);
        policy.on_location(Coordinate::new(48.05, 11.05));
        policy.request_update("b", true);
        assert_eq!(policy.version(), 3);

        tokio::time::sleep(Duration::from_millis(600)).await;
        let snapshot = rx.try_recv().unwrap();
        assert_eq!(snapshot.version, 3);
        assert_eq!(snapshot.reason, "b");
        // Built from the cache, which includes the location skipped by the gate.
        assert!(snapshot.has_annotation(AnnotationKind::User));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_versions_strictly_increase() {
        let (policy, mut rx) = policy();
        let mut versions = Vec::new();

        for _ in 0..4 {
            policy.on_telemetry(&sample(5.0), MotionMetrics::default());
            tokio::time::sleep(Duration::from_millis(1100)).await;
            versions.push(rx.try_recv().unwrap().version);
        }

        assert_eq!(versions, vec![1, 2, 3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_balloon_skips_publish() {
        let (policy, mut rx) = policy();

        assert!(policy.on_location(Coordinate::new(48.0, 11.0)));
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(rx.try_recv().is_err());
    }
}
