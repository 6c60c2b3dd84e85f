//! The tracker service: one task that owns the pipeline and the mode
//! machine and drives the map policies.
//!
//! Events arrive on a bounded channel and are handled one at a time, so
//! the pipeline and the machine need no locking. The policies and the
//! scheduler are shared handles; their debounced work runs on separate
//! tasks and reads the latest cached inputs.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::clock::ServiceClock;
use super::event::{TrackerEvent, UiCommand};
use crate::config::TrackerConfig;
use crate::geo::Coordinate;
use crate::mode::{Mode, ModeChange, ModeStateMachine};
use crate::policy::{AnnotationPolicy, AppPhase, CameraPolicy, MapStateSnapshot, POLICY_KEY_PREFIX};
use crate::prediction::LandingPrediction;
use crate::scheduler::{Scheduler, ThrottleEdge};
use crate::telemetry::{TelemetryPipeline, TelemetrySample, TrackStore};

/// Capacity of the event channel returned by [`TrackerService::new`].
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Scheduler key of the periodic mode re-evaluation.
pub const REEVALUATE_KEY: &str = "mode.reevaluate";

/// Point-in-time summary of the service.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrackerStatus {
    pub mode: Mode,
    pub phase: AppPhase,
    pub sonde: Option<String>,
    pub samples_accepted: u64,
    pub samples_dropped: u64,
    pub is_flying: bool,
    pub is_landed: bool,
    pub landed_position: Option<Coordinate>,
    pub mode_changes: u64,
    pub annotation_version: u64,
    pub camera_version: u64,
}

/// Read-only view of [`TrackerStatus`] that outlives the service task.
#[derive(Debug, Clone, Default)]
pub struct StatusHandle {
    inner: Arc<Mutex<TrackerStatus>>,
}

impl StatusHandle {
    pub fn snapshot(&self) -> TrackerStatus {
        self.inner.lock().clone()
    }

    fn update(&self, f: impl FnOnce(&mut TrackerStatus)) {
        f(&mut self.inner.lock());
    }
}

/// Tracking orchestration service.
///
/// Create with [`TrackerService::new`], take whatever handles are needed
/// ([`subscribe_modes`](Self::subscribe_modes), [`status`](Self::status),
/// [`clock`](Self::clock)), then spawn [`run`](Self::run).
pub struct TrackerService {
    config: TrackerConfig,
    clock: ServiceClock,
    scheduler: Scheduler,
    pipeline: TelemetryPipeline,
    machine: ModeStateMachine,
    annotations: AnnotationPolicy,
    camera: CameraPolicy,
    status: StatusHandle,
    event_rx: mpsc::Receiver<TrackerEvent>,
    tick_tx: mpsc::UnboundedSender<()>,
    tick_rx: mpsc::UnboundedReceiver<()>,
}

impl TrackerService {
    /// Create the service and the sender used to feed it events.
    ///
    /// Map snapshots from both policies are delivered on `snapshots`.
    pub fn new(
        config: TrackerConfig,
        store: Arc<dyn TrackStore>,
        snapshots: mpsc::UnboundedSender<MapStateSnapshot>,
    ) -> (Self, mpsc::Sender<TrackerEvent>) {
        Self::with_clock(config, store, snapshots, ServiceClock::new())
    }

    /// Like [`new`](Self::new), with an explicit clock.
    pub fn with_clock(
        config: TrackerConfig,
        store: Arc<dyn TrackStore>,
        snapshots: mpsc::UnboundedSender<MapStateSnapshot>,
        clock: ServiceClock,
    ) -> (Self, mpsc::Sender<TrackerEvent>) {
        let (event_tx, event_rx) = mpsc::channel(DEFAULT_EVENT_CAPACITY);
        let (tick_tx, tick_rx) = mpsc::unbounded_channel();

        let scheduler = Scheduler::new(config.scheduler.clone());
        let pipeline = TelemetryPipeline::new(config.telemetry.clone(), store);
        let machine = ModeStateMachine::new(config.mode.clone());
        let annotations =
            AnnotationPolicy::new(config.policy.clone(), scheduler.clone(), snapshots.clone());
        let camera = CameraPolicy::new(config.policy.clone(), scheduler.clone(), snapshots);

        let service = Self {
            config,
            clock,
            scheduler,
            pipeline,
            machine,
            annotations,
            camera,
            status: StatusHandle::default(),
            event_rx,
            tick_tx,
            tick_rx,
        };

        (service, event_tx)
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn clock(&self) -> ServiceClock {
        self.clock
    }

    /// Shared scheduler used by the service and its policies.
    pub fn scheduler(&self) -> Scheduler {
        self.scheduler.clone()
    }

    pub fn status(&self) -> StatusHandle {
        self.status.clone()
    }

    /// Receive every mode change made while the service runs.
    pub fn subscribe_modes(&self) -> broadcast::Receiver<ModeChange> {
        self.machine.subscribe()
    }

    /// Run until `shutdown` is cancelled or every event sender is dropped.
    ///
    /// All pending scheduled work is cancelled on exit, so no snapshot is
    /// published after this returns.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            reevaluation_secs = self.config.mode.reevaluation_interval.as_secs_f64(),
            "Tracker service started"
        );

        self.arm_reevaluation().await;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Tracker service shutting down");
                    break;
                }

                Some(()) = self.tick_rx.recv() => {
                    self.on_reevaluate();
                    self.arm_reevaluation().await;
                }

                event = self.event_rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event),
                        None => {
                            info!("Event channel closed, tracker service stopping");
                            break;
                        }
                    }
                }
            }
        }

        let cancelled = self.scheduler.cancel_all(None);
        debug!(cancelled, "Cancelled pending scheduled work");
        info!(status = ?self.status.snapshot(), "Tracker service stopped");
    }

    fn handle_event(&mut self, event: TrackerEvent) {
        trace!(kind = event.kind(), "Tracker event");
        let now = self.clock.now();

        match event {
            TrackerEvent::Telemetry(sample) => self.on_telemetry(sample, now),
            TrackerEvent::Location(location) => self.on_location(location, now),
            TrackerEvent::Prediction(prediction) => self.on_prediction(prediction),
            TrackerEvent::Command(command) => self.on_command(command, now),
        }

        self.refresh_status(now);
    }

    fn on_telemetry(&mut self, sample: TelemetrySample, now: DateTime<Utc>) {
        let Some(metrics) = self.pipeline.process_at(sample.clone(), now) else {
            self.status.update(|s| s.samples_dropped += 1);
            return;
        };

        self.annotations.on_telemetry(&sample, metrics);
        self.camera.on_balloon_position(sample.position());

        if let Some(change) = self.machine.on_telemetry(&sample, now) {
            self.on_mode_change(change);
        }
    }

    fn on_location(&mut self, location: Coordinate, now: DateTime<Utc>) {
        if !location.is_valid() || location.is_null_island() {
            debug!(%location, "Ignoring invalid user location");
            return;
        }

        self.annotations.on_location(location);
        self.camera.on_location(location);

        if let Some(change) = self.machine.on_location(location, now) {
            self.on_mode_change(change);
        }
    }

    fn on_prediction(&mut self, prediction: LandingPrediction) {
        if !prediction.is_valid() {
            debug!(landing = %prediction.landing, "Ignoring invalid landing prediction");
            return;
        }

        self.annotations.on_prediction(prediction);
        self.camera.on_prediction(prediction);
    }

    fn on_command(&mut self, command: UiCommand, now: DateTime<Utc>) {
        match command {
            UiCommand::SetMode(mode) => match self.machine.force_transition(mode, now) {
                Some(change) => self.on_mode_change(change),
                None => debug!(%mode, "Already in requested mode"),
            },
            UiCommand::CameraPan => self.camera.on_user_pan(),
            UiCommand::CameraZoom(zoom) => {
                if zoom.is_finite() && zoom > 0.0 {
                    self.camera.on_user_zoom(zoom);
                } else {
                    warn!(zoom, "Ignoring invalid zoom level");
                }
            }
            UiCommand::ToggleHeading => {
                let heading = self.camera.toggle_heading();
                debug!(?heading, "Heading mode toggled");
            }
        }
    }

    fn on_reevaluate(&mut self) {
        let now = self.clock.now();
        if let Some(change) = self.machine.evaluate(now) {
            self.on_mode_change(change);
        }
        self.refresh_status(now);
    }

    /// Drop stale policy work and republish for the new mode.
    fn on_mode_change(&mut self, change: ModeChange) {
        let cancelled = self.scheduler.cancel_all(Some(POLICY_KEY_PREFIX));
        info!(
            from = %change.from,
            to = %change.to,
            cause = ?change.cause,
            cancelled,
            "Mode changed"
        );

        self.annotations.on_mode_change(change.to);
        self.camera.on_mode_change(change.to);
        self.status.update(|s| s.mode_changes += 1);
    }

    async fn arm_reevaluation(&self) {
        let tick_tx = self.tick_tx.clone();
        self.scheduler
            .throttle(
                REEVALUATE_KEY,
                self.config.mode.reevaluation_interval,
                ThrottleEdge::Trailing,
                move || async move {
                    let _ = tick_tx.send(());
                },
            )
            .await;
    }

    fn refresh_status(&self, now: DateTime<Utc>) {
        let metrics = self.pipeline.metrics();
        let is_flying = self.pipeline.is_flying(now);
        let mode = self.machine.current_mode();
        let phase = self.annotations.phase();
        let sonde = self.pipeline.current_sonde().map(str::to_string);
        let accepted = self.pipeline.accepted_count();
        let annotation_version = self.annotations.version();
        let camera_version = self.camera.version();

        self.status.update(|s| {
            s.mode = mode;
            s.phase = phase;
            s.sonde = sonde;
            s.samples_accepted = accepted;
            s.is_flying = is_flying;
            s.is_landed = metrics.is_landed;
            s.landed_position = metrics.landed_position;
            s.annotation_version = annotation_version;
            s.camera_version = camera_version;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::InMemoryTrackStore;
    use chrono::TimeZone;
    use std::time::Duration;

    fn origin() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
    }

    fn service() -> (
        TrackerService,
        mpsc::Sender<TrackerEvent>,
        mpsc::UnboundedReceiver<MapStateSnapshot>,
    ) {
        let (snap_tx, snap_rx) = mpsc::unbounded_channel();
        let (service, tx) = TrackerService::with_clock(
            TrackerConfig::default(),
            Arc::new(InMemoryTrackStore::new()),
            snap_tx,
            ServiceClock::anchored_at(origin()),
        );
        (service, tx, snap_rx)
    }

    fn sample(clock: &ServiceClock, altitude: f64) -> TelemetrySample {
        TelemetrySample {
            sonde_name: "S1234567".to_string(),
            latitude: 47.0,
            longitude: 8.0,
            altitude,
            vertical_speed: 5.0,
            horizontal_speed: 20.0,
            signal_strength: -70.0,
            timestamp: clock.now(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_senders_dropped() {
        let (service, tx, _snaps) = service();
        let scheduler = service.scheduler();
        let handle = tokio::spawn(service.run(CancellationToken::new()));

        drop(tx);
        handle.await.unwrap();
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reevaluation_is_armed_while_running() {
        let (service, _tx, _snaps) = service();
        let scheduler = service.scheduler();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(service.run(shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(scheduler.has_pending(REEVALUATE_KEY));

        // Still armed after the first tick fired
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(scheduler.has_pending(REEVALUATE_KEY));

        shutdown.cancel();
        handle.await.unwrap();
        assert!(!scheduler.has_pending(REEVALUATE_KEY));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_counts_samples() {
        let (service, tx, _snaps) = service();
        let clock = service.clock();
        let status = service.status();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(service.run(shutdown.clone()));

        tx.send(sample(&clock, 500.0).into()).await.unwrap();
        let mut bad = sample(&clock, 500.0);
        bad.latitude = 0.0;
        bad.longitude = 0.0;
        tx.send(bad.into()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let snapshot = status.snapshot();
        assert_eq!(snapshot.samples_accepted, 1);
        assert_eq!(snapshot.samples_dropped, 1);
        assert_eq!(snapshot.sonde.as_deref(), Some("S1234567"));

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_mode_republishes_for_new_mode() {
        let (service, tx, mut snaps) = service();
        let clock = service.clock();
        let mut modes = service.subscribe_modes();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(service.run(shutdown.clone()));

        tx.send(sample(&clock, 500.0).into()).await.unwrap();
        tx.send(UiCommand::SetMode(Mode::Follow).into())
            .await
            .unwrap();

        let change = modes.recv().await.unwrap();
        assert_eq!(change.to, Mode::Follow);

        tokio::time::sleep(Duration::from_secs(1)).await;
        let mut saw_follow_camera = false;
        while let Ok(snapshot) = snaps.try_recv() {
            if snapshot.reason == "mode-change" && snapshot.camera.is_some() {
                saw_follow_camera = true;
            }
        }
        assert!(saw_follow_camera);

        shutdown.cancel();
        handle.await.unwrap();
    }
}
