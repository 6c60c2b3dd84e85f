//! Hysteresis-gated mode state machine.
//!
//! # Decision Rules (highest priority first)
//!
//! ```text
//! 1. telemetry silent > 300s  OR  distance > 50 km          → Explore
//! 2. flying AND (|v| < 1.0 m/s for ≥ 60s
//!                OR (alt < 1000 m AND distance < 1000 m))   → FinalApproach
//! 3. flying AND signal > -80 dBm for ≥ 30s                  → Follow
//! 4. otherwise                                              → Explore
//! ```
//!
//! Evaluations inside the 5s dwell after a transition are ignored. The
//! context is still updated so the next evaluation sees every event.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use super::context::ModeContext;
use super::types::{Mode, ModeChange, TransitionCause, TransitionRecord};
use crate::geo::Coordinate;
use crate::telemetry::{SlidingWindow, TelemetrySample};

/// Capacity of the mode-change broadcast channel.
const NOTIFICATION_CAPACITY: usize = 32;

/// Configuration for the mode state machine.
#[derive(Debug, Clone, PartialEq)]
pub struct ModeMachineConfig {
    /// Minimum dwell after a transition before rules are evaluated again.
    pub hysteresis: Duration,
    /// Periodic re-evaluation interval (driven by the service).
    pub reevaluation_interval: Duration,
    /// Telemetry silence after which the tracker falls back to Explore.
    pub signal_loss_timeout: Duration,
    /// Distance (m) beyond which the tracker falls back to Explore.
    pub max_distance_m: f64,
    /// Altitude (m) above which the balloon counts as flying.
    pub flying_altitude_m: f64,
    /// |vertical speed| (m/s) below which the balloon counts as slow.
    pub low_speed_threshold: f64,
    pub low_speed_duration: Duration,
    pub final_approach_altitude_m: f64,
    pub final_approach_distance_m: f64,
    /// Signal strength (dBm) the Follow rule requires to be exceeded.
    pub follow_signal_dbm: f64,
    pub follow_signal_duration: Duration,
    /// Telemetry gap that breaks a continuous good-signal run.
    pub telemetry_gap: Duration,
    pub history_capacity: usize,
}

impl Default for ModeMachineConfig {
    fn default() -> Self {
        Self {
            hysteresis: Duration::from_secs(5),
            reevaluation_interval: Duration::from_secs(30),
            signal_loss_timeout: Duration::from_secs(300),
            max_distance_m: 50_000.0,
            flying_altitude_m: 100.0,
            low_speed_threshold: 1.0,
            low_speed_duration: Duration::from_secs(60),
            final_approach_altitude_m: 1000.0,
            final_approach_distance_m: 1000.0,
            follow_signal_dbm: -80.0,
            follow_signal_duration: Duration::from_secs(30),
            telemetry_gap: Duration::from_secs(10),
            history_capacity: 20,
        }
    }
}

/// Decides the operating mode from telemetry and location context.
#[derive(Debug)]
pub struct ModeStateMachine {
    config: ModeMachineConfig,
    current: Mode,
    context: ModeContext,
    /// When the last transition (evaluated or forced) happened.
    last_transition: Option<DateTime<Utc>>,
    history: SlidingWindow<TransitionRecord>,
    notifier: broadcast::Sender<ModeChange>,
}

impl ModeStateMachine {
    pub fn new(config: ModeMachineConfig) -> Self {
        let (notifier, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            history: SlidingWindow::new(config.history_capacity),
            config,
            current: Mode::Explore,
            context: ModeContext::new(),
            last_transition: None,
            notifier,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ModeMachineConfig::default())
    }

    pub fn config(&self) -> &ModeMachineConfig {
        &self.config
    }

    pub fn current_mode(&self) -> Mode {
        self.current
    }

    pub fn context(&self) -> &ModeContext {
        &self.context
    }

    /// Transition history, oldest first.
    pub fn history(&self) -> Vec<TransitionRecord> {
        self.history.iter().copied().collect()
    }

    /// Receive a [`ModeChange`] for every future transition.
    ///
    /// Dropping the receiver ends the subscription.
    pub fn subscribe(&self) -> broadcast::Receiver<ModeChange> {
        self.notifier.subscribe()
    }

    /// Update the context with a telemetry sample, then evaluate.
    pub fn on_telemetry(
        &mut self,
        sample: &TelemetrySample,
        now: DateTime<Utc>,
    ) -> Option<ModeChange> {
        self.context.record_telemetry(sample, now, &self.config);
        self.evaluate(now)
    }

    /// Update the context with the user's location, then evaluate.
    pub fn on_location(&mut self, location: Coordinate, now: DateTime<Utc>) -> Option<ModeChange> {
        self.context.record_location(location);
        self.evaluate(now)
    }

    /// Apply the decision rules, unless inside the hysteresis dwell.
    pub fn evaluate(&mut self, now: DateTime<Utc>) -> Option<ModeChange> {
        if self.in_dwell(now) {
            tracing::trace!(mode = %self.current, "Evaluation inside hysteresis dwell ignored");
            return None;
        }

        let target = self.decide(now);
        if target == self.current {
            return None;
        }

        Some(self.transition(target, now, TransitionCause::Evaluated))
    }

    /// Switch to `mode` regardless of rules and dwell.
    ///
    /// Returns `None` if already in `mode`.
    pub fn force_transition(&mut self, mode: Mode, now: DateTime<Utc>) -> Option<ModeChange> {
        if mode == self.current {
            return None;
        }
        Some(self.transition(mode, now, TransitionCause::Forced))
    }

    /// Target mode for the current context (no hysteresis).
    pub fn decide(&self, now: DateTime<Utc>) -> Mode {
        let ctx = &self.context;
        let cfg = &self.config;
        let distance = ctx.distance_to_balloon;

        let signal_lost = ctx
            .telemetry_age(now)
            .is_some_and(|age| age > cfg.signal_loss_timeout.as_secs_f64());
        let too_far = distance.is_some_and(|d| d > cfg.max_distance_m);
        if signal_lost || too_far {
            return Mode::Explore;
        }

        if !ctx.is_balloon_flying {
            return Mode::Explore;
        }

        let slow_long_enough = ctx
            .low_speed_held_for(now)
            .is_some_and(|held| held >= cfg.low_speed_duration.as_secs_f64());
        let low_and_close = ctx
            .balloon_altitude
            .is_some_and(|alt| alt < cfg.final_approach_altitude_m)
            && distance.is_some_and(|d| d < cfg.final_approach_distance_m);
        if slow_long_enough || low_and_close {
            return Mode::FinalApproach;
        }

        let strong_signal = ctx
            .signal_strength
            .is_some_and(|s| s > cfg.follow_signal_dbm);
        let held = ctx
            .signal_held_for(now)
            .is_some_and(|held| held >= cfg.follow_signal_duration.as_secs_f64());
        if strong_signal && held {
            return Mode::Follow;
        }

        Mode::Explore
    }

    fn in_dwell(&self, now: DateTime<Utc>) -> bool {
        self.last_transition.is_some_and(|last| {
            let since = (now - last).num_milliseconds() as f64 / 1000.0;
            since < self.config.hysteresis.as_secs_f64()
        })
    }

    fn transition(&mut self, to: Mode, now: DateTime<Utc>, cause: TransitionCause) -> ModeChange {
        let from = self.current;
        self.current = to;
        self.last_transition = Some(now);
        self.history.push(TransitionRecord { mode: to, at: now });

        let change = ModeChange {
            from,
            to,
            at: now,
            cause,
        };

        self.on_enter(&change);

        // No subscribers is fine.
        let _ = self.notifier.send(change.clone());
        change
    }

    fn on_enter(&mut self, change: &ModeChange) {
        let config = change.to.config();
        tracing::info!(
            from = %change.from,
            to = %change.to,
            cause = ?change.cause,
            distance_m = self.context.distance_to_balloon.unwrap_or(-1.0),
            altitude_m = self.context.balloon_altitude.unwrap_or(-1.0),
            prediction_interval_s = config.prediction_interval.as_secs(),
            routing = config.routing_enabled,
            "Mode transition"
        );

        if change.to == Mode::Explore {
            // A fresh run must be observed before leaving Explore again.
            self.context.low_speed_start = None;
            self.context.continuous_telemetry_start = None;
        }
    }
}

impl Default for ModeStateMachine {
    fn default() -> Self {
        Self::with_defaults()
    }
}
