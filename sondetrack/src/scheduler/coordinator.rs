//! Keyed scheduling coordinator.
//!
//! All bookkeeping lives in one mutex-guarded table, so every read and write
//! for a key is serialized. The lock is never held across an `.await`:
//! deferred executions are Tokio tasks that sleep under `select!` against a
//! [`CancellationToken`] and re-check the table immediately before running
//! their operation.
//!
//! # Invariant
//!
//! At most one pending execution exists per key. Installing a new one cancels
//! the previous token *under the same lock* that installs the replacement,
//! so a superseded task can never pass its pre-run check.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::backoff::{BackoffState, DEFAULT_BACKOFF_BASE, DEFAULT_MAX_MULTIPLIER};
use super::decision::{
    BackoffDecision, CooldownDecision, ScheduleKind, ThrottleDecision, ThrottleEdge,
};

/// Configuration for the scheduling coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Base interval scaled by the backoff multiplier.
    pub backoff_base: Duration,
    /// Upper bound on the backoff multiplier.
    pub backoff_max_multiplier: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_max_multiplier: DEFAULT_MAX_MULTIPLIER,
        }
    }
}

#[derive(Debug)]
struct PendingExecution {
    generation: u64,
    token: CancellationToken,
}

#[derive(Debug)]
struct ScheduledEntry {
    kind: ScheduleKind,
    last_execution: Option<Instant>,
    pending: Option<PendingExecution>,
    backoff: BackoffState,
}

impl ScheduledEntry {
    fn new(kind: ScheduleKind) -> Self {
        Self {
            kind,
            last_execution: None,
            pending: None,
            backoff: BackoffState::new(),
        }
    }
}

#[derive(Debug, Default)]
struct ScheduleTable {
    entries: HashMap<String, ScheduledEntry>,
    next_generation: u64,
}

impl ScheduleTable {
    fn entry(&mut self, key: &str, kind: ScheduleKind) -> &mut ScheduledEntry {
        let entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| ScheduledEntry::new(kind));
        entry.kind = kind;
        entry
    }

    /// Replace any pending execution for `key` with a fresh one.
    fn install_pending(&mut self, key: &str, kind: ScheduleKind) -> (u64, CancellationToken) {
        self.next_generation += 1;
        let generation = self.next_generation;
        let token = CancellationToken::new();

        let entry = self.entry(key, kind);
        if let Some(previous) = entry.pending.take() {
            previous.token.cancel();
            tracing::trace!(key, kind = %kind, "Superseded pending execution");
        }
        entry.pending = Some(PendingExecution {
            generation,
            token: token.clone(),
        });

        (generation, token)
    }

    /// Claim the right to run a pending execution.
    ///
    /// Succeeds only if `generation` is still the key's current, uncancelled
    /// pending execution; the pending slot is cleared and the execution time
    /// recorded.
    fn take_pending(&mut self, key: &str, generation: u64) -> bool {
        let Some(entry) = self.entries.get_mut(key) else {
            return false;
        };

        let is_current = entry
            .pending
            .as_ref()
            .is_some_and(|p| p.generation == generation && !p.token.is_cancelled());

        if is_current {
            entry.pending = None;
            entry.last_execution = Some(Instant::now());
        }
        is_current
    }

    /// Record an execution now unless the key ran within `window`.
    fn claim_window(
        &mut self,
        key: &str,
        kind: ScheduleKind,
        window: Duration,
    ) -> Result<(), Duration> {
        let now = Instant::now();
        let entry = self.entry(key, kind);

        if let Some(last) = entry.last_execution {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < window {
                return Err(window - elapsed);
            }
        }

        entry.last_execution = Some(now);
        Ok(())
    }

    fn cancel_where(&mut self, mut matches: impl FnMut(&str) -> bool) -> usize {
        let mut cancelled = 0;
        for (key, entry) in self.entries.iter_mut() {
            if !matches(key) {
                continue;
            }
            if let Some(pending) = entry.pending.take() {
                pending.token.cancel();
                cancelled += 1;
            }
        }
        cancelled
    }
}

/// Keyed debounce / throttle / cooldown / coalesce / latest-wins / backoff.
///
/// Cheap to clone; clones share the same table. Methods that defer work
/// spawn Tokio tasks and must be called from within a Tokio runtime.
///
/// # Example
///
/// ```ignore
/// let scheduler = Scheduler::new(SchedulerConfig::default());
///
/// // A burst of calls collapses into one recompute 500ms after the last.
/// for _ in 0..10 {
///     let state = Arc::clone(&state);
///     scheduler.debounce("policy.annotation", Duration::from_millis(500), move || async move {
///         state.recompute();
///     });
/// }
/// ```
#[derive(Clone)]
pub struct Scheduler {
    config: SchedulerConfig,
    table: Arc<Mutex<ScheduleTable>>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("keys", &self.table.lock().entries.len())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            table: Arc::new(Mutex::new(ScheduleTable::default())),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(SchedulerConfig::default())
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run `op` unless `key` executed less than `duration` ago.
    pub async fn cooldown<F, Fut, T>(&self, key: &str, duration: Duration, op: F) -> CooldownDecision<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let claim = self
            .table
            .lock()
            .claim_window(key, ScheduleKind::Cooldown, duration);

        match claim {
            Ok(()) => CooldownDecision::Executed(op().await),
            Err(remaining) => {
                tracing::trace!(key, remaining_ms = remaining.as_millis() as u64, "Cooldown skip");
                CooldownDecision::Skipped { remaining }
            }
        }
    }

    /// Rate-limit `op` to one run per `interval`.
    ///
    /// - [`ThrottleEdge::Leading`]: runs inline if outside the window.
    /// - [`ThrottleEdge::Trailing`]: (re)schedules one run `interval` from
    ///   now, cancelling any earlier pending run for the key.
    pub async fn throttle<F, Fut>(
        &self,
        key: &str,
        interval: Duration,
        edge: ThrottleEdge,
        op: F,
    ) -> ThrottleDecision
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        match edge {
            ThrottleEdge::Leading => {
                let claim = self
                    .table
                    .lock()
                    .claim_window(key, ScheduleKind::Throttle, interval);
                match claim {
                    Ok(()) => {
                        op().await;
                        ThrottleDecision::Executed
                    }
                    Err(remaining) => ThrottleDecision::Skipped { remaining },
                }
            }
            ThrottleEdge::Trailing => {
                self.schedule_deferred(key, ScheduleKind::Throttle, interval, op);
                ThrottleDecision::Scheduled
            }
        }
    }

    /// Run `op` once `delay` passes without another call for `key`.
    ///
    /// Each call cancels the previous pending one, so a burst produces a
    /// single execution carrying whatever the last closure captured.
    pub fn debounce<F, Fut>(&self, key: &str, delay: Duration, op: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.schedule_deferred(key, ScheduleKind::Debounce, delay, op);
    }

    /// Deliver the latest `value` for `key` once `window` passes quietly.
    ///
    /// The value travels inside the pending task, so each call site keeps
    /// its own static type.
    pub fn coalesce<T, F, Fut>(&self, key: &str, value: T, window: Duration, op: F)
    where
        T: Send + 'static,
        F: FnOnce(T) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.schedule_deferred(key, ScheduleKind::Coalesce, window, move || op(value));
    }

    /// Start `op` now, preempting any still-running operation for `key`.
    ///
    /// The returned handle yields `None` if this operation was superseded
    /// (or cancelled) before it completed.
    pub fn latest_wins<F, Fut, T>(&self, key: &str, op: F) -> JoinHandle<Option<T>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (generation, token) = self.table.lock().install_pending(key, ScheduleKind::LatestWins);
        let table = Arc::clone(&self.table);
        let key = key.to_string();

        tokio::spawn(async move {
            tokio::select! {
                biased;

                _ = token.cancelled() => {
                    tracing::trace!(key = %key, "Latest-wins operation preempted");
                    None
                }

                output = op() => {
                    if table.lock().take_pending(&key, generation) {
                        Some(output)
                    } else {
                        None
                    }
                }
            }
        })
    }

    /// Run a fallible `op` under per-key exponential backoff.
    ///
    /// Failures double the key's multiplier (capped) and lock the key out for
    /// `base × multiplier`; a success resets it. The operation's own error is
    /// returned inside [`BackoffDecision::Executed`].
    pub async fn with_backoff<F, Fut, T, E>(&self, key: &str, op: F) -> BackoffDecision<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        {
            let mut table = self.table.lock();
            let entry = table.entry(key, ScheduleKind::Backoff);
            if let Err(next_attempt) = entry.backoff.check(Instant::now()) {
                return BackoffDecision::Rejected {
                    next_attempt,
                    multiplier: entry.backoff.multiplier(),
                };
            }
        }

        let result = op().await;

        let mut table = self.table.lock();
        let entry = table.entry(key, ScheduleKind::Backoff);
        let now = Instant::now();
        entry.last_execution = Some(now);
        match &result {
            Ok(_) => entry.backoff.record_success(),
            Err(_) => {
                let next = entry.backoff.record_failure(
                    now,
                    self.config.backoff_base,
                    self.config.backoff_max_multiplier,
                );
                tracing::debug!(
                    key,
                    multiplier = entry.backoff.multiplier(),
                    retry_in_ms = next.saturating_duration_since(now).as_millis() as u64,
                    "Operation failed, backing off"
                );
            }
        }

        BackoffDecision::Executed(result)
    }

    /// Cancel the pending execution for `key`, if any.
    pub fn cancel(&self, key: &str) -> bool {
        self.table.lock().cancel_where(|k| k == key) > 0
    }

    /// Cancel all pending executions, optionally only for keys starting with
    /// `prefix`. Returns how many were cancelled.
    pub fn cancel_all(&self, prefix: Option<&str>) -> usize {
        let cancelled = match prefix {
            Some(prefix) => self.table.lock().cancel_where(|k| k.starts_with(prefix)),
            None => self.table.lock().cancel_where(|_| true),
        };
        if cancelled > 0 {
            tracing::debug!(prefix = prefix.unwrap_or("*"), cancelled, "Cancelled pending executions");
        }
        cancelled
    }

    pub fn has_pending(&self, key: &str) -> bool {
        self.table
            .lock()
            .entries
            .get(key)
            .is_some_and(|e| e.pending.is_some())
    }

    pub fn pending_count(&self) -> usize {
        self.table
            .lock()
            .entries
            .values()
            .filter(|e| e.pending.is_some())
            .count()
    }

    /// Current backoff multiplier for `key` (1.0 if never failed).
    pub fn backoff_multiplier(&self, key: &str) -> f64 {
        self.table
            .lock()
            .entries
            .get(key)
            .map_or(1.0, |e| e.backoff.multiplier())
    }

    pub fn last_execution(&self, key: &str) -> Option<Instant> {
        self.table.lock().entries.get(key).and_then(|e| e.last_execution)
    }

    fn schedule_deferred<F, Fut>(&self, key: &str, kind: ScheduleKind, delay: Duration, op: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (generation, token) = self.table.lock().install_pending(key, kind);
        let table = Arc::clone(&self.table);
        let key = key.to_string();

        tokio::spawn(async move {
            tokio::select! {
                biased;

                _ = token.cancelled() => {}

                _ = tokio::time::sleep(delay) => {
                    let ready = table.lock().take_pending(&key, generation);
                    if ready {
                        tracing::trace!(key = %key, kind = %kind, "Deferred execution firing");
                        op().await;
                    }
                }
            }
        });
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Debounce / coalesce
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_debounce_burst_executes_once_with_last_state() {
        let scheduler = Scheduler::with_defaults();
        let executions = Arc::new(Mutex::new(Vec::new()));
        let delay = ms(500);

        let mut last_call = None;
        for i in 0..5u32 {
            let executions = Arc::clone(&executions);
            last_call = Some(Instant::now());
            scheduler.debounce("burst", delay, move || async move {
                executions.lock().push((i, Instant::now()));
            });
            tokio::time::sleep(ms(100)).await;
        }

        tokio::time::sleep(delay + ms(50)).await;

        let executions = executions.lock();
        assert_eq!(executions.len(), 1);
        let (value, fired_at) = executions[0];
        assert_eq!(value, 4);
        assert!(fired_at >= last_call.unwrap() + delay);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_separate_keys_are_independent() {
        let scheduler = Scheduler::with_defaults();
        let count = Arc::new(AtomicUsize::new(0));

        for key in ["a", "b", "c"] {
            let count = Arc::clone(&count);
            scheduler.debounce(key, ms(100), move || async move {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }

        tokio::time::sleep(ms(150)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_coalesce_delivers_last_value() {
        let scheduler = Scheduler::with_defaults();
        let delivered = Arc::new(Mutex::new(Vec::new()));

        for value in ["first", "second", "third"] {
            let delivered = Arc::clone(&delivered);
            scheduler.coalesce("label", value.to_string(), ms(200), move |v| async move {
                delivered.lock().push(v);
            });
            tokio::time::sleep(ms(50)).await;
        }

        tokio::time::sleep(ms(300)).await;
        assert_eq!(*delivered.lock(), vec!["third".to_string()]);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Throttle / cooldown
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_throttle_leading_skips_inside_window() {
        let scheduler = Scheduler::with_defaults();
        let count = Arc::new(AtomicUsize::new(0));

        let run = |count: Arc<AtomicUsize>| move || async move {
            count.fetch_add(1, Ordering::SeqCst);
        };

        let first = scheduler
            .throttle("t", ms(1000), ThrottleEdge::Leading, run(Arc::clone(&count)))
            .await;
        assert_eq!(first, ThrottleDecision::Executed);

        tokio::time::advance(ms(400)).await;
        let second = scheduler
            .throttle("t", ms(1000), ThrottleEdge::Leading, run(Arc::clone(&count)))
            .await;
        assert_eq!(
            second,
            ThrottleDecision::Skipped {
                remaining: ms(600)
            }
        );

        tokio::time::advance(ms(600)).await;
        let third = scheduler
            .throttle("t", ms(1000), ThrottleEdge::Leading, run(Arc::clone(&count)))
            .await;
        assert_eq!(third, ThrottleDecision::Executed);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_trailing_collapses_burst() {
        let scheduler = Scheduler::with_defaults();
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..4 {
            let count = Arc::clone(&count);
            let decision = scheduler
                .throttle("trail", ms(300), ThrottleEdge::Trailing, move || async move {
                    count.fetch_add(1, Ordering::SeqCst);
                })
                .await;
            assert_eq!(decision, ThrottleDecision::Scheduled);
        }
        assert!(scheduler.has_pending("trail"));

        tokio::time::sleep(ms(350)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!scheduler.has_pending("trail"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_reports_remaining() {
        let scheduler = Scheduler::with_defaults();

        let first = scheduler.cooldown("cd", ms(2000), || async { 42 }).await;
        assert_eq!(first, CooldownDecision::Executed(42));

        tokio::time::advance(ms(500)).await;
        let second = scheduler.cooldown("cd", ms(2000), || async { 43 }).await;
        assert_eq!(
            second,
            CooldownDecision::Skipped {
                remaining: ms(1500)
            }
        );

        tokio::time::advance(ms(1500)).await;
        let third = scheduler.cooldown("cd", ms(2000), || async { 44 }).await;
        assert_eq!(third, CooldownDecision::Executed(44));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Latest-wins
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_latest_wins_suppresses_older_completion() {
        let scheduler = Scheduler::with_defaults();
        let a_done = Arc::new(AtomicBool::new(false));
        let b_done = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&a_done);
        let handle_a = scheduler.latest_wins("route", move || async move {
            tokio::time::sleep(ms(500)).await;
            flag.store(true, Ordering::SeqCst);
            "a"
        });

        tokio::time::sleep(ms(100)).await;

        let flag = Arc::clone(&b_done);
        let handle_b = scheduler.latest_wins("route", move || async move {
            tokio::time::sleep(ms(500)).await;
            flag.store(true, Ordering::SeqCst);
            "b"
        });

        assert_eq!(handle_a.await.unwrap(), None);
        assert_eq!(handle_b.await.unwrap(), Some("b"));
        assert!(!a_done.load(Ordering::SeqCst));
        assert!(b_done.load(Ordering::SeqCst));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Backoff
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_backoff_multiplier_monotonic_and_capped() {
        let scheduler = Scheduler::with_defaults();
        let mut previous = scheduler.backoff_multiplier("fetch");

        for _ in 0..8 {
            let decision = scheduler
                .with_backoff("fetch", || async { Err::<(), _>("offline") })
                .await;
            assert!(matches!(decision, BackoffDecision::Executed(Err("offline"))));

            let multiplier = scheduler.backoff_multiplier("fetch");
            assert!(multiplier >= previous);
            assert!(multiplier <= 32.0);
            previous = multiplier;

            tokio::time::advance(Duration::from_secs(64)).await;
        }

        assert_eq!(previous, 32.0);

        let decision = scheduler
            .with_backoff("fetch", || async { Ok::<_, &str>(1) })
            .await;
        assert!(matches!(decision, BackoffDecision::Executed(Ok(1))));
        assert_eq!(scheduler.backoff_multiplier("fetch"), 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_rejects_early_calls() {
        let scheduler = Scheduler::with_defaults();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        scheduler
            .with_backoff("fetch", || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(())
            })
            .await;

        let failed_at = Instant::now();
        tokio::time::advance(ms(500)).await;

        let counter = Arc::clone(&calls);
        let decision = scheduler
            .with_backoff("fetch", || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ()>(())
            })
            .await;

        match decision {
            BackoffDecision::Rejected {
                next_attempt,
                multiplier,
            } => {
                assert_eq!(multiplier, 2.0);
                assert_eq!(next_attempt, failed_at + Duration::from_secs(2));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Cancellation
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_with_prefix() {
        let scheduler = Scheduler::with_defaults();
        let count = Arc::new(AtomicUsize::new(0));

        for key in ["policy.annotation", "policy.camera", "mode.reevaluate"] {
            let count = Arc::clone(&count);
            scheduler.debounce(key, ms(200), move || async move {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(scheduler.pending_count(), 3);

        assert_eq!(scheduler.cancel_all(Some("policy.")), 2);
        assert_eq!(scheduler.pending_count(), 1);

        tokio::time::sleep(ms(300)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_without_prefix() {
        let scheduler = Scheduler::with_defaults();
        let fired = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&fired);
        scheduler.debounce("x", ms(100), move || async move {
            flag.store(true, Ordering::SeqCst);
        });
        assert!(scheduler.cancel("x"));
        assert!(!scheduler.cancel("x"));
        assert_eq!(scheduler.cancel_all(None), 0);

        tokio::time::sleep(ms(200)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }
}
