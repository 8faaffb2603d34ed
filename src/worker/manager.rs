//! Tag-keyed registry and lifecycle façade over [`WorkerUnit`]s.
//!
//! Every unit's work function is wrapped so it first consults the
//! registration's `should_run` condition (unless handed [`Payload::Bypass`])
//! and records a last-successful-run timestamp when the work reports success.
//! Scattered GUI or lifecycle call sites can trigger a tag freely; the gate
//! decides whether a run is currently valid.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::WorkerConfig;
use crate::debounce::Debouncer;
use crate::state::{RunState, StateManager};
use crate::worker::unit::{DurationFn, Payload, UnitOptions, WorkFn, WorkerUnit};

/// Condition consulted before each gated run.
pub type ConditionFn = Arc<dyn Fn() -> bool + Send + Sync>;

type LastRuns = Arc<RwLock<HashMap<String, DateTime<Utc>>>>;

type Units<T> = Arc<RwLock<HashMap<String, Entry<T>>>>;

/// How [`Worker::call`] triggers a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallMode {
    /// Run the work function now on its own task, skipping the queue.
    Immediate,
    /// Enqueue a bare trigger.
    Queued,
    /// Coalesce with other debounced calls on the same tag, then run directly.
    Debounced,
    /// Enqueue a trigger that skips the `should_run` condition.
    BypassImmediate,
}

/// Everything needed to (re)create a tag's unit.
pub struct WorkerRegistration<T: Send + 'static> {
    queue_size: Option<usize>,
    delay: Option<DurationFn>,
    interval: Option<DurationFn>,
    work: Arc<dyn WorkFn<T>>,
    should_run: ConditionFn,
}

impl<T: Send + 'static> WorkerRegistration<T> {
    /// Push-driven registration that always passes its condition.
    pub fn new(work: impl WorkFn<T> + 'static) -> Self {
        Self {
            queue_size: None,
            delay: None,
            interval: None,
            work: Arc::new(work),
            should_run: Arc::new(|| true),
        }
    }

    pub fn queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = Some(queue_size);
        self
    }

    pub fn delay(self, delay: Duration) -> Self {
        self.delay_with(move || delay)
    }

    pub fn delay_with(mut self, f: impl Fn() -> Duration + Send + Sync + 'static) -> Self {
        self.delay = Some(Arc::new(f));
        self
    }

    pub fn interval(self, interval: Duration) -> Self {
        self.interval_with(move || interval)
    }

    pub fn interval_with(mut self, f: impl Fn() -> Duration + Send + Sync + 'static) -> Self {
        self.interval = Some(Arc::new(f));
        self
    }

    pub fn should_run(mut self, f: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.should_run = Arc::new(f);
        self
    }

    fn options(&self, default_queue_size: usize) -> UnitOptions {
        let mut options = UnitOptions::new(self.queue_size.unwrap_or(default_queue_size));
        if let Some(delay) = &self.delay {
            options.delay = Arc::clone(delay);
        }
        if let Some(interval) = &self.interval {
            options.interval = Arc::clone(interval);
        }
        options
    }
}

/// Serializable snapshot of one registered tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitStatus {
    pub tag: String,
    pub state: RunState,
    pub queued: usize,
    pub last_run: Option<DateTime<Utc>>,
}

/// Work function wrapper that applies the condition gate.
struct GatedWork<T: Send + 'static> {
    tag: String,
    work: Arc<dyn WorkFn<T>>,
    should_run: ConditionFn,
    last_runs: LastRuns,
    /// Set once the registration is replaced or removed.
    retired: Arc<AtomicBool>,
}

#[async_trait]
impl<T: Send + 'static> WorkFn<T> for GatedWork<T> {
    async fn run(&self, payload: Payload<T>) -> bool {
        if !payload.is_bypass() && !(self.should_run)() {
            debug!(tag = %self.tag, "Skipped: condition not met");
            return false;
        }

        let succeeded = self.work.run(payload).await;
        if succeeded {
            let mut last_runs = self.last_runs.write().unwrap_or_else(|e| e.into_inner());
            // Checked under the lock so a concurrent deregister can't be undone.
            if self.retired.load(Ordering::Acquire) {
                debug!(tag = %self.tag, "Run finished after deregistration");
            } else {
                last_runs.insert(self.tag.clone(), Utc::now());
            }
        } else {
            debug!(tag = %self.tag, "Work reported failure");
        }
        succeeded
    }
}

struct Entry<T: Send + 'static> {
    unit: WorkerUnit<T>,
    should_run: ConditionFn,
    retired: Arc<AtomicBool>,
}

impl<T: Send + 'static> Entry<T> {
    fn retire(&self) {
        self.retired.store(true, Ordering::Release);
        self.unit.stop();
        self.unit.destroy();
    }
}

/// Registry of named worker units.
pub struct Worker<T: Send + 'static> {
    config: WorkerConfig,
    debouncer: Arc<Debouncer>,
    shutdown: CancellationToken,
    state: StateManager,
    units: Units<T>,
    last_runs: LastRuns,
}

fn debounce_key(tag: &str) -> String {
    format!("worker_{tag}")
}

impl<T: Send + 'static> Worker<T> {
    /// Create an empty, running manager.
    pub fn new(config: WorkerConfig, debouncer: Arc<Debouncer>, shutdown: CancellationToken) -> Self {
        Self {
            config,
            debouncer,
            shutdown,
            state: StateManager::new(RunState::Running),
            units: Arc::new(RwLock::new(HashMap::new())),
            last_runs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Entry<T>>> {
        self.units.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Entry<T>>> {
        self.units.write().unwrap_or_else(|e| e.into_inner())
    }

    /// (Re)create the unit for `tag`, destroying any previous one.
    ///
    /// The new unit starts right away unless the manager is paused.
    pub fn register(&self, tag: impl Into<String>, registration: WorkerRegistration<T>) {
        if self.state.is_destroyed() {
            return;
        }
        let tag = tag.into();

        let options = registration.options(self.config.default_queue_size);
        let retired = Arc::new(AtomicBool::new(false));
        let gated = GatedWork {
            tag: tag.clone(),
            work: Arc::clone(&registration.work),
            should_run: Arc::clone(&registration.should_run),
            last_runs: Arc::clone(&self.last_runs),
            retired: Arc::clone(&retired),
        };
        let unit = WorkerUnit::new(tag.clone(), options, Arc::new(gated), self.shutdown.clone());

        let previous = self.write().insert(
            tag.clone(),
            Entry {
                unit: unit.clone(),
                should_run: registration.should_run,
                retired,
            },
        );
        if let Some(previous) = previous {
            previous.retire();
            info!(tag = %tag, "Worker re-registered, previous unit destroyed");
        } else {
            info!(tag = %tag, "Worker registered");
        }

        match self.state.get() {
            RunState::Running => unit.start(),
            RunState::Paused => {}
            // Lost a race with destroy().
            RunState::Destroyed => unit.destroy(),
        }
    }

    /// Stop, destroy and forget the unit for `tag`.
    pub fn deregister(&self, tag: &str) {
        let removed = self.write().remove(tag);
        let Some(entry) = removed else {
            return;
        };
        self.debouncer.cancel(&debounce_key(tag));
        entry.retire();
        self.last_runs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(tag);
        info!(tag = %tag, "Worker deregistered");
    }

    /// Trigger the unit for `tag`.
    pub fn call(&self, tag: &str, mode: CallMode) {
        if self.state.is_destroyed() {
            return;
        }
        let Some(unit) = self.unit(tag) else {
            debug!(tag = %tag, "Call ignored: unknown worker");
            return;
        };

        match mode {
            CallMode::Immediate => {
                tokio::spawn(async move {
                    unit.call(Payload::Tick).await;
                });
            }
            CallMode::Queued => {
                unit.push(Payload::Tick);
            }
            CallMode::Debounced => {
                // Resolve the unit when the window closes, so a re-registration
                // in the meantime receives the trigger.
                let units = Arc::downgrade(&self.units);
                let tag = tag.to_string();
                self.debouncer
                    .call(debounce_key(&tag), self.config.debounce_window, async move {
                        let current = units.upgrade().and_then(|units| {
                            let units = units.read().unwrap_or_else(|e| e.into_inner());
                            units.get(&tag).map(|entry| entry.unit.clone())
                        });
                        if let Some(unit) = current {
                            unit.call(Payload::Tick).await;
                        }
                    });
            }
            CallMode::BypassImmediate => {
                unit.push(Payload::Bypass);
            }
        }
    }

    /// Enqueue `data` for `tag`. Returns whether it was accepted.
    pub fn push(&self, tag: &str, data: T) -> bool {
        if self.state.is_destroyed() {
            return false;
        }
        self.unit(tag)
            .is_some_and(|unit| unit.push(Payload::Data(data)))
    }

    /// Discard `tag`'s queued payloads. Returns how many were dropped.
    pub fn flush(&self, tag: &str) -> usize {
        self.unit(tag).map_or(0, |unit| unit.flush())
    }

    pub fn reset(&self, tag: &str) {
        if let Some(unit) = self.unit(tag) {
            unit.reset();
        }
    }

    /// Stop one unit.
    pub fn pause(&self, tag: &str) {
        if let Some(unit) = self.unit(tag) {
            unit.stop();
        }
    }

    /// Restart one unit.
    pub fn resume(&self, tag: &str) {
        if self.state.is_destroyed() {
            return;
        }
        if let Some(unit) = self.unit(tag) {
            unit.start();
        }
    }

    /// Stop every unit; later registrations stay paused until resumed.
    pub fn pause_all(&self) {
        if !self
            .state
            .compare_and_change(RunState::Running, RunState::Paused)
        {
            return;
        }
        for unit in self.units() {
            unit.stop();
        }
        info!("All workers paused");
    }

    /// Start every unit, including ones registered while paused.
    pub fn resume_all(&self) {
        if self.state.is_destroyed() {
            return;
        }
        self.state.compare_and_change(RunState::Paused, RunState::Running);
        for unit in self.units() {
            unit.start();
        }
        info!("All workers resumed");
    }

    /// Same as [`Worker::resume_all`].
    pub fn start_all(&self) {
        self.resume_all();
    }

    /// Pause then resume every unit, re-reading their delay and interval.
    ///
    /// A paused manager only stops its units; they restart on `resume_all`.
    pub fn reload(&self) {
        if self.state.is_destroyed() {
            return;
        }
        let restart = self.state.is(RunState::Running);
        for unit in self.units() {
            unit.stop();
            if restart {
                unit.start();
            }
        }
        info!(restart, "All workers reloaded");
    }

    /// Tear down every unit. Permanent.
    pub fn destroy(&self) {
        if self.state.is_destroyed() {
            return;
        }
        self.state.change(RunState::Destroyed);

        let drained: Vec<(String, Entry<T>)> = self.write().drain().collect();
        for (tag, entry) in &drained {
            self.debouncer.cancel(&debounce_key(tag));
            entry.retire();
        }
        self.last_runs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        info!(count = drained.len(), "Worker manager destroyed");
    }

    /// Current manager state.
    pub fn state(&self) -> RunState {
        self.state.get()
    }

    pub fn is_registered(&self, tag: &str) -> bool {
        self.read().contains_key(tag)
    }

    /// Registered tags, sorted.
    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.read().keys().cloned().collect();
        tags.sort();
        tags
    }

    pub fn unit(&self, tag: &str) -> Option<WorkerUnit<T>> {
        self.read().get(tag).map(|entry| entry.unit.clone())
    }

    /// Evaluate the registration's condition right now.
    pub fn should_run(&self, tag: &str) -> Option<bool> {
        let condition = self.read().get(tag).map(|entry| Arc::clone(&entry.should_run))?;
        Some(condition())
    }

    /// When `tag` last ran successfully.
    pub fn last_run(&self, tag: &str) -> Option<DateTime<Utc>> {
        self.last_runs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(tag)
            .copied()
    }

    /// Snapshot of every registered tag, sorted by tag.
    pub fn status(&self) -> Vec<UnitStatus> {
        let mut status: Vec<UnitStatus> = self
            .read()
            .iter()
            .map(|(tag, entry)| UnitStatus {
                tag: tag.clone(),
                state: entry.unit.state(),
                queued: entry.unit.queued(),
                last_run: self.last_run(tag),
            })
            .collect();
        status.sort_by(|a, b| a.tag.cmp(&b.tag));
        status
    }

    fn units(&self) -> Vec<WorkerUnit<T>> {
        self.read().values().map(|entry| entry.unit.clone()).collect()
    }
}

impl<T: Send + 'static> Drop for Worker<T> {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, AtomicUsize};

    fn manager() -> Worker<u32> {
        Worker::new(
            WorkerConfig {
                debounce_window: Duration::from_millis(100),
                default_queue_size: 8,
            },
            Debouncer::new(),
            CancellationToken::new(),
        )
    }

    fn counting(count: &Arc<AtomicUsize>) -> impl WorkFn<u32> + 'static {
        let count = Arc::clone(count);
        move |_: Payload<u32>| {
            let count = Arc::clone(&count);
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                true
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_respects_condition() {
        let worker = manager();
        let count = Arc::new(AtomicUsize::new(0));
        worker.register(
            "sync",
            WorkerRegistration::new(counting(&count)).should_run(|| false),
        );

        worker.call("sync", CallMode::Immediate);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(worker.last_run("sync"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn bypass_ignores_condition() {
        let worker = manager();
        let count = Arc::new(AtomicUsize::new(0));
        worker.register(
            "sync",
            WorkerRegistration::new(counting(&count)).should_run(|| false),
        );

        worker.call("sync", CallMode::BypassImmediate);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(worker.last_run("sync").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn queued_call_runs_through_queue() {
        let worker = manager();
        let count = Arc::new(AtomicUsize::new(0));
        worker.register("sync", WorkerRegistration::new(counting(&count)));

        worker.call("sync", CallMode::Queued);
        worker.call("sync", CallMode::Queued);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn debounced_calls_coalesce() {
        let worker = manager();
        let count = Arc::new(AtomicUsize::new(0));
        worker.register("sync", WorkerRegistration::new(counting(&count)));

        for _ in 0..3 {
            worker.call("sync", CallMode::Debounced);
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn condition_is_read_on_each_run() {
        let worker = manager();
        let count = Arc::new(AtomicUsize::new(0));
        let ready = Arc::new(AtomicBool::new(false));
        let r = Arc::clone(&ready);
        worker.register(
            "sync",
            WorkerRegistration::new(counting(&count)).should_run(move || r.load(Ordering::SeqCst)),
        );

        worker.call("sync", CallMode::Queued);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(worker.should_run("sync"), Some(false));

        ready.store(true, Ordering::SeqCst);
        worker.call("sync", CallMode::Queued);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn push_delivers_data() {
        let worker = manager();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        worker.register(
            "ingest",
            WorkerRegistration::new(move |payload: Payload<u32>| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(payload.into_data());
                    true
                }
            }),
        );

        assert!(worker.push("ingest", 42));
        assert_eq!(rx.recv().await, Some(Some(42)));
    }

    #[tokio::test(start_paused = true)]
    async fn reregistration_replaces_unit() {
        let worker = manager();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        worker.register("sync", WorkerRegistration::new(counting(&first)));
        let old_unit = worker.unit("sync").unwrap();
        worker.register("sync", WorkerRegistration::new(counting(&second)));

        assert_eq!(old_unit.state(), RunState::Destroyed);
        assert_eq!(worker.tags(), vec!["sync".to_string()]);

        worker.call("sync", CallMode::Queued);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deregister_removes_everything() {
        let worker = manager();
        let count = Arc::new(AtomicUsize::new(0));
        worker.register("sync", WorkerRegistration::new(counting(&count)));
        let unit = worker.unit("sync").unwrap();

        worker.deregister("sync");
        assert!(!worker.is_registered("sync"));
        assert_eq!(unit.state(), RunState::Destroyed);
        assert_eq!(worker.should_run("sync"), None);

        worker.call("sync", CallMode::Immediate);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn registrations_while_paused_wait_for_resume() {
        let worker = manager();
        let count = Arc::new(AtomicUsize::new(0));
        worker.pause_all();
        worker.register("sync", WorkerRegistration::new(counting(&count)));

        assert_eq!(worker.unit("sync").unwrap().state(), RunState::Paused);
        worker.call("sync", CallMode::Queued);

        worker.resume_all();
        worker.call("sync", CallMode::Queued);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reload_restarts_units() {
        let worker = manager();
        let count = Arc::new(AtomicUsize::new(0));
        worker.register("a", WorkerRegistration::new(counting(&count)));
        worker.register("b", WorkerRegistration::new(counting(&count)));
        worker.pause("b");

        worker.reload();
        assert!(worker.status().iter().all(|s| s.state == RunState::Running));
    }

    #[tokio::test(start_paused = true)]
    async fn reload_while_paused_keeps_units_stopped() {
        let worker = manager();
        let count = Arc::new(AtomicUsize::new(0));
        worker.register("a", WorkerRegistration::new(counting(&count)));
        worker.pause_all();

        worker.reload();
        assert_eq!(worker.state(), RunState::Paused);
        assert_eq!(worker.unit("a").unwrap().state(), RunState::Paused);

        worker.register("b", WorkerRegistration::new(counting(&count)));
        assert_eq!(worker.unit("b").unwrap().state(), RunState::Paused);

        worker.resume_all();
        assert!(worker.status().iter().all(|s| s.state == RunState::Running));
    }

    #[tokio::test(start_paused = true)]
    async fn reload_rereads_interval() {
        let worker = manager();
        let count = Arc::new(AtomicUsize::new(0));
        let interval_ms = Arc::new(AtomicU64::new(100));
        let ms = Arc::clone(&interval_ms);
        worker.register(
            "tick",
            WorkerRegistration::new(counting(&count))
                .interval_with(move || Duration::from_millis(ms.load(Ordering::SeqCst))),
        );

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        interval_ms.store(1000, Ordering::SeqCst);
        worker.reload();
        count.store(0, Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(700)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn debounced_call_reaches_replacement_unit() {
        let worker = manager();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        worker.register("sync", WorkerRegistration::new(counting(&first)));

        worker.call("sync", CallMode::Debounced);
        worker.register("sync", WorkerRegistration::new(counting(&second)));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_finishing_after_deregister_leaves_no_timestamp() {
        let worker = manager();
        let gate = Arc::new(tokio::sync::Notify::new());
        let (started_tx, mut started_rx) = tokio::sync::mpsc::unbounded_channel();
        let g = Arc::clone(&gate);
        worker.register(
            "slow",
            WorkerRegistration::new(move |_: Payload<u32>| {
                let gate = Arc::clone(&g);
                let started_tx = started_tx.clone();
                async move {
                    let _ = started_tx.send(());
                    gate.notified().await;
                    true
                }
            }),
        );

        assert!(worker.push("slow", 1));
        started_rx.recv().await.unwrap();
        worker.deregister("slow");
        gate.notify_one();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(worker.last_run("slow"), None);
        assert!(worker.status().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn destroyed_manager_is_inert() {
        let worker = manager();
        let count = Arc::new(AtomicUsize::new(0));
        worker.register("sync", WorkerRegistration::new(counting(&count)));
        let unit = worker.unit("sync").unwrap();

        worker.destroy();
        assert_eq!(worker.state(), RunState::Destroyed);
        assert_eq!(unit.state(), RunState::Destroyed);
        assert!(worker.tags().is_empty());

        worker.register("sync", WorkerRegistration::new(counting(&count)));
        worker.call("sync", CallMode::Immediate);
        assert!(!worker.push("sync", 1));
        worker.resume_all();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(!worker.is_registered("sync"));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn status_reports_queue_and_last_run() {
        let worker = manager();
        let count = Arc::new(AtomicUsize::new(0));
        worker.register("b", WorkerRegistration::new(counting(&count)));
        worker.register("a", WorkerRegistration::new(counting(&count)));

        worker.call("a", CallMode::Queued);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let status = worker.status();
        assert_eq!(status.len(), 2);
        assert_eq!(status[0].tag, "a");
        assert!(status[0].last_run.is_some());
        assert!(status[1].last_run.is_none());

        let json = serde_json::to_value(&status[0]).unwrap();
        assert_eq!(json["state"], "running");
    }
}
