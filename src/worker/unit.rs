//! Single named background task: bounded queue + optional ticker + pre-delay.
//!
//! Lifecycle: created `Paused` → `start()` → `Running` → `stop()` → `Paused`
//! → ... → `destroy()` → `Destroyed` (terminal, every call becomes a no-op).
//!
//! The control loop races four sources each iteration:
//! - the orchestrator-wide shutdown token (exit)
//! - the unit's own cancellation token, registered under `"worker"` (exit)
//! - the interval ticker, which enqueues [`Payload::Tick`]
//! - the queue, whose payloads are handed to the work function
//!
//! An interval of zero disables the ticker, leaving a purely push-driven unit.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cancel::CancelRegistry;
use crate::state::{RunState, StateManager};

/// Registry key for a unit's loop token.
const LOOP_CANCEL_KEY: &str = "worker";

/// What a work function is invoked with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload<T> {
    /// No data: a ticker fire or a bare trigger.
    Tick,
    /// Run even if the registration's condition currently fails.
    Bypass,
    /// Caller-supplied data.
    Data(T),
}

impl<T> Payload<T> {
    pub fn is_bypass(&self) -> bool {
        matches!(self, Self::Bypass)
    }

    pub fn into_data(self) -> Option<T> {
        match self {
            Self::Data(data) => Some(data),
            _ => None,
        }
    }
}

/// Asynchronous work function. Returns whether the run succeeded.
#[async_trait]
pub trait WorkFn<T: Send + 'static>: Send + Sync {
    async fn run(&self, payload: Payload<T>) -> bool;
}

#[async_trait]
impl<T, F, Fut> WorkFn<T> for F
where
    T: Send + 'static,
    F: Fn(Payload<T>) -> Fut + Send + Sync,
    Fut: Future<Output = bool> + Send + 'static,
{
    async fn run(&self, payload: Payload<T>) -> bool {
        (self)(payload).await
    }
}

/// Provider for a delay or interval, read on every `start()`.
pub type DurationFn = Arc<dyn Fn() -> Duration + Send + Sync>;

/// Queue size plus delay/interval providers for a unit.
#[derive(Clone)]
pub struct UnitOptions {
    pub queue_size: usize,
    pub delay: DurationFn,
    pub interval: DurationFn,
}

impl UnitOptions {
    /// Push-driven unit with no pre-delay.
    pub fn new(queue_size: usize) -> Self {
        Self {
            queue_size,
            delay: Arc::new(|| Duration::ZERO),
            interval: Arc::new(|| Duration::ZERO),
        }
    }

    pub fn delay(self, delay: Duration) -> Self {
        self.delay_with(move || delay)
    }

    pub fn delay_with(mut self, f: impl Fn() -> Duration + Send + Sync + 'static) -> Self {
        self.delay = Arc::new(f);
        self
    }

    pub fn interval(self, interval: Duration) -> Self {
        self.interval_with(move || interval)
    }

    pub fn interval_with(mut self, f: impl Fn() -> Duration + Send + Sync + 'static) -> Self {
        self.interval = Arc::new(f);
        self
    }
}

impl std::fmt::Debug for UnitOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOptions")
            .field("queue_size", &self.queue_size)
            .field("delay", &(self.delay)())
            .field("interval", &(self.interval)())
            .finish()
    }
}

/// Bounded FIFO that can be drained from outside the consuming loop.
struct PayloadQueue<T> {
    items: Mutex<VecDeque<Payload<T>>>,
    capacity: usize,
    notify: Notify,
    closed: AtomicBool,
}

impl<T> PayloadQueue<T> {
    fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Payload<T>>> {
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Enqueue without waiting. Returns false when full or closed.
    fn try_push(&self, payload: Payload<T>) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        {
            let mut items = self.lock();
            if items.len() >= self.capacity {
                return false;
            }
            items.push_back(payload);
        }
        self.notify.notify_one();
        true
    }

    /// Wait for the next payload. `None` once closed.
    async fn pop(&self) -> Option<Payload<T>> {
        loop {
            let notified = self.notify.notified();
            if let Some(payload) = self.lock().pop_front() {
                return Some(payload);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            notified.await;
        }
    }

    fn drain(&self) -> usize {
        let mut items = self.lock();
        let count = items.len();
        items.clear();
        count
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

struct UnitInner<T: Send + 'static> {
    name: String,
    state: StateManager,
    queue: PayloadQueue<T>,
    options: UnitOptions,
    work: Arc<dyn WorkFn<T>>,
    cancels: CancelRegistry,
    shutdown: CancellationToken,
    /// Serializes start/stop/destroy.
    lifecycle: Mutex<()>,
}

/// Handle to one background task runtime. Cheap to clone.
pub struct WorkerUnit<T: Send + 'static> {
    inner: Arc<UnitInner<T>>,
}

impl<T: Send + 'static> Clone for WorkerUnit<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> WorkerUnit<T> {
    /// Create a paused unit. `shutdown` is the process-wide stop signal.
    pub fn new(
        name: impl Into<String>,
        options: UnitOptions,
        work: Arc<dyn WorkFn<T>>,
        shutdown: CancellationToken,
    ) -> Self {
        let queue = PayloadQueue::new(options.queue_size);
        Self {
            inner: Arc::new(UnitInner {
                name: name.into(),
                state: StateManager::new(RunState::Paused),
                queue,
                options,
                work,
                cancels: CancelRegistry::new(),
                shutdown,
                lifecycle: Mutex::new(()),
            }),
        }
    }

    fn lifecycle(&self) -> MutexGuard<'_, ()> {
        self.inner.lifecycle.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn state(&self) -> RunState {
        self.inner.state.get()
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.is(RunState::Running)
    }

    /// Number of payloads waiting in the queue.
    pub fn queued(&self) -> usize {
        self.inner.queue.len()
    }

    /// Whether the queue has been closed by `destroy()`.
    pub fn is_closed(&self) -> bool {
        self.inner.queue.is_closed()
    }

    /// Spawn the control loop. No-op when running or destroyed.
    pub fn start(&self) {
        let _guard = self.lifecycle();
        if !self
            .inner
            .state
            .compare_and_change(RunState::Paused, RunState::Running)
        {
            return;
        }

        let delay = (self.inner.options.delay)();
        let interval = (self.inner.options.interval)();
        let token = CancellationToken::new();
        self.inner.cancels.set(LOOP_CANCEL_KEY, token.clone());

        tokio::spawn(control_loop(Arc::clone(&self.inner), token, delay, interval));
        info!(
            unit = %self.inner.name,
            delay_ms = delay.as_millis() as u64,
            interval_ms = interval.as_millis() as u64,
            "Worker unit started"
        );
    }

    /// Pause the unit and stop its loop. Idempotent.
    pub fn stop(&self) {
        let _guard = self.lifecycle();
        if self
            .inner
            .state
            .compare_and_change(RunState::Running, RunState::Paused)
        {
            self.inner.cancels.cancel(LOOP_CANCEL_KEY);
            info!(unit = %self.inner.name, "Worker unit stopped");
        }
    }

    /// Best-effort enqueue. Dropped when full or not running.
    pub fn push(&self, payload: Payload<T>) -> bool {
        if !self.is_running() {
            debug!(unit = %self.inner.name, "Push ignored: unit not running");
            return false;
        }
        let accepted = self.inner.queue.try_push(payload);
        if !accepted {
            debug!(unit = %self.inner.name, "Push dropped: queue full");
        }
        accepted
    }

    /// Invoke the work function directly, bypassing the queue.
    ///
    /// Returns `None` if the unit is not running.
    pub async fn call(&self, payload: Payload<T>) -> Option<bool> {
        if !self.is_running() {
            return None;
        }
        Some(self.inner.work.run(payload).await)
    }

    /// Discard everything queued. Returns how many payloads were dropped.
    pub fn flush(&self) -> usize {
        let dropped = self.inner.queue.drain();
        if dropped > 0 {
            debug!(unit = %self.inner.name, dropped, "Worker unit queue flushed");
        }
        dropped
    }

    /// Flush, then restart the loop if it was running.
    pub fn reset(&self) {
        self.flush();
        if self.is_running() {
            self.stop();
            self.start();
        }
    }

    /// Tear the unit down for good.
    pub fn destroy(&self) {
        let _guard = self.lifecycle();
        if self.inner.state.is_destroyed() {
            return;
        }
        self.inner.queue.drain();
        self.inner.state.change(RunState::Destroyed);
        self.inner.cancels.destroy();
        self.inner.queue.close();
        info!(unit = %self.inner.name, "Worker unit destroyed");
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn control_loop<T: Send + 'static>(
    inner: Arc<UnitInner<T>>,
    token: CancellationToken,
    delay: Duration,
    interval: Duration,
) {
    let mut ticker = (!interval.is_zero()).then(|| {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker
    });

    loop {
        tokio::select! {
            biased;
            _ = inner.shutdown.cancelled() => break,
            _ = token.cancelled() => break,
            _ = next_tick(&mut ticker) => {
                if !inner.queue.try_push(Payload::Tick) {
                    debug!(unit = %inner.name, "Tick dropped: queue full");
                }
            }
            payload = inner.queue.pop() => {
                let Some(payload) = payload else {
                    break;
                };
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if token.is_cancelled() || !inner.state.is(RunState::Running) {
                    continue;
                }
                inner.work.run(payload).await;
            }
        }
    }
    debug!(unit = %inner.name, "Worker unit loop exited");
}
