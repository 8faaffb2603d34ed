//! Bounded-concurrency job pool shared across callers.
//!
//! Jobs go into one bounded FIFO channel. A single dispatch loop pulls them
//! off, waits for a semaphore slot and runs each job on its own task. A slot
//! is held for `delay` after its job finishes, which paces bursts.
//!
//! Configuration: `buffer` only applies before [`Dispatcher::init`] because a
//! live channel is never resized. `max_concurrent` and `delay` apply live.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use tokio::sync::{Semaphore, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DispatcherConfig;

type Job = BoxFuture<'static, ()>;

/// Point-in-time counters for a dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatcherStats {
    pub queued: usize,
    pub in_flight: usize,
    pub completed: u64,
    pub max_concurrent: usize,
    pub paused: bool,
}

#[derive(Default)]
struct Counters {
    queued: AtomicUsize,
    in_flight: AtomicUsize,
    completed: AtomicU64,
    delay_nanos: AtomicU64,
}

impl Counters {
    fn delay(&self) -> Duration {
        Duration::from_nanos(self.delay_nanos.load(Ordering::Relaxed))
    }

    fn set_delay(&self, delay: Duration) {
        let nanos = u64::try_from(delay.as_nanos()).unwrap_or(u64::MAX);
        self.delay_nanos.store(nanos, Ordering::Relaxed);
    }

    /// Saturates at zero; shutdown may have already reset the count.
    fn dequeued(&self) {
        let _ = self
            .queued
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }
}

struct Inner {
    config: DispatcherConfig,
    tx: Option<mpsc::Sender<Job>>,
    rx: Option<mpsc::Receiver<Job>>,
    semaphore: Option<Arc<Semaphore>>,
    /// Jobs submitted before `init`.
    pending: Vec<Job>,
    started: bool,
    shut_down: bool,
}

/// Shared bounded-concurrency executor.
pub struct Dispatcher {
    inner: Mutex<Inner>,
    counters: Arc<Counters>,
    paused: watch::Sender<bool>,
    shutdown: CancellationToken,
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig) -> Self {
        let counters = Counters::default();
        counters.set_delay(config.delay);
        let (paused, _) = watch::channel(false);

        Self {
            inner: Mutex::new(Inner {
                config,
                tx: None,
                rx: None,
                semaphore: None,
                pending: Vec::new(),
                started: false,
                shut_down: false,
            }),
            counters: Arc::new(counters),
            paused,
            shutdown: CancellationToken::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create the queue and semaphore, flushing anything submitted earlier.
    ///
    /// The queue is sized to hold at least the pre-init backlog.
    pub fn init(&self) {
        let mut inner = self.lock();
        if inner.tx.is_some() || inner.shut_down {
            return;
        }

        let capacity = inner.config.buffer.max(inner.pending.len()).max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let backlog = inner.pending.len();
        for job in inner.pending.drain(..) {
            if tx.try_send(job).is_err() {
                self.counters.dequeued();
            }
        }

        let max_concurrent = inner.config.max_concurrent.max(1);
        inner.semaphore = Some(Arc::new(Semaphore::new(max_concurrent)));
        inner.tx = Some(tx);
        inner.rx = Some(rx);

        info!(capacity, max_concurrent, backlog, "Dispatcher initialized");
    }

    /// Spawn the dispatch loop. Initializes first if needed; idempotent.
    pub fn start(&self) {
        self.init();

        let (rx, semaphore) = {
            let mut inner = self.lock();
            if inner.started || inner.shut_down {
                return;
            }
            let (Some(rx), Some(semaphore)) = (inner.rx.take(), inner.semaphore.clone()) else {
                return;
            };
            inner.started = true;
            (rx, semaphore)
        };

        tokio::spawn(dispatch_loop(
            rx,
            semaphore,
            self.paused.subscribe(),
            self.shutdown.clone(),
            Arc::clone(&self.counters),
        ));
        debug!("Dispatch loop started");
    }

    /// Queue `job` for execution.
    ///
    /// Waits while the queue is full. Must not be awaited from the dispatch
    /// loop itself.
    pub async fn submit<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let job: Job = job.boxed();
        let tx = {
            let mut inner = self.lock();
            if inner.shut_down {
                warn!("Dispatcher shut down, dropping submitted job");
                return;
            }
            self.counters.queued.fetch_add(1, Ordering::Relaxed);
            match &inner.tx {
                Some(tx) => tx.clone(),
                None => {
                    inner.pending.push(job);
                    return;
                }
            }
        };

        if tx.send(job).await.is_err() {
            self.counters.dequeued();
            warn!("Dispatcher queue closed, dropping submitted job");
        }
    }

    /// Hold back queued jobs. Running jobs are unaffected.
    pub fn pause(&self) {
        if !self.paused.send_replace(true) {
            info!("Dispatcher paused");
        }
    }

    pub fn resume(&self) {
        if self.paused.send_replace(false) {
            info!("Dispatcher resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Set the queue capacity. Ignored by a dispatcher that is already initialized.
    pub fn set_buffer(&self, buffer: usize) {
        let mut inner = self.lock();
        if inner.tx.is_some() {
            debug!(buffer, "Dispatcher already initialized, buffer change deferred");
        }
        inner.config.buffer = buffer;
    }

    /// Resize the concurrency bound, growing or shrinking the live semaphore.
    pub fn set_max_concurrent(&self, max_concurrent: usize) {
        if max_concurrent == 0 {
            warn!("Ignoring max_concurrent of 0");
            return;
        }

        let mut inner = self.lock();
        let old = inner.config.max_concurrent;
        inner.config.max_concurrent = max_concurrent;
        let Some(semaphore) = inner.semaphore.clone() else {
            return;
        };
        drop(inner);

        if max_concurrent > old {
            semaphore.add_permits(max_concurrent - old);
        } else if max_concurrent < old {
            let shrink = old - max_concurrent;
            let remaining = shrink - semaphore.forget_permits(shrink);
            // The rest are retired as running jobs hand their slots back.
            if remaining > 0
                && let Ok(handle) = tokio::runtime::Handle::try_current()
            {
                let permits = u32::try_from(remaining).unwrap_or(u32::MAX);
                handle.spawn(async move {
                    if let Ok(permit) = semaphore.acquire_many_owned(permits).await {
                        permit.forget();
                    }
                });
            }
        }
        info!(old, new = max_concurrent, "Dispatcher concurrency resized");
    }

    /// Set the post-completion delay. Applies from the next completion.
    pub fn set_delay(&self, delay: Duration) {
        self.lock().config.delay = delay;
        self.counters.set_delay(delay);
    }

    pub fn config(&self) -> DispatcherConfig {
        self.lock().config.clone()
    }

    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            queued: self.counters.queued.load(Ordering::Relaxed),
            in_flight: self.counters.in_flight.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            max_concurrent: self.lock().config.max_concurrent,
            paused: self.is_paused(),
        }
    }

    /// Stop the dispatch loop. Queued jobs are dropped; running jobs finish.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        let mut inner = self.lock();
        if inner.shut_down {
            return;
        }
        inner.shut_down = true;
        inner.tx = None;
        inner.rx = None;
        inner.pending.clear();
        self.counters.queued.store(0, Ordering::Relaxed);
        info!("Dispatcher shut down");
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DispatcherConfig::default())
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Block while paused. Returns false if the dispatcher went away.
async fn wait_resumed(paused: &mut watch::Receiver<bool>) -> bool {
    loop {
        let is_paused = *paused.borrow_and_update();
        if !is_paused {
            return true;
        }
        if paused.changed().await.is_err() {
            return false;
        }
    }
}

async fn dispatch_loop(
    mut rx: mpsc::Receiver<Job>,
    semaphore: Arc<Semaphore>,
    mut paused: watch::Receiver<bool>,
    shutdown: CancellationToken,
    counters: Arc<Counters>,
) {
    loop {
        let resumed = tokio::select! {
            _ = shutdown.cancelled() => false,
            resumed = wait_resumed(&mut paused) => resumed,
        };
        if !resumed {
            break;
        }

        let job = tokio::select! {
            _ = shutdown.cancelled() => None,
            job = rx.recv() => job,
        };
        let Some(job) = job else {
            break;
        };
        counters.dequeued();

        // Paused between wake-up and dequeue: hold the job until resumed.
        let resumed = tokio::select! {
            _ = shutdown.cancelled() => false,
            resumed = wait_resumed(&mut paused) => resumed,
        };
        if !resumed {
            break;
        }

        let permit = tokio::select! {
            _ = shutdown.cancelled() => None,
            permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
        };
        let Some(permit) = permit else {
            break;
        };

        counters.in_flight.fetch_add(1, Ordering::Relaxed);
        let counters = Arc::clone(&counters);
        tokio::spawn(async move {
            let _permit = permit;
            if AssertUnwindSafe(job).catch_unwind().await.is_err() {
                warn!("Dispatched job panicked");
            }
            counters.in_flight.fetch_sub(1, Ordering::Relaxed);
            counters.completed.fetch_add(1, Ordering::Relaxed);

            let delay = counters.delay();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        });
    }
    debug!("Dispatch loop exited");
}
