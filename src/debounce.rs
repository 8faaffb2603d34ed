//! Per-key coalescing scheduler.
//!
//! `call(key, delay, job)` arms a timer for `key`. Another `call` on the same key
//! before the timer fires re-arms it and discards the previous job, so a burst
//! of calls yields at most one run: the last job, `delay` after the last call.
//!
//! Each pending key owns one task and one signalling channel. The task removes
//! its map entry before running the job, so a call arriving mid-run starts a
//! fresh task.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tracing::debug;

/// One scheduled run, replaced wholesale by the next call on its key.
struct Scheduled {
    delay: Duration,
    job: BoxFuture<'static, ()>,
}

enum Expiry {
    Rearm(Scheduled),
    Fire,
    Abandon,
}

struct KeyEntry {
    generation: u64,
    tx: mpsc::UnboundedSender<Scheduled>,
}

/// Debounces jobs per string key.
#[derive(Default)]
pub struct Debouncer {
    entries: Mutex<HashMap<String, KeyEntry>>,
    generation: AtomicU64,
}

impl Debouncer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, KeyEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Schedule `job` to run once `key` has been quiet for `delay`.
    pub fn call<F>(self: &Arc<Self>, key: impl Into<String>, delay: Duration, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let key = key.into();
        let mut scheduled = Scheduled {
            delay,
            job: job.boxed(),
        };

        let mut entries = self.lock();
        if let Some(entry) = entries.get(&key) {
            match entry.tx.send(scheduled) {
                Ok(()) => {
                    debug!(key = %key, "Debounce timer reset");
                    return;
                }
                // Task is gone; fall through and replace it.
                Err(mpsc::error::SendError(returned)) => scheduled = returned,
            }
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(scheduled);
        entries.insert(key.clone(), KeyEntry { generation, tx });
        drop(entries);

        tokio::spawn(Arc::clone(self).run_key(key, generation, rx));
    }

    /// Abort the pending call on `key`, if any.
    pub fn cancel(&self, key: &str) {
        if self.lock().remove(key).is_some() {
            debug!(key = %key, "Debounced call cancelled");
        }
    }

    /// Abort every pending call.
    pub fn cancel_all(&self) {
        let count = {
            let mut entries = self.lock();
            let count = entries.len();
            entries.clear();
            count
        };
        if count > 0 {
            debug!(count, "Cancelled all debounced calls");
        }
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    async fn run_key(
        self: Arc<Self>,
        key: String,
        generation: u64,
        mut rx: mpsc::UnboundedReceiver<Scheduled>,
    ) {
        let Some(mut current) = rx.recv().await else {
            return;
        };

        loop {
            tokio::select! {
                next = rx.recv() => match next {
                    Some(next) => current = next,
                    // Entry removed by cancel.
                    None => return,
                },
                _ = tokio::time::sleep(current.delay) => {
                    let expiry = {
                        let mut entries = self.lock();
                        // Senders only send while holding the lock, so an empty
                        // channel here means the burst is over.
                        if let Ok(next) = rx.try_recv() {
                            Expiry::Rearm(next)
                        } else if entries
                            .get(&key)
                            .is_some_and(|entry| entry.generation == generation)
                        {
                            entries.remove(&key);
                            Expiry::Fire
                        } else {
                            Expiry::Abandon
                        }
                    };

                    match expiry {
                        Expiry::Rearm(next) => current = next,
                        Expiry::Fire => {
                            debug!(key = %key, "Debounced call firing");
                            current.job.await;
                            return;
                        }
                        Expiry::Abandon => return,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn burst_runs_only_last_job() {
        let debouncer = Debouncer::new();
        let fired = Arc::new(Mutex::new(Vec::new()));
        let start = Instant::now();

        for i in 1..=3 {
            let fired = Arc::clone(&fired);
            debouncer.call("refresh", Duration::from_millis(50), async move {
                fired.lock().unwrap().push((i, Instant::now()));
            });
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        tokio::time::sleep(Duration::from_millis(200)).await;

        let fired = fired.lock().unwrap();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].0, 3);
        // Last call at ~20ms, so the run lands at >= 70ms.
        assert!(fired[0].1.duration_since(start) >= Duration::from_millis(70));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_run() {
        let debouncer = Debouncer::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&count);
        debouncer.call("refresh", Duration::from_millis(50), async move {
            c.fetch_add(1, Ordering::SeqCst);
        });
        debouncer.cancel("refresh");

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(!debouncer.is_pending("refresh"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_without_pending_is_noop() {
        let debouncer = Debouncer::new();
        debouncer.cancel("nothing");
        assert_eq!(debouncer.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn keys_are_independent() {
        let debouncer = Debouncer::new();
        let count = Arc::new(AtomicUsize::new(0));

        for key in ["a", "b"] {
            let c = Arc::clone(&count);
            debouncer.call(key, Duration::from_millis(30), async move {
                c.fetch_add(1, Ordering::SeqCst);
            });
        }
        debouncer.cancel("a");

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn key_is_reusable_after_firing() {
        let debouncer = Debouncer::new();
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let c = Arc::clone(&count);
            debouncer.call("k", Duration::from_millis(20), async move {
                c.fetch_add(1, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(debouncer.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_clears_every_key() {
        let debouncer = Debouncer::new();
        let count = Arc::new(AtomicUsize::new(0));

        for key in ["a", "b", "c"] {
            let c = Arc::clone(&count);
            debouncer.call(key, Duration::from_millis(30), async move {
                c.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(debouncer.pending_count(), 3);
        debouncer.cancel_all();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
