//! Named async-operation registry with fan-out/fan-in over the dispatcher.
//!
//! `call` runs one handler on its own task and hands the result to the
//! registration's callback. `dispatch` fans a batch of items out as one
//! dispatcher job each and invokes a single callback once every job is done.
//! In the batch result map a missing key means "not attempted" (condition
//! failed or job dropped), distinct from a present entry carrying an error.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::join_all;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dispatcher::Dispatcher;
use crate::error::FetchError;
use crate::state::{RunState, StateManager};
use crate::worker::ConditionFn;

/// Outcome of one fetch, tagged with the registration it came from.
#[derive(Debug)]
pub struct FetchResult<O> {
    pub code: i64,
    pub data: Option<O>,
    pub error: Option<anyhow::Error>,
    pub source: String,
}

impl<O> FetchResult<O> {
    pub fn ok(data: O) -> Self {
        Self {
            data: Some(data),
            ..Self::default()
        }
    }

    pub fn with_code(code: i64, data: O) -> Self {
        Self {
            code,
            data: Some(data),
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<anyhow::Error>) -> Self {
        let mut result = Self::default();
        result.set_error(error);
        result
    }

    pub fn set_source(&mut self, source: impl Into<String>) {
        self.source = source.into();
    }

    /// Attach an error. A zero code becomes -1.
    pub fn set_error(&mut self, error: impl Into<anyhow::Error>) {
        self.error = Some(error.into());
        if self.code == 0 {
            self.code = -1;
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

impl<O> Default for FetchResult<O> {
    fn default() -> Self {
        Self {
            code: 0,
            data: None,
            error: None,
            source: String::new(),
        }
    }
}

/// Asynchronous fetch handler.
#[async_trait]
pub trait FetchHandler<I: Send + 'static, O: Send + 'static>: Send + Sync {
    async fn fetch(&self, item: I) -> anyhow::Result<FetchResult<O>>;
}

#[async_trait]
impl<I, O, F, Fut> FetchHandler<I, O> for F
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<FetchResult<O>>> + Send + 'static,
{
    async fn fetch(&self, item: I) -> anyhow::Result<FetchResult<O>> {
        (self)(item).await
    }
}

type Callback<O> = Arc<dyn Fn(FetchResult<O>) + Send + Sync>;

struct Registration<I: Send + 'static, O: Send + 'static> {
    delay: Duration,
    handler: Arc<dyn FetchHandler<I, O>>,
    callback: Callback<O>,
    condition: ConditionFn,
}

impl<I: Send + 'static, O: Send + 'static> Clone for Registration<I, O> {
    fn clone(&self) -> Self {
        Self {
            delay: self.delay,
            handler: Arc::clone(&self.handler),
            callback: Arc::clone(&self.callback),
            condition: Arc::clone(&self.condition),
        }
    }
}

fn panic_reason(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run a handler, folding errors and panics into the result.
async fn run_handler<I: Send + 'static, O: Send + 'static>(
    tag: &str,
    handler: &dyn FetchHandler<I, O>,
    item: I,
) -> FetchResult<O> {
    let mut result = match AssertUnwindSafe(handler.fetch(item)).catch_unwind().await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            warn!(tag = %tag, error = %e, "Fetch handler failed");
            FetchResult::failed(e)
        }
        Err(panic) => {
            let reason = panic_reason(panic);
            warn!(tag = %tag, reason = %reason, "Fetch handler panicked");
            FetchResult::failed(FetchError::HandlerPanicked {
                tag: tag.to_string(),
                reason,
            })
        }
    };
    result.set_source(tag);
    result
}

/// Registry of named fetch operations.
pub struct Fetcher<I: Send + 'static, O: Send + 'static> {
    dispatcher: Arc<Dispatcher>,
    state: StateManager,
    registrations: RwLock<HashMap<String, Registration<I, O>>>,
}

impl<I, O> Fetcher<I, O>
where
    I: Eq + Hash + Clone + Send + Sync + 'static,
    O: Send + 'static,
{
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            state: StateManager::new(RunState::Running),
            registrations: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Registration<I, O>>> {
        self.registrations.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Registration<I, O>>> {
        self.registrations.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register (or overwrite) the operation for `tag`.
    ///
    /// `delay` is waited before the handler runs in [`Fetcher::call`].
    pub fn register(
        &self,
        tag: impl Into<String>,
        delay: Duration,
        handler: impl FetchHandler<I, O> + 'static,
        callback: impl Fn(FetchResult<O>) + Send + Sync + 'static,
        condition: impl Fn() -> bool + Send + Sync + 'static,
    ) {
        if self.state.is_destroyed() {
            return;
        }
        let tag = tag.into();
        let registration = Registration {
            delay,
            handler: Arc::new(handler),
            callback: Arc::new(callback),
            condition: Arc::new(condition),
        };
        if self.write().insert(tag.clone(), registration).is_some() {
            info!(tag = %tag, "Fetcher re-registered");
        } else {
            info!(tag = %tag, "Fetcher registered");
        }
    }

    pub fn deregister(&self, tag: &str) {
        if self.write().remove(tag).is_some() {
            info!(tag = %tag, "Fetcher deregistered");
        }
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

    fn registration(&self, tag: &str) -> Option<Registration<I, O>> {
        self.read().get(tag).cloned()
    }

    /// Fire-and-forget: run `tag`'s handler on `item` and pass the result to
    /// its callback. No-op when the condition fails.
    pub fn call(&self, tag: &str, item: I) {
        if self.state.is_destroyed() {
            return;
        }
        let Some(registration) = self.registration(tag) else {
            debug!(tag = %tag, "Call ignored: unknown fetcher");
            return;
        };
        if !(registration.condition)() {
            debug!(tag = %tag, "Skipped: condition not met");
            return;
        }

        let tag = tag.to_string();
        tokio::spawn(async move {
            if !registration.delay.is_zero() {
                tokio::time::sleep(registration.delay).await;
            }
            let result = run_handler(&tag, registration.handler.as_ref(), item).await;
            (registration.callback)(result);
        });
    }

    /// Fan `payloads` out over the dispatcher and join on the results.
    ///
    /// Items under tags whose condition fails right now are dropped entirely.
    /// `preprocess` gets the eligible item count before anything is
    /// submitted; `callback` gets the full result map exactly once, after
    /// every submitted job has finished. Returns once everything is submitted.
    pub async fn dispatch<P, C>(&self, payloads: HashMap<String, Vec<I>>, preprocess: P, callback: C)
    where
        P: FnOnce(usize) + Send,
        C: FnOnce(HashMap<I, FetchResult<O>>) + Send + 'static,
    {
        if self.state.is_destroyed() {
            return;
        }
        let batch = Uuid::new_v4();

        let mut eligible = Vec::with_capacity(payloads.len());
        for (tag, items) in payloads {
            match self.registration(&tag) {
                Some(registration) if (registration.condition)() => {
                    eligible.push((tag, registration, items));
                }
                Some(_) => {
                    debug!(%batch, tag = %tag, dropped = items.len(), "Skipped: condition not met");
                }
                None => {
                    debug!(%batch, tag = %tag, dropped = items.len(), "Skipped: unknown fetcher");
                }
            }
        }

        let total: usize = eligible.iter().map(|(_, _, items)| items.len()).sum();
        preprocess(total);
        debug!(%batch, total, "Dispatching fetch batch");

        let results = Arc::new(Mutex::new(HashMap::with_capacity(total)));
        let mut done = Vec::with_capacity(total);

        for (tag, registration, items) in eligible {
            for item in items {
                let (done_tx, done_rx) = oneshot::channel::<()>();
                done.push(done_rx);

                let tag = tag.clone();
                let handler = Arc::clone(&registration.handler);
                let results = Arc::clone(&results);
                self.dispatcher
                    .submit(async move {
                        let result = run_handler(&tag, handler.as_ref(), item.clone()).await;
                        results
                            .lock()
                            .unwrap_or_else(|e| e.into_inner())
                            .insert(item, result);
                        let _ = done_tx.send(());
                    })
                    .await;
            }
        }

        tokio::spawn(async move {
            // A dropped job closes its channel, which also counts as done.
            join_all(done).await;
            let results = std::mem::take(&mut *results.lock().unwrap_or_else(|e| e.into_inner()));
            debug!(%batch, completed = results.len(), "Fetch batch complete");
            callback(results);
        });
    }

    /// Drop every registration. Later calls are no-ops.
    pub fn destroy(&self) {
        if self.state.is_destroyed() {
            return;
        }
        self.state.change(RunState::Destroyed);
        let count = {
            let mut registrations = self.write();
            let count = registrations.len();
            registrations.clear();
            count
        };
        info!(count, "Fetcher destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.is_destroyed()
    }
}
