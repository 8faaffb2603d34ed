//! Explicitly constructed orchestration context.
//!
//! Bundles the debouncer, dispatcher, worker manager and fetcher manager
//! under one root shutdown token. Hosts construct one and pass it by
//! reference to whatever needs to trigger work.

use std::hash::Hash;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::OrchestratorConfig;
use crate::debounce::Debouncer;
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::fetcher::Fetcher;
use crate::worker::Worker;

/// Worker payloads of type `T`, fetch items of type `I`, fetch outputs of type `O`.
pub struct Orchestrator<T, I, O>
where
    T: Send + 'static,
    I: Eq + Hash + Clone + Send + Sync + 'static,
    O: Send + 'static,
{
    debouncer: Arc<Debouncer>,
    dispatcher: Arc<Dispatcher>,
    worker: Worker<T>,
    fetcher: Fetcher<I, O>,
    shutdown: CancellationToken,
}

impl<T, I, O> Orchestrator<T, I, O>
where
    T: Send + 'static,
    I: Eq + Hash + Clone + Send + Sync + 'static,
    O: Send + 'static,
{
    /// Build every component and start the dispatcher. Needs a tokio runtime.
    pub fn new(config: OrchestratorConfig) -> Self {
        let shutdown = CancellationToken::new();
        let debouncer = Debouncer::new();

        let dispatcher = Arc::new(Dispatcher::new(config.dispatcher.clone()));
        dispatcher.start();

        let worker = Worker::new(config.worker.clone(), Arc::clone(&debouncer), shutdown.clone());
        let fetcher = Fetcher::new(Arc::clone(&dispatcher));

        info!(
            max_concurrent = config.dispatcher.max_concurrent,
            buffer = config.dispatcher.buffer,
            "Orchestrator started"
        );

        Self {
            debouncer,
            dispatcher,
            worker,
            fetcher,
            shutdown,
        }
    }

    /// Build from `TASKWEAVE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let config = OrchestratorConfig::from_env()?;
        Ok(Self::new(config))
    }

    pub fn debouncer(&self) -> &Arc<Debouncer> {
        &self.debouncer
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn worker(&self) -> &Worker<T> {
        &self.worker
    }

    pub fn fetcher(&self) -> &Fetcher<I, O> {
        &self.fetcher
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Stop everything. Idempotent.
    pub fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();
        self.debouncer.cancel_all();
        self.worker.destroy();
        self.fetcher.destroy();
        self.dispatcher.shutdown();
        info!("Orchestrator shut down");
    }
}

impl<T, I, O> Drop for Orchestrator<T, I, O>
where
    T: Send + 'static,
    I: Eq + Hash + Clone + Send + Sync + 'static,
    O: Send + 'static,
{
    fn drop(&mut self) {
        self.shutdown();
    }
}
