//! taskweave: in-process task orchestration core.

pub mod cancel;
pub mod config;
pub mod debounce;
pub mod dispatcher;
pub mod error;
pub mod fetcher;
pub mod orchestrator;
pub mod state;
pub mod worker;

pub use cancel::CancelRegistry;
pub use config::{DispatcherConfig, OrchestratorConfig, WorkerConfig};
pub use debounce::Debouncer;
pub use dispatcher::{Dispatcher, DispatcherStats};
pub use error::{ConfigError, Error, FetchError, Result};
pub use fetcher::{FetchHandler, FetchResult, Fetcher};
pub use orchestrator::Orchestrator;
pub use state::{RunState, StateManager};
pub use worker::{CallMode, Payload, WorkFn, Worker, WorkerRegistration, WorkerUnit};
