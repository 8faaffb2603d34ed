//! Worker system: named background units behind a registry.
//!
//! Core components:
//! - `unit`: single task runtime (bounded queue, ticker, pre-delay, state machine)
//! - `manager`: tag registry, condition gating, call modes, last-run tracking

pub mod manager;
pub mod unit;

pub use manager::{CallMode, ConditionFn, UnitStatus, Worker, WorkerRegistration};
pub use unit::{DurationFn, Payload, UnitOptions, WorkFn, WorkerUnit};
