//! Configuration types.

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Dispatcher pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Capacity of the submission queue. Fixed once the dispatcher is initialized.
    pub buffer: usize,
    /// Maximum number of jobs running at once.
    pub max_concurrent: usize,
    /// Pause held by a slot after its job completes.
    #[serde(with = "millis")]
    pub delay: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            buffer: 1000,
            max_concurrent: 4,
            delay: Duration::from_millis(16),
        }
    }
}

/// Worker manager configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Quiescence window for `CallMode::Debounced`.
    #[serde(with = "millis")]
    pub debounce_window: Duration,
    /// Queue size used when a registration doesn't set one.
    pub default_queue_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            debounce_window: Duration::from_millis(500),
            default_queue_size: 16,
        }
    }
}

/// Configuration for a whole orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub dispatcher: DispatcherConfig,
    pub worker: WorkerConfig,
}

impl OrchestratorConfig {
    /// Build from `TASKWEAVE_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(v) = parse_var::<usize>(&lookup, "TASKWEAVE_DISPATCH_BUFFER")? {
            config.dispatcher.buffer = v;
        }
        if let Some(v) = parse_var::<usize>(&lookup, "TASKWEAVE_DISPATCH_MAX_CONCURRENT")? {
            config.dispatcher.max_concurrent = v;
        }
        if let Some(v) = parse_var::<u64>(&lookup, "TASKWEAVE_DISPATCH_DELAY_MS")? {
            config.dispatcher.delay = Duration::from_millis(v);
        }
        if let Some(v) = parse_var::<u64>(&lookup, "TASKWEAVE_DEBOUNCE_MS")? {
            config.worker.debounce_window = Duration::from_millis(v);
        }
        if let Some(v) = parse_var::<usize>(&lookup, "TASKWEAVE_DEFAULT_QUEUE_SIZE")? {
            config.worker.default_queue_size = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("dispatcher.buffer", self.dispatcher.buffer),
            ("dispatcher.max_concurrent", self.dispatcher.max_concurrent),
            ("worker.default_queue_size", self.worker.default_queue_size),
        ];
        for (key, value) in checks {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: "must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{raw:?}: {e}"),
            }),
    }
}

/// Durations as integer milliseconds.
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
