//! Error types for taskweave.
//!
//! The runtime API is tombstone-style and does not return errors; these cover
//! configuration loading and the fetch path.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors attached to fetch results by the fetcher itself.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Fetch handler {tag} panicked: {reason}")]
    HandlerPanicked { tag: String, reason: String },
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
