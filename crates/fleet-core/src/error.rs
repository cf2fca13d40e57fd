//! Configuration error types.

use thiserror::Error;

/// Result type alias for configuration parsing.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or validating a `fleet.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid duration: {0:?}")]
    InvalidDuration(String),

    #[error("unknown balancing strategy: {0:?}")]
    UnknownStrategy(String),

    #[error("invalid scaling policy for {service}: {reason}")]
    InvalidPolicy { service: String, reason: String },

    #[error("duplicate service in config: {0}")]
    DuplicateService(String),
}
