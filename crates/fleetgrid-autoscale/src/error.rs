//! Autoscaler error types.

use thiserror::Error;

/// Errors raised while managing policies or evaluating a service.
#[derive(Debug, Error)]
pub enum ScaleError {
    #[error("no metrics for service: {0}")]
    MissingMetrics(String),

    #[error("invalid scaling policy for {service}: {reason}")]
    InvalidPolicy { service: String, reason: String },

    #[error(transparent)]
    Metrics(#[from] anyhow::Error),
}

pub type ScaleResult<T> = Result<T, ScaleError>;
