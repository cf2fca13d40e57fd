//! Load balancer error types.

use thiserror::Error;

/// Errors returned by `LoadBalancer::select_instance`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BalancerError {
    /// The registry reports zero healthy instances. Retry policy is the
    /// caller's decision.
    #[error("no healthy instances for service: {0}")]
    NoHealthyInstances(String),

    #[error("load balancer is shut down")]
    ShutDown,
}

pub type BalancerResult<T> = Result<T, BalancerError>;
