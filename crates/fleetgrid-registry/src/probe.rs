//! Health probe plumbing.
//!
//! A probe is an async closure supplied by whoever registers an instance.
//! It resolves to `Ok(true)` when the instance is healthy; `Ok(false)`,
//! an error, or a timeout all count as a failed check.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Boxed future returned by a `HealthProbe`.
pub type ProbeFuture = Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send>>;

/// Injected health check for a single instance.
pub type HealthProbe = Arc<dyn Fn() -> ProbeFuture + Send + Sync>;

/// Wrap an async closure as a `HealthProbe`.
pub fn probe_fn<F, Fut>(f: F) -> HealthProbe
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
{
    Arc::new(move || Box::pin(f()))
}

/// Result of a single health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    /// The probe reported the instance healthy.
    Healthy,
    /// The probe reported the instance unhealthy.
    Unhealthy,
    /// The probe returned an error.
    Failed,
    /// The probe did not finish within the timeout.
    TimedOut,
}

impl ProbeResult {
    pub fn is_healthy(self) -> bool {
        self == ProbeResult::Healthy
    }
}

/// Run a probe under `timeout`, returning its result and how long it took.
pub async fn execute_probe(probe: &HealthProbe, timeout: Duration) -> (ProbeResult, Duration) {
    let started = Instant::now();
    let result = match tokio::time::timeout(timeout, probe()).await {
        Ok(Ok(true)) => ProbeResult::Healthy,
        Ok(Ok(false)) => ProbeResult::Unhealthy,
        Ok(Err(e)) => {
            debug!(error = %e, "health probe failed");
            ProbeResult::Failed
        }
        Err(_) => {
            debug!(timeout_ms = timeout.as_millis() as u64, "health probe timed out");
            ProbeResult::TimedOut
        }
    };
    (result, started.elapsed())
}
