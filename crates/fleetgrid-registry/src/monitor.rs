//! Health-check loop.
//!
//! Runs `check_all()` on a fixed interval, independent of request traffic,
//! until the shutdown signal flips. A cycle interrupted by shutdown is
//! dropped, which aborts its outstanding probes.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::registry::ServiceRegistry;

/// Shortest period the loop will tick at.
pub const MIN_CHECK_INTERVAL: Duration = Duration::from_millis(1);

impl ServiceRegistry {
    /// Run the health-check loop until `shutdown` is set to `true`.
    ///
    /// An interval below `MIN_CHECK_INTERVAL` is raised to it.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let interval = if interval < MIN_CHECK_INTERVAL {
            warn!(
                interval_ms = interval.as_millis() as u64,
                "health check interval too short, clamping"
            );
            MIN_CHECK_INTERVAL
        } else {
            interval
        };

        info!(
            interval_ms = interval.as_millis() as u64,
            max_concurrent_probes = self.settings().max_concurrent_probes,
            "health checker started"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; wait a full interval before probing.
        ticker.tick().await;

        'checks: loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let cycle = self.check_all();
                    tokio::pin!(cycle);
                    loop {
                        tokio::select! {
                            biased;
                            changed = shutdown.changed() => {
                                if changed.is_err() || *shutdown.borrow() {
                                    break 'checks;
                                }
                            }
                            summary = &mut cycle => {
                                debug!(
                                    probed = summary.probed,
                                    failed = summary.failed,
                                    became_unhealthy = summary.became_unhealthy,
                                    recovered = summary.recovered,
                                    "health check cycle complete"
                                );
                                break;
                            }
                        }
                    }
                }
            }
        }

        info!("health checker shutting down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::probe_fn;
    use crate::registry::{HealthSettings, Registration};
    use fleet_core::{EventBus, Instance};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counted_registry(calls: Arc<AtomicUsize>) -> Arc<ServiceRegistry> {
        let reg = Arc::new(ServiceRegistry::new(EventBus::new(), HealthSettings::default()));
        reg.register_with_probes(
            "api",
            vec![Registration::new(Instance::new("A", "h", 1)).with_probe(probe_fn(move || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(true)
                }
            }))],
        );
        reg
    }

    #[tokio::test(start_paused = true)]
    async fn probes_once_per_interval() {
        let calls = Arc::new(AtomicUsize::new(0));
        let reg = counted_registry(calls.clone());
        let (tx, rx) = watch::channel(false);

        let task = {
            let reg = reg.clone();
            tokio::spawn(async move { reg.run(Duration::from_secs(10), rx).await })
        };

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn no_probes_after_shutdown() {
        let calls = Arc::new(AtomicUsize::new(0));
        let reg = counted_registry(calls.clone());
        let (tx, rx) = watch::channel(false);

        let task = {
            let reg = reg.clone();
            tokio::spawn(async move { reg.run(Duration::from_secs(1), rx).await })
        };

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        tx.send(true).unwrap();
        task.await.unwrap();
        let after_stop = calls.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test]
    async fn exits_immediately_when_already_shut_down() {
        let reg = Arc::new(ServiceRegistry::new(EventBus::new(), HealthSettings::default()));
        let (tx, rx) = watch::channel(true);
        reg.run(Duration::from_secs(3600), rx).await;
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_is_clamped() {
        let calls = Arc::new(AtomicUsize::new(0));
        let reg = counted_registry(calls.clone());
        let (tx, rx) = watch::channel(false);

        let task = {
            let reg = reg.clone();
            tokio::spawn(async move { reg.run(Duration::ZERO, rx).await })
        };

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(calls.load(Ordering::SeqCst) >= 1);

        tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn false_signal_does_not_cut_a_cycle_short() {
        let calls = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));
        let reg = Arc::new(ServiceRegistry::new(EventBus::new(), HealthSettings::default()));
        {
            let calls = calls.clone();
            let finished = finished.clone();
            reg.register_with_probes(
                "api",
                vec![Registration::new(Instance::new("A", "h", 1)).with_probe(probe_fn(
                    move || {
                        let calls = calls.clone();
                        let finished = finished.clone();
                        async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(500)).await;
                            finished.fetch_add(1, Ordering::SeqCst);
                            Ok(true)
                        }
                    },
                ))],
            );
        }
        let (tx, rx) = watch::channel(false);

        let task = {
            let reg = reg.clone();
            tokio::spawn(async move { reg.run(Duration::from_secs(10), rx).await })
        };

        // Mid-cycle: the check started at 10s and is still sleeping.
        tokio::time::sleep(Duration::from_millis(10_200)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        tx.send(false).unwrap();

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert!(!task.is_finished());

        tx.send(true).unwrap();
        task.await.unwrap();
    }
}
