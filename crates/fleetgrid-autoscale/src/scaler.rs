//! Autoscaler — evaluates scaling policies and emits decisions.
//!
//! Each evaluation reads `ServiceLoad` from a `MetricsSource`, checks the
//! service's cooldown against the last recorded `ScalingEvent`, and
//! applies the policy thresholds. Decisions are appended to a bounded
//! per-service history and published as `FleetEvent::AutoScaling`.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use fleet_core::{
    EventBus, FleetEvent, ScalingAction, ScalingEvent, ScalingPolicy, ScalingPolicyOverrides,
    SharedClock, system_clock,
};

use crate::error::{ScaleError, ScaleResult};
use crate::metrics::{MetricsSource, ServiceLoad};

/// Default number of events kept per service.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Shortest period the evaluation loop will tick at.
pub const MIN_EVALUATION_INTERVAL: Duration = Duration::from_millis(1);

/// Outcome of applying a policy to a load reading.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalingDecision {
    pub action: ScalingAction,
    pub current_instances: u32,
    pub target_instances: u32,
    pub utilization: f64,
    pub reason: String,
}

/// Policy and recent decisions for one service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScalingStatus {
    pub policy: ScalingPolicy,
    pub history_len: usize,
    pub last_event: Option<ScalingEvent>,
}

struct ServiceScaling {
    policy: ScalingPolicy,
    history: VecDeque<ScalingEvent>,
}

impl ServiceScaling {
    fn in_cooldown(&self, now_ms: u64) -> bool {
        let cooldown_ms = self.policy.cooldown.as_millis() as u64;
        self.history
            .back()
            .is_some_and(|last| now_ms.saturating_sub(last.timestamp) < cooldown_ms)
    }
}

/// Requests routed per healthy instance.
///
/// With no healthy instances any traffic reads as unbounded load.
pub fn utilization(load: &ServiceLoad) -> f64 {
    if load.healthy_instances == 0 {
        if load.total_requests > 0 {
            f64::INFINITY
        } else {
            0.0
        }
    } else {
        load.total_requests as f64 / f64::from(load.healthy_instances)
    }
}

/// Apply `policy` to `load`. Cooldown is not considered here.
pub fn decide(policy: &ScalingPolicy, load: &ServiceLoad) -> Option<ScalingDecision> {
    let healthy = load.healthy_instances;
    let util = utilization(load);

    if util > policy.scale_up_threshold && healthy < policy.max_instances {
        let target = healthy
            .saturating_add(policy.scale_up_by)
            .min(policy.max_instances)
            .max(policy.min_instances);
        return Some(ScalingDecision {
            action: ScalingAction::ScaleUp,
            current_instances: healthy,
            target_instances: target,
            utilization: util,
            reason: format!(
                "utilization {util:.1} above scale-up threshold {}",
                policy.scale_up_threshold
            ),
        });
    }

    if util < policy.scale_down_threshold && healthy > policy.min_instances {
        let target = healthy
            .saturating_sub(policy.scale_down_by)
            .max(policy.min_instances)
            .min(policy.max_instances);
        return Some(ScalingDecision {
            action: ScalingAction::ScaleDown,
            current_instances: healthy,
            target_instances: target,
            utilization: util,
            reason: format!(
                "utilization {util:.1} below scale-down threshold {}",
                policy.scale_down_threshold
            ),
        });
    }

    None
}

/// Evaluates scaling policies on its own schedule.
pub struct AutoScaler {
    source: Arc<dyn MetricsSource>,
    events: EventBus,
    clock: SharedClock,
    history_limit: usize,
    services: RwLock<BTreeMap<String, ServiceScaling>>,
}

impl AutoScaler {
    pub fn new(source: Arc<dyn MetricsSource>, events: EventBus) -> Self {
        Self::with_clock(source, events, system_clock())
    }

    pub fn with_clock(source: Arc<dyn MetricsSource>, events: EventBus, clock: SharedClock) -> Self {
        Self {
            source,
            events,
            clock,
            history_limit: DEFAULT_HISTORY_LIMIT,
            services: RwLock::new(BTreeMap::new()),
        }
    }

    /// Keep at most `limit` events per service (minimum 1).
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    /// Merge `overrides` over the default policy and attach it to `service`.
    ///
    /// Replacing a policy keeps the service's history, so an active cooldown
    /// survives the change.
    pub fn add_scaling_policy(
        &self,
        service: &str,
        overrides: &ScalingPolicyOverrides,
    ) -> ScaleResult<ScalingPolicy> {
        let policy = ScalingPolicy::from_overrides(overrides);
        self.set_policy(service, policy.clone())?;
        Ok(policy)
    }

    /// Attach a fully specified policy to `service`.
    pub fn set_policy(&self, service: &str, policy: ScalingPolicy) -> ScaleResult<()> {
        policy.validate().map_err(|reason| ScaleError::InvalidPolicy {
            service: service.to_string(),
            reason,
        })?;

        info!(
            service,
            min = policy.min_instances,
            max = policy.max_instances,
            cooldown_secs = policy.cooldown.as_secs(),
            "scaling policy added"
        );

        let mut services = self.services.write().expect("autoscaler lock");
        match services.get_mut(service) {
            Some(existing) => existing.policy = policy,
            None => {
                services.insert(
                    service.to_string(),
                    ServiceScaling {
                        policy,
                        history: VecDeque::new(),
                    },
                );
            }
        }
        Ok(())
    }

    pub fn remove_scaling_policy(&self, service: &str) -> bool {
        let mut services = self.services.write().expect("autoscaler lock");
        services.remove(service).is_some()
    }

    pub fn policy(&self, service: &str) -> Option<ScalingPolicy> {
        let services = self.services.read().expect("autoscaler lock");
        services.get(service).map(|s| s.policy.clone())
    }

    /// Evaluate one service. `Ok(None)` means no decision this cycle.
    pub fn evaluate(&self, service: &str) -> ScaleResult<Option<ScalingEvent>> {
        let now = self.clock.now_ms();
        let policy = {
            let services = self.services.read().expect("autoscaler lock");
            let Some(scaling) = services.get(service) else {
                return Ok(None);
            };
            if scaling.in_cooldown(now) {
                debug!(service, "in cooldown, skipping");
                return Ok(None);
            }
            scaling.policy.clone()
        };

        let load = self.source.service_load(service)?;
        let Some(decision) = decide(&policy, &load) else {
            debug!(
                service,
                healthy = load.healthy_instances,
                requests = load.total_requests,
                utilization = utilization(&load),
                "no scaling needed"
            );
            return Ok(None);
        };

        let event = ScalingEvent {
            timestamp: now,
            action: decision.action,
            current_instances: decision.current_instances,
            target_instances: decision.target_instances,
            reason: decision.reason,
        };

        {
            let mut services = self.services.write().expect("autoscaler lock");
            let Some(scaling) = services.get_mut(service) else {
                return Ok(None);
            };
            // Another evaluation may have decided while metrics were read.
            if scaling.in_cooldown(now) {
                return Ok(None);
            }
            scaling.history.push_back(event.clone());
            while scaling.history.len() > self.history_limit {
                scaling.history.pop_front();
            }
        }

        info!(
            service,
            action = %event.action,
            from = event.current_instances,
            to = event.target_instances,
            reason = %event.reason,
            "scaling decision"
        );
        self.events.emit(FleetEvent::AutoScaling {
            service: service.to_string(),
            action: event.action,
            current_instances: event.current_instances,
            target_instances: event.target_instances,
            reason: event.reason.clone(),
        });

        Ok(Some(event))
    }

    /// Evaluate every service with a policy.
    ///
    /// A failing service is logged and skipped; the rest are still evaluated.
    pub fn evaluate_all(&self) -> Vec<(String, ScalingEvent)> {
        let names: Vec<String> = {
            let services = self.services.read().expect("autoscaler lock");
            services.keys().cloned().collect()
        };

        let mut decisions = Vec::new();
        for name in names {
            match self.evaluate(&name) {
                Ok(Some(event)) => decisions.push((name, event)),
                Ok(None) => {}
                Err(e) => warn!(service = %name, error = %e, "scaling evaluation failed"),
            }
        }
        decisions
    }

    pub fn history(&self, service: &str) -> Vec<ScalingEvent> {
        let services = self.services.read().expect("autoscaler lock");
        services
            .get(service)
            .map(|s| s.history.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Policy, history size and latest decision for every service.
    pub fn get_scaling_metrics(&self) -> BTreeMap<String, ScalingStatus> {
        let services = self.services.read().expect("autoscaler lock");
        services
            .iter()
            .map(|(name, s)| {
                (
                    name.clone(),
                    ScalingStatus {
                        policy: s.policy.clone(),
                        history_len: s.history.len(),
                        last_event: s.history.back().cloned(),
                    },
                )
            })
            .collect()
    }

    /// Run the autoscaler loop until `shutdown` is set to `true`.
    ///
    /// An interval below `MIN_EVALUATION_INTERVAL` is raised to it.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let interval = if interval < MIN_EVALUATION_INTERVAL {
            warn!(
                interval_ms = interval.as_millis() as u64,
                "autoscale interval too short, clamping"
            );
            MIN_EVALUATION_INTERVAL
        } else {
            interval
        };
        info!(interval_ms = interval.as_millis() as u64, "autoscaler started");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
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
                    let decisions = self.evaluate_all();
                    debug!(decisions = decisions.len(), "autoscaler cycle complete");
                }
            }
        }

        info!("autoscaler shutting down");
    }
}
