//! Load balancer — one healthy instance per request.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tracing::{debug, info, warn};

use fleet_core::{Instance, Strategy};
use fleetgrid_registry::{HealthCandidate, ServiceRegistry};

use crate::counters::{RoundRobinCounter, WeightedCursor};
use crate::error::{BalancerError, BalancerResult};
use crate::metrics::{SelectionMetrics, SelectionMetricsSnapshot};
use crate::strategy;

/// Per-request inputs to selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub client_ip: Option<String>,
}

impl RequestContext {
    pub fn from_ip(ip: impl Into<String>) -> Self {
        Self {
            client_ip: Some(ip.into()),
        }
    }
}

/// Selection state for one service.
#[derive(Default)]
struct ServiceSlot {
    round_robin: RoundRobinCounter,
    weighted: WeightedCursor,
    metrics: SelectionMetrics,
}

/// Routes requests for a service to one of its healthy instances.
pub struct LoadBalancer {
    registry: Arc<ServiceRegistry>,
    strategy: Strategy,
    slots: RwLock<HashMap<String, Arc<ServiceSlot>>>,
    shut_down: AtomicBool,
}

impl LoadBalancer {
    pub fn new(registry: Arc<ServiceRegistry>, strategy: Strategy) -> Self {
        info!(%strategy, "load balancer initialized");
        Self {
            registry,
            strategy,
            slots: RwLock::new(HashMap::new()),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    /// Select one healthy instance of `service`.
    ///
    /// The selection is counted and the instance's in-flight count is
    /// raised until `release` is called for it.
    pub fn select_instance(&self, service: &str, ctx: &RequestContext) -> BalancerResult<Instance> {
        if self.is_shut_down() {
            return Err(BalancerError::ShutDown);
        }

        let candidates = self.registry.healthy_candidates(service);
        if candidates.is_empty() {
            warn!(service, "no healthy instances");
            return Err(BalancerError::NoHealthyInstances(service.to_string()));
        }

        let slot = self.slot(service);
        let idx = self
            .pick_and_record(&slot, &candidates, ctx)
            .ok_or_else(|| BalancerError::NoHealthyInstances(service.to_string()))?;
        let chosen = candidates[idx].instance.clone();

        debug!(
            service,
            instance = %chosen.id,
            strategy = %self.strategy,
            healthy = candidates.len(),
            "instance selected"
        );
        Ok(chosen)
    }

    /// Pick an index into `candidates` and count the selection.
    fn pick_and_record(
        &self,
        slot: &ServiceSlot,
        candidates: &[HealthCandidate],
        ctx: &RequestContext,
    ) -> Option<usize> {
        let idx = match self.strategy {
            Strategy::RoundRobin => slot.round_robin.next(candidates.len()),
            Strategy::LeastConnections => {
                // Read and record under one lock.
                let ids: Vec<&str> = candidates.iter().map(|c| c.instance.id.as_str()).collect();
                return slot.metrics.select_by_in_flight(&ids, |in_flight| {
                    let counts: Vec<u64> = candidates
                        .iter()
                        .zip(in_flight)
                        .map(|(c, active)| c.instance.current_connections.saturating_add(*active))
                        .collect();
                    strategy::least_connections(&counts)
                });
            }
            Strategy::WeightedRoundRobin => {
                let weights: Vec<u64> = candidates
                    .iter()
                    .map(|c| c.instance.effective_weight())
                    .collect();
                slot.weighted.next(&weights)
            }
            Strategy::IpHash => {
                strategy::ip_hash_index(ctx.client_ip.as_deref(), candidates.len())
            }
            Strategy::LeastResponseTime => {
                let times: Vec<_> = candidates.iter().map(|c| c.response_time).collect();
                strategy::least_response_time(&times)
            }
            Strategy::FirstHealthy => Some(0),
        }?;
        slot.metrics.record_selection(&candidates.get(idx)?.instance.id);
        Some(idx)
    }

    /// Count a failed request against an instance. Health is not affected.
    ///
    /// Reports for instances the registry does not know are dropped.
    pub fn report_failure(&self, service: &str, instance_id: &str) {
        if self.registry.get_health(service, instance_id).is_none() {
            debug!(service, instance = instance_id, "failure for unknown instance ignored");
            return;
        }
        self.slot(service).metrics.record_failure(instance_id);
        debug!(service, instance = instance_id, "request failure reported");
    }

    /// Mark a previously selected request as finished.
    pub fn release(&self, service: &str, instance_id: &str) {
        if let Some(slot) = self.existing_slot(service) {
            slot.metrics.release(instance_id);
        }
    }

    /// Requests routed for `service` since startup.
    pub fn total_requests(&self, service: &str) -> u64 {
        self.existing_slot(service)
            .map(|slot| slot.metrics.total_requests())
            .unwrap_or(0)
    }

    pub fn selection_metrics(&self, service: &str) -> Option<SelectionMetricsSnapshot> {
        self.existing_slot(service).map(|slot| slot.metrics.snapshot())
    }

    pub fn all_selection_metrics(&self) -> BTreeMap<String, SelectionMetricsSnapshot> {
        let slots = self.slots.read().expect("balancer lock");
        slots
            .iter()
            .map(|(name, slot)| (name.clone(), slot.metrics.snapshot()))
            .collect()
    }

    /// Drop metrics for services and instances no longer registered.
    ///
    /// Stats otherwise persist after deregistration. Returns the number of
    /// service slots and instance entries removed.
    pub fn prune_stale(&self) -> usize {
        let mut slots = self.slots.write().expect("balancer lock");
        let before = slots.len();
        slots.retain(|service, _| self.registry.contains_service(service));
        let mut removed = before - slots.len();

        for (service, slot) in slots.iter() {
            removed += slot
                .metrics
                .retain(|id| self.registry.get_health(service, id).is_some());
        }
        if removed > 0 {
            debug!(removed, "stale selection metrics pruned");
        }
        removed
    }

    /// Refuse all further selections.
    pub fn shutdown(&self) {
        if !self.shut_down.swap(true, Ordering::SeqCst) {
            info!("load balancer shut down");
        }
    }

    /// Accept selections again after `shutdown`.
    pub fn reopen(&self) {
        if self.shut_down.swap(false, Ordering::SeqCst) {
            info!("load balancer reopened");
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    fn existing_slot(&self, service: &str) -> Option<Arc<ServiceSlot>> {
        let slots = self.slots.read().expect("balancer lock");
        slots.get(service).cloned()
    }

    fn slot(&self, service: &str) -> Arc<ServiceSlot> {
        if let Some(slot) = self.existing_slot(service) {
            return slot;
        }
        let mut slots = self.slots.write().expect("balancer lock");
        slots.entry(service.to_string()).or_default().clone()
    }
}
