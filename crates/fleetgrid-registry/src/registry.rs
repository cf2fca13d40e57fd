//! Service registry — instances and health records per service.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use fleet_core::{
    EventBus, FleetEvent, HealthRecord, Instance, InstanceId, SharedClock, system_clock,
};

use crate::checker::{HealthTransition, apply_probe};
use crate::probe::{HealthProbe, ProbeResult, execute_probe};

/// Limits applied to each health-check cycle.
#[derive(Debug, Clone)]
pub struct HealthSettings {
    /// Probes that run longer than this count as failures.
    pub probe_timeout: Duration,
    /// Upper bound on probes in flight at once, across all services.
    pub max_concurrent_probes: usize,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(2),
            max_concurrent_probes: 32,
        }
    }
}

/// An instance plus the probe used to check it.
#[derive(Clone)]
pub struct Registration {
    pub instance: Instance,
    pub probe: Option<HealthProbe>,
}

impl Registration {
    pub fn new(instance: Instance) -> Self {
        Self {
            instance,
            probe: None,
        }
    }

    pub fn with_probe(mut self, probe: HealthProbe) -> Self {
        self.probe = Some(probe);
        self
    }
}

impl From<Instance> for Registration {
    fn from(instance: Instance) -> Self {
        Self::new(instance)
    }
}

/// A healthy instance paired with its last measured probe latency.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthCandidate {
    pub instance: Instance,
    pub response_time: Option<Duration>,
}

/// Aggregate health view of one service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceHealthMetrics {
    pub instance_count: usize,
    pub healthy_count: usize,
    /// Mean over instances that have a recorded response time.
    pub avg_response_time: Option<Duration>,
    pub total_errors: u64,
}

/// What one health-check cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckSummary {
    pub probed: usize,
    pub failed: usize,
    pub became_unhealthy: usize,
    pub recovered: usize,
}

struct Slot {
    instance: Instance,
    probe: Option<HealthProbe>,
}

#[derive(Default)]
struct ServiceEntry {
    instances: Vec<Slot>,
    health: HashMap<InstanceId, HealthRecord>,
}

impl ServiceEntry {
    fn healthy(&self) -> impl Iterator<Item = (&Slot, &HealthRecord)> {
        self.instances.iter().filter_map(|slot| {
            self.health
                .get(&slot.instance.id)
                .filter(|record| record.healthy)
                .map(|record| (slot, record))
        })
    }
}

/// Owns the instance set and health state of every registered service.
pub struct ServiceRegistry {
    services: RwLock<HashMap<String, ServiceEntry>>,
    events: EventBus,
    clock: SharedClock,
    settings: HealthSettings,
    probe_slots: Arc<Semaphore>,
}

impl ServiceRegistry {
    /// Create a registry publishing on `events`, using the system clock.
    pub fn new(events: EventBus, settings: HealthSettings) -> Self {
        Self::with_clock(events, settings, system_clock())
    }

    pub fn with_clock(events: EventBus, settings: HealthSettings, clock: SharedClock) -> Self {
        let permits = settings.max_concurrent_probes.max(1);
        Self {
            services: RwLock::new(HashMap::new()),
            events,
            clock,
            settings,
            probe_slots: Arc::new(Semaphore::new(permits)),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn settings(&self) -> &HealthSettings {
        &self.settings
    }

    /// Upsert instances without probes. Existing probes are kept.
    pub fn register_service(&self, name: &str, instances: Vec<Instance>) {
        self.register_with_probes(name, instances.into_iter().map(Registration::new).collect());
    }

    /// Upsert instances. Known ids are replaced in place, new ids appended.
    ///
    /// A registration without a probe leaves any probe already attached to
    /// that id untouched.
    pub fn register_with_probes(&self, name: &str, registrations: Vec<Registration>) {
        let instance_ids: Vec<InstanceId> = registrations
            .iter()
            .map(|r| r.instance.id.clone())
            .collect();

        {
            let mut services = self.services.write().expect("registry lock");
            let entry = services.entry(name.to_string()).or_default();

            for reg in registrations {
                let id = reg.instance.id.clone();
                match entry.instances.iter_mut().find(|s| s.instance.id == id) {
                    Some(slot) => {
                        slot.instance = reg.instance;
                        if reg.probe.is_some() {
                            slot.probe = reg.probe;
                        }
                    }
                    None => entry.instances.push(Slot {
                        instance: reg.instance,
                        probe: reg.probe,
                    }),
                }
                entry.health.entry(id).or_default();
            }
        }

        info!(service = name, count = instance_ids.len(), "service registered");
        self.events.emit(FleetEvent::ServiceRegistered {
            service: name.to_string(),
            instance_ids,
        });
    }

    /// Remove one instance and its health record. Unknown names are ignored.
    ///
    /// Returns whether an instance was removed.
    pub fn deregister_service(&self, name: &str, instance_id: &str) -> bool {
        let removed = {
            let mut services = self.services.write().expect("registry lock");
            match services.get_mut(name) {
                Some(entry) => {
                    let before = entry.instances.len();
                    entry.instances.retain(|s| s.instance.id != instance_id);
                    entry.health.remove(instance_id);
                    entry.instances.len() != before
                }
                None => false,
            }
        };

        if removed {
            info!(service = name, instance = instance_id, "instance deregistered");
            self.events.emit(FleetEvent::InstanceDeregistered {
                service: name.to_string(),
                instance_id: instance_id.to_string(),
            });
        } else {
            debug!(service = name, instance = instance_id, "deregister of unknown instance ignored");
        }
        removed
    }

    /// Instances currently marked healthy, in registration order.
    pub fn get_healthy_instances(&self, name: &str) -> Vec<Instance> {
        let services = self.services.read().expect("registry lock");
        services
            .get(name)
            .map(|entry| entry.healthy().map(|(slot, _)| slot.instance.clone()).collect())
            .unwrap_or_default()
    }

    /// Healthy instances with their last successful probe latency.
    pub fn healthy_candidates(&self, name: &str) -> Vec<HealthCandidate> {
        let services = self.services.read().expect("registry lock");
        services
            .get(name)
            .map(|entry| {
                entry
                    .healthy()
                    .map(|(slot, record)| HealthCandidate {
                        instance: slot.instance.clone(),
                        response_time: record.response_time,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All instances of a service, healthy or not.
    pub fn get_instances(&self, name: &str) -> Vec<Instance> {
        let services = self.services.read().expect("registry lock");
        services
            .get(name)
            .map(|entry| entry.instances.iter().map(|s| s.instance.clone()).collect())
            .unwrap_or_default()
    }

    pub fn get_health(&self, name: &str, instance_id: &str) -> Option<HealthRecord> {
        let services = self.services.read().expect("registry lock");
        services.get(name)?.health.get(instance_id).cloned()
    }

    pub fn service_names(&self) -> Vec<String> {
        let services = self.services.read().expect("registry lock");
        let mut names: Vec<String> = services.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn contains_service(&self, name: &str) -> bool {
        let services = self.services.read().expect("registry lock");
        services.contains_key(name)
    }

    /// Instance count, healthy count, mean response time and error total.
    pub fn get_service_metrics(&self, name: &str) -> Option<ServiceHealthMetrics> {
        let services = self.services.read().expect("registry lock");
        let entry = services.get(name)?;

        let records: Vec<&HealthRecord> = entry
            .instances
            .iter()
            .filter_map(|s| entry.health.get(&s.instance.id))
            .collect();

        let timed: Vec<Duration> = records.iter().filter_map(|r| r.response_time).collect();
        let avg_response_time = if timed.is_empty() {
            None
        } else {
            Some(timed.iter().sum::<Duration>() / timed.len() as u32)
        };

        Some(ServiceHealthMetrics {
            instance_count: entry.instances.len(),
            healthy_count: records.iter().filter(|r| r.healthy).count(),
            avg_response_time,
            total_errors: records.iter().map(|r| u64::from(r.error_count)).sum(),
        })
    }

    /// Record one probe result for an instance.
    ///
    /// Returns `None` when the instance is no longer registered, which
    /// happens when it was deregistered while its probe was in flight.
    pub fn apply_probe_result(
        &self,
        name: &str,
        instance_id: &str,
        result: ProbeResult,
        elapsed: Duration,
    ) -> Option<Option<HealthTransition>> {
        let now = self.clock.now_ms();
        let (transition, error_count) = {
            let mut services = self.services.write().expect("registry lock");
            let record = services.get_mut(name)?.health.get_mut(instance_id)?;
            let transition = apply_probe(record, result, elapsed, now);
            (transition, record.error_count)
        };

        match transition {
            Some(HealthTransition::BecameUnhealthy) => {
                warn!(
                    service = name,
                    instance = instance_id,
                    ?result,
                    error_count,
                    "instance marked unhealthy"
                );
                self.events.emit(FleetEvent::InstanceUnhealthy {
                    service: name.to_string(),
                    instance_id: instance_id.to_string(),
                    error_count,
                });
            }
            Some(HealthTransition::Recovered) => {
                info!(service = name, instance = instance_id, "instance recovered");
                self.events.emit(FleetEvent::InstanceRecovered {
                    service: name.to_string(),
                    instance_id: instance_id.to_string(),
                });
            }
            None => {}
        }
        Some(transition)
    }

    /// Probe every instance that has a probe, concurrently.
    ///
    /// In-flight probes are capped by `max_concurrent_probes`; each probe is
    /// bounded by `probe_timeout`. Dropping the returned future aborts the
    /// probes still running.
    pub async fn check_all(&self) -> CheckSummary {
        let jobs: Vec<(String, InstanceId, HealthProbe)> = {
            let services = self.services.read().expect("registry lock");
            services
                .iter()
                .flat_map(|(name, entry)| {
                    entry.instances.iter().filter_map(move |slot| {
                        slot.probe
                            .clone()
                            .map(|probe| (name.clone(), slot.instance.id.clone(), probe))
                    })
                })
                .collect()
        };

        let mut probes = JoinSet::new();
        for (service, instance_id, probe) in jobs {
            let slots = Arc::clone(&self.probe_slots);
            let timeout = self.settings.probe_timeout;
            probes.spawn(async move {
                let _permit = slots.acquire_owned().await.ok();
                let (result, elapsed) = execute_probe(&probe, timeout).await;
                (service, instance_id, result, elapsed)
            });
        }

        let mut summary = CheckSummary::default();
        while let Some(joined) = probes.join_next().await {
            let (service, instance_id, result, elapsed) = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(error = %e, "health probe task aborted");
                    continue;
                }
            };

            debug!(
                service = %service,
                instance = %instance_id,
                ?result,
                elapsed_ms = elapsed.as_millis() as u64,
                "health probe finished"
            );

            let Some(transition) = self.apply_probe_result(&service, &instance_id, result, elapsed)
            else {
                debug!(service = %service, instance = %instance_id, "probe result discarded");
                continue;
            };

            summary.probed += 1;
            if !result.is_healthy() {
                summary.failed += 1;
            }
            match transition {
                Some(HealthTransition::BecameUnhealthy) => summary.became_unhealthy += 1,
                Some(HealthTransition::Recovered) => summary.recovered += 1,
                None => {}
            }
        }
        summary
    }
}
