//! Inputs to a scaling evaluation.

use std::sync::Arc;

use serde::Serialize;

use fleetgrid_balancer::LoadBalancer;
use fleetgrid_registry::ServiceRegistry;

use crate::error::{ScaleError, ScaleResult};

/// Load figures for one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServiceLoad {
    pub healthy_instances: u32,
    pub total_requests: u64,
}

/// Where the autoscaler reads service load from.
pub trait MetricsSource: Send + Sync {
    fn service_load(&self, service: &str) -> ScaleResult<ServiceLoad>;
}

/// Healthy count from the registry, request count from the balancer.
pub struct FleetMetrics {
    registry: Arc<ServiceRegistry>,
    balancer: Arc<LoadBalancer>,
}

impl FleetMetrics {
    pub fn new(registry: Arc<ServiceRegistry>, balancer: Arc<LoadBalancer>) -> Self {
        Self { registry, balancer }
    }
}

impl MetricsSource for FleetMetrics {
    fn service_load(&self, service: &str) -> ScaleResult<ServiceLoad> {
        let health = self
            .registry
            .get_service_metrics(service)
            .ok_or_else(|| ScaleError::MissingMetrics(service.to_string()))?;

        Ok(ServiceLoad {
            healthy_instances: u32::try_from(health.healthy_count).unwrap_or(u32::MAX),
            total_requests: self.balancer.total_requests(service),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::{EventBus, Instance, Strategy};
    use fleetgrid_balancer::RequestContext;
    use fleetgrid_registry::{HealthSettings, ProbeResult};
    use std::time::Duration;

    #[test]
    fn combines_registry_and_balancer() {
        let registry = Arc::new(ServiceRegistry::new(EventBus::new(), HealthSettings::default()));
        registry.register_service(
            "api",
            vec![Instance::new("a", "h", 1), Instance::new("b", "h", 2)],
        );
        registry.apply_probe_result("api", "b", ProbeResult::Failed, Duration::ZERO);

        let balancer = Arc::new(LoadBalancer::new(registry.clone(), Strategy::RoundRobin));
        for _ in 0..5 {
            balancer.select_instance("api", &RequestContext::default()).unwrap();
        }

        let source = FleetMetrics::new(registry, balancer);
        let load = source.service_load("api").unwrap();
        assert_eq!(
            load,
            ServiceLoad {
                healthy_instances: 1,
                total_requests: 5
            }
        );
    }

    #[test]
    fn unknown_service_is_missing_metrics() {
        let registry = Arc::new(ServiceRegistry::new(EventBus::new(), HealthSettings::default()));
        let balancer = Arc::new(LoadBalancer::new(registry.clone(), Strategy::RoundRobin));
        let source = FleetMetrics::new(registry, balancer);

        assert!(matches!(
            source.service_load("ghost"),
            Err(ScaleError::MissingMetrics(_))
        ));
    }
}
