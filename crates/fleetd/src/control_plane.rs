//! Control plane — wires the registry, balancer and autoscaler together
//! and owns their background loops.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use fleet_core::{EventBus, FleetConfig, SharedClock, Strategy, system_clock};
use fleetgrid_autoscale::{AutoScaler, FleetMetrics};
use fleetgrid_balancer::LoadBalancer;
use fleetgrid_registry::{HealthSettings, ServiceRegistry};

use crate::events::log_events;

/// Intervals and limits for the control plane.
#[derive(Debug, Clone)]
pub struct ControlPlaneSettings {
    pub health_interval: Duration,
    pub health: HealthSettings,
    pub strategy: Strategy,
    pub autoscale_interval: Duration,
    pub history_limit: usize,
    /// Spawn the event logger alongside the loops.
    pub log_events: bool,
}

impl Default for ControlPlaneSettings {
    fn default() -> Self {
        Self {
            health_interval: Duration::from_secs(10),
            health: HealthSettings::default(),
            strategy: Strategy::RoundRobin,
            autoscale_interval: Duration::from_secs(30),
            history_limit: 100,
            log_events: true,
        }
    }
}

impl ControlPlaneSettings {
    /// Validate `config` and read its loop settings.
    pub fn from_config(config: &FleetConfig) -> anyhow::Result<Self> {
        config.validate()?;
        Ok(Self {
            health_interval: config.health.interval()?,
            health: HealthSettings {
                probe_timeout: config.health.probe_timeout()?,
                max_concurrent_probes: config.health.max_concurrent_probes,
            },
            strategy: config.balancer.strategy()?,
            autoscale_interval: config.autoscale.interval()?,
            history_limit: config.autoscale.history_limit,
            log_events: true,
        })
    }
}

/// The assembled control plane.
pub struct ControlPlane {
    settings: ControlPlaneSettings,
    events: EventBus,
    registry: Arc<ServiceRegistry>,
    balancer: Arc<LoadBalancer>,
    autoscaler: Arc<AutoScaler>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl ControlPlane {
    pub fn new(settings: ControlPlaneSettings) -> Self {
        Self::with_clock(settings, system_clock())
    }

    /// Build with an explicit clock for health timestamps and cooldowns.
    pub fn with_clock(settings: ControlPlaneSettings, clock: SharedClock) -> Self {
        let events = EventBus::new();
        let registry = Arc::new(ServiceRegistry::with_clock(
            events.clone(),
            settings.health.clone(),
            clock.clone(),
        ));
        let balancer = Arc::new(LoadBalancer::new(registry.clone(), settings.strategy));
        let metrics = Arc::new(FleetMetrics::new(registry.clone(), balancer.clone()));
        let autoscaler = Arc::new(
            AutoScaler::with_clock(metrics, events.clone(), clock)
                .with_history_limit(settings.history_limit),
        );
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            settings,
            events,
            registry,
            balancer,
            autoscaler,
            shutdown_tx,
            tasks: Vec::new(),
        }
    }

    /// Build from a parsed config, registering its services and policies.
    pub fn from_config(config: &FleetConfig) -> anyhow::Result<Self> {
        let plane = Self::new(ControlPlaneSettings::from_config(config)?);

        for service in &config.services {
            plane
                .registry
                .register_service(&service.name, service.instances.clone());
            if let Some(scaling) = &service.scaling {
                plane
                    .autoscaler
                    .add_scaling_policy(&service.name, &scaling.to_overrides()?)?;
            }
        }
        Ok(plane)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub fn balancer(&self) -> &Arc<LoadBalancer> {
        &self.balancer
    }

    pub fn autoscaler(&self) -> &Arc<AutoScaler> {
        &self.autoscaler
    }

    pub fn is_running(&self) -> bool {
        !self.tasks.is_empty()
    }

    /// Spawn the health-check and autoscaler loops. No-op if running.
    ///
    /// Starting again after `shutdown` reopens the balancer.
    pub fn start(&mut self) {
        if self.is_running() {
            warn!("control plane already running");
            return;
        }
        self.shutdown_tx.send_replace(false);
        self.balancer.reopen();

        let registry = self.registry.clone();
        let interval = self.settings.health_interval;
        let shutdown = self.shutdown_tx.subscribe();
        self.tasks.push(tokio::spawn(async move {
            registry.run(interval, shutdown).await;
        }));

        let autoscaler = self.autoscaler.clone();
        let interval = self.settings.autoscale_interval;
        let shutdown = self.shutdown_tx.subscribe();
        self.tasks.push(tokio::spawn(async move {
            autoscaler.run(interval, shutdown).await;
        }));

        if self.settings.log_events {
            let rx = self.events.subscribe();
            let shutdown = self.shutdown_tx.subscribe();
            self.tasks.push(tokio::spawn(log_events(rx, shutdown)));
        }

        info!(
            health_interval_ms = self.settings.health_interval.as_millis() as u64,
            autoscale_interval_ms = self.settings.autoscale_interval.as_millis() as u64,
            strategy = %self.settings.strategy,
            "control plane started"
        );
    }

    /// Stop every loop and close the balancer.
    ///
    /// When this returns no probe, selection or scaling evaluation will be
    /// dispatched again.
    pub async fn shutdown(&mut self) {
        self.balancer.shutdown();
        self.shutdown_tx.send_replace(true);

        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "control plane task ended abnormally");
            }
        }
        info!("control plane stopped");
    }
}
