//! Event logger.
//!
//! Subscribes to the control-plane `EventBus` and writes every event to the
//! log. Scaling decisions are only logged; acting on them is left to an
//! external executor.

use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use fleet_core::FleetEvent;

/// Log events from `rx` until shutdown or until every publisher is gone.
pub async fn log_events(
    mut rx: broadcast::Receiver<FleetEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            received = rx.recv() => match received {
                Ok(event) => log_event(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event logger lagged behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    debug!("event logger stopped");
}

fn log_event(event: &FleetEvent) {
    match event {
        FleetEvent::ServiceRegistered {
            service,
            instance_ids,
        } => info!(%service, instances = instance_ids.len(), "event: service registered"),
        FleetEvent::InstanceDeregistered {
            service,
            instance_id,
        } => info!(%service, instance = %instance_id, "event: instance deregistered"),
        FleetEvent::InstanceUnhealthy {
            service,
            instance_id,
            error_count,
        } => warn!(%service, instance = %instance_id, error_count, "event: instance unhealthy"),
        FleetEvent::InstanceRecovered {
            service,
            instance_id,
        } => info!(%service, instance = %instance_id, "event: instance recovered"),
        FleetEvent::AutoScaling {
            service,
            action,
            current_instances,
            target_instances,
            reason,
        } => info!(
            %service,
            %action,
            from = current_instances,
            to = target_instances,
            %reason,
            "event: scaling requested"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::EventBus;

    #[tokio::test]
    async fn stops_on_shutdown() {
        let bus = EventBus::new();
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(log_events(bus.subscribe(), rx));

        bus.emit(FleetEvent::InstanceRecovered {
            service: "api".to_string(),
            instance_id: "a".to_string(),
        });
        tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn stops_when_bus_is_dropped() {
        let bus = EventBus::new();
        let (_tx, rx) = watch::channel(false);
        let task = tokio::spawn(log_events(bus.subscribe(), rx));
        drop(bus);
        task.await.unwrap();
    }
}
