//! Control-plane events and the broadcast bus that carries them.
//!
//! Components publish state transitions on an `EventBus`; any number of
//! subscribers (loggers, alerting, a provisioning executor) can listen
//! without the publisher knowing about them. Publishing never blocks and
//! never fails when nobody is subscribed.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use crate::types::{InstanceId, ScalingAction};

/// Default number of buffered events per subscriber.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// A state transition observed by the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FleetEvent {
    /// Instances were registered (or re-registered) for a service.
    ServiceRegistered {
        service: String,
        instance_ids: Vec<InstanceId>,
    },
    /// An instance was removed from a service.
    InstanceDeregistered {
        service: String,
        instance_id: InstanceId,
    },
    /// A probe failure flipped an instance from healthy to unhealthy.
    InstanceUnhealthy {
        service: String,
        instance_id: InstanceId,
        error_count: u32,
    },
    /// A probe success flipped an instance from unhealthy to healthy.
    InstanceRecovered {
        service: String,
        instance_id: InstanceId,
    },
    /// The autoscaler decided the service should grow or shrink.
    AutoScaling {
        service: String,
        action: ScalingAction,
        current_instances: u32,
        target_instances: u32,
        reason: String,
    },
}

impl FleetEvent {
    /// Service the event is about.
    pub fn service(&self) -> &str {
        match self {
            FleetEvent::ServiceRegistered { service, .. }
            | FleetEvent::InstanceDeregistered { service, .. }
            | FleetEvent::InstanceUnhealthy { service, .. }
            | FleetEvent::InstanceRecovered { service, .. }
            | FleetEvent::AutoScaling { service, .. } => service,
        }
    }
}

/// Broadcast channel for `FleetEvent`s. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<FleetEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to all events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<FleetEvent> {
        self.tx.subscribe()
    }

    /// Publish an event to every current subscriber.
    pub fn emit(&self, event: FleetEvent) {
        if self.tx.send(event).is_err() {
            trace!("event dropped: no subscribers");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.emit(FleetEvent::InstanceRecovered {
            service: "api".to_string(),
            instance_id: "a".to_string(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.service(), "api");
    }

    #[test]
    fn emit_without_subscribers_is_silent() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        bus.emit(FleetEvent::InstanceDeregistered {
            service: "api".to_string(),
            instance_id: "a".to_string(),
        });
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = FleetEvent::AutoScaling {
            service: "api".to_string(),
            action: ScalingAction::ScaleUp,
            current_instances: 2,
            target_instances: 3,
            reason: "utilization 100.0 above 80.0".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "autoScaling");
        assert_eq!(json["action"], "scale-up");
    }
}
