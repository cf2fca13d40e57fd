//! fleetd — assembles the FleetGrid control plane.
//!
//! Builds one `ServiceRegistry`, one `LoadBalancer` and one `AutoScaler`
//! sharing an `EventBus`, then runs:
//! - the health-check loop
//! - the autoscaler loop
//! - an event logger that stands in for the provisioning executor
//!
//! All three stop on `ControlPlane::shutdown`, which also closes the
//! balancer to new selections.

pub mod control_plane;
pub mod events;

pub use control_plane::{ControlPlane, ControlPlaneSettings};
pub use events::log_events;
