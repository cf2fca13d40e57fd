//! fleetgrid-autoscale — utilization-driven scaling decisions.
//!
//! Evaluates every service that has a `ScalingPolicy` on a fixed interval
//! and emits scale-up / scale-down decisions. It never creates or destroys
//! instances; an external listener on the `AutoScaling` event does that.
//!
//! # Scaling Algorithm
//!
//! ```text
//! skip if now - last_decision < cooldown
//!
//! utilization = total_requests / healthy_instances
//!
//! if utilization > scale_up_threshold and healthy < max:
//!     ScaleUp   to min(healthy + scale_up_by, max)
//! elif utilization < scale_down_threshold and healthy > min:
//!     ScaleDown to max(healthy - scale_down_by, min)
//! ```
//!
//! Utilization here is requests routed per healthy instance, a stand-in
//! for real CPU or memory pressure. Any `MetricsSource` can replace it.

pub mod error;
pub mod metrics;
pub mod scaler;

pub use error::{ScaleError, ScaleResult};
pub use metrics::{FleetMetrics, MetricsSource, ServiceLoad};
pub use scaler::{AutoScaler, MIN_EVALUATION_INTERVAL, ScalingDecision, ScalingStatus, decide};
