//! fleetgrid-balancer — picks one healthy instance per request.
//!
//! The `LoadBalancer` reads a point-in-time snapshot of a service's
//! healthy instances from the `ServiceRegistry` and applies the strategy
//! it was built with:
//!
//! | strategy               | choice                                              |
//! |------------------------|-----------------------------------------------------|
//! | `round-robin`          | atomic per-service counter mod healthy count        |
//! | `least-connections`    | lowest baseline + in-flight connections             |
//! | `weighted-round-robin` | cumulative-weight walk over a per-service cursor    |
//! | `ip-hash`              | sum of client IP octets mod healthy count           |
//! | `least-response-time`  | smallest last probe latency, unmeasured = +∞        |
//! | `first-healthy`        | first healthy instance                              |
//!
//! Every selection is counted per service and per instance. Failures the
//! caller reports are counted too, but never change health; only the
//! registry flips the healthy flag.

pub mod balancer;
pub mod counters;
pub mod error;
pub mod metrics;
pub mod strategy;

pub use balancer::{LoadBalancer, RequestContext};
pub use counters::{RoundRobinCounter, WeightedCursor};
pub use error::{BalancerError, BalancerResult};
pub use metrics::{InstanceSelectionStats, SelectionMetricsSnapshot};
