//! fleetgrid-registry — the authoritative instance set for every service.
//!
//! Tracks the instances registered under each service name together with
//! a `HealthRecord` per instance, and runs a periodic health-check cycle
//! that probes every instance through an injected probe function.
//!
//! # Architecture
//!
//! ```text
//! ServiceRegistry
//!   ├── service name → ServiceEntry
//!   │   ├── ordered instances (+ optional HealthProbe each)
//!   │   └── instance id → HealthRecord
//!   ├── check_all()  probes concurrently (semaphore cap + per-probe timeout)
//!   ├── run()        health-check loop, stopped by a watch signal
//!   └── EventBus     ServiceRegistered / InstanceDeregistered /
//!                    InstanceUnhealthy / InstanceRecovered
//! ```
//!
//! The registry is the only writer of health state. Readers get
//! point-in-time snapshots; a selection may act on health up to one
//! check interval stale.
//!
//! Instances registered without a probe are assumed healthy and are never
//! dispatched to the prober.

pub mod checker;
pub mod monitor;
pub mod probe;
pub mod registry;

pub use checker::{HealthTransition, apply_probe};
pub use monitor::MIN_CHECK_INTERVAL;
pub use probe::{HealthProbe, ProbeFuture, ProbeResult, probe_fn};
pub use registry::{
    CheckSummary, HealthCandidate, HealthSettings, Registration, ServiceHealthMetrics,
    ServiceRegistry,
};
