//! fleet-core — shared types for the FleetGrid control plane.
//!
//! Holds the domain model used by the registry, the load balancer and the
//! autoscaler, plus the pieces they all need:
//!
//! - **`types`** — `Instance`, `HealthRecord`, `ScalingPolicy`, `ScalingEvent`
//! - **`event`** — `FleetEvent` and the broadcast-backed `EventBus`
//! - **`clock`** — wall-clock abstraction (`SystemClock`, `ManualClock`)
//! - **`config`** — `fleet.toml` parsing and duration strings

pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod types;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock, system_clock};
pub use config::{FleetConfig, parse_duration};
pub use error::{ConfigError, ConfigResult};
pub use event::{EventBus, FleetEvent};
pub use types::*;
