//! Domain types for the FleetGrid control plane.
//!
//! Instances and scaling policies are serializable so they can be declared
//! in `fleet.toml` and rendered as JSON by the daemon.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Unique identifier for an instance within a service.
pub type InstanceId = String;

// ── Instance ──────────────────────────────────────────────────────

/// One addressable backend unit of a named service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instance {
    pub id: InstanceId,
    pub host: String,
    pub port: u16,
    /// Relative weight for weighted round-robin.
    #[serde(default = "default_weight")]
    pub weight: u32,
    /// Baseline connection count reported by the owner of the instance.
    #[serde(default)]
    pub current_connections: u64,
    /// Free-form labels; never read by selection logic.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

fn default_weight() -> u32 {
    1
}

impl Instance {
    /// Create an instance with weight 1 and no metadata.
    pub fn new(id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            port,
            weight: 1,
            current_connections: 0,
            metadata: HashMap::new(),
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_connections(mut self, connections: u64) -> Self {
        self.current_connections = connections;
        self
    }

    /// Full address string.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Weight used by weighted round-robin; zero counts as one.
    pub fn effective_weight(&self) -> u64 {
        u64::from(self.weight.max(1))
    }
}

// ── Health ────────────────────────────────────────────────────────

/// Health state of a single registered instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthRecord {
    pub healthy: bool,
    /// Epoch millis of the last completed probe.
    pub last_check: Option<u64>,
    /// Duration of the last successful probe.
    pub response_time: Option<Duration>,
    /// Incremented on failure, decremented (floored at 0) on success.
    pub error_count: u32,
}

impl HealthRecord {
    /// A freshly registered instance starts healthy with no errors.
    pub fn new() -> Self {
        Self {
            healthy: true,
            last_check: None,
            response_time: None,
            error_count: 0,
        }
    }
}

impl Default for HealthRecord {
    fn default() -> Self {
        Self::new()
    }
}

// ── Load balancing ────────────────────────────────────────────────

/// Instance selection algorithm used by a load balancer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    #[default]
    RoundRobin,
    LeastConnections,
    WeightedRoundRobin,
    IpHash,
    LeastResponseTime,
    /// Always the first healthy instance.
    FirstHealthy,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::RoundRobin => "round-robin",
            Strategy::LeastConnections => "least-connections",
            Strategy::WeightedRoundRobin => "weighted-round-robin",
            Strategy::IpHash => "ip-hash",
            Strategy::LeastResponseTime => "least-response-time",
            Strategy::FirstHealthy => "first-healthy",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "round-robin" => Ok(Strategy::RoundRobin),
            "least-connections" => Ok(Strategy::LeastConnections),
            "weighted-round-robin" | "weighted" => Ok(Strategy::WeightedRoundRobin),
            "ip-hash" => Ok(Strategy::IpHash),
            "least-response-time" => Ok(Strategy::LeastResponseTime),
            "first-healthy" => Ok(Strategy::FirstHealthy),
            _ => Err(ConfigError::UnknownStrategy(s.to_string())),
        }
    }
}

// ── Scaling ───────────────────────────────────────────────────────

/// Thresholds and bounds governing a service's autoscaling.
///
/// Utilization thresholds are in the same unit as the utilization signal
/// (requests per healthy instance).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScalingPolicy {
    pub min_instances: u32,
    pub max_instances: u32,
    pub target_utilization: f64,
    pub scale_up_threshold: f64,
    pub scale_down_threshold: f64,
    pub cooldown: Duration,
    pub scale_up_by: u32,
    pub scale_down_by: u32,
}

impl Default for ScalingPolicy {
    fn default() -> Self {
        Self {
            min_instances: 1,
            max_instances: 10,
            target_utilization: 70.0,
            scale_up_threshold: 80.0,
            scale_down_threshold: 30.0,
            cooldown: Duration::from_secs(300),
            scale_up_by: 1,
            scale_down_by: 1,
        }
    }
}

impl ScalingPolicy {
    /// Merge the supplied fields over the defaults.
    pub fn from_overrides(overrides: &ScalingPolicyOverrides) -> Self {
        let d = Self::default();
        Self {
            min_instances: overrides.min_instances.unwrap_or(d.min_instances),
            max_instances: overrides.max_instances.unwrap_or(d.max_instances),
            target_utilization: overrides.target_utilization.unwrap_or(d.target_utilization),
            scale_up_threshold: overrides.scale_up_threshold.unwrap_or(d.scale_up_threshold),
            scale_down_threshold: overrides
                .scale_down_threshold
                .unwrap_or(d.scale_down_threshold),
            cooldown: overrides.cooldown.unwrap_or(d.cooldown),
            scale_up_by: overrides.scale_up_by.unwrap_or(d.scale_up_by),
            scale_down_by: overrides.scale_down_by.unwrap_or(d.scale_down_by),
        }
    }

    /// Check that the policy can only produce targets inside `[min, max]`.
    pub fn validate(&self) -> Result<(), String> {
        if self.min_instances > self.max_instances {
            return Err(format!(
                "min_instances ({}) exceeds max_instances ({})",
                self.min_instances, self.max_instances
            ));
        }
        if self.scale_down_threshold > self.scale_up_threshold {
            return Err(format!(
                "scale_down_threshold ({}) exceeds scale_up_threshold ({})",
                self.scale_down_threshold, self.scale_up_threshold
            ));
        }
        if self.scale_up_threshold.is_nan() || self.scale_down_threshold.is_nan() {
            return Err("thresholds must be numbers".to_string());
        }
        Ok(())
    }
}

/// Partial scaling policy; unset fields fall back to the defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScalingPolicyOverrides {
    pub min_instances: Option<u32>,
    pub max_instances: Option<u32>,
    pub target_utilization: Option<f64>,
    pub scale_up_threshold: Option<f64>,
    pub scale_down_threshold: Option<f64>,
    pub cooldown: Option<Duration>,
    pub scale_up_by: Option<u32>,
    pub scale_down_by: Option<u32>,
}

/// Direction of a scaling decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScalingAction {
    ScaleUp,
    ScaleDown,
}

impl fmt::Display for ScalingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalingAction::ScaleUp => f.write_str("scale-up"),
            ScalingAction::ScaleDown => f.write_str("scale-down"),
        }
    }
}

/// A scaling decision recorded in a service's history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScalingEvent {
    /// Epoch millis when the decision was taken.
    pub timestamp: u64,
    pub action: ScalingAction,
    pub current_instances: u32,
    pub target_instances: u32,
    pub reason: String,
}
