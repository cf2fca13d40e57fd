//! fleet.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};
use crate::types::{Instance, ScalingPolicy, ScalingPolicyOverrides, Strategy};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetConfig {
    #[serde(default)]
    pub health: HealthSection,
    #[serde(default)]
    pub balancer: BalancerSection,
    #[serde(default)]
    pub autoscale: AutoscaleSection,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSection {
    #[serde(default = "default_health_interval")]
    pub interval: String,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout: String,
    #[serde(default = "default_max_concurrent_probes")]
    pub max_concurrent_probes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalancerSection {
    #[serde(default = "default_strategy")]
    pub strategy: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoscaleSection {
    #[serde(default = "default_autoscale_interval")]
    pub interval: String,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    #[serde(default)]
    pub instances: Vec<Instance>,
    pub scaling: Option<ScalingConfig>,
}

/// Any subset of the scaling policy fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScalingConfig {
    pub min_instances: Option<u32>,
    pub max_instances: Option<u32>,
    pub target_utilization: Option<f64>,
    pub scale_up_threshold: Option<f64>,
    pub scale_down_threshold: Option<f64>,
    pub cooldown: Option<String>,
    pub scale_up_by: Option<u32>,
    pub scale_down_by: Option<u32>,
}

fn default_health_interval() -> String {
    "10s".to_string()
}

fn default_probe_timeout() -> String {
    "2s".to_string()
}

fn default_max_concurrent_probes() -> usize {
    32
}

fn default_strategy() -> String {
    "round-robin".to_string()
}

fn default_autoscale_interval() -> String {
    "30s".to_string()
}

fn default_history_limit() -> usize {
    100
}

impl Default for HealthSection {
    fn default() -> Self {
        Self {
            interval: default_health_interval(),
            probe_timeout: default_probe_timeout(),
            max_concurrent_probes: default_max_concurrent_probes(),
        }
    }
}

impl Default for BalancerSection {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
        }
    }
}

impl Default for AutoscaleSection {
    fn default() -> Self {
        Self {
            interval: default_autoscale_interval(),
            history_limit: default_history_limit(),
        }
    }
}

impl HealthSection {
    pub fn interval(&self) -> ConfigResult<Duration> {
        parse_duration(&self.interval)
    }

    pub fn probe_timeout(&self) -> ConfigResult<Duration> {
        parse_duration(&self.probe_timeout)
    }
}

impl BalancerSection {
    pub fn strategy(&self) -> ConfigResult<Strategy> {
        self.strategy.parse()
    }
}

impl AutoscaleSection {
    pub fn interval(&self) -> ConfigResult<Duration> {
        parse_duration(&self.interval)
    }
}

impl ScalingConfig {
    pub fn to_overrides(&self) -> ConfigResult<ScalingPolicyOverrides> {
        let cooldown = match &self.cooldown {
            Some(s) => Some(parse_duration(s)?),
            None => None,
        };
        Ok(ScalingPolicyOverrides {
            min_instances: self.min_instances,
            max_instances: self.max_instances,
            target_utilization: self.target_utilization,
            scale_up_threshold: self.scale_up_threshold,
            scale_down_threshold: self.scale_down_threshold,
            cooldown,
            scale_up_by: self.scale_up_by,
            scale_down_by: self.scale_down_by,
        })
    }
}

impl FleetConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: FleetConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every duration, the strategy name and each scaling policy.
    ///
    /// Loop intervals and the probe timeout must be non-zero.
    pub fn validate(&self) -> ConfigResult<()> {
        non_zero("health.interval", &self.health.interval, self.health.interval()?)?;
        non_zero(
            "health.probe_timeout",
            &self.health.probe_timeout,
            self.health.probe_timeout()?,
        )?;
        self.balancer.strategy()?;
        non_zero("autoscale.interval", &self.autoscale.interval, self.autoscale.interval()?)?;

        let mut seen = HashSet::new();
        for service in &self.services {
            if !seen.insert(service.name.as_str()) {
                return Err(ConfigError::DuplicateService(service.name.clone()));
            }
            if let Some(scaling) = &service.scaling {
                let policy = ScalingPolicy::from_overrides(&scaling.to_overrides()?);
                policy
                    .validate()
                    .map_err(|reason| ConfigError::InvalidPolicy {
                        service: service.name.clone(),
                        reason,
                    })?;
            }
        }
        Ok(())
    }
}

fn non_zero(field: &str, raw: &str, value: Duration) -> ConfigResult<()> {
    if value.is_zero() {
        return Err(ConfigError::InvalidDuration(format!(
            "{field} = {raw:?} must be greater than zero"
        )));
    }
    Ok(())
}

/// Parse a duration string like "5s", "500ms", "2m". A bare number is seconds.
pub fn parse_duration(s: &str) -> ConfigResult<Duration> {
    let t = s.trim();
    let parsed = if let Some(ms) = t.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = t.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = t.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else if let Some(hours) = t.strip_suffix('h') {
        hours
            .trim()
            .parse::<u64>()
            .ok()
            .and_then(|h| h.checked_mul(3600))
            .map(Duration::from_secs)
    } else {
        t.parse::<u64>().ok().map(Duration::from_secs)
    };
    parsed.ok_or_else(|| ConfigError::InvalidDuration(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("10").unwrap(), Duration::from_secs(10));
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn parse_duration_rejects_overflow() {
        let huge = format!("{}h", u64::MAX / 1000);
        assert!(matches!(parse_duration(&huge), Err(ConfigError::InvalidDuration(_))));
        let huge = format!("{}m", u64::MAX);
        assert!(matches!(parse_duration(&huge), Err(ConfigError::InvalidDuration(_))));
    }

    #[test]
    fn rejects_zero_intervals_and_timeout() {
        for toml_str in [
            "[health]\ninterval = \"0s\"\n",
            "[health]\nprobe_timeout = \"0ms\"\n",
            "[autoscale]\ninterval = \"0\"\n",
        ] {
            let err = FleetConfig::from_toml_str(toml_str).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidDuration(_)), "{toml_str}");
        }
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = FleetConfig::from_toml_str("").unwrap();
        assert_eq!(config.health.interval().unwrap(), Duration::from_secs(10));
        assert_eq!(config.health.max_concurrent_probes, 32);
        assert_eq!(config.balancer.strategy().unwrap(), Strategy::RoundRobin);
        assert_eq!(config.autoscale.history_limit, 100);
        assert!(config.services.is_empty());
    }

    #[test]
    fn parse_services_and_scaling() {
        let toml_str = r#"
[balancer]
strategy = "weighted-round-robin"

[[services]]
name = "api"
instances = [
    { id = "a", host = "10.0.0.1", port = 8080, weight = 2 },
    { id = "b", host = "10.0.0.2", port = 8080 },
]

[services.scaling]
max_instances = 4
cooldown = "1m"
"#;
        let config = FleetConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.balancer.strategy().unwrap(), Strategy::WeightedRoundRobin);

        let api = &config.services[0];
        assert_eq!(api.instances.len(), 2);
        assert_eq!(api.instances[0].weight, 2);
        assert_eq!(api.instances[1].weight, 1);

        let overrides = api.scaling.as_ref().unwrap().to_overrides().unwrap();
        assert_eq!(overrides.max_instances, Some(4));
        assert_eq!(overrides.cooldown, Some(Duration::from_secs(60)));
    }

    #[test]
    fn rejects_unknown_strategy() {
        let err = FleetConfig::from_toml_str("[balancer]\nstrategy = \"random\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownStrategy(_)));
    }

    #[test]
    fn rejects_invalid_policy() {
        let toml_str = r#"
[[services]]
name = "api"

[services.scaling]
min_instances = 5
max_instances = 2
"#;
        let err = FleetConfig::from_toml_str(toml_str).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPolicy { .. }));
    }

    #[test]
    fn rejects_duplicate_services() {
        let toml_str = r#"
[[services]]
name = "api"

[[services]]
name = "api"
"#;
        let err = FleetConfig::from_toml_str(toml_str).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateService(_)));
    }
}
