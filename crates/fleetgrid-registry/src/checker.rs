//! Health record bookkeeping.
//!
//! Applies one probe result to an instance's `HealthRecord`. A single
//! failure demotes an instance and a single success restores it; the
//! error counter decays by one per success so it reflects recent
//! flakiness rather than lifetime failures.

use std::time::Duration;

use fleet_core::HealthRecord;

use crate::probe::ProbeResult;

/// A change in an instance's healthy flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthTransition {
    BecameUnhealthy,
    Recovered,
}

/// Record a probe result and return the transition it caused, if any.
pub fn apply_probe(
    record: &mut HealthRecord,
    result: ProbeResult,
    elapsed: Duration,
    now_ms: u64,
) -> Option<HealthTransition> {
    let was_healthy = record.healthy;
    record.last_check = Some(now_ms);

    if result.is_healthy() {
        record.response_time = Some(elapsed);
        record.error_count = record.error_count.saturating_sub(1);
        record.healthy = true;
    } else {
        record.error_count = record.error_count.saturating_add(1);
        record.healthy = false;
    }

    match (was_healthy, record.healthy) {
        (true, false) => Some(HealthTransition::BecameUnhealthy),
        (false, true) => Some(HealthTransition::Recovered),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(12);

    #[test]
    fn first_failure_demotes() {
        let mut record = HealthRecord::new();
        let t = apply_probe(&mut record, ProbeResult::Failed, MS, 100);
        assert_eq!(t, Some(HealthTransition::BecameUnhealthy));
        assert!(!record.healthy);
        assert_eq!(record.error_count, 1);
        assert_eq!(record.last_check, Some(100));
    }

    #[test]
    fn repeated_failures_count_without_new_transition() {
        let mut record = HealthRecord::new();
        apply_probe(&mut record, ProbeResult::Unhealthy, MS, 1);
        let t = apply_probe(&mut record, ProbeResult::TimedOut, MS, 2);
        assert_eq!(t, None);
        assert_eq!(record.error_count, 2);
    }

    #[test]
    fn success_recovers_and_decays_errors() {
        let mut record = HealthRecord::new();
        apply_probe(&mut record, ProbeResult::Failed, MS, 1);
        apply_probe(&mut record, ProbeResult::Failed, MS, 2);

        let t = apply_probe(&mut record, ProbeResult::Healthy, MS, 3);
        assert_eq!(t, Some(HealthTransition::Recovered));
        assert!(record.healthy);
        assert_eq!(record.error_count, 1);
        assert_eq!(record.response_time, Some(MS));
    }

    #[test]
    fn error_count_floors_at_zero() {
        let mut record = HealthRecord::new();
        apply_probe(&mut record, ProbeResult::Healthy, MS, 1);
        apply_probe(&mut record, ProbeResult::Healthy, MS, 2);
        assert_eq!(record.error_count, 0);
    }

    #[test]
    fn failure_keeps_last_successful_response_time() {
        let mut record = HealthRecord::new();
        apply_probe(&mut record, ProbeResult::Healthy, MS, 1);
        apply_probe(&mut record, ProbeResult::Failed, Duration::from_secs(2), 2);
        assert_eq!(record.response_time, Some(MS));
    }
}
