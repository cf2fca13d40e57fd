//! Selection metrics — observational counters per service.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use fleet_core::InstanceId;

/// Counters for one instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstanceSelectionStats {
    pub selections: u64,
    pub failures: u64,
    /// Selections not yet released by the caller.
    pub in_flight: u64,
}

/// Point-in-time view of a service's selection metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SelectionMetricsSnapshot {
    pub total_requests: u64,
    pub instances: BTreeMap<InstanceId, InstanceSelectionStats>,
}

#[derive(Default)]
pub(crate) struct SelectionMetrics {
    total_requests: AtomicU64,
    instances: Mutex<HashMap<InstanceId, InstanceSelectionStats>>,
}

impl SelectionMetrics {
    pub(crate) fn record_selection(&self, instance_id: &str) {
        let mut instances = self.instances.lock().expect("selection metrics lock");
        self.bump(&mut instances, instance_id);
    }

    /// Choose from current in-flight counts and record the choice under one
    /// lock, so concurrent callers see each other's picks.
    pub(crate) fn select_by_in_flight<F>(&self, instance_ids: &[&str], choose: F) -> Option<usize>
    where
        F: FnOnce(&[u64]) -> Option<usize>,
    {
        let mut instances = self.instances.lock().expect("selection metrics lock");
        let in_flight: Vec<u64> = instance_ids
            .iter()
            .map(|id| instances.get(*id).map(|s| s.in_flight).unwrap_or(0))
            .collect();
        let idx = choose(&in_flight)?;
        self.bump(&mut instances, instance_ids.get(idx)?);
        Some(idx)
    }

    fn bump(&self, instances: &mut HashMap<InstanceId, InstanceSelectionStats>, instance_id: &str) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        let stats = instances.entry(instance_id.to_string()).or_default();
        stats.selections += 1;
        stats.in_flight += 1;
    }

    /// Drop stats for instances `keep` rejects. Returns how many were dropped.
    pub(crate) fn retain<F>(&self, mut keep: F) -> usize
    where
        F: FnMut(&str) -> bool,
    {
        let mut instances = self.instances.lock().expect("selection metrics lock");
        let before = instances.len();
        instances.retain(|id, _| keep(id));
        before - instances.len()
    }

    pub(crate) fn record_failure(&self, instance_id: &str) {
        let mut instances = self.instances.lock().expect("selection metrics lock");
        instances.entry(instance_id.to_string()).or_default().failures += 1;
    }

    pub(crate) fn release(&self, instance_id: &str) {
        let mut instances = self.instances.lock().expect("selection metrics lock");
        if let Some(stats) = instances.get_mut(instance_id) {
            stats.in_flight = stats.in_flight.saturating_sub(1);
        }
    }

    pub(crate) fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub(crate) fn snapshot(&self) -> SelectionMetricsSnapshot {
        let instances = self.instances.lock().expect("selection metrics lock");
        SelectionMetricsSnapshot {
            total_requests: self.total_requests(),
            instances: instances
                .iter()
                .map(|(id, stats)| (id.clone(), stats.clone()))
                .collect(),
        }
    }
}
