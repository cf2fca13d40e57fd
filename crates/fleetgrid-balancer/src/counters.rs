//! Per-service selection counters.
//!
//! `RoundRobinCounter` is lock-free. `WeightedCursor` needs a
//! read-compare-reset on every call, so it sits behind a mutex.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Round-robin position for one service.
///
/// The balancer keeps one per service name. The value only ever grows; it
/// is reduced modulo the healthy-set size at the moment of selection, so a
/// service whose healthy set changes size keeps rotating from where it was.
#[derive(Debug, Default)]
pub struct RoundRobinCounter {
    served: AtomicUsize,
}

impl RoundRobinCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index into a healthy set of `healthy` instances, then advance.
    pub fn next(&self, healthy: usize) -> Option<usize> {
        (healthy > 0).then(|| self.served.fetch_add(1, Ordering::Relaxed) % healthy)
    }

    /// Selections served for this service so far.
    pub fn served(&self) -> usize {
        self.served.load(Ordering::Relaxed)
    }
}

/// Position in `[0, total_weight)` for weighted round-robin.
///
/// Once the position reaches the total weight the walk finds no instance;
/// the cursor is then set to 1 and the first instance is returned. That
/// reset lands on 1 rather than 0, so the first instance is served by the
/// overflow path on every cycle after the first. Per-cycle counts still
/// equal the weights.
pub struct WeightedCursor {
    position: Mutex<u64>,
}

impl WeightedCursor {
    pub fn new() -> Self {
        Self {
            position: Mutex::new(0),
        }
    }

    /// Pick an index given the weights of the current candidates.
    pub fn next(&self, weights: &[u64]) -> Option<usize> {
        if weights.is_empty() {
            return None;
        }
        let mut position = self.position.lock().expect("weighted cursor lock");

        let mut cumulative = 0u64;
        for (idx, weight) in weights.iter().enumerate() {
            cumulative += weight;
            if *position < cumulative {
                *position += 1;
                return Some(idx);
            }
        }

        *position = 1;
        Some(0)
    }

    pub fn position(&self) -> u64 {
        *self.position.lock().expect("weighted cursor lock")
    }
}

impl Default for WeightedCursor {
    fn default() -> Self {
        Self::new()
    }
}
