//! Cache Statistics Module
//!
//! Tracks engine counters: reads, upstream fetches and how their failures were handled.

use serde::Serialize;

// == Cache Stats ==
/// Engine performance counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Reads that found a live value
    pub hits: u64,
    /// Reads that found nothing or an expired value
    pub misses: u64,
    /// Fetch functions invoked by wrap
    pub fetches: u64,
    /// Fetch functions that failed
    pub fetch_failures: u64,
    /// Failed fetches masked by re-serving the previous value
    pub stale_served: u64,
    /// Failed fetches surfaced to callers
    pub escalations: u64,
    /// Entries pushed out of the hot layer by its capacity
    pub hot_evictions: u64,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if no reads have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_fetch(&mut self) {
        self.fetches += 1;
    }

    /// Records a failed fetch and how it was handled.
    pub fn record_fetch_failure(&mut self, escalated: bool) {
        self.fetch_failures += 1;
        if escalated {
            self.escalations += 1;
        } else {
            self.stale_served += 1;
        }
    }

    pub fn record_hot_eviction(&mut self) {
        self.hot_evictions += 1;
    }
}
