//! Shared proxy counters (§5, "Counter metrics"; §9.6)

use std::collections::HashMap;

use parking_lot::RwLock;

/// A small name -> count map the handler framework increments on notable events
#[derive(Default)]
pub struct Metrics {
    counts: RwLock<HashMap<&'static str, u64>>,
}

impl Metrics {
    /// Build an empty metrics table
    #[must_use]
    pub fn new() -> Self {
        Metrics::default()
    }

    /// Bump a named counter by one
    ///
    /// # Arguments
    ///
    /// * `name` - The counter to increment, e.g. `"terminate"`, `"reject"`, `"delay"`
    pub fn increment(&self, name: &'static str) {
        *self.counts.write().entry(name).or_insert(0) += 1;
    }

    /// Get a defensive copy of the current counters
    #[must_use]
    pub fn snapshot(&self) -> HashMap<&'static str, u64> {
        self.counts.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increments_and_snapshots_independently() {
        let metrics = Metrics::new();
        metrics.increment("delay");
        metrics.increment("delay");
        metrics.increment("reject");
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.get("delay"), Some(&2));
        assert_eq!(snapshot.get("reject"), Some(&1));
        metrics.increment("delay");
        // the earlier snapshot is unaffected by later increments
        assert_eq!(snapshot.get("delay"), Some(&2));
    }
}
