//! Per-cycle memo of resolved bracket survivors.

use std::sync::atomic::{AtomicI64, Ordering};

use dashmap::DashMap;

/// Marker stored before any cycle has been observed.
const NO_CYCLE: i64 = i64::MIN;

/// Bounded map from phase key to the image that won it.
///
/// Entries are only valid for one cycle: observing a different `cycle_start` clears the map.
pub struct BracketCache {
    survivors: DashMap<String, String>,
    cycle_start_ms: AtomicI64,
    capacity: usize,
}

impl BracketCache {
    /// Empty cache holding at most `capacity` survivors.
    pub fn new(capacity: usize) -> Self {
        Self {
            survivors: DashMap::new(),
            cycle_start_ms: AtomicI64::new(NO_CYCLE),
            capacity,
        }
    }

    /// Tag the cache with the current cycle, dropping entries from any other cycle.
    pub fn observe_cycle(&self, cycle_start_ms: i64) {
        let previous = self.cycle_start_ms.swap(cycle_start_ms, Ordering::AcqRel);
        if previous != cycle_start_ms {
            self.survivors.clear();
        }
    }

    /// Memoized survivor of `phase_key`, if known.
    pub fn get(&self, phase_key: &str) -> Option<String> {
        self.survivors
            .get(phase_key)
            .map(|entry| entry.value().clone())
    }

    /// Remember the survivor of `phase_key`; ignored once the cache is full.
    pub fn insert(&self, phase_key: String, image: String) {
        if self.survivors.len() >= self.capacity && !self.survivors.contains_key(&phase_key) {
            return;
        }
        self.survivors.insert(phase_key, image);
    }

    /// Drop every entry and forget the observed cycle.
    pub fn invalidate(&self) {
        self.cycle_start_ms.store(NO_CYCLE, Ordering::Release);
        self.survivors.clear();
    }

    /// Number of memoized survivors.
    pub fn len(&self) -> usize {
        self.survivors.len()
    }

    /// Whether nothing is memoized.
    pub fn is_empty(&self) -> bool {
        self.survivors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_cycle_clears_entries() {
        let cache = BracketCache::new(8);
        cache.observe_cycle(1_000);
        cache.insert("a".into(), "img/01.png".into());
        cache.observe_cycle(1_000);
        assert_eq!(cache.get("a").as_deref(), Some("img/01.png"));

        cache.observe_cycle(2_000);
        assert!(cache.get("a").is_none());
    }

    #[test]
    fn capacity_bounds_entries() {
        let cache = BracketCache::new(2);
        for key in ["a", "b", "c"] {
            cache.insert(key.into(), "img".into());
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.get("c").is_none());

        cache.invalidate();
        assert!(cache.is_empty());
    }
}
