use dashmap::DashMap;

use super::GeoLocation;

/// Memoization store used by [`super::GeoResolver`].
///
/// Implementations must be safe to share between concurrently running
/// requests.
pub trait LocationCache: Send + Sync {
    fn get(&self, address: &str) -> Option<GeoLocation>;
    fn insert(&self, address: String, location: GeoLocation);
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sharded concurrent cache with an optional entry limit.
///
/// When the limit is reached an arbitrary resident entry is evicted to make
/// room. Concurrent inserts can overshoot the limit by a few entries. Without a
/// limit the cache grows with the number of distinct addresses seen for the
/// lifetime of the process.
pub struct ConcurrentLocationCache {
    entries: DashMap<String, GeoLocation>,
    capacity: Option<usize>,
}

impl ConcurrentLocationCache {
    /// A `capacity` of 0 means unbounded.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity: (capacity > 0).then_some(capacity),
        }
    }

    fn evict_one(&self) {
        let victim = self.entries.iter().next().map(|entry| entry.key().clone());
        if let Some(key) = victim {
            self.entries.remove(&key);
        }
    }
}

impl Default for ConcurrentLocationCache {
    fn default() -> Self {
        Self::new(0)
    }
}

impl LocationCache for ConcurrentLocationCache {
    fn get(&self, address: &str) -> Option<GeoLocation> {
        self.entries.get(address).map(|entry| entry.value().clone())
    }

    fn insert(&self, address: String, location: GeoLocation) {
        if let Some(capacity) = self.capacity
            && self.entries.len() >= capacity
            && !self.entries.contains_key(&address)
        {
            self.evict_one();
        }
        self.entries.insert(address, location);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
