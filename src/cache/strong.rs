//! Strong (unbounded) and null (pass-through) cache policies.

use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;

use crate::cache::stats::CacheStats;
use crate::common::{Error, Result};

/// Unbounded cache: everything loaded stays resident until removed.
///
/// Eviction and resizing are no-ops.
pub struct StrongCache<K, V> {
    name: String,
    map: DashMap<K, Arc<V>>,
    stats: CacheStats,
}

impl<K, V> StrongCache<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create a new strong cache.
    ///
    /// # Errors
    /// `InvalidArgument` when `name` is empty.
    pub fn new(name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(Error::InvalidArgument("cache name must not be empty".into()));
        }

        Ok(Self {
            name: name.to_owned(),
            map: DashMap::new(),
            stats: CacheStats::new(),
        })
    }

    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        match self.map.get(key).map(|entry| Arc::clone(entry.value())) {
            Some(value) => {
                self.stats.record_hit();
                Some(value)
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    pub fn put(&self, key: K, value: Arc<V>) {
        self.map.insert(key, value);
    }

    pub fn remove(&self, key: &K) -> Option<Arc<V>> {
        self.map.remove(key).map(|(_, value)| value)
    }

    /// Unbounded; resizing is a no-op.
    pub fn resize(&self, _capacity: usize) -> Result<()> {
        Ok(())
    }

    pub fn clear(&self) {
        self.map.clear();
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

/// Pass-through policy: nothing is ever cached.
///
/// Every `get` is a miss, so every lookup goes to the record store.
pub struct NullCache {
    name: String,
    stats: CacheStats,
}

impl NullCache {
    /// Create a new null cache.
    ///
    /// # Errors
    /// `InvalidArgument` when `name` is empty.
    pub fn new(name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(Error::InvalidArgument("cache name must not be empty".into()));
        }

        Ok(Self {
            name: name.to_owned(),
            stats: CacheStats::new(),
        })
    }

    pub fn get<V>(&self) -> Option<Arc<V>> {
        self.stats.record_miss();
        None
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strong_never_evicts() {
        let cache: StrongCache<u64, String> = StrongCache::new("test-strong").unwrap();

        for i in 0..10_000u64 {
            cache.put(i, Arc::new(format!("v{i}")));
        }

        assert_eq!(cache.len(), 10_000);
        assert_eq!(cache.get(&9_999).unwrap().as_str(), "v9999");
        cache.resize(10).unwrap();
        assert_eq!(cache.len(), 10_000);
    }

    #[test]
    fn test_strong_remove() {
        let cache: StrongCache<u64, String> = StrongCache::new("test-strong").unwrap();
        cache.put(1, Arc::new("a".to_owned()));

        assert_eq!(cache.remove(&1).unwrap().as_str(), "a");
        assert!(cache.get(&1).is_none());
    }

    #[test]
    fn test_null_always_misses() {
        let cache = NullCache::new("test-null").unwrap();

        assert!(cache.get::<String>().is_none());
        assert_eq!(cache.stats().snapshot().misses, 1);
        assert_eq!(cache.stats().snapshot().hits, 0);
    }

    #[test]
    fn test_rejects_empty_name() {
        assert!(StrongCache::<u64, String>::new("").is_err());
        assert!(NullCache::new("").is_err());
    }
}
