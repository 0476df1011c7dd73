//! Least-recently-used eviction policy, adaptively resizable.
//!
//! Backed by the `lru` crate's access-ordered map behind a mutex. The
//! same type serves two configured policies: plain `lru`, and `soft`,
//! which is this cache registered with the
//! [`AdaptiveCacheManager`](crate::cache::AdaptiveCacheManager) so its
//! capacity follows heap pressure.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::cache::stats::CacheStats;
use crate::common::{Error, Result};

/// Access-ordered bounded cache.
///
/// `resize` is the integration point for adaptive sizing: it shrinks the
/// population to the new capacity before returning, evicting from the
/// least-recently-used end.
pub struct AdaptiveLruCache<K, V> {
    name: String,
    inner: Mutex<lru::LruCache<K, Arc<V>>>,
    stats: CacheStats,
}

impl<K, V> AdaptiveLruCache<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create a new LRU cache.
    ///
    /// # Errors
    /// `InvalidArgument` when `name` is empty or `capacity` is zero.
    pub fn new(name: &str, capacity: usize) -> Result<Self> {
        if name.is_empty() {
            return Err(Error::InvalidArgument("cache name must not be empty".into()));
        }
        let capacity = NonZeroUsize::new(capacity).ok_or_else(|| {
            Error::InvalidArgument(format!("cache '{name}' capacity must be > 0"))
        })?;

        Ok(Self {
            name: name.to_owned(),
            inner: Mutex::new(lru::LruCache::new(capacity)),
            stats: CacheStats::new(),
        })
    }

    /// Look up a key, refreshing its recency on hit.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let hit = self.inner.lock().get(key).cloned();
        match hit {
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

    /// Install or replace the value for a key.
    ///
    /// On overflow the least-recently-used entry is dropped.
    pub fn put(&self, key: K, value: Arc<V>) {
        let displaced = self.inner.lock().push(key.clone(), value);
        if let Some((old_key, _)) = displaced {
            // push returns the same key when it replaced in place.
            if old_key != key {
                self.stats.record_evictions(1);
            }
        }
    }

    /// Evict a key on demand.
    pub fn remove(&self, key: &K) -> Option<Arc<V>> {
        self.inner.lock().pop(key)
    }

    /// Change the capacity, evicting least-recently-used entries until
    /// the population fits.
    ///
    /// # Errors
    /// `InvalidArgument` when `capacity` is zero.
    pub fn resize(&self, capacity: usize) -> Result<()> {
        let capacity = NonZeroUsize::new(capacity).ok_or_else(|| {
            Error::InvalidArgument(format!("cache '{}' capacity must be > 0", self.name))
        })?;

        let mut inner = self.inner.lock();
        let before = inner.len();
        inner.resize(capacity);
        let dropped = before - inner.len();
        if dropped > 0 {
            self.stats.record_evictions(dropped as u64);
        }
        Ok(())
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Number of resident entries.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Current capacity.
    pub fn capacity(&self) -> usize {
        self.inner.lock().cap().get()
    }

    /// Cache name, used in diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Statistics counters.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}
