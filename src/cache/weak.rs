//! Weak-referent cache.
//!
//! Entries hold [`std::sync::Weak`] references: a value stays retrievable
//! only while some strong owner (a live proxy, an in-flight operation)
//! keeps it alive. Dead referents read as misses and are reaped by a
//! sweep piggybacked on inserts.

use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use log::debug;

use crate::cache::stats::CacheStats;
use crate::common::{Error, Result};

/// How many inserts between reaping sweeps.
const SWEEP_INTERVAL: usize = 1024;

/// Cache whose residency is governed by reachability, not capacity.
///
/// `len` is best-effort: entries whose referent has been dropped still
/// count until the next sweep removes them.
pub struct WeakCache<K, V> {
    name: String,
    map: DashMap<K, Weak<V>>,
    inserts: AtomicUsize,
    stats: CacheStats,
}

impl<K, V> WeakCache<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create a new weak cache.
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
            inserts: AtomicUsize::new(0),
            stats: CacheStats::new(),
        })
    }

    /// Look up a key. A dead referent is a miss.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let upgraded = self.map.get(key).and_then(|weak| weak.upgrade());
        match upgraded {
            Some(value) => {
                self.stats.record_hit();
                Some(value)
            }
            None => {
                // Collected between insert and lookup; drop the husk.
                self.map.remove_if(key, |_, weak| weak.strong_count() == 0);
                self.stats.record_miss();
                None
            }
        }
    }

    /// Install a weak reference to the value.
    pub fn put(&self, key: K, value: Arc<V>) {
        self.map.insert(key, Arc::downgrade(&value));

        if self.inserts.fetch_add(1, Ordering::Relaxed) % SWEEP_INTERVAL == SWEEP_INTERVAL - 1 {
            self.sweep();
        }
    }

    /// Evict a key on demand.
    pub fn remove(&self, key: &K) -> Option<Arc<V>> {
        self.map.remove(key).and_then(|(_, weak)| weak.upgrade())
    }

    /// Capacity is governed by reachability; resizing is a no-op.
    pub fn resize(&self, _capacity: usize) -> Result<()> {
        Ok(())
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.map.clear();
    }

    /// Best-effort population count.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the cache is empty (best-effort).
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Cache name, used in diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Statistics counters.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Remove entries whose referent has been dropped.
    fn sweep(&self) {
        let before = self.map.len();
        self.map.retain(|_, weak| weak.strong_count() > 0);
        let reaped = before.saturating_sub(self.map.len());
        if reaped > 0 {
            debug!("cache '{}': reaped {} dead referents", self.name, reaped);
        }
    }
}
