//! Bounded caches and eviction policies.
//!
//! The entity layer caches materialized nodes and relationships behind a
//! single contract with runtime-selectable eviction policies.
//!
//! # Components
//! - [`Cache`] - policy dispatch over the shared contract
//! - [`ClockCache`] - concurrent second-chance eviction
//! - [`AdaptiveLruCache`] - access-ordered eviction, resizable under pressure
//! - [`WeakCache`] - reachability-governed residency
//! - [`StrongCache`] / [`NullCache`] - unbounded / pass-through
//! - [`AdaptiveCacheManager`] - heap-pressure driven resizing
//! - [`StripedLoadLocks`] - per-id serialization of the load path
//! - [`CacheStats`] - per-cache counters

mod adaptive;
mod clock;
mod lru;
mod page;
mod stats;
mod stripes;
mod strong;
mod weak;

pub use adaptive::{AdaptiveCacheManager, HeapUsage, MemoryMonitor, SystemMemoryMonitor};
pub use clock::ClockCache;
pub use lru::AdaptiveLruCache;
pub use stats::{CacheStats, StatsSnapshot};
pub use stripes::StripedLoadLocks;
pub use strong::{NullCache, StrongCache};
pub use weak::WeakCache;

use std::hash::Hash;
use std::sync::Arc;

use crate::common::{CacheKind, Result};

/// A bounded cache dispatching to its configured eviction policy.
///
/// All variants share one contract: `put` installs or replaces, `get`
/// returns the current referent or `None`, `remove` evicts on demand,
/// `resize` shrinks the population to the new capacity before returning,
/// `clear` empties, `len` reports the population.
pub enum Cache<K, V> {
    Clock(ClockCache<K, V>),
    Lru(AdaptiveLruCache<K, V>),
    Weak(WeakCache<K, V>),
    Soft(AdaptiveLruCache<K, V>),
    Strong(StrongCache<K, V>),
    None(NullCache),
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Build a cache of the configured kind.
    ///
    /// `capacity` bounds the Clock, Lru, and Soft variants; Weak, Strong,
    /// and None ignore it.
    ///
    /// # Errors
    /// `InvalidArgument` when `name` is empty, or when a bounded variant
    /// gets a zero capacity.
    pub fn with_kind(kind: CacheKind, name: &str, capacity: usize) -> Result<Self> {
        Ok(match kind {
            CacheKind::Clock => Cache::Clock(ClockCache::new(name, capacity)?),
            CacheKind::Lru => Cache::Lru(AdaptiveLruCache::new(name, capacity)?),
            CacheKind::Weak => Cache::Weak(WeakCache::new(name)?),
            CacheKind::Soft => Cache::Soft(AdaptiveLruCache::new(name, capacity)?),
            CacheKind::Strong => Cache::Strong(StrongCache::new(name)?),
            CacheKind::None => Cache::None(NullCache::new(name)?),
        })
    }

    /// The policy backing this cache.
    pub fn kind(&self) -> CacheKind {
        match self {
            Cache::Clock(_) => CacheKind::Clock,
            Cache::Lru(_) => CacheKind::Lru,
            Cache::Weak(_) => CacheKind::Weak,
            Cache::Soft(_) => CacheKind::Soft,
            Cache::Strong(_) => CacheKind::Strong,
            Cache::None(_) => CacheKind::None,
        }
    }

    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        match self {
            Cache::Clock(c) => c.get(key),
            Cache::Lru(c) | Cache::Soft(c) => c.get(key),
            Cache::Weak(c) => c.get(key),
            Cache::Strong(c) => c.get(key),
            Cache::None(c) => c.get(),
        }
    }

    pub fn put(&self, key: K, value: Arc<V>) {
        match self {
            Cache::Clock(c) => c.put(key, value),
            Cache::Lru(c) | Cache::Soft(c) => c.put(key, value),
            Cache::Weak(c) => c.put(key, value),
            Cache::Strong(c) => c.put(key, value),
            Cache::None(_) => {}
        }
    }

    pub fn remove(&self, key: &K) -> Option<Arc<V>> {
        match self {
            Cache::Clock(c) => c.remove(key),
            Cache::Lru(c) | Cache::Soft(c) => c.remove(key),
            Cache::Weak(c) => c.remove(key),
            Cache::Strong(c) => c.remove(key),
            Cache::None(_) => None,
        }
    }

    pub fn resize(&self, capacity: usize) -> Result<()> {
        match self {
            Cache::Clock(c) => c.resize(capacity),
            Cache::Lru(c) | Cache::Soft(c) => c.resize(capacity),
            Cache::Weak(c) => c.resize(capacity),
            Cache::Strong(c) => c.resize(capacity),
            Cache::None(_) => Ok(()),
        }
    }

    pub fn clear(&self) {
        match self {
            Cache::Clock(c) => c.clear(),
            Cache::Lru(c) | Cache::Soft(c) => c.clear(),
            Cache::Weak(c) => c.clear(),
            Cache::Strong(c) => c.clear(),
            Cache::None(_) => {}
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Cache::Clock(c) => c.len(),
            Cache::Lru(c) | Cache::Soft(c) => c.len(),
            Cache::Weak(c) => c.len(),
            Cache::Strong(c) => c.len(),
            Cache::None(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn name(&self) -> &str {
        match self {
            Cache::Clock(c) => c.name(),
            Cache::Lru(c) | Cache::Soft(c) => c.name(),
            Cache::Weak(c) => c.name(),
            Cache::Strong(c) => c.name(),
            Cache::None(c) => c.name(),
        }
    }

    pub fn stats(&self) -> &CacheStats {
        match self {
            Cache::Clock(c) => c.stats(),
            Cache::Lru(c) | Cache::Soft(c) => c.stats(),
            Cache::Weak(c) => c.stats(),
            Cache::Strong(c) => c.stats(),
            Cache::None(c) => c.stats(),
        }
    }
}

/// Capability the adaptive manager needs from a registered cache.
pub trait ResizableCache: Send + Sync {
    fn name(&self) -> &str;
    fn len(&self) -> usize;
    fn resize(&self, capacity: usize) -> Result<()>;
}

impl<K, V> ResizableCache for Cache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Send + Sync,
{
    fn name(&self) -> &str {
        Cache::name(self)
    }

    fn len(&self) -> usize {
        Cache::len(self)
    }

    fn resize(&self, capacity: usize) -> Result<()> {
        Cache::resize(self, capacity)
    }
}
