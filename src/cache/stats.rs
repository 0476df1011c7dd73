//! Cache statistics.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one entity cache.
///
/// Recorded lock-free from the lookup, eviction, load, and chain-paging
/// paths; all counters are eventually consistent.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    loads: AtomicU64,
    chain_pages: AtomicU64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// A lookup served from the cache.
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// A lookup that found nothing resident.
    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// `count` entries evicted to stay within capacity.
    pub(crate) fn record_evictions(&self, count: u64) {
        self.evictions.fetch_add(count, Ordering::Relaxed);
    }

    /// An entity materialized from the record store.
    pub(crate) fn record_load(&self) {
        self.loads.fetch_add(1, Ordering::Relaxed);
    }

    /// One page of a relationship chain fetched and merged.
    pub(crate) fn record_chain_page(&self) {
        self.chain_pages.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the counters out for reporting.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            chain_pages: self.chain_pages.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`CacheStats`] counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub loads: u64,
    pub chain_pages: u64,
}

impl StatsSnapshot {
    /// Fraction of lookups served from the cache (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} hits / {} misses ({:.1}% hit rate), {} evictions, {} loads, {} chain pages",
            self.hits,
            self.misses,
            self.hit_rate() * 100.0,
            self.evictions,
            self.loads,
            self.chain_pages
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::common::CacheKind;
    use std::sync::Arc;

    fn value() -> Arc<String> {
        Arc::new("v".to_owned())
    }

    #[test]
    fn test_counters_follow_lookup_traffic() {
        let cache: Cache<u64, String> = Cache::with_kind(CacheKind::Clock, "nodes", 4).unwrap();

        cache.put(1, value());
        assert!(cache.get(&1).is_some());
        assert!(cache.get(&1).is_some());
        assert!(cache.get(&2).is_none());

        let snapshot = cache.stats().snapshot();
        assert_eq!(snapshot.hits, 2);
        assert_eq!(snapshot.misses, 1);
        assert_eq!(snapshot.evictions, 0);
        assert_eq!(snapshot.chain_pages, 0);
    }

    #[test]
    fn test_evictions_counted_when_capacity_overflows() {
        let cache: Cache<u64, String> =
            Cache::with_kind(CacheKind::Lru, "relationships", 2).unwrap();

        for key in 0..5 {
            cache.put(key, value());
        }

        let snapshot = cache.stats().snapshot();
        assert_eq!(snapshot.evictions, 3);
        assert_eq!(snapshot.hits + snapshot.misses, 0, "puts are not lookups");
    }

    #[test]
    fn test_hit_rate_over_mixed_traffic() {
        let cache: Cache<u64, String> = Cache::with_kind(CacheKind::Strong, "nodes", 0).unwrap();
        assert_eq!(cache.stats().snapshot().hit_rate(), 0.0);

        cache.put(7, value());
        for _ in 0..3 {
            cache.get(&7);
        }
        cache.get(&8);

        assert_eq!(cache.stats().snapshot().hit_rate(), 0.75);
    }

    #[test]
    fn test_snapshot_is_detached_from_live_counters() {
        let cache: Cache<u64, String> = Cache::with_kind(CacheKind::Clock, "nodes", 4).unwrap();
        cache.put(1, value());
        cache.get(&1);

        let before = cache.stats().snapshot();
        cache.get(&1);
        cache.get(&9);

        assert_eq!(before.hits, 1, "snapshot moved with the live counters");
        let after = cache.stats().snapshot();
        assert_eq!(after.hits, 2);
        assert_eq!(after.misses, 1);
        assert_ne!(before, after);
    }

    #[test]
    fn test_counters_accumulate_across_threads() {
        use std::thread;

        let cache: Arc<Cache<u64, String>> =
            Arc::new(Cache::with_kind(CacheKind::Strong, "nodes", 0).unwrap());
        cache.put(1, value());

        let mut handles = vec![];
        for _ in 0..4 {
            let cache = Arc::clone(&cache);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    cache.get(&1);
                    cache.get(&2);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = cache.stats().snapshot();
        assert_eq!(snapshot.hits, 400);
        assert_eq!(snapshot.misses, 400);
    }

    #[test]
    fn test_display_reads_as_a_report() {
        let cache: Cache<u64, String> = Cache::with_kind(CacheKind::Clock, "nodes", 4).unwrap();
        cache.put(1, value());
        cache.get(&1);
        cache.get(&2);

        let report = format!("{}", cache.stats().snapshot());
        assert!(report.contains("1 hits"));
        assert!(report.contains("1 misses"));
        assert!(report.contains("50.0% hit rate"));
    }
}
