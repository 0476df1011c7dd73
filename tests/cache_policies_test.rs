//! Cache policy tests.
//!
//! Exercises the policy family through the public `cache` module: the
//! clock second-chance scenario, adaptive LRU resizing, reachability of
//! the weak variant, and the bounded-population invariant under
//! arbitrary operation sequences.

use std::sync::Arc;

use proptest::prelude::*;

use graphmem::cache::{
    AdaptiveCacheManager, AdaptiveLruCache, Cache, ClockCache, HeapUsage, MemoryMonitor,
    ResizableCache, WeakCache,
};
use graphmem::CacheKind;

fn value(s: &str) -> Arc<String> {
    Arc::new(s.to_owned())
}

// ============================================================================
// Clock second-chance scenario
// ============================================================================

/// Capacity 3; put A, B, C; get(A); put D. A and D must be resident and
/// exactly one of B, C evicted.
#[test]
fn test_clock_second_chance_scenario() {
    let cache: ClockCache<char, String> = ClockCache::new("nodes", 3).unwrap();

    cache.put('A', value("a"));
    cache.put('B', value("b"));
    cache.put('C', value("c"));

    assert!(cache.get(&'A').is_some());

    cache.put('D', value("d"));

    assert_eq!(cache.len(), 3);
    assert!(cache.get(&'A').is_some(), "A had its reference bit set");
    assert!(cache.get(&'D').is_some(), "D was just installed");

    let evicted = ['B', 'C']
        .iter()
        .filter(|k| cache.get(k).is_none())
        .count();
    assert_eq!(evicted, 1, "exactly one of B, C must be evicted");
}

#[test]
fn test_clock_population_never_exceeds_capacity() {
    let cache: ClockCache<u64, String> = ClockCache::new("nodes", 8).unwrap();

    for i in 0..1000 {
        cache.put(i, value("x"));
        assert!(cache.len() <= 8);
        // Interleave reads to keep reference bits churning.
        cache.get(&(i / 2));
    }
}

// ============================================================================
// Adaptive LRU resize (S4)
// ============================================================================

/// Start at 1000, resize to 100: population fits and the survivors are
/// the most recently accessed keys.
#[test]
fn test_lru_resize_keeps_recently_used() {
    let cache: AdaptiveLruCache<u64, String> = AdaptiveLruCache::new("nodes", 1000).unwrap();

    for i in 0..1000 {
        cache.put(i, value("x"));
    }
    for i in 900..1000 {
        assert!(cache.get(&i).is_some());
    }

    cache.resize(100).unwrap();

    assert!(cache.len() <= 100);
    for i in 900..1000 {
        assert!(
            cache.get(&i).is_some(),
            "recently accessed key {i} must survive the shrink"
        );
    }
}

struct FixedMonitor(HeapUsage);

impl MemoryMonitor for FixedMonitor {
    fn sample(&self) -> Option<HeapUsage> {
        Some(self.0)
    }
}

#[test]
fn test_adaptive_manager_shrinks_under_pressure() {
    let cache: Arc<Cache<u64, String>> =
        Arc::new(Cache::with_kind(CacheKind::Soft, "nodes", 1000).unwrap());
    for i in 0..1000 {
        cache.put(i, value("x"));
    }

    let manager = AdaptiveCacheManager::new(
        0.5,
        Box::new(FixedMonitor(HeapUsage {
            used: 95,
            total: 100,
        })),
    );
    manager.register(Arc::clone(&cache) as Arc<dyn ResizableCache>, 50, 1000);

    manager.sample_once();

    assert!(cache.len() < 1000, "pressure must shrink the cache");
    assert!(cache.len() >= 50, "never below the configured minimum");
}

#[test]
fn test_adaptive_manager_restores_capacity_when_relaxed() {
    let cache: Arc<Cache<u64, String>> =
        Arc::new(Cache::with_kind(CacheKind::Soft, "nodes", 100).unwrap());

    let manager = AdaptiveCacheManager::new(
        0.8,
        Box::new(FixedMonitor(HeapUsage {
            used: 10,
            total: 100,
        })),
    );
    manager.register(Arc::clone(&cache) as Arc<dyn ResizableCache>, 10, 100);
    manager.sample_once();

    // Low pressure: full capacity, nothing evicted on insert churn.
    for i in 0..100 {
        cache.put(i, value("x"));
    }
    assert_eq!(cache.len(), 100);
}

// ============================================================================
// Weak variant
// ============================================================================

#[test]
fn test_weak_cache_follows_reachability() {
    let cache: WeakCache<u64, String> = WeakCache::new("nodes").unwrap();

    let held = value("held");
    cache.put(1, Arc::clone(&held));
    cache.put(2, value("dropped"));

    assert!(cache.get(&1).is_some(), "strongly held referent survives");
    assert!(cache.get(&2).is_none(), "unreferenced value reads as miss");
}

// ============================================================================
// Strong and None variants
// ============================================================================

#[test]
fn test_strong_kind_is_unbounded() {
    let cache: Cache<u64, String> = Cache::with_kind(CacheKind::Strong, "nodes", 10).unwrap();

    for i in 0..1000 {
        cache.put(i, value("x"));
    }
    assert_eq!(cache.len(), 1000);
    assert!(cache.get(&0).is_some());
}

#[test]
fn test_none_kind_is_pass_through() {
    let cache: Cache<u64, String> = Cache::with_kind(CacheKind::None, "nodes", 10).unwrap();

    cache.put(1, value("x"));
    assert!(cache.get(&1).is_none());
    assert_eq!(cache.len(), 0);
}

// ============================================================================
// Bounded-population invariant, property-based
// ============================================================================

#[derive(Debug, Clone)]
enum Op {
    Put(u8),
    Get(u8),
    Remove(u8),
    Resize(u8),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        any::<u8>().prop_map(Op::Put),
        any::<u8>().prop_map(Op::Get),
        any::<u8>().prop_map(Op::Remove),
        (1u8..32).prop_map(Op::Resize),
    ]
}

proptest! {
    /// For any sequence of operations and any bounded policy, the
    /// population observed between operations never exceeds the
    /// capacity in force.
    #[test]
    fn prop_population_bounded(
        ops in proptest::collection::vec(op_strategy(), 1..200),
        capacity in 1usize..16,
    ) {
        for kind in [CacheKind::Clock, CacheKind::Lru] {
            let cache: Cache<u8, String> = Cache::with_kind(kind, "nodes", capacity).unwrap();
            let mut current_capacity = capacity;

            for op in &ops {
                match op {
                    Op::Put(k) => cache.put(*k, value("v")),
                    Op::Get(k) => {
                        cache.get(k);
                    }
                    Op::Remove(k) => {
                        cache.remove(k);
                    }
                    Op::Resize(n) => {
                        let n = *n as usize;
                        cache.resize(n).unwrap();
                        current_capacity = n;
                    }
                }
                prop_assert!(
                    cache.len() <= current_capacity,
                    "{:?}: population {} exceeds capacity {}",
                    kind,
                    cache.len(),
                    current_capacity
                );
            }
        }
    }

    /// A value just put is retrievable until something else evicts it.
    #[test]
    fn prop_put_then_get_hits(key in any::<u8>()) {
        let cache: Cache<u8, String> = Cache::with_kind(CacheKind::Clock, "nodes", 4).unwrap();
        cache.put(key, value("v"));
        prop_assert!(cache.get(&key).is_some());
    }
}
