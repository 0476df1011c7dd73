//! Clock (second-chance) eviction policy.
//!
//! A [`ClockCache`] keeps a concurrent map from key to [`Page`] plus a
//! circular queue of the pages themselves. Lookups only touch the map and
//! the page's atomic reference bit; the eviction sweep is serialized under
//! the queue lock.

use std::collections::VecDeque;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::debug;
use parking_lot::{Mutex, RwLock};

use crate::cache::page::Page;
use crate::cache::stats::CacheStats;
use crate::common::{Error, Result};

/// Concurrent bounded cache with second-chance eviction.
///
/// # Architecture
/// ```text
/// ┌──────────────────────────────────────────────────────────────┐
/// │                         ClockCache                           │
/// │  ┌──────────────┐   ┌──────────────────────────────────┐    │
/// │  │  map         │   │  queue: VecDeque<Arc<Page>>      │    │
/// │  │ K → Arc<Page>│──▶│  [P0] [P1] [P2] [P3] ...         │    │
/// │  └──────────────┘   └──────────────────────────────────┘    │
/// │        population: AtomicUsize   capacity: AtomicUsize      │
/// └──────────────────────────────────────────────────────────────┘
/// ```
///
/// # Eviction
/// When population exceeds capacity the sweep walks the queue head:
/// a referenced page loses its bit and rotates to the tail (second
/// chance); an unreferenced page has its value slot cleared and stays
/// queued, vacant, for reuse by a later `put` of the same key. Vacant
/// pages are pruned once the queue grows past twice the capacity.
///
/// # Thread Safety
/// - `map`: sharded concurrent map — lock-free readers
/// - `queue`: `Mutex` — one evictor at a time
/// - `population` / `capacity`: atomics
/// - `gate`: `RwLock` — `resize`/`clear` exclude all mutators
///
/// Lock order is gate, then queue, then a map shard; `put` releases its
/// map shard before touching the queue, so no cycle exists.
pub struct ClockCache<K, V> {
    name: String,

    /// Maps keys to their queue page.
    map: DashMap<K, Arc<Page<K, V>>>,

    /// Circular queue of pages in insertion order (head = next victim).
    queue: Mutex<VecDeque<Arc<Page<K, V>>>>,

    /// Maximum resident entries.
    capacity: AtomicUsize,

    /// Current resident entries.
    population: AtomicUsize,

    /// Read-held by `put`/`remove`, write-held by `resize`/`clear`.
    gate: RwLock<()>,

    stats: CacheStats,
}

impl<K, V> ClockCache<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create a new clock cache.
    ///
    /// # Errors
    /// `InvalidArgument` when `name` is empty or `capacity` is zero.
    pub fn new(name: &str, capacity: usize) -> Result<Self> {
        if name.is_empty() {
            return Err(Error::InvalidArgument("cache name must not be empty".into()));
        }
        if capacity == 0 {
            return Err(Error::InvalidArgument(format!(
                "cache '{name}' capacity must be > 0"
            )));
        }

        Ok(Self {
            name: name.to_owned(),
            map: DashMap::new(),
            queue: Mutex::new(VecDeque::new()),
            capacity: AtomicUsize::new(capacity),
            population: AtomicUsize::new(0),
            gate: RwLock::new(()),
            stats: CacheStats::new(),
        })
    }

    /// Look up a key, setting its reference bit on hit.
    ///
    /// A page whose value slot was cleared by the sweep reads as a miss.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        if let Some(page) = self.map.get(key) {
            if let Some(value) = page.get() {
                page.mark_referenced();
                self.stats.record_hit();
                return Some(value);
            }
        }
        self.stats.record_miss();
        None
    }

    /// Install or replace the value for a key.
    ///
    /// An existing page (even a vacated one) is repopulated in place; a
    /// new key gets a fresh page appended to the queue. Overflow triggers
    /// the sweep before returning.
    pub fn put(&self, key: K, value: Arc<V>) {
        let mut value = value;
        loop {
            match self.try_put(&key, value) {
                // A concurrent remove or pruning pass unmapped the page
                // between the lookup and the install; the returned value
                // goes around again against a fresh page.
                Some(reclaimed) => value = reclaimed,
                None => return,
            }
        }
    }

    /// One install attempt. Returns the value back when the target page
    /// was concurrently unmapped, so no resident value is unreachable.
    fn try_put(&self, key: &K, value: Arc<V>) -> Option<Arc<V>> {
        let _gate = self.gate.read();

        let mut appended = None;
        let page = match self.map.entry(key.clone()) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                let page = Arc::new(Page::new(entry.key().clone()));
                appended = Some(Arc::clone(&page));
                entry.insert(Arc::clone(&page));
                page
            }
        };

        // The map shard lock is released; the queue can be taken safely.
        if let Some(page) = appended {
            self.queue.lock().push_back(page);
        }

        if page.set(value) {
            self.population.fetch_add(1, Ordering::Relaxed);

            let still_mapped = self
                .map
                .get(key)
                .is_some_and(|current| Arc::ptr_eq(current.value(), &page));
            if !still_mapped {
                if let Some(value) = page.take() {
                    self.population.fetch_sub(1, Ordering::Relaxed);
                    return Some(value);
                }
            }
        }

        self.evict_overflow();
        None
    }

    /// Evict a key on demand, returning the value it held.
    pub fn remove(&self, key: &K) -> Option<Arc<V>> {
        let _gate = self.gate.read();

        let (_, page) = self.map.remove(key)?;
        let previous = page.take();
        if previous.is_some() {
            self.population.fetch_sub(1, Ordering::Relaxed);
        }
        // The page stays queued until the next pruning pass.
        previous
    }

    /// Change the capacity, shrinking population to fit before returning.
    ///
    /// # Errors
    /// `InvalidArgument` when `capacity` is zero.
    pub fn resize(&self, capacity: usize) -> Result<()> {
        if capacity == 0 {
            return Err(Error::InvalidArgument(format!(
                "cache '{}' capacity must be > 0",
                self.name
            )));
        }

        let _gate = self.gate.write();
        self.capacity.store(capacity, Ordering::Relaxed);
        self.evict_overflow();
        Ok(())
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let _gate = self.gate.write();
        let mut queue = self.queue.lock();
        queue.clear();
        self.map.clear();
        self.population.store(0, Ordering::Relaxed);
    }

    /// Number of resident entries.
    pub fn len(&self) -> usize {
        self.population.load(Ordering::Relaxed)
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current capacity.
    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Relaxed)
    }

    /// Cache name, used in diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Statistics counters.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Run the second-chance sweep until population fits capacity.
    ///
    /// Serialized under the queue lock; concurrent callers queue up and
    /// find the work already done. The walk is bounded by two rotations:
    /// the first clears reference bits, the second must find a victim.
    fn evict_overflow(&self) {
        if self.population.load(Ordering::Relaxed) <= self.capacity.load(Ordering::Relaxed) {
            return;
        }

        let mut queue = self.queue.lock();
        let mut steps = 0;
        let limit = 2 * queue.len() + 1;

        while self.population.load(Ordering::Relaxed) > self.capacity.load(Ordering::Relaxed)
            && steps < limit
        {
            let Some(page) = queue.pop_front() else { break };
            steps += 1;

            if page.clear_referenced() {
                // Second chance.
                queue.push_back(page);
            } else if page.take().is_some() {
                self.population.fetch_sub(1, Ordering::Relaxed);
                self.stats.record_evictions(1);
                // The vacated page stays queued for reuse.
                queue.push_back(page);
            } else {
                // Already vacant; a pruning candidate.
                queue.push_back(page);
            }
        }

        self.prune_locked(&mut queue);
    }

    /// Drop vacated pages once the queue outgrows twice the capacity.
    ///
    /// A vacant page whose map entry still points at it is unmapped too,
    /// so the next `put` of that key starts from a fresh page.
    fn prune_locked(&self, queue: &mut VecDeque<Arc<Page<K, V>>>) {
        let capacity = self.capacity.load(Ordering::Relaxed);
        if queue.len() <= capacity.saturating_mul(2) {
            return;
        }

        let before = queue.len();
        queue.retain(|page| {
            if page.is_resident() {
                return true;
            }
            self.map
                .remove_if(page.key(), |_, current| Arc::ptr_eq(current, page));
            false
        });
        debug!(
            "cache '{}': pruned {} vacant pages",
            self.name,
            before - queue.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(capacity: usize) -> ClockCache<u64, String> {
        ClockCache::new("test-nodes", capacity).unwrap()
    }

    fn value(s: &str) -> Arc<String> {
        Arc::new(s.to_owned())
    }

    #[test]
    fn test_rejects_bad_construction() {
        assert!(ClockCache::<u64, String>::new("", 10).is_err());
        assert!(ClockCache::<u64, String>::new("nodes", 0).is_err());
    }

    #[test]
    fn test_put_get_roundtrip() {
        let cache = cache(4);

        cache.put(1, value("a"));
        assert_eq!(cache.get(&1).unwrap().as_str(), "a");
        assert!(cache.get(&2).is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_put_replaces_value() {
        let cache = cache(4);

        cache.put(1, value("a"));
        cache.put(1, value("b"));

        assert_eq!(cache.get(&1).unwrap().as_str(), "b");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_capacity_respected() {
        let cache = cache(3);

        for i in 0..10 {
            cache.put(i, value("x"));
            assert!(cache.len() <= 3, "population exceeded capacity");
        }
    }

    /// Second-chance behavior: a recently read page survives the sweep.
    #[test]
    fn test_clock_eviction_second_chance() {
        let cache = cache(3);

        cache.put(1, value("a"));
        cache.put(2, value("b"));
        cache.put(3, value("c"));

        // Give page 1 its reference bit.
        assert!(cache.get(&1).is_some());

        cache.put(4, value("d"));

        assert_eq!(cache.len(), 3);
        assert!(cache.get(&1).is_some(), "referenced page was evicted");
        assert!(cache.get(&4).is_some(), "incoming page was evicted");
        let survivors = [2, 3]
            .iter()
            .filter(|k| cache.map.get(k).is_some_and(|p| p.is_resident()))
            .count();
        assert_eq!(survivors, 1, "exactly one unreferenced page must go");
    }

    #[test]
    fn test_vacated_page_reusable() {
        let cache = cache(2);

        cache.put(1, value("a"));
        cache.put(2, value("b"));
        cache.put(3, value("c")); // evicts one of 1/2

        let evicted = if cache.get(&1).is_none() { 1 } else { 2 };

        // Re-putting the evicted key repopulates its page in place.
        cache.put(evicted, value("back"));
        assert_eq!(cache.get(&evicted).unwrap().as_str(), "back");
        assert!(cache.len() <= 2);
    }

    #[test]
    fn test_remove() {
        let cache = cache(4);

        cache.put(1, value("a"));
        assert_eq!(cache.remove(&1).unwrap().as_str(), "a");
        assert!(cache.get(&1).is_none());
        assert_eq!(cache.len(), 0);
        assert!(cache.remove(&1).is_none());
    }

    #[test]
    fn test_resize_shrinks_population() {
        let cache = cache(100);
        for i in 0..100 {
            cache.put(i, value("x"));
        }

        cache.resize(10).unwrap();
        assert!(cache.len() <= 10);
        assert_eq!(cache.capacity(), 10);

        assert!(cache.resize(0).is_err());
    }

    #[test]
    fn test_clear() {
        let cache = cache(8);
        for i in 0..8 {
            cache.put(i, value("x"));
        }

        cache.clear();
        assert_eq!(cache.len(), 0);
        assert!(cache.get(&0).is_none());
    }

    #[test]
    fn test_queue_pruned() {
        let cache = cache(2);

        // Churn enough distinct keys that vacated pages must be pruned
        // rather than accumulate.
        for i in 0..100 {
            cache.put(i, value("x"));
        }

        assert!(cache.queue.lock().len() <= 4);
        assert!(cache.len() <= 2);
    }

    #[test]
    fn test_stats_track_hits_and_misses() {
        let cache = cache(4);
        cache.put(1, value("a"));

        cache.get(&1);
        cache.get(&2);

        let snapshot = cache.stats().snapshot();
        assert_eq!(snapshot.hits, 1);
        assert_eq!(snapshot.misses, 1);
    }

    #[test]
    fn test_concurrent_put_get() {
        use std::thread;

        let cache = Arc::new(cache(64));
        let mut handles = vec![];

        for t in 0..8u64 {
            let cache = Arc::clone(&cache);
            handles.push(thread::spawn(move || {
                for i in 0..500u64 {
                    let key = (t * 31 + i) % 128;
                    cache.put(key, Arc::new(format!("v{key}")));
                    if let Some(v) = cache.get(&key) {
                        assert_eq!(v.as_str(), format!("v{key}"));
                    }
                    assert!(cache.len() <= 64);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(cache.len() <= 64);
    }
}
