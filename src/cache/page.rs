//! Page - a referent holder in the clock cache.
//!
//! A [`Page`] is one slot in the clock's circular queue. It carries the key
//! it was created for, a mutable value slot, and the reference bit the
//! second-chance sweep inspects.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

/// A slot in the clock cache.
///
/// The page outlives the residency of its value: eviction clears the value
/// slot but leaves the page queued, so a later `put` for the same key can
/// repopulate it without reshuffling the queue.
///
/// # Thread Safety
/// All fields use interior mutability for safe concurrent access:
/// - `value`: `RwLock` so lookups and the evictor never tear a swap
/// - `referenced`: `AtomicBool` set lock-free on every hit
pub struct Page<K, V> {
    /// Key this page was installed for. Never changes.
    key: K,

    /// The current referent, or None while the slot is vacant.
    value: RwLock<Option<Arc<V>>>,

    /// Second-chance bit, set on lookup hits, cleared by the sweep.
    ///
    /// Starts clear: a page that is installed but never read gets no
    /// second chance, which keeps one-shot scans from flushing hot pages.
    referenced: AtomicBool,
}

impl<K, V> Page<K, V> {
    /// Create a new vacant page for `key`.
    pub fn new(key: K) -> Self {
        Self {
            key,
            value: RwLock::new(None),
            referenced: AtomicBool::new(false),
        }
    }

    /// The key this page belongs to.
    #[inline]
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Current referent, if the slot is populated.
    #[inline]
    pub fn get(&self) -> Option<Arc<V>> {
        self.value.read().clone()
    }

    /// Install a referent, returning `true` if the slot was vacant.
    ///
    /// The caller uses the return value to keep the population counter
    /// accurate: only a vacant-to-populated transition counts.
    pub fn set(&self, value: Arc<V>) -> bool {
        let mut slot = self.value.write();
        let was_vacant = slot.is_none();
        *slot = Some(value);
        was_vacant
    }

    /// Clear the slot, returning the referent that was evicted.
    pub fn take(&self) -> Option<Arc<V>> {
        self.value.write().take()
    }

    /// Whether the slot currently holds a referent.
    #[inline]
    pub fn is_resident(&self) -> bool {
        self.value.read().is_some()
    }

    /// Set the reference bit.
    #[inline]
    pub fn mark_referenced(&self) {
        self.referenced.store(true, Ordering::Relaxed);
    }

    /// Clear the reference bit, returning its previous value.
    #[inline]
    pub fn clear_referenced(&self) -> bool {
        self.referenced.swap(false, Ordering::Relaxed)
    }

    /// Read the reference bit.
    #[inline]
    pub fn is_referenced(&self) -> bool {
        self.referenced.load(Ordering::Relaxed)
    }
}
