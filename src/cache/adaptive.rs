//! Adaptive cache manager - heap-pressure driven resizing.
//!
//! When enabled, a background worker periodically samples memory usage
//! and resizes every registered cache toward a capacity derived from the
//! configured heap ratio, within each cache's `[min, max]` bounds.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, warn};
use parking_lot::{Condvar, Mutex};

use crate::cache::ResizableCache;
use crate::common::config::clamp_heap_ratio;
use crate::common::Result;

/// A point-in-time memory sample.
#[derive(Debug, Clone, Copy)]
pub struct HeapUsage {
    /// Bytes in use.
    pub used: u64,
    /// Total bytes available to the process.
    pub total: u64,
}

impl HeapUsage {
    /// Fraction of the total currently in use (0.0 to 1.0).
    pub fn pressure(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.used as f64 / self.total as f64).clamp(0.0, 1.0)
    }
}

/// Source of memory samples.
///
/// A seam so tests can drive the manager with synthetic pressure instead
/// of the host's real memory state.
pub trait MemoryMonitor: Send + Sync {
    /// Sample current usage, or `None` when the host provides no numbers.
    fn sample(&self) -> Option<HeapUsage>;
}

/// Samples the host via `sys-info`.
pub struct SystemMemoryMonitor;

impl MemoryMonitor for SystemMemoryMonitor {
    fn sample(&self) -> Option<HeapUsage> {
        let info = sys_info::mem_info().ok()?;
        let total = info.total.saturating_mul(1024);
        let available = info.avail.saturating_mul(1024);
        Some(HeapUsage {
            used: total.saturating_sub(available),
            total,
        })
    }
}

struct Registration {
    cache: Arc<dyn ResizableCache>,
    min_size: usize,
    max_size: usize,
}

struct Inner {
    registrations: Mutex<Vec<Registration>>,
    monitor: Box<dyn MemoryMonitor>,
    heap_ratio: f64,
    stopped: Mutex<bool>,
    wakeup: Condvar,
}

impl Inner {
    fn apply(&self, usage: HeapUsage) {
        let pressure = usage.pressure();
        for registration in self.registrations.lock().iter() {
            let target = target_capacity(
                pressure,
                self.heap_ratio,
                registration.min_size,
                registration.max_size,
            );
            debug!(
                "adaptive resize: cache '{}' pressure {:.2} target {}",
                registration.cache.name(),
                pressure,
                target
            );
            if let Err(err) = registration.cache.resize(target) {
                warn!(
                    "adaptive resize of '{}' failed: {}",
                    registration.cache.name(),
                    err
                );
            }
        }
    }
}

/// Derive a capacity from memory pressure.
///
/// At or below the configured ratio the cache gets its full `max`; above
/// it the capacity falls linearly toward `min`, reaching it when the
/// heap is exhausted. Never returns zero: a bounded cache cannot have a
/// zero capacity.
fn target_capacity(pressure: f64, heap_ratio: f64, min: usize, max: usize) -> usize {
    let floor = min.max(1);
    let max = max.max(floor);
    if pressure <= heap_ratio {
        return max;
    }
    let excess = ((pressure - heap_ratio) / (1.0 - heap_ratio)).clamp(0.0, 1.0);
    let span = (max - floor) as f64;
    max - (excess * span).round() as usize
}

/// Resizes registered caches in response to heap-memory pressure.
///
/// The worker thread is started explicitly and joined on drop. Every
/// sample resizes all registered caches; `resize` itself enforces that
/// population fits the new capacity before it returns.
pub struct AdaptiveCacheManager {
    inner: Arc<Inner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AdaptiveCacheManager {
    /// Create a manager steering toward `heap_ratio` (clamped to the
    /// accepted range) using the given monitor.
    pub fn new(heap_ratio: f64, monitor: Box<dyn MemoryMonitor>) -> Self {
        Self {
            inner: Arc::new(Inner {
                registrations: Mutex::new(Vec::new()),
                monitor,
                heap_ratio: clamp_heap_ratio(heap_ratio),
                stopped: Mutex::new(false),
                wakeup: Condvar::new(),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Register a cache to be resized within `[min_size, max_size]`.
    pub fn register(&self, cache: Arc<dyn ResizableCache>, min_size: usize, max_size: usize) {
        self.inner.registrations.lock().push(Registration {
            cache,
            min_size,
            max_size,
        });
    }

    /// Take one sample and resize all registered caches accordingly.
    pub fn sample_once(&self) {
        if let Some(usage) = self.inner.monitor.sample() {
            self.inner.apply(usage);
        }
    }

    /// Start the background worker sampling every `interval`.
    ///
    /// # Errors
    /// `Store` when the worker thread cannot be spawned.
    pub fn start(&self, interval: Duration) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }

        *self.inner.stopped.lock() = false;
        let inner = Arc::clone(&self.inner);
        let handle = std::thread::Builder::new()
            .name("graphmem-adaptive-cache".to_owned())
            .spawn(move || loop {
                let mut stopped = inner.stopped.lock();
                if *stopped {
                    break;
                }
                inner.wakeup.wait_for(&mut stopped, interval);
                if *stopped {
                    break;
                }
                drop(stopped);

                if let Some(usage) = inner.monitor.sample() {
                    inner.apply(usage);
                }
            })?;

        *worker = Some(handle);
        Ok(())
    }

    /// Stop the background worker and wait for it to exit.
    pub fn stop(&self) {
        *self.inner.stopped.lock() = true;
        self.inner.wakeup.notify_all();

        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for AdaptiveCacheManager {
    fn drop(&mut self) {
        self.stop();
    }
}
