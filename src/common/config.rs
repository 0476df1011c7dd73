//! Configuration for the entity caches.

use std::str::FromStr;

use crate::common::{Error, Result};

/// Number of stripes in a load-lock array.
///
/// A power of two so the id-to-stripe mapping reduces to a mask.
pub const DEFAULT_STRIPE_COUNT: usize = 32;

/// Default capacity of the node cache.
pub const DEFAULT_MAX_NODE_CACHE_SIZE: usize = 1500;

/// Default capacity of the relationship cache.
pub const DEFAULT_MAX_RELATIONSHIP_CACHE_SIZE: usize = 3500;

/// Default heap ratio targeted by the adaptive cache manager.
pub const DEFAULT_ADAPTIVE_HEAP_RATIO: f64 = 0.77;

/// Lowest accepted heap ratio; smaller values are clamped up.
pub const MIN_ADAPTIVE_HEAP_RATIO: f64 = 0.1;

/// Highest accepted heap ratio; larger values are clamped down.
pub const MAX_ADAPTIVE_HEAP_RATIO: f64 = 0.95;

/// Which eviction policy backs an entity cache.
///
/// `Soft` and `Weak` approximate the reachability-governed caches of
/// runtimes with a managed heap: `Weak` holds [`std::sync::Weak`]
/// referents, `Soft` is an LRU that shrinks under memory pressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Clock,
    Lru,
    Weak,
    Soft,
    Strong,
    None,
}

impl CacheKind {
    /// Name used in configuration values.
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::Clock => "clock",
            CacheKind::Lru => "lru",
            CacheKind::Weak => "weak",
            CacheKind::Soft => "soft",
            CacheKind::Strong => "strong",
            CacheKind::None => "none",
        }
    }
}

impl FromStr for CacheKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "clock" => Ok(CacheKind::Clock),
            "lru" => Ok(CacheKind::Lru),
            "weak" => Ok(CacheKind::Weak),
            "soft" => Ok(CacheKind::Soft),
            "strong" => Ok(CacheKind::Strong),
            "none" => Ok(CacheKind::None),
            other => Err(Error::InvalidArgument(format!(
                "unknown cache_type '{other}'"
            ))),
        }
    }
}

impl Default for CacheKind {
    fn default() -> Self {
        CacheKind::Soft
    }
}

/// Named cache options and their effects.
///
/// Out-of-range values are clamped rather than rejected, so a settings
/// struct is always usable as constructed.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Eviction policy for both entity caches.
    pub cache_kind: CacheKind,

    /// Enables heap-pressure driven resizing of the LRU-backed caches.
    pub use_adaptive_cache: bool,

    /// Heap usage ratio the adaptive manager steers toward.
    pub adaptive_cache_heap_ratio: f64,

    /// Lower bound the adaptive manager will never shrink the node cache below.
    pub min_node_cache_size: usize,

    /// Lower bound for the relationship cache.
    pub min_relationship_cache_size: usize,

    /// Capacity of the node cache.
    pub max_node_cache_size: usize,

    /// Capacity of the relationship cache.
    pub max_relationship_cache_size: usize,
}

impl CacheSettings {
    /// Settings with all defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the eviction policy.
    pub fn with_cache_kind(mut self, kind: CacheKind) -> Self {
        self.cache_kind = kind;
        self
    }

    /// Enable or disable adaptive resizing.
    pub fn with_adaptive_cache(mut self, enabled: bool) -> Self {
        self.use_adaptive_cache = enabled;
        self
    }

    /// Set the adaptive heap ratio, clamped to the accepted range.
    pub fn with_heap_ratio(mut self, ratio: f64) -> Self {
        self.adaptive_cache_heap_ratio = clamp_heap_ratio(ratio);
        self
    }

    /// Set the node cache bounds.
    pub fn with_node_cache_sizes(mut self, min: usize, max: usize) -> Self {
        self.min_node_cache_size = min;
        self.max_node_cache_size = max.max(min);
        self
    }

    /// Set the relationship cache bounds.
    pub fn with_relationship_cache_sizes(mut self, min: usize, max: usize) -> Self {
        self.min_relationship_cache_size = min;
        self.max_relationship_cache_size = max.max(min);
        self
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            cache_kind: CacheKind::default(),
            use_adaptive_cache: false,
            adaptive_cache_heap_ratio: DEFAULT_ADAPTIVE_HEAP_RATIO,
            min_node_cache_size: 0,
            min_relationship_cache_size: 0,
            max_node_cache_size: DEFAULT_MAX_NODE_CACHE_SIZE,
            max_relationship_cache_size: DEFAULT_MAX_RELATIONSHIP_CACHE_SIZE,
        }
    }
}

/// Clamp a heap ratio into `[0.1, 0.95]`.
pub fn clamp_heap_ratio(ratio: f64) -> f64 {
    ratio.clamp(MIN_ADAPTIVE_HEAP_RATIO, MAX_ADAPTIVE_HEAP_RATIO)
}
