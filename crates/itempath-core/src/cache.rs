//! Descriptive Cache
//!
//! Process-lifetime map from a [`Description`] to the items matching it.
//! Shared by the batch prefetch engine and the single-description lookup path.
//!
//! Thread-safe via interior mutability: the default backend is a sharded
//! `DashMap`; the bounded backend is an `LruCache` behind `parking_lot::Mutex`.
//! Every lock is held only for the duration of one get or insert, never across
//! a store round trip.

use crate::description::Description;
use crate::item::Item;
use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Items matching one description, shared between the cache and batch holders.
pub type ItemList = Arc<Vec<Arc<Item>>>;

/// Cache metrics for monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheMetrics {
    /// Number of single-description lookups
    pub lookups: u64,
    /// Number of lookups that had to query the store
    pub misses: u64,
}

impl CacheMetrics {
    pub fn hits(&self) -> u64 {
        self.lookups.saturating_sub(self.misses)
    }

    /// Get hit rate as a fraction (0.0 - 1.0)
    pub fn hit_rate(&self) -> f64 {
        if self.lookups == 0 {
            0.0
        } else {
            self.hits() as f64 / self.lookups as f64
        }
    }
}

enum CacheStore {
    Unbounded(DashMap<Description, ItemList>),
    Bounded(Mutex<LruCache<Description, ItemList>>),
}

/// Memoizes description → items. Write-once per key in practice; a racing
/// second write for the same key simply replaces an equal value.
pub struct DescriptiveCache {
    store: CacheStore,
    lookups: AtomicU64,
    misses: AtomicU64,
}

impl DescriptiveCache {
    /// Unbounded cache with no eviction.
    pub fn new() -> Self {
        Self::with_store(CacheStore::Unbounded(DashMap::new()))
    }

    /// Cache that evicts the least recently used description beyond `capacity` entries.
    pub fn bounded(capacity: NonZeroUsize) -> Self {
        Self::with_store(CacheStore::Bounded(Mutex::new(LruCache::new(capacity))))
    }

    /// Unbounded for `None`, bounded otherwise. A zero capacity is treated as unbounded.
    pub fn with_capacity(capacity: Option<usize>) -> Self {
        match capacity.and_then(NonZeroUsize::new) {
            Some(capacity) => Self::bounded(capacity),
            None => Self::new(),
        }
    }

    fn with_store(store: CacheStore) -> Self {
        Self {
            store,
            lookups: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn is_bounded(&self) -> bool {
        matches!(self.store, CacheStore::Bounded(_))
    }

    /// Cached items for `description`, if present. Does not touch the metrics.
    pub fn get(&self, description: &Description) -> Option<ItemList> {
        match &self.store {
            CacheStore::Unbounded(map) => map.get(description).map(|r| Arc::clone(r.value())),
            CacheStore::Bounded(lru) => lru.lock().get(description).map(Arc::clone),
        }
    }

    pub fn insert(&self, description: Description, items: ItemList) {
        match &self.store {
            CacheStore::Unbounded(map) => {
                map.insert(description, items);
            }
            CacheStore::Bounded(lru) => {
                lru.lock().put(description, items);
            }
        }
    }

    pub fn contains(&self, description: &Description) -> bool {
        match &self.store {
            CacheStore::Unbounded(map) => map.contains_key(description),
            CacheStore::Bounded(lru) => lru.lock().contains(description),
        }
    }

    /// Number of cached descriptions
    pub fn len(&self) -> usize {
        match &self.store {
            CacheStore::Unbounded(map) => map.len(),
            CacheStore::Bounded(lru) => lru.lock().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Count a single-description lookup.
    pub(crate) fn record_lookup(&self) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a miss; returns the miss total including this one.
    pub(crate) fn record_miss(&self) -> u64 {
        self.misses.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Get a snapshot of cache metrics
    pub fn metrics(&self) -> CacheMetrics {
        CacheMetrics {
            lookups: self.lookups.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl Default for DescriptiveCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DescriptiveCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptiveCache")
            .field("bounded", &self.is_bounded())
            .field("len", &self.len())
            .field("metrics", &self.metrics())
            .finish()
    }
}
