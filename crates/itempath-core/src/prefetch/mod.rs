//! Path-Following Prefetch Engine
//!
//! Wraps any [`ObjectStore`] so that every root batch of items triggers a
//! sweep over the configured descriptors, fetching related items with as
//! few batched queries as possible and memoizing them by description.
//!
//! # Architecture
//!
//! ```text
//! PathFollowingStore::execute_batch(query)
//! ├── inner store: root rows
//! └── Sweep (one per root batch)
//!     ├── seed: root items × DescriptorRegistry → descriptions
//!     ├── FIFO of (descriptor, descriptions)
//!     │   ├── DescriptiveCache hits → Holder
//!     │   ├── batch_query: sharedStatic AND (d1 OR … OR dn)
//!     │   ├── demux: rows → description groups → cache + Holder
//!     │   └── child descriptors over fetched items → enqueue
//!     └── BatchResults { rows, holder, stats }
//! ```
//!
//! Without a registry (or with an empty one) the wrapper is a pure
//! pass-through and the cache is never written by `execute_batch`.

mod batch_query;
mod demux;
mod sweep;

pub use batch_query::{build_batch_query, build_description_query};

use crate::cache::{DescriptiveCache, ItemList};
use crate::description::Description;
use crate::item::Item;
use crate::query::Query;
use crate::registry::DescriptorRegistry;
use crate::store::{ObjectStore, ResultsRow, Sequence, StoreError};
use itempath_config::{ConfigError, ItempathConfig, DEFAULT_BATCH_SIZE, DEFAULT_MISS_LOG_INTERVAL};
use serde::Serialize;
use std::collections::HashSet;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Instant;
use sweep::Sweep;
use tracing::{debug, info};

/// Tuning for prefetch queries and diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefetchOptions {
    /// Result batch size set on every query the engine builds
    pub batch_size: usize,
    /// Log a cache diagnostic every this many lookup misses (0 disables)
    pub miss_log_interval: u64,
}

impl Default for PrefetchOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            miss_log_interval: DEFAULT_MISS_LOG_INTERVAL,
        }
    }
}

/// Counters for one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepStats {
    /// Work items taken off the queue
    pub work_items: usize,
    /// Batch queries executed
    pub queries: usize,
    /// Descriptions answered from the cache
    pub cache_hits: usize,
    /// Work items left unfetched because only one description missed the cache
    pub skipped_singletons: usize,
    /// Items returned by batch queries
    pub items_fetched: usize,
    /// Descriptions or rows skipped because a field could not be resolved
    pub unresolved: usize,
}

/// Items fetched alongside a batch, in the order they were resolved.
#[derive(Debug, Clone, Default)]
pub struct Holder {
    lists: Vec<ItemList>,
}

impl Holder {
    pub(crate) fn push(&mut self, items: ItemList) {
        if !items.is_empty() {
            self.lists.push(items);
        }
    }

    /// Every held item, in order
    pub fn items(&self) -> impl Iterator<Item = &Arc<Item>> {
        self.lists.iter().flat_map(|l| l.iter())
    }

    /// The cache-backed lists the items came from
    pub fn lists(&self) -> &[ItemList] {
        &self.lists
    }

    pub fn len(&self) -> usize {
        self.lists.iter().map(|l| l.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    pub fn into_items(self) -> Vec<Arc<Item>> {
        self.lists
            .into_iter()
            .flat_map(|l| l.iter().cloned().collect::<Vec<_>>())
            .collect()
    }
}

/// Rows of a root batch plus whatever was prefetched for them.
///
/// Dereferences to the rows, so code that ignores prefetching reads it like
/// a plain result.
#[derive(Debug, Clone, Default)]
pub struct BatchResults {
    rows: Vec<ResultsRow>,
    holder: Holder,
    stats: SweepStats,
}

impl BatchResults {
    fn plain(rows: Vec<ResultsRow>) -> Self {
        Self {
            rows,
            ..Default::default()
        }
    }

    pub fn rows(&self) -> &[ResultsRow] {
        &self.rows
    }

    pub fn holder(&self) -> &Holder {
        &self.holder
    }

    pub fn stats(&self) -> &SweepStats {
        &self.stats
    }

    pub fn into_rows(self) -> Vec<ResultsRow> {
        self.rows
    }

    pub fn into_parts(self) -> (Vec<ResultsRow>, Holder, SweepStats) {
        (self.rows, self.holder, self.stats)
    }
}

impl Deref for BatchResults {
    type Target = [ResultsRow];

    fn deref(&self) -> &Self::Target {
        &self.rows
    }
}

/// An [`ObjectStore`] that follows descriptor paths from every root batch.
pub struct PathFollowingStore<S> {
    store: S,
    registry: Option<Arc<DescriptorRegistry>>,
    cache: Arc<DescriptiveCache>,
    options: PrefetchOptions,
}

impl<S: ObjectStore> PathFollowingStore<S> {
    /// Pass-through wrapper with an empty unbounded cache and no descriptors.
    pub fn new(store: S) -> Self {
        Self {
            store,
            registry: None,
            cache: Arc::new(DescriptiveCache::new()),
            options: PrefetchOptions::default(),
        }
    }

    /// Build from configuration: descriptors (unless prefetch is disabled),
    /// cache capacity and tuning.
    pub fn from_config(store: S, config: &ItempathConfig) -> Result<Self, ConfigError> {
        let registry = if config.prefetch.enabled {
            Some(Arc::new(DescriptorRegistry::from_config(&config.prefetch)?))
        } else {
            None
        };

        Ok(Self {
            store,
            registry,
            cache: Arc::new(DescriptiveCache::with_capacity(config.cache.capacity)),
            options: PrefetchOptions {
                batch_size: config.prefetch.batch_size,
                miss_log_interval: config.prefetch.miss_log_interval,
            },
        })
    }

    pub fn with_descriptors(mut self, registry: Arc<DescriptorRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Share a cache with other stores.
    pub fn with_cache(mut self, cache: Arc<DescriptiveCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_options(mut self, options: PrefetchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn inner(&self) -> &S {
        &self.store
    }

    pub fn cache(&self) -> &Arc<DescriptiveCache> {
        &self.cache
    }

    pub fn registry(&self) -> Option<&Arc<DescriptorRegistry>> {
        self.registry.as_ref()
    }

    pub fn options(&self) -> &PrefetchOptions {
        &self.options
    }

    /// True if root batches trigger sweeps.
    pub fn is_prefetching(&self) -> bool {
        self.registry.as_ref().is_some_and(|r| !r.is_empty())
    }

    /// Execute a root batch at the store's current sequence.
    pub fn execute_batch(&self, query: &Query) -> Result<BatchResults, StoreError> {
        self.execute_batch_at(query, self.store.sequence())
    }

    /// Execute a root batch, running every prefetch query at `sequence` too.
    ///
    /// Any store error aborts the sweep and is returned as is. Cache entries
    /// written before the failure stay.
    pub fn execute_batch_at(
        &self,
        query: &Query,
        sequence: Sequence,
    ) -> Result<BatchResults, StoreError> {
        let rows = self.store.execute(query, sequence)?;

        let registry = match &self.registry {
            Some(registry) if !registry.is_empty() => registry,
            _ => return Ok(BatchResults::plain(rows)),
        };
        if rows.is_empty() || !query.selects_single_item() {
            return Ok(BatchResults::plain(rows));
        }

        let start = Instant::now();
        let mut sweep = Sweep::new(&self.store, &self.cache, &self.options, sequence);
        sweep.seed(registry, &rows)?;
        sweep.drain()?;
        let (holder, stats) = sweep.finish();

        debug!(
            root_rows = rows.len(),
            work_items = stats.work_items,
            queries = stats.queries,
            cache_hits = stats.cache_hits,
            skipped_singletons = stats.skipped_singletons,
            items_fetched = stats.items_fetched,
            unresolved = stats.unresolved,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Prefetch sweep complete"
        );

        Ok(BatchResults {
            rows,
            holder,
            stats,
        })
    }

    /// Items matching `description`, from the cache or one query.
    ///
    /// Always caches, including empty results.
    pub fn get_items_by_description(
        &self,
        description: &Description,
    ) -> Result<ItemList, StoreError> {
        self.cache.record_lookup();
        if let Some(items) = self.cache.get(description) {
            return Ok(items);
        }

        let misses = self.cache.record_miss();
        let interval = self.options.miss_log_interval;
        if interval > 0 && misses % interval == 0 {
            let metrics = self.cache.metrics();
            info!(
                lookups = metrics.lookups,
                misses = metrics.misses,
                cache_size = self.cache.len(),
                "Descriptive cache statistics"
            );
        }

        let start = Instant::now();
        let query = build_description_query(description, self.options.batch_size)?;
        let rows = self.store.execute(&query, self.store.sequence())?;
        // non-distinct: an item repeating the matched value comes back twice
        let mut seen = HashSet::new();
        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            let item = row.item(0)?;
            if seen.insert(item.identifier.as_str()) {
                items.push(Arc::clone(item));
            }
        }
        let items = Arc::new(items);
        self.cache.insert(description.clone(), Arc::clone(&items));

        debug!(
            description = %description,
            items = items.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Fetched description"
        );
        Ok(items)
    }
}

impl<S: ObjectStore> ObjectStore for PathFollowingStore<S> {
    fn execute(&self, query: &Query, sequence: Sequence) -> Result<Vec<ResultsRow>, StoreError> {
        self.execute_batch_at(query, sequence)
            .map(BatchResults::into_rows)
    }

    fn sequence(&self) -> Sequence {
        self.store.sequence()
    }
}

impl<S: std::fmt::Debug> std::fmt::Debug for PathFollowingStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathFollowingStore")
            .field("store", &self.store)
            .field("descriptors", &self.registry.as_ref().map(|r| r.len()))
            .field("cache", &self.cache)
            .field("options", &self.options)
            .finish()
    }
}
