//! Batch Work Queue
//!
//! One sweep drains a FIFO of `(descriptor, descriptions)` work items that
//! starts from a root batch and grows one descriptor level at a time.

use super::batch_query::build_batch_query;
use super::demux::demultiplex;
use super::{Holder, PrefetchOptions, SweepStats};
use crate::cache::DescriptiveCache;
use crate::description::Description;
use crate::descriptor::PrefetchDescriptor;
use crate::item::Item;
use crate::registry::DescriptorRegistry;
use crate::store::{ObjectStore, ResultsRow, Sequence, StoreError};
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Descriptions produced by one descriptor, batchable in one query
#[derive(Debug)]
struct WorkItem {
    descriptor: Arc<PrefetchDescriptor>,
    descriptions: BTreeSet<Description>,
}

pub(crate) struct Sweep<'a, S: ObjectStore + ?Sized> {
    store: &'a S,
    cache: &'a DescriptiveCache,
    options: &'a PrefetchOptions,
    sequence: Sequence,
    queue: VecDeque<WorkItem>,
    holder: Holder,
    stats: SweepStats,
}

impl<'a, S: ObjectStore + ?Sized> Sweep<'a, S> {
    pub(crate) fn new(
        store: &'a S,
        cache: &'a DescriptiveCache,
        options: &'a PrefetchOptions,
        sequence: Sequence,
    ) -> Self {
        Self {
            store,
            cache,
            options,
            sequence,
            queue: VecDeque::new(),
            holder: Holder::default(),
            stats: SweepStats::default(),
        }
    }

    /// Seed one work item per descriptor applicable to the root rows.
    pub(crate) fn seed(
        &mut self,
        registry: &DescriptorRegistry,
        rows: &[ResultsRow],
    ) -> Result<(), StoreError> {
        let mut groups: Vec<WorkItem> = Vec::new();
        for row in rows {
            let item = row.item(0)?;
            for descriptor in registry.descriptors_for(&item.class_name) {
                if let Some(description) = self.describe(descriptor, item) {
                    group_for(&mut groups, descriptor).insert(description);
                }
            }
        }
        self.queue
            .extend(groups.into_iter().filter(|w| !w.descriptions.is_empty()));
        Ok(())
    }

    /// Process work items until the queue is empty.
    pub(crate) fn drain(&mut self) -> Result<(), StoreError> {
        while let Some(work) = self.queue.pop_front() {
            self.stats.work_items += 1;
            self.process(work)?;
        }
        Ok(())
    }

    pub(crate) fn finish(self) -> (Holder, SweepStats) {
        (self.holder, self.stats)
    }

    fn describe(&mut self, descriptor: &PrefetchDescriptor, item: &Item) -> Option<Description> {
        match descriptor.description_for(item) {
            Ok(description) => Some(description),
            Err(e) => {
                self.stats.unresolved += 1;
                warn!(error = %e, "Skipping prefetch");
                None
            }
        }
    }

    fn process(&mut self, work: WorkItem) -> Result<(), StoreError> {
        let mut pending = BTreeSet::new();
        for description in work.descriptions {
            match self.cache.get(&description) {
                Some(items) => {
                    self.stats.cache_hits += 1;
                    self.holder.push(items);
                }
                None => {
                    pending.insert(description);
                }
            }
        }

        // A lone leftover is not worth a round trip of its own
        if pending.len() <= 1 {
            if !pending.is_empty() {
                self.stats.skipped_singletons += 1;
                debug!(
                    descriptor = work.descriptor.name(),
                    "Skipping prefetch of a single description"
                );
            }
            return Ok(());
        }

        let start = Instant::now();
        let query = build_batch_query(&work.descriptor, &pending, self.options.batch_size)?;
        let built = start.elapsed();

        let rows = self.store.execute(&query, self.sequence)?;
        self.stats.queries += 1;
        let executed = start.elapsed();

        let demuxed = demultiplex(&work.descriptor, &pending, &rows)?;
        self.stats.unresolved += demuxed.dropped;

        // an item with a repeated field can answer several groups
        let mut fetched: Vec<Arc<Item>> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for (description, items) in demuxed.groups {
            fetched.extend(
                items
                    .iter()
                    .filter(|item| seen.insert(item.identifier.clone()))
                    .cloned(),
            );
            self.cache.insert(description, Arc::clone(&items));
            self.holder.push(items);
        }
        self.stats.items_fetched += fetched.len();
        let processed = start.elapsed();

        debug!(
            descriptor = work.descriptor.name(),
            descriptions = pending.len(),
            rows = rows.len(),
            build_ms = built.as_millis() as u64,
            execute_ms = (executed - built).as_millis() as u64,
            process_ms = (processed - executed).as_millis() as u64,
            "Prefetch query"
        );

        for child in work.descriptor.children() {
            let mut descriptions = BTreeSet::new();
            for item in &fetched {
                if let Some(description) = self.describe(child, item) {
                    descriptions.insert(description);
                }
            }
            if !descriptions.is_empty() {
                self.queue.push_back(WorkItem {
                    descriptor: Arc::clone(child),
                    descriptions,
                });
            }
        }
        Ok(())
    }
}

/// The descriptions already collected for `descriptor`, creating the group on first use.
fn group_for<'g>(
    groups: &'g mut Vec<WorkItem>,
    descriptor: &Arc<PrefetchDescriptor>,
) -> &'g mut BTreeSet<Description> {
    let idx = match groups
        .iter()
        .position(|w| Arc::ptr_eq(&w.descriptor, descriptor))
    {
        Some(idx) => idx,
        None => {
            groups.push(WorkItem {
                descriptor: Arc::clone(descriptor),
                descriptions: BTreeSet::new(),
            });
            groups.len() - 1
        }
    };
    &mut groups[idx].descriptions
}
