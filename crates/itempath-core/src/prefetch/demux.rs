//! Result Demultiplexer
//!
//! Splits the rows of one batch query back into per-description groups by
//! reverse-resolving each fetched item through the descriptor that built the
//! query. Every expected description gets a group, empty or not.

use crate::cache::ItemList;
use crate::description::Description;
use crate::descriptor::PrefetchDescriptor;
use crate::item::Item;
use crate::store::{ResultsRow, StoreError};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tracing::warn;

/// Groups recovered from one batch result
#[derive(Debug, Default)]
pub(crate) struct Demultiplexed {
    /// One entry per expected description, in description order
    pub groups: Vec<(Description, ItemList)>,
    /// Rows that could not be filed under an expected description
    pub dropped: usize,
}

/// File each row under every description its item satisfies.
///
/// A row that is not an item fails the whole batch. A row whose item cannot
/// be reverse-resolved, or answers no description anybody asked for, is
/// logged and dropped rather than filed under the wrong key. An item with a
/// repeated field lands in each group one of its values answers.
pub(crate) fn demultiplex(
    descriptor: &PrefetchDescriptor,
    expected: &BTreeSet<Description>,
    rows: &[ResultsRow],
) -> Result<Demultiplexed, StoreError> {
    let mut groups: BTreeMap<Description, Group> = expected
        .iter()
        .map(|d| (d.clone(), Group::default()))
        .collect();
    let mut dropped = 0;

    for row in rows {
        let item = row.item(0)?;
        match descriptor.descriptions_from_target(item) {
            Ok(candidates) => {
                let mut filed = false;
                for description in &candidates {
                    if let Some(group) = groups.get_mut(description) {
                        group.push(item);
                        filed = true;
                    }
                }
                if !filed {
                    dropped += 1;
                    warn!(
                        descriptor = descriptor.name(),
                        item = %item,
                        candidates = candidates.len(),
                        "Prefetched row matches no requested description"
                    );
                }
            }
            Err(e) => {
                dropped += 1;
                warn!(error = %e, "Cannot demultiplex prefetched row");
            }
        }
    }

    Ok(Demultiplexed {
        groups: groups
            .into_iter()
            .map(|(description, group)| (description, Arc::new(group.items)))
            .collect(),
        dropped,
    })
}

/// Items filed under one description, each at most once.
#[derive(Default)]
struct Group {
    items: Vec<Arc<Item>>,
    seen: HashSet<String>,
}

impl Group {
    fn push(&mut self, item: &Arc<Item>) {
        // the batch join returns an item once per matching value
        if self.seen.insert(item.identifier.clone()) {
            self.items.push(Arc::clone(item));
        }
    }
}
