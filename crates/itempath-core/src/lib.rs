//! ItemPath Core - Descriptor-driven prefetching over a generic item store
//!
//! This crate provides:
//! - A generic item model (class, identifier, attributes, references)
//! - Descriptions: order-independent sets of field criteria used as cache keys
//! - Prefetch descriptors and an immutable class → descriptor registry
//! - A thread-safe descriptive cache (unbounded, or LRU-bounded on request)
//! - A small query AST, the `ObjectStore` trait and a SQLite item store
//! - `PathFollowingStore`, which batches related-item fetches for every root batch

pub mod cache;
pub mod description;
pub mod descriptor;
pub mod item;
pub mod prefetch;
pub mod query;
pub mod registry;
pub mod store;

// Model re-exports
pub use description::{Description, FieldMatch};
pub use item::{Attribute, Item, Reference, CLASS_NAME_FIELD, IDENTIFIER_FIELD};

// Descriptor re-exports
pub use descriptor::{DescriptorError, FieldSource, FieldTemplate, PrefetchDescriptor, ResolveError};
pub use registry::{DescriptorRegistry, DescriptorRegistryBuilder};

// Cache re-exports
pub use cache::{CacheMetrics, DescriptiveCache, ItemList};

// Query and store re-exports
pub use query::{
    Collection, CollectionRef, Column, Constraint, ConstraintOp, ConstraintSet, Query, QueryClass,
    QueryField, Table,
};
pub use store::{
    ObjectStore, ResultValue, ResultsRow, Sequence, SqliteItemStore, StoreError,
    STORE_SCHEMA_VERSION,
};

// Prefetch re-exports
pub use prefetch::{
    build_batch_query, build_description_query, BatchResults, Holder, PathFollowingStore,
    PrefetchOptions, SweepStats,
};
