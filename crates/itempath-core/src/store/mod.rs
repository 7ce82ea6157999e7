//! Object Store Layer
//!
//! The relational query layer the prefetch engine calls into:
//!
//! ```text
//! ┌──────────────────────┐   execute(query, sequence)   ┌──────────────────┐
//! │ PathFollowingStore   │ ───────────────────────────▶ │ dyn ObjectStore  │
//! │ (prefetch engine)    │ ◀─────────────────────────── │ SqliteItemStore  │
//! └──────────────────────┘        Vec<ResultsRow>       └──────────────────┘
//! ```
//!
//! Rows are addressed by select-column position. Every call carries the
//! [`Sequence`] token of the snapshot it expects; a store that has been
//! written to since then rejects the call with [`StoreError::StaleSequence`].

pub mod schema;
mod sqlite;

pub use schema::STORE_SCHEMA_VERSION;
pub use sqlite::SqliteItemStore;

use crate::item::{Attribute, Item, Reference};
use crate::query::Query;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by stores and surfaced by prefetch sweeps
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Stale sequence: query issued at {expected}, store is at {found}")]
    StaleSequence { expected: Sequence, found: Sequence },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Cannot read column {column} of result row: {message}")]
    FieldAccess { column: usize, message: String },

    #[error("Schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch { expected: String, found: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery(message.into())
    }
}

/// Opaque consistency token. Advances on every write to a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Sequence(pub u64);

impl std::fmt::Display for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One selected column value
#[derive(Debug, Clone, PartialEq)]
pub enum ResultValue {
    Item(Arc<Item>),
    Attribute(Attribute),
    Reference(Reference),
}

/// One result row, addressable by select position
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultsRow {
    values: Vec<ResultValue>,
}

impl ResultsRow {
    pub fn new(values: Vec<ResultValue>) -> Self {
        Self { values }
    }

    /// Single-column row holding one item.
    pub fn single_item(item: Arc<Item>) -> Self {
        Self::new(vec![ResultValue::Item(item)])
    }

    pub fn get(&self, column: usize) -> Option<&ResultValue> {
        self.values.get(column)
    }

    /// The item in `column`; anything else is a field-access failure.
    pub fn item(&self, column: usize) -> Result<&Arc<Item>, StoreError> {
        match self.values.get(column) {
            Some(ResultValue::Item(item)) => Ok(item),
            Some(other) => Err(StoreError::FieldAccess {
                column,
                message: format!("expected an item, found {:?}", other),
            }),
            None => Err(StoreError::FieldAccess {
                column,
                message: format!("row has {} columns", self.values.len()),
            }),
        }
    }

    pub fn values(&self) -> &[ResultValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A store that executes [`Query`] values against one consistent snapshot.
pub trait ObjectStore: Send + Sync {
    /// Run `query`, failing if the store has moved past `sequence`.
    fn execute(&self, query: &Query, sequence: Sequence) -> Result<Vec<ResultsRow>, StoreError>;

    /// Current consistency token.
    fn sequence(&self) -> Sequence;
}

impl<S: ObjectStore + ?Sized> ObjectStore for Arc<S> {
    fn execute(&self, query: &Query, sequence: Sequence) -> Result<Vec<ResultsRow>, StoreError> {
        (**self).execute(query, sequence)
    }

    fn sequence(&self) -> Sequence {
        (**self).sequence()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_item_access() {
        let item = Arc::new(Item::new("d1", "Department"));
        let row = ResultsRow::single_item(Arc::clone(&item));
        assert!(Arc::ptr_eq(row.item(0).unwrap(), &item));
        assert_eq!(row.len(), 1);
    }

    #[test]
    fn test_row_field_access_failure() {
        let row = ResultsRow::new(vec![ResultValue::Attribute(Attribute {
            name: "name".to_string(),
            value: "Finance".to_string(),
        })]);
        assert!(matches!(
            row.item(0),
            Err(StoreError::FieldAccess { column: 0, .. })
        ));
        assert!(matches!(
            row.item(3),
            Err(StoreError::FieldAccess { column: 3, .. })
        ));
    }

    #[test]
    fn test_sequence_display() {
        assert_eq!(Sequence(4).to_string(), "#4");
        assert!(Sequence(1) < Sequence(2));
    }
}
