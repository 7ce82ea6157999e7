//! SQLite Item Store
//!
//! A [`ObjectStore`] over a single SQLite database. Queries are compiled from
//! the AST into parameterised SQL; selected items are then hydrated with
//! their attributes and references in chunks of the query's batch size.

use super::schema::{
    SCHEMA_CREATE_ATTRIBUTES, SCHEMA_CREATE_INDEXES, SCHEMA_CREATE_ITEMS, SCHEMA_CREATE_METADATA,
    SCHEMA_CREATE_REFERENCES, SCHEMA_VERSION_KEY, SEQUENCE_KEY, STORE_SCHEMA_VERSION,
};
use super::{ObjectStore, ResultValue, ResultsRow, Sequence, StoreError};
use crate::item::{Attribute, Item, Reference};
use crate::query::{
    Collection, Column, Constraint, ConstraintOp, ConstraintSet, Query, QueryClass, Table,
};
use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Result as SqliteResult};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Hydration chunk when the query sets no batch size
const DEFAULT_HYDRATE_CHUNK: usize = 500;

/// Upper bound on ids bound into one `IN (...)` list
const MAX_HYDRATE_CHUNK: usize = 900;

/// Item store backed by one SQLite database
pub struct SqliteItemStore {
    conn: Mutex<Connection>,
    /// Mirrors the persisted sequence; only written while `conn` is locked
    sequence: AtomicU64,
}

impl SqliteItemStore {
    /// Open (or create) a store database at `path`
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        Self::configure_connection(&conn)?;

        conn.execute(SCHEMA_CREATE_ITEMS, [])?;
        conn.execute(SCHEMA_CREATE_ATTRIBUTES, [])?;
        conn.execute(SCHEMA_CREATE_REFERENCES, [])?;
        conn.execute(SCHEMA_CREATE_METADATA, [])?;
        conn.execute_batch(SCHEMA_CREATE_INDEXES)?;

        match get_metadata(&conn, SCHEMA_VERSION_KEY)? {
            Some(version) if version != STORE_SCHEMA_VERSION => {
                return Err(StoreError::SchemaVersionMismatch {
                    expected: STORE_SCHEMA_VERSION.to_string(),
                    found: version,
                });
            }
            Some(_) => {}
            None => set_metadata(&conn, SCHEMA_VERSION_KEY, STORE_SCHEMA_VERSION)?,
        }

        let sequence = get_metadata(&conn, SEQUENCE_KEY)?
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);

        Ok(Self {
            conn: Mutex::new(conn),
            sequence: AtomicU64::new(sequence),
        })
    }

    /// Configure SQLite connection for performance
    fn configure_connection(conn: &Connection) -> SqliteResult<()> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        // negative value = KB
        conn.pragma_update(None, "cache_size", -64000)?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "temp_store", "MEMORY")?;
        Ok(())
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Insert or replace items, then advance the sequence.
    ///
    /// An item whose identifier already exists has its class, attributes and
    /// references replaced. Returns the new sequence token.
    pub fn insert_items(&self, items: &[Item]) -> Result<Sequence, StoreError> {
        let conn = self.conn.lock();
        if items.is_empty() {
            return Ok(self.sequence());
        }

        let tx = conn.unchecked_transaction()?;
        {
            let mut upsert = tx.prepare(
                r#"
                INSERT INTO items (identifier, class_name) VALUES (?1, ?2)
                ON CONFLICT(identifier) DO UPDATE SET class_name = excluded.class_name
                "#,
            )?;
            let mut row_id = tx.prepare("SELECT id FROM items WHERE identifier = ?1")?;
            let mut clear_attributes = tx.prepare("DELETE FROM item_attributes WHERE item_id = ?1")?;
            let mut clear_references = tx.prepare("DELETE FROM item_references WHERE item_id = ?1")?;
            let mut insert_attribute = tx
                .prepare("INSERT INTO item_attributes (item_id, name, value) VALUES (?1, ?2, ?3)")?;
            let mut insert_reference = tx
                .prepare("INSERT INTO item_references (item_id, name, ref_id) VALUES (?1, ?2, ?3)")?;

            for item in items {
                upsert.execute(params![item.identifier, item.class_name])?;
                let id: i64 = row_id.query_row([&item.identifier], |row| row.get(0))?;

                clear_attributes.execute([id])?;
                clear_references.execute([id])?;
                for attribute in &item.attributes {
                    insert_attribute.execute(params![id, attribute.name, attribute.value])?;
                }
                for reference in &item.references {
                    insert_reference.execute(params![id, reference.name, reference.ref_id])?;
                }
            }
        }

        let next = self.sequence.load(Ordering::SeqCst) + 1;
        set_metadata(&tx, SEQUENCE_KEY, &next.to_string())?;
        tx.commit()?;
        self.sequence.store(next, Ordering::SeqCst);

        debug!(items = items.len(), sequence = next, "Inserted items");
        Ok(Sequence(next))
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    /// Total number of items
    pub fn item_count(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Item counts per class, ordered by class name
    pub fn class_counts(&self) -> Result<Vec<(String, usize)>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT class_name, COUNT(*) FROM items GROUP BY class_name ORDER BY class_name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // =========================================================================
    // Query Execution
    // =========================================================================

    fn run(&self, conn: &Connection, query: &Query) -> Result<Vec<ResultsRow>, StoreError> {
        let compiled = compile(query)?;
        debug!(sql = %compiled.sql, params = compiled.params.len(), "Executing query");

        // Raw rows keep item row ids until hydration
        let mut raw: Vec<Vec<RawValue>> = Vec::new();
        {
            let mut stmt = conn.prepare(&compiled.sql)?;
            let mut rows = stmt.query(params_from_iter(compiled.params.iter()))?;
            while let Some(row) = rows.next()? {
                let mut values = Vec::with_capacity(query.select().len());
                let mut idx = 0;
                for class in query.select() {
                    match class.table {
                        Table::Item => {
                            values.push(RawValue::Item(row.get(idx)?));
                            idx += 1;
                        }
                        Table::Attribute => {
                            values.push(RawValue::Attribute(Attribute {
                                name: row.get(idx + 1)?,
                                value: row.get(idx + 2)?,
                            }));
                            idx += 3;
                        }
                        Table::Reference => {
                            values.push(RawValue::Reference(Reference {
                                name: row.get(idx + 1)?,
                                ref_id: row.get(idx + 2)?,
                            }));
                            idx += 3;
                        }
                    }
                }
                raw.push(values);
            }
        }

        let mut seen = HashSet::new();
        let ids: Vec<i64> = raw
            .iter()
            .flatten()
            .filter_map(|v| match v {
                RawValue::Item(id) => Some(*id),
                _ => None,
            })
            .filter(|id| seen.insert(*id))
            .collect();

        let chunk = query
            .batch_size()
            .unwrap_or(DEFAULT_HYDRATE_CHUNK)
            .clamp(1, MAX_HYDRATE_CHUNK);
        let items = hydrate(conn, &ids, chunk)?;

        raw.into_iter()
            .map(|values| {
                values
                    .into_iter()
                    .enumerate()
                    .map(|(column, value)| match value {
                        RawValue::Item(id) => items
                            .get(&id)
                            .map(|item| ResultValue::Item(Arc::clone(item)))
                            .ok_or_else(|| StoreError::FieldAccess {
                                column,
                                message: format!("item row {} missing during hydration", id),
                            }),
                        RawValue::Attribute(a) => Ok(ResultValue::Attribute(a)),
                        RawValue::Reference(r) => Ok(ResultValue::Reference(r)),
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map(ResultsRow::new)
            })
            .collect()
    }
}

impl ObjectStore for SqliteItemStore {
    fn execute(&self, query: &Query, sequence: Sequence) -> Result<Vec<ResultsRow>, StoreError> {
        // Held for the whole call so no write can land between check and read
        let conn = self.conn.lock();
        let current = self.sequence();
        if sequence != current {
            return Err(StoreError::StaleSequence {
                expected: sequence,
                found: current,
            });
        }
        self.run(&conn, query)
    }

    fn sequence(&self) -> Sequence {
        Sequence(self.sequence.load(Ordering::SeqCst))
    }
}

impl std::fmt::Debug for SqliteItemStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteItemStore")
            .field("sequence", &self.sequence())
            .finish_non_exhaustive()
    }
}

enum RawValue {
    Item(i64),
    Attribute(Attribute),
    Reference(Reference),
}

// =============================================================================
// Metadata
// =============================================================================

fn get_metadata(conn: &Connection, key: &str) -> Result<Option<String>, StoreError> {
    let value = conn
        .query_row(
            "SELECT value FROM store_metadata WHERE key = ?1",
            [key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

fn set_metadata(conn: &Connection, key: &str, value: &str) -> Result<(), StoreError> {
    conn.execute(
        "INSERT OR REPLACE INTO store_metadata (key, value) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}

// =============================================================================
// Hydration
// =============================================================================

/// Load items (with attributes and references) by row id.
fn hydrate(
    conn: &Connection,
    ids: &[i64],
    chunk: usize,
) -> Result<HashMap<i64, Arc<Item>>, StoreError> {
    let mut items: HashMap<i64, Item> = HashMap::with_capacity(ids.len());

    for chunk_ids in ids.chunks(chunk) {
        let placeholders = vec!["?"; chunk_ids.len()].join(", ");

        let sql = format!(
            "SELECT id, identifier, class_name FROM items WHERE id IN ({})",
            placeholders
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(chunk_ids.iter()), |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        for row in rows {
            let (id, identifier, class_name) = row?;
            items.insert(id, Item::new(identifier, class_name));
        }

        let sql = format!(
            "SELECT item_id, name, value FROM item_attributes WHERE item_id IN ({}) ORDER BY id",
            placeholders
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(chunk_ids.iter()), |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        for row in rows {
            let (id, name, value) = row?;
            if let Some(item) = items.get_mut(&id) {
                item.attributes.push(Attribute { name, value });
            }
        }

        let sql = format!(
            "SELECT item_id, name, ref_id FROM item_references WHERE item_id IN ({}) ORDER BY id",
            placeholders
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(chunk_ids.iter()), |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        for row in rows {
            let (id, name, ref_id) = row?;
            if let Some(item) = items.get_mut(&id) {
                item.references.push(Reference { name, ref_id });
            }
        }
    }

    Ok(items
        .into_iter()
        .map(|(id, item)| (id, Arc::new(item)))
        .collect())
}

// =============================================================================
// Query Compilation
// =============================================================================

struct CompiledQuery {
    sql: String,
    params: Vec<String>,
}

fn table_name(table: Table) -> &'static str {
    match table {
        Table::Item => "items",
        Table::Attribute => "item_attributes",
        Table::Reference => "item_references",
    }
}

fn column_name(column: Column) -> &'static str {
    match column {
        Column::Identifier => "identifier",
        Column::ClassName => "class_name",
        Column::Name => "name",
        Column::Value => "value",
        Column::RefId => "ref_id",
    }
}

fn alias(class: &QueryClass) -> String {
    format!("t{}", class.alias)
}

fn check_class(query: &Query, class: &QueryClass) -> Result<(), StoreError> {
    if query.from().get(class.alias) == Some(class) {
        Ok(())
    } else {
        Err(StoreError::invalid_query(format!(
            "{} {} is not in the FROM list",
            class.table.as_str(),
            alias(class)
        )))
    }
}

fn compile(query: &Query) -> Result<CompiledQuery, StoreError> {
    if query.from().is_empty() {
        return Err(StoreError::invalid_query("query has no FROM entities"));
    }
    let first = query
        .select()
        .first()
        .ok_or_else(|| StoreError::invalid_query("query selects nothing"))?;

    let mut columns = Vec::new();
    for class in query.select() {
        check_class(query, class)?;
        let a = alias(class);
        match class.table {
            Table::Item => columns.push(format!("{}.id", a)),
            Table::Attribute => columns.push(format!("{a}.id, {a}.name, {a}.value")),
            Table::Reference => columns.push(format!("{a}.id, {a}.name, {a}.ref_id")),
        }
    }

    let from: Vec<String> = query
        .from()
        .iter()
        .map(|c| format!("{} AS {}", table_name(c.table), alias(c)))
        .collect();

    let mut sql = format!(
        "SELECT {}{} FROM {}",
        if query.is_distinct() { "DISTINCT " } else { "" },
        columns.join(", "),
        from.join(", ")
    );

    let mut params = Vec::new();
    if let Some(constraint) = query.constraint() {
        let clause = compile_set(query, constraint, &mut params)?;
        sql.push_str(" WHERE ");
        sql.push_str(&clause);
    }
    sql.push_str(&format!(" ORDER BY {}.id", alias(first)));

    Ok(CompiledQuery { sql, params })
}

fn compile_set(
    query: &Query,
    set: &ConstraintSet,
    params: &mut Vec<String>,
) -> Result<String, StoreError> {
    if set.is_empty() {
        return Ok(match set.op {
            ConstraintOp::And => "1".to_string(),
            ConstraintOp::Or => "0".to_string(),
        });
    }
    let sep = match set.op {
        ConstraintOp::And => " AND ",
        ConstraintOp::Or => " OR ",
    };
    let parts = set
        .constraints
        .iter()
        .map(|c| compile_constraint(query, c, params))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(format!("({})", parts.join(sep)))
}

fn compile_constraint(
    query: &Query,
    constraint: &Constraint,
    params: &mut Vec<String>,
) -> Result<String, StoreError> {
    match constraint {
        Constraint::Equals { field, value } => {
            check_class(query, &field.class)?;
            if !field.column.belongs_to(field.class.table) {
                return Err(StoreError::invalid_query(format!(
                    "{} has no column {}",
                    field.class.table.as_str(),
                    field.column.as_str()
                )));
            }
            params.push(value.clone());
            Ok(format!("{}.{} = ?", alias(&field.class), column_name(field.column)))
        }
        Constraint::Contains { collection, member } => {
            check_class(query, &collection.owner)?;
            check_class(query, member)?;
            let expected = match collection.collection {
                Collection::Attributes => Table::Attribute,
                Collection::References => Table::Reference,
            };
            if collection.owner.table != Table::Item || member.table != expected {
                return Err(StoreError::invalid_query(format!(
                    "{} cannot contain {}",
                    collection.owner.table.as_str(),
                    member.table.as_str()
                )));
            }
            Ok(format!(
                "{}.item_id = {}.id",
                alias(member),
                alias(&collection.owner)
            ))
        }
        Constraint::Set(set) => compile_set(query, set, params),
    }
}
