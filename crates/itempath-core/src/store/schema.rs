//! SQLite Schema Definitions for the Item Store
//!
//! Items are stored generically: one row per item plus one row per
//! attribute and per reference. Store-level metadata (schema version and
//! the persisted sequence token) lives in a key/value table.

/// Schema version for item store databases
pub const STORE_SCHEMA_VERSION: &str = "1.0";

/// Metadata key holding the persisted sequence token
pub const SEQUENCE_KEY: &str = "sequence";

/// Metadata key holding the schema version
pub const SCHEMA_VERSION_KEY: &str = "schema_version";

/// SQL to create the items table
///
/// `id` is the internal row id used for joins and result ordering;
/// `identifier` is the store-wide identifier references point at.
pub const SCHEMA_CREATE_ITEMS: &str = r#"
CREATE TABLE IF NOT EXISTS items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    identifier TEXT NOT NULL UNIQUE,
    class_name TEXT NOT NULL
)
"#;

/// SQL to create the attributes table
pub const SCHEMA_CREATE_ATTRIBUTES: &str = r#"
CREATE TABLE IF NOT EXISTS item_attributes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    item_id INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    value TEXT NOT NULL
)
"#;

/// SQL to create the references table
///
/// `ref_id` holds the target's `identifier`, not its row id, so references
/// may point at items imported later.
pub const SCHEMA_CREATE_REFERENCES: &str = r#"
CREATE TABLE IF NOT EXISTS item_references (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    item_id INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    ref_id TEXT NOT NULL
)
"#;

/// SQL to create the metadata table
pub const SCHEMA_CREATE_METADATA: &str = r#"
CREATE TABLE IF NOT EXISTS store_metadata (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
)
"#;

/// SQL to create indexes for the lookups batch queries compile to
pub const SCHEMA_CREATE_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_items_class ON items(class_name);

-- name/value equality within an item's attribute collection
CREATE INDEX IF NOT EXISTS idx_attributes_item ON item_attributes(item_id);
CREATE INDEX IF NOT EXISTS idx_attributes_name_value ON item_attributes(name, value);

CREATE INDEX IF NOT EXISTS idx_references_item ON item_references(item_id);
CREATE INDEX IF NOT EXISTS idx_references_name_target ON item_references(name, ref_id);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_creates_tables() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(SCHEMA_CREATE_ITEMS, []).unwrap();
        conn.execute(SCHEMA_CREATE_ATTRIBUTES, []).unwrap();
        conn.execute(SCHEMA_CREATE_REFERENCES, []).unwrap();
        conn.execute(SCHEMA_CREATE_METADATA, []).unwrap();
        conn.execute_batch(SCHEMA_CREATE_INDEXES).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(
            tables,
            vec!["item_attributes", "item_references", "items", "store_metadata"]
        );
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        for _ in 0..2 {
            conn.execute(SCHEMA_CREATE_ITEMS, []).unwrap();
            conn.execute(SCHEMA_CREATE_ATTRIBUTES, []).unwrap();
            conn.execute(SCHEMA_CREATE_REFERENCES, []).unwrap();
            conn.execute_batch(SCHEMA_CREATE_INDEXES).unwrap();
        }
    }
}
