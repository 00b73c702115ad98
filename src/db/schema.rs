//! SQL DDL for all mnemos tables.
//!
//! Defines `namespaces`, `items`, `chunks` and `schema_meta`. All DDL uses
//! `IF NOT EXISTS` for idempotent initialization. Chunks reference their item
//! with `ON DELETE CASCADE`, and items reference their namespace the same way,
//! so foreign keys must be enabled on every connection.

use rusqlite::Connection;

/// All schema DDL statements for the core tables.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS namespaces (
    name TEXT PRIMARY KEY CHECK(length(trim(name)) > 0),
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS items (
    namespace TEXT NOT NULL REFERENCES namespaces(name) ON DELETE CASCADE,
    key TEXT NOT NULL CHECK(length(trim(key)) > 0),
    value TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (namespace, key)
);

-- Embedding text and vectors. Replaced wholesale whenever the item changes.
CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY,
    namespace TEXT NOT NULL,
    item_key TEXT NOT NULL,
    chunk_index INTEGER NOT NULL CHECK(chunk_index >= 0),
    text TEXT NOT NULL,
    embedding BLOB,
    created_at TEXT NOT NULL,
    FOREIGN KEY (namespace, item_key) REFERENCES items(namespace, key) ON DELETE CASCADE,
    UNIQUE (namespace, item_key, chunk_index)
);

CREATE INDEX IF NOT EXISTS idx_chunks_item ON chunks(namespace, item_key);

-- Chunks the repair pass still has to embed.
CREATE INDEX IF NOT EXISTS idx_chunks_pending ON chunks(namespace) WHERE embedding IS NULL;

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    // Set initial schema version if not already present
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_creates_all_tables() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert_eq!(tables, vec!["chunks", "items", "namespaces", "schema_meta"]);

        let pending_index: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = 'idx_chunks_pending'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(pending_index, 1);
    }

    #[test]
    fn schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap(); // second call should not error
    }

    #[test]
    fn blank_keys_are_rejected_by_the_engine() {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", "ON").unwrap();
        init_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO namespaces (name, created_at) VALUES ('ns', 'now')",
            [],
        )
        .unwrap();
        let err = conn.execute(
            "INSERT INTO items (namespace, key, value, created_at, updated_at) VALUES ('ns', '  ', '1', 'now', 'now')",
            [],
        );
        assert!(err.is_err());
    }
}
