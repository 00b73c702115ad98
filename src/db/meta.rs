//! Key/value metadata stored alongside the data in `schema_meta`.
//!
//! Holds the schema version written by [`super::schema::init_schema`] and the
//! identifier of the model that produced the stored vectors.

use anyhow::{ensure, Result};
use rusqlite::{Connection, OptionalExtension};

/// The schema version that the current binary writes and understands.
pub const SCHEMA_VERSION: u32 = 1;

/// The schema version recorded in the database.
pub fn schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT value FROM schema_meta WHERE key = 'schema_version'",
        [],
        |row| {
            let val: String = row.get(0)?;
            Ok(val.parse::<u32>().unwrap_or(0))
        },
    )
}

/// Refuse databases written by a newer mnemos; their layout is unknown here.
pub fn check_schema_version(conn: &Connection) -> Result<()> {
    let version = schema_version(conn)?;
    ensure!(
        version <= SCHEMA_VERSION,
        "database schema v{version} is newer than this build supports (v{SCHEMA_VERSION})"
    );
    tracing::debug!(schema_version = version, "schema version ok");
    Ok(())
}

/// Get the stored embedding model identifier, if any.
pub fn get_embedding_model(conn: &Connection) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM schema_meta WHERE key = 'embedding_model'",
        [],
        |row| row.get::<_, String>(0),
    )
    .optional()
}

/// Set the stored embedding model identifier.
pub fn set_embedding_model(conn: &Connection, model: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_meta (key, value) VALUES ('embedding_model', ?1)",
        [model],
    )?;
    Ok(())
}
