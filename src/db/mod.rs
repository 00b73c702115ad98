//! SQLite storage: connection setup, schema, metadata and health checks.
//!
//! [`Database`] is the process-wide handle. It opens its single connection on
//! first use and hands out clones of the shared `Arc<Mutex<Connection>>`.

pub mod meta;
pub mod schema;

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::StoreError;

/// Open (or create) the database at the given path with schema initialized.
pub fn open_database(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let conn = Connection::open(path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;

    // Enable WAL mode for better concurrent read performance
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;

    schema::init_schema(&conn).context("failed to initialize schema")?;
    meta::check_schema_version(&conn)?;

    tracing::info!(path = %path.display(), "database initialized");
    Ok(conn)
}

/// Open an in-memory database with the full schema. Used by tests and dry runs.
pub fn open_memory_database() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    schema::init_schema(&conn).context("failed to initialize schema")?;
    Ok(conn)
}

enum Location {
    File(PathBuf),
    Memory,
}

/// Lazily opened, shared storage connection.
pub struct Database {
    location: Location,
    conn: Mutex<Option<Arc<Mutex<Connection>>>>,
}

impl Database {
    /// A handle to the database file at `path`. Nothing is opened yet.
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            location: Location::File(path.into()),
            conn: Mutex::new(None),
        }
    }

    /// A handle to a private in-memory database.
    pub fn in_memory() -> Self {
        Self {
            location: Location::Memory,
            conn: Mutex::new(None),
        }
    }

    /// The shared connection, opening it on first use.
    pub fn connection(&self) -> Result<Arc<Mutex<Connection>>, StoreError> {
        let mut slot = self
            .conn
            .lock()
            .map_err(|e| StoreError::Internal(format!("db handle lock poisoned: {e}")))?;
        if let Some(conn) = slot.as_ref() {
            return Ok(Arc::clone(conn));
        }

        let conn = match &self.location {
            Location::File(path) => open_database(path),
            Location::Memory => open_memory_database(),
        }
        .map_err(|e| StoreError::Internal(format!("{e:#}")))?;

        let shared = Arc::new(Mutex::new(conn));
        *slot = Some(Arc::clone(&shared));
        Ok(shared)
    }

    /// Whether the connection has been opened.
    pub fn is_open(&self) -> bool {
        self.conn.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }

    /// Drop the shared connection. Outstanding clones keep it alive until they
    /// are released; a later [`Database::connection`] call reopens it.
    pub fn close(&self) {
        let taken = match self.conn.lock() {
            Ok(mut slot) => slot.take(),
            Err(e) => e.into_inner().take(),
        };
        let Some(shared) = taken else {
            return;
        };
        match Arc::try_unwrap(shared) {
            Ok(mutex) => {
                let conn = mutex.into_inner().unwrap_or_else(|e| e.into_inner());
                if let Err((_, e)) = conn.close() {
                    tracing::warn!(error = %e, "failed to close database cleanly");
                } else {
                    tracing::info!("database closed");
                }
            }
            Err(_) => tracing::debug!("database still referenced; closes when released"),
        }
    }
}

/// Results of [`check_database_health`].
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub integrity_ok: bool,
    pub schema_version: u32,
    pub embedding_model: Option<String>,
    pub namespace_count: i64,
    pub item_count: i64,
    pub chunk_count: i64,
    pub pending_chunk_count: i64,
}

/// Run `PRAGMA integrity_check` and gather table counts.
pub fn check_database_health(conn: &Connection) -> Result<HealthReport> {
    let integrity: String = conn
        .query_row("PRAGMA integrity_check", [], |row| row.get(0))
        .context("integrity check failed to run")?;
    let count = |sql: &str| -> Result<i64> {
        conn.query_row(sql, [], |row| row.get(0))
            .with_context(|| format!("count query failed: {sql}"))
    };

    Ok(HealthReport {
        integrity_ok: integrity == "ok",
        schema_version: meta::schema_version(conn)?,
        embedding_model: meta::get_embedding_model(conn)?,
        namespace_count: count("SELECT COUNT(*) FROM namespaces")?,
        item_count: count("SELECT COUNT(*) FROM items")?,
        chunk_count: count("SELECT COUNT(*) FROM chunks")?,
        pending_chunk_count: count("SELECT COUNT(*) FROM chunks WHERE embedding IS NULL")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lazy_handle_opens_once() {
        let db = Database::in_memory();
        assert!(!db.is_open());
        let a = db.connection().unwrap();
        let b = db.connection().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(db.is_open());
        drop((a, b));
        db.close();
        assert!(!db.is_open());
    }

    #[test]
    fn health_on_empty_database() {
        let conn = open_memory_database().unwrap();
        let report = check_database_health(&conn).unwrap();
        assert!(report.integrity_ok);
        assert_eq!(report.schema_version, meta::SCHEMA_VERSION);
        assert_eq!(report.item_count, 0);
        assert_eq!(report.pending_chunk_count, 0);
    }
}
