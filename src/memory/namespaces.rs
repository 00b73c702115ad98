//! Namespace lifecycle.
//!
//! Deleting a namespace removes its items in the same transaction; their
//! chunks go with them through the `chunks → items` foreign-key cascade.

use rusqlite::{params, Connection, OptionalExtension};

use super::types::validate_name;
use crate::error::StoreError;

/// Create a namespace. Returns `false` if it already existed.
pub fn create_namespace(conn: &Connection, name: &str) -> Result<bool, StoreError> {
    validate_name("namespace", name)?;
    let created = ensure_namespace(conn, name)?;
    if created {
        tracing::debug!(namespace = name, "namespace created");
    }
    Ok(created)
}

/// Insert the namespace row if missing. Shared by explicit and implicit creation.
pub(crate) fn ensure_namespace(conn: &Connection, name: &str) -> Result<bool, StoreError> {
    let now = chrono::Utc::now().to_rfc3339();
    let rows = conn.execute(
        "INSERT INTO namespaces (name, created_at) VALUES (?1, ?2) ON CONFLICT(name) DO NOTHING",
        params![name, now],
    )?;
    Ok(rows == 1)
}

/// Delete a namespace and everything in it. Returns `false` if it did not exist.
pub fn delete_namespace(conn: &mut Connection, name: &str) -> Result<bool, StoreError> {
    validate_name("namespace", name)?;
    let tx = conn.transaction()?;

    let exists = tx
        .query_row(
            "SELECT 1 FROM namespaces WHERE name = ?1",
            params![name],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    if !exists {
        return Ok(false);
    }

    let items = tx.execute("DELETE FROM items WHERE namespace = ?1", params![name])?;
    tx.execute("DELETE FROM namespaces WHERE name = ?1", params![name])?;
    tx.commit()?;

    tracing::info!(namespace = name, items, "namespace deleted");
    Ok(true)
}

/// All namespace names in ascending order.
pub fn list_namespaces(conn: &Connection) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn.prepare("SELECT name FROM namespaces ORDER BY name")?;
    let names = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(names)
}

pub fn namespace_exists(conn: &Connection, name: &str) -> Result<bool, StoreError> {
    let found = conn
        .query_row(
            "SELECT 1 FROM namespaces WHERE name = ?1",
            params![name],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::memory::store::{list_keys, write_item};
    use crate::memory::types::WriteMode;
    use serde_json::json;

    #[test]
    fn create_is_idempotent() {
        let conn = db::open_memory_database().unwrap();
        assert!(create_namespace(&conn, "notes").unwrap());
        assert!(!create_namespace(&conn, "notes").unwrap());
        assert_eq!(list_namespaces(&conn).unwrap(), vec!["notes"]);
    }

    #[test]
    fn listing_is_sorted() {
        let conn = db::open_memory_database().unwrap();
        for name in ["zeta", "alpha", "mid"] {
            create_namespace(&conn, name).unwrap();
        }
        assert_eq!(list_namespaces(&conn).unwrap(), vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn delete_missing_returns_false() {
        let mut conn = db::open_memory_database().unwrap();
        assert!(!delete_namespace(&mut conn, "ghost").unwrap());
    }

    #[test]
    fn delete_cascades_items_and_chunks() {
        let mut conn = db::open_memory_database().unwrap();
        write_item(&mut conn, "ns", "a", &json!("x"), WriteMode::Create, &["x".into()]).unwrap();
        write_item(&mut conn, "ns", "b", &json!("y"), WriteMode::Create, &["y".into()]).unwrap();
        write_item(&mut conn, "other", "a", &json!("z"), WriteMode::Create, &["z".into()]).unwrap();

        assert!(delete_namespace(&mut conn, "ns").unwrap());
        assert!(!namespace_exists(&conn, "ns").unwrap());
        assert!(list_keys(&conn, "ns").unwrap().is_empty());

        let chunks: i64 = conn
            .query_row("SELECT COUNT(*) FROM chunks WHERE namespace = 'ns'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(chunks, 0);

        // Other namespaces are untouched.
        assert_eq!(list_keys(&conn, "other").unwrap().len(), 1);
    }

    #[test]
    fn blank_name_is_rejected() {
        let conn = db::open_memory_database().unwrap();
        assert!(matches!(create_namespace(&conn, "  "), Err(StoreError::Validation(_))));
    }
}
