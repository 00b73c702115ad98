//! Write path and key lookups for items.
//!
//! [`write_item`] is the single write entry point. Inside one transaction it
//! creates the namespace if needed, inserts or updates the item row with a
//! single conditional statement, and replaces the item's chunks. Embeddings
//! are filled in later; the returned [`WriteOutcome::pending`] lists the
//! chunks that need them.

use std::collections::HashMap;

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;

use super::chunks::replace_chunks;
use super::namespaces::ensure_namespace;
use super::types::{decode_value, encode_value, validate_name, ContextItem, KeyInfo, PendingChunk, WriteMode};
use crate::error::StoreError;

/// Result of a committed write.
#[derive(Debug)]
pub struct WriteOutcome {
    pub item: ContextItem,
    /// `true` when the row was inserted rather than overwritten.
    pub created: bool,
    /// Freshly inserted chunks, all without embeddings.
    pub pending: Vec<PendingChunk>,
}

/// Insert or overwrite an item according to `mode` and replace its chunks
/// with `chunk_texts`. All-or-nothing.
pub fn write_item(
    conn: &mut Connection,
    namespace: &str,
    key: &str,
    value: &Value,
    mode: WriteMode,
    chunk_texts: &[String],
) -> Result<WriteOutcome, StoreError> {
    validate_name("namespace", namespace)?;
    validate_name("key", key)?;

    let encoded = encode_value(value)?;
    let now = chrono::Utc::now().to_rfc3339();
    let tx = conn.transaction()?;

    if mode != WriteMode::Update {
        ensure_namespace(&tx, namespace)?;
    }

    // Each statement is atomic and guarded by the (namespace, key) primary key,
    // so concurrent writers cannot both pass an existence check.
    let sql = match mode {
        WriteMode::Create => {
            "INSERT INTO items (namespace, key, value, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?4) \
             ON CONFLICT(namespace, key) DO NOTHING \
             RETURNING created_at, updated_at"
        }
        WriteMode::Update => {
            "UPDATE items SET value = ?3, updated_at = ?4 \
             WHERE namespace = ?1 AND key = ?2 \
             RETURNING created_at, updated_at"
        }
        WriteMode::Upsert => {
            "INSERT INTO items (namespace, key, value, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?4) \
             ON CONFLICT(namespace, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at \
             RETURNING created_at, updated_at"
        }
    };

    let stamps: Option<(String, String)> = tx
        .query_row(sql, params![namespace, key, encoded, now], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .optional()?;

    let Some((created_at, updated_at)) = stamps else {
        let message = match mode {
            WriteMode::Update => format!("key '{key}' does not exist in namespace '{namespace}'"),
            _ => format!("key '{key}' already exists in namespace '{namespace}'"),
        };
        return Err(StoreError::Conflict(message));
    };
    let created = mode == WriteMode::Create || (mode == WriteMode::Upsert && created_at == now);

    let pending = replace_chunks(&tx, namespace, key, chunk_texts, &now)?;

    tx.commit()?;

    Ok(WriteOutcome {
        item: ContextItem {
            namespace: namespace.to_string(),
            key: key.to_string(),
            value: value.clone(),
            created_at,
            updated_at,
        },
        created,
        pending,
    })
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<ContextItem> {
    Ok(ContextItem {
        namespace: row.get(0)?,
        key: row.get(1)?,
        value: decode_value(row.get(2)?),
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

/// Look up one item by key.
pub fn retrieve_item(
    conn: &Connection,
    namespace: &str,
    key: &str,
) -> Result<Option<ContextItem>, StoreError> {
    validate_name("namespace", namespace)?;
    validate_name("key", key)?;

    let item = conn
        .query_row(
            "SELECT namespace, key, value, created_at, updated_at FROM items \
             WHERE namespace = ?1 AND key = ?2",
            params![namespace, key],
            item_from_row,
        )
        .optional()?;
    Ok(item)
}

/// Delete one item; its chunks cascade. Returns `false` if it did not exist.
pub fn delete_item(conn: &Connection, namespace: &str, key: &str) -> Result<bool, StoreError> {
    validate_name("namespace", namespace)?;
    validate_name("key", key)?;

    let rows = conn.execute(
        "DELETE FROM items WHERE namespace = ?1 AND key = ?2",
        params![namespace, key],
    )?;
    Ok(rows > 0)
}

/// Keys in a namespace, ascending. Unknown namespaces list as empty.
pub fn list_keys(conn: &Connection, namespace: &str) -> Result<Vec<KeyInfo>, StoreError> {
    validate_name("namespace", namespace)?;

    let mut stmt = conn.prepare(
        "SELECT key, created_at, updated_at FROM items WHERE namespace = ?1 ORDER BY key",
    )?;
    let keys = stmt
        .query_map(params![namespace], |row| {
            Ok(KeyInfo {
                key: row.get(0)?,
                created_at: row.get(1)?,
                updated_at: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(keys)
}

/// Fetch several items of one namespace, keyed by item key.
pub fn fetch_items(
    conn: &Connection,
    namespace: &str,
    keys: &[&str],
) -> Result<HashMap<String, ContextItem>, StoreError> {
    let mut stmt = conn.prepare_cached(
        "SELECT namespace, key, value, created_at, updated_at FROM items \
         WHERE namespace = ?1 AND key = ?2",
    )?;
    let mut items = HashMap::with_capacity(keys.len());
    for key in keys {
        if let Some(item) = stmt
            .query_row(params![namespace, key], item_from_row)
            .optional()?
        {
            items.insert(item.key.clone(), item);
        }
    }
    Ok(items)
}
