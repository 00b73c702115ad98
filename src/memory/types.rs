//! Core record types.
//!
//! Defines [`ContextItem`] (a stored value), [`KeyInfo`] (listing rows),
//! [`Chunk`] and [`PendingChunk`] (embedding units), and [`WriteMode`].
//!
//! Item values are `serde_json::Value`: a closed variant of
//! Null | Bool | Number | String | Array | Object.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreError;

/// A stored item, matching the `items` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextItem {
    pub namespace: String,
    pub key: String,
    /// The value with its original JSON type restored.
    pub value: Value,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    /// ISO 8601 last-modification timestamp.
    pub updated_at: String,
}

/// One row of a key listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyInfo {
    pub key: String,
    pub created_at: String,
    pub updated_at: String,
}

/// A slice of an item's text plus its embedding, matching the `chunks` table.
#[derive(Debug, Clone, Serialize)]
pub struct Chunk {
    /// UUID v7 primary key.
    pub id: String,
    pub namespace: String,
    pub item_key: String,
    /// 0-based, contiguous within an item.
    pub chunk_index: i64,
    pub text: String,
    /// `None` until the indexing step has run.
    #[serde(skip_serializing)]
    pub embedding: Option<Vec<f32>>,
    pub created_at: String,
}

/// A chunk that still needs an embedding.
#[derive(Debug, Clone)]
pub struct PendingChunk {
    pub id: String,
    pub namespace: String,
    pub item_key: String,
    pub text: String,
}

/// How a write treats an existing `(namespace, key)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Insert; fail if the key exists.
    Create,
    /// Overwrite; fail if the key is missing.
    Update,
    /// Insert or overwrite.
    Upsert,
}

/// Reject empty or whitespace-only namespaces and keys.
pub fn validate_name(kind: &str, value: &str) -> Result<(), StoreError> {
    if value.trim().is_empty() {
        return Err(StoreError::Validation(format!("{kind} must not be empty")));
    }
    Ok(())
}

/// Serialized form stored in `items.value`.
pub fn encode_value(value: &Value) -> Result<String, StoreError> {
    Ok(serde_json::to_string(value)?)
}

/// Restore a stored value. Text that does not parse is returned unchanged as a string.
pub fn decode_value(raw: String) -> Value {
    match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(_) => Value::String(raw),
    }
}

/// The text of a value that gets chunked and embedded.
///
/// Strings contribute their raw contents; everything else its compact JSON.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(_) | Value::Number(_) | Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}
