//! Parameters for the item tools: `store_context`, `update_context`,
//! `retrieve_context`, `delete_context` and `list_context_keys`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for `store_context` and `update_context`.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct WriteContextParams {
    #[schemars(description = "Namespace the item lives in. Created on first store.")]
    pub namespace: String,

    #[schemars(description = "Key of the item, unique within its namespace")]
    pub key: String,

    /// Any JSON value. Strings are indexed by their text, everything else by
    /// its compact JSON form.
    #[schemars(
        description = "The value to store: any JSON value (string, number, boolean, null, array or object). Its type is preserved on retrieval."
    )]
    pub value: serde_json::Value,
}

/// Parameters for tools addressing a single item by key.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ContextKeyParams {
    #[schemars(description = "Namespace of the item")]
    pub namespace: String,

    #[schemars(description = "Key of the item")]
    pub key: String,
}

/// Parameters for `list_context_keys`.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ListKeysParams {
    #[schemars(description = "Namespace whose keys to list")]
    pub namespace: String,
}
