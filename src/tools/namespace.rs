//! MCP `create_namespace` / `delete_namespace` parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct NamespaceParams {
    #[schemars(description = "Namespace name (non-empty)")]
    pub namespace: String,
}
