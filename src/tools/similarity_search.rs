//! MCP `retrieve_context_by_similarity` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `retrieve_context_by_similarity` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SimilaritySearchParams {
    #[schemars(description = "Namespace to search")]
    pub namespace: String,

    /// Free text compared by meaning, not keywords.
    #[schemars(description = "Natural language query")]
    pub query: String,

    /// Minimum cosine similarity in `[-1, 1]`.
    #[schemars(
        description = "Minimum similarity (-1 to 1). Defaults to 0.5, or 0.7 when values are indexed whole."
    )]
    pub threshold: Option<f64>,

    #[schemars(description = "Maximum number of items to return. Defaults to 10.")]
    pub limit: Option<usize>,
}
