pub mod context_item;
pub mod namespace;
pub mod similarity_search;

use context_item::{ContextKeyParams, ListKeysParams, WriteContextParams};
use namespace::NamespaceParams;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use serde::Serialize;
use similarity_search::SimilaritySearchParams;
use std::sync::Arc;

use crate::error::StoreError;
use crate::memory::service::ContextService;

/// The mnemos MCP tool handler. Every tool is a thin adapter over
/// [`ContextService`]; results are returned as JSON text.
#[derive(Clone)]
pub struct MnemosTools {
    tool_router: ToolRouter<Self>,
    service: Arc<ContextService>,
}

#[tool_router]
impl MnemosTools {
    pub fn new(service: Arc<ContextService>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            service,
        }
    }

    #[tool(description = "Store a new value under a namespace and key. Fails if the key already exists; use update_context to overwrite.")]
    async fn store_context(
        &self,
        Parameters(params): Parameters<WriteContextParams>,
    ) -> Result<String, String> {
        tracing::info!(namespace = %params.namespace, key = %params.key, "store_context called");
        let receipt = self
            .service
            .store(&params.namespace, &params.key, params.value)
            .await
            .map_err(tool_error)?;
        to_json(&receipt)
    }

    #[tool(description = "Overwrite the value of an existing key. Fails if the key does not exist.")]
    async fn update_context(
        &self,
        Parameters(params): Parameters<WriteContextParams>,
    ) -> Result<String, String> {
        tracing::info!(namespace = %params.namespace, key = %params.key, "update_context called");
        let receipt = self
            .service
            .update(&params.namespace, &params.key, params.value)
            .await
            .map_err(tool_error)?;
        to_json(&receipt)
    }

    #[tool(description = "Retrieve a value by namespace and key. Returns found=false when the key does not exist.")]
    async fn retrieve_context(
        &self,
        Parameters(params): Parameters<ContextKeyParams>,
    ) -> Result<String, String> {
        let item = self
            .service
            .retrieve(&params.namespace, &params.key)
            .await
            .map_err(tool_error)?;
        match item {
            Some(item) => to_json(&serde_json::json!({ "found": true, "item": item })),
            None => to_json(&serde_json::json!({ "found": false })),
        }
    }

    #[tool(description = "Delete a key and its search index entries. Returns deleted=false when the key did not exist.")]
    async fn delete_context(
        &self,
        Parameters(params): Parameters<ContextKeyParams>,
    ) -> Result<String, String> {
        let deleted = self
            .service
            .delete(&params.namespace, &params.key)
            .await
            .map_err(tool_error)?;
        to_json(&serde_json::json!({ "deleted": deleted }))
    }

    #[tool(description = "Create an empty namespace. Returns created=false when it already exists.")]
    async fn create_namespace(
        &self,
        Parameters(params): Parameters<NamespaceParams>,
    ) -> Result<String, String> {
        let created = self
            .service
            .create_namespace(&params.namespace)
            .await
            .map_err(tool_error)?;
        to_json(&serde_json::json!({ "created": created }))
    }

    #[tool(description = "Delete a namespace together with every key in it.")]
    async fn delete_namespace(
        &self,
        Parameters(params): Parameters<NamespaceParams>,
    ) -> Result<String, String> {
        tracing::info!(namespace = %params.namespace, "delete_namespace called");
        let deleted = self
            .service
            .delete_namespace(&params.namespace)
            .await
            .map_err(tool_error)?;
        to_json(&serde_json::json!({ "deleted": deleted }))
    }

    #[tool(description = "List all namespaces in name order.")]
    async fn list_namespaces(&self) -> Result<String, String> {
        let namespaces = self.service.list_namespaces().await.map_err(tool_error)?;
        to_json(&serde_json::json!({ "namespaces": namespaces }))
    }

    #[tool(description = "List the keys of a namespace in key order, with their timestamps.")]
    async fn list_context_keys(
        &self,
        Parameters(params): Parameters<ListKeysParams>,
    ) -> Result<String, String> {
        let keys = self
            .service
            .list_keys(&params.namespace)
            .await
            .map_err(tool_error)?;
        to_json(&serde_json::json!({ "keys": keys }))
    }

    #[tool(description = "Find values in a namespace whose meaning is similar to a natural language query. Results are ranked by similarity, one per key.")]
    async fn retrieve_context_by_similarity(
        &self,
        Parameters(params): Parameters<SimilaritySearchParams>,
    ) -> Result<String, String> {
        tracing::info!(namespace = %params.namespace, query_len = params.query.len(), "retrieve_context_by_similarity called");
        let results = self
            .service
            .semantic_search(&params.namespace, &params.query, params.threshold, params.limit)
            .await
            .map_err(tool_error)?;
        to_json(&serde_json::json!({ "results": results }))
    }
}

#[tool_handler]
impl ServerHandler for MnemosTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "mnemos is a namespaced key-value memory. Use store_context and update_context \
                 to save values, retrieve_context to read them by key, and \
                 retrieve_context_by_similarity to find them by meaning."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}

fn tool_error(e: StoreError) -> String {
    tracing::warn!(error = %e, "tool call failed");
    e.to_string()
}

fn to_json<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| format!("serialization failed: {e}"))
}
