//! The boundary every transport calls into.
//!
//! [`ContextService`] owns the storage handle, the optional embedder and the
//! configuration. Storage work runs on the blocking pool; embedding of freshly
//! written chunks happens after the write commits and never fails the write.

use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinSet;

use super::chunks::{clear_embeddings, pending_chunks, set_embeddings};
use super::namespaces;
use super::search::{search_namespace, SearchHit};
use super::stats::{namespace_stats, NamespaceStats};
use super::store::{self, WriteOutcome};
use super::types::{validate_name, value_text, ContextItem, KeyInfo, PendingChunk, WriteMode};
use crate::chunker::chunk_text;
use crate::config::MnemosConfig;
use crate::db::{meta, Database};
use crate::embedding::{EmbedTask, Embedder};
use crate::error::{EmbeddingError, StoreError};

/// What a successful write reports back.
#[derive(Debug, Clone, Serialize)]
pub struct WriteReceipt {
    pub item: ContextItem,
    pub created: bool,
    /// Chunks queued for embedding.
    pub chunks: usize,
}

impl From<&WriteOutcome> for WriteReceipt {
    fn from(outcome: &WriteOutcome) -> Self {
        Self {
            item: outcome.item.clone(),
            created: outcome.created,
            chunks: outcome.pending.len(),
        }
    }
}

pub struct ContextService {
    db: Arc<Database>,
    embedder: Option<Arc<dyn Embedder>>,
    config: Arc<MnemosConfig>,
    indexing: AsyncMutex<JoinSet<()>>,
}

impl ContextService {
    /// `embedder: None` stores values without chunks; semantic search then
    /// fails with [`EmbeddingError::Disabled`].
    pub fn new(
        db: Arc<Database>,
        embedder: Option<Arc<dyn Embedder>>,
        config: Arc<MnemosConfig>,
    ) -> Self {
        Self {
            db,
            embedder,
            config,
            indexing: AsyncMutex::new(JoinSet::new()),
        }
    }

    pub fn config(&self) -> &MnemosConfig {
        &self.config
    }

    pub fn embedder(&self) -> Option<&Arc<dyn Embedder>> {
        self.embedder.as_ref()
    }

    // ── Items ────────────────────────────────────────────────────────────────

    /// Insert a new item. Fails with [`StoreError::Conflict`] if the key exists.
    pub async fn store(&self, namespace: &str, key: &str, value: Value) -> Result<WriteReceipt, StoreError> {
        self.write(namespace, key, value, WriteMode::Create).await
    }

    /// Overwrite an existing item. Fails with [`StoreError::Conflict`] if it is missing.
    pub async fn update(&self, namespace: &str, key: &str, value: Value) -> Result<WriteReceipt, StoreError> {
        self.write(namespace, key, value, WriteMode::Update).await
    }

    /// Insert or overwrite.
    pub async fn put(&self, namespace: &str, key: &str, value: Value) -> Result<WriteReceipt, StoreError> {
        self.write(namespace, key, value, WriteMode::Upsert).await
    }

    async fn write(
        &self,
        namespace: &str,
        key: &str,
        value: Value,
        mode: WriteMode,
    ) -> Result<WriteReceipt, StoreError> {
        let chunk_texts = self.chunk_value(&value);
        let (ns, k) = (namespace.to_string(), key.to_string());
        let outcome = with_conn(&self.db, move |conn| {
            store::write_item(conn, &ns, &k, &value, mode, &chunk_texts)
        })
        .await?;

        tracing::info!(
            namespace,
            key,
            mode = ?mode,
            created = outcome.created,
            chunks = outcome.pending.len(),
            "item written"
        );

        let receipt = WriteReceipt::from(&outcome);
        self.schedule_indexing(outcome.pending).await;
        Ok(receipt)
    }

    /// Chunk texts for a value. Nothing is chunked while indexing is disabled.
    fn chunk_value(&self, value: &Value) -> Vec<String> {
        if self.embedder.is_none() {
            return Vec::new();
        }
        let text = value_text(value);
        if self.config.chunking.enabled {
            chunk_text(&text, &self.config.chunking)
        } else if text.trim().is_empty() {
            Vec::new()
        } else {
            vec![text]
        }
    }

    pub async fn retrieve(&self, namespace: &str, key: &str) -> Result<Option<ContextItem>, StoreError> {
        let (ns, k) = (namespace.to_string(), key.to_string());
        with_conn(&self.db, move |conn| store::retrieve_item(conn, &ns, &k)).await
    }

    /// Returns `false` if the item did not exist.
    pub async fn delete(&self, namespace: &str, key: &str) -> Result<bool, StoreError> {
        let (ns, k) = (namespace.to_string(), key.to_string());
        let deleted = with_conn(&self.db, move |conn| store::delete_item(conn, &ns, &k)).await?;
        tracing::info!(namespace, key, deleted, "delete");
        Ok(deleted)
    }

    pub async fn list_keys(&self, namespace: &str) -> Result<Vec<KeyInfo>, StoreError> {
        let ns = namespace.to_string();
        with_conn(&self.db, move |conn| store::list_keys(conn, &ns)).await
    }

    // ── Namespaces ───────────────────────────────────────────────────────────

    pub async fn create_namespace(&self, name: &str) -> Result<bool, StoreError> {
        let name = name.to_string();
        with_conn(&self.db, move |conn| namespaces::create_namespace(conn, &name)).await
    }

    pub async fn delete_namespace(&self, name: &str) -> Result<bool, StoreError> {
        let name = name.to_string();
        with_conn(&self.db, move |conn| namespaces::delete_namespace(conn, &name)).await
    }

    pub async fn list_namespaces(&self) -> Result<Vec<String>, StoreError> {
        with_conn(&self.db, |conn| namespaces::list_namespaces(conn)).await
    }

    // ── Retrieval ────────────────────────────────────────────────────────────

    /// Items whose best chunk scores at least `threshold` against `query`.
    ///
    /// Defaults come from `[retrieval]`: the chunk threshold when chunking is
    /// on, the whole-item threshold otherwise. Embedding failures surface.
    pub async fn semantic_search(
        &self,
        namespace: &str,
        query: &str,
        threshold: Option<f64>,
        limit: Option<usize>,
    ) -> Result<Vec<SearchHit>, StoreError> {
        validate_name("namespace", namespace)?;
        if query.trim().is_empty() {
            return Err(StoreError::Validation("query must not be empty".into()));
        }
        let limit = limit.unwrap_or(self.config.retrieval.default_limit);
        if limit == 0 {
            return Err(StoreError::Validation("limit must be at least 1".into()));
        }
        let threshold = threshold.unwrap_or_else(|| {
            self.config
                .retrieval
                .default_threshold(self.config.chunking.enabled)
        });
        if !(-1.0..=1.0).contains(&threshold) {
            return Err(StoreError::Validation(format!(
                "threshold must be between -1 and 1, got {threshold}"
            )));
        }
        let embedder = self.embedder.as_ref().ok_or(EmbeddingError::Disabled)?;

        let query_vector = embedder.embed(query, EmbedTask::Query).await?;
        let ns = namespace.to_string();
        let hits = with_conn(&self.db, move |conn| {
            search_namespace(conn, &ns, &query_vector, threshold, limit)
        })
        .await?;

        tracing::info!(namespace, threshold, limit, hits = hits.len(), "semantic search");
        Ok(hits)
    }

    // ── Indexing ─────────────────────────────────────────────────────────────

    async fn schedule_indexing(&self, pending: Vec<PendingChunk>) {
        if pending.is_empty() {
            return;
        }
        let Some(embedder) = self.embedder.clone() else {
            return;
        };
        let db = Arc::clone(&self.db);
        let batch_size = self.config.embedding.batch_size;

        if !self.config.embedding.background {
            log_indexing_result(index_chunks(&db, embedder.as_ref(), pending, batch_size).await);
            return;
        }

        let mut tasks = self.indexing.lock().await;
        while let Some(finished) = tasks.try_join_next() {
            if let Err(e) = finished {
                tracing::warn!(error = %e, "indexing task did not complete");
            }
        }
        tasks.spawn(async move {
            log_indexing_result(index_chunks(&db, embedder.as_ref(), pending, batch_size).await);
        });
    }

    /// Wait for every background indexing task started so far.
    pub async fn wait_for_indexing(&self) {
        let mut tasks = self.indexing.lock().await;
        while let Some(finished) = tasks.join_next().await {
            if let Err(e) = finished {
                tracing::warn!(error = %e, "indexing task did not complete");
            }
        }
    }

    /// Embed up to `max` chunks that have no embedding yet. Returns how many
    /// chunks were picked up; zero means nothing is pending. Errors surface.
    pub async fn reindex_pending(&self, namespace: Option<&str>, max: usize) -> Result<usize, StoreError> {
        let embedder = self.embedder.clone().ok_or(EmbeddingError::Disabled)?;
        let ns = namespace.map(str::to_string);
        let pending = with_conn(&self.db, move |conn| pending_chunks(conn, ns.as_deref(), max)).await?;
        let picked = pending.len();
        if picked == 0 {
            return Ok(0);
        }

        let stored = index_chunks(&self.db, embedder.as_ref(), pending, self.config.embedding.batch_size).await?;
        tracing::info!(picked, stored, "repair pass embedded chunks");
        Ok(picked)
    }

    /// Drop stored embeddings so the repair pass recomputes them with the
    /// current model, and record that model. Returns the chunks cleared.
    pub async fn reset_embeddings(&self, namespace: Option<&str>) -> Result<usize, StoreError> {
        let model = self
            .embedder
            .as_ref()
            .map(|e| e.model().to_string())
            .ok_or(EmbeddingError::Disabled)?;
        let ns = namespace.map(str::to_string);
        let cleared = with_conn(&self.db, move |conn| {
            let cleared = clear_embeddings(conn, ns.as_deref())?;
            meta::set_embedding_model(conn, &model)?;
            Ok(cleared)
        })
        .await?;
        tracing::info!(cleared, "embeddings cleared");
        Ok(cleared)
    }

    pub async fn stats(&self) -> Result<Vec<NamespaceStats>, StoreError> {
        with_conn(&self.db, |conn| namespace_stats(conn)).await
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Drain background indexing for at most `grace` (aborting what remains),
    /// stop the embedder, then close storage.
    pub async fn shutdown(&self, grace: Duration) {
        tracing::info!(grace_ms = grace.as_millis() as u64, "shutting down");

        if tokio::time::timeout(grace, self.wait_for_indexing()).await.is_err() {
            let mut tasks = self.indexing.lock().await;
            tracing::warn!(remaining = tasks.len(), "aborting unfinished indexing tasks");
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }

        if let Some(embedder) = &self.embedder {
            embedder.shutdown(grace).await;
        }

        let db = Arc::clone(&self.db);
        if let Err(e) = tokio::task::spawn_blocking(move || db.close()).await {
            tracing::warn!(error = %e, "database close task failed");
        }
    }
}

/// Run `f` against the shared connection on the blocking pool.
async fn with_conn<T, F>(db: &Arc<Database>, f: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
{
    let db = Arc::clone(db);
    tokio::task::spawn_blocking(move || {
        let shared = db.connection()?;
        let mut conn = shared
            .lock()
            .map_err(|e| StoreError::Internal(format!("db lock poisoned: {e}")))?;
        f(&mut conn)
    })
    .await
    .map_err(|e| StoreError::Internal(format!("db task failed: {e}")))?
}

/// Embed `chunks` in batches and store the vectors. Returns the rows updated;
/// chunks replaced in the meantime are skipped.
async fn index_chunks(
    db: &Arc<Database>,
    embedder: &dyn Embedder,
    chunks: Vec<PendingChunk>,
    batch_size: usize,
) -> Result<usize, StoreError> {
    let mut stored = 0;
    for batch in chunks.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder.embed_batch(&texts, EmbedTask::Passage.is_query()).await?;
        let updates: Vec<(String, Vec<f32>)> = batch.iter().map(|c| c.id.clone()).zip(vectors).collect();
        stored += with_conn(db, move |conn| set_embeddings(conn, &updates)).await?;
    }
    Ok(stored)
}

fn log_indexing_result(result: Result<usize, StoreError>) {
    match result {
        Ok(stored) => tracing::debug!(stored, "chunks embedded"),
        Err(e) => tracing::warn!(error = %e, "indexing failed; chunks left for the repair pass"),
    }
}
