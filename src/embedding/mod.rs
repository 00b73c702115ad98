//! Text-to-vector embedding pipeline.
//!
//! Provides the [`Embedder`] trait and [`process::ProcessEmbedder`], which keeps
//! a long-lived external model process and talks to it over newline-delimited
//! JSON. The embedder is created from configuration via [`create_embedder`].

pub mod framing;
pub mod process;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{expand_tilde, EmbeddingConfig};
use crate::error::EmbeddingError;

/// Which side of an asymmetric retrieval model a text is embedded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedTask {
    /// A search query.
    Query,
    /// Stored content to be searched.
    Passage,
}

impl EmbedTask {
    pub fn is_query(self) -> bool {
        matches!(self, Self::Query)
    }
}

/// Trait for turning text into vectors.
///
/// Implementations must surface failures faithfully; they never substitute a
/// result for a failed call.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text. Convenience wrapper over [`Embedder::embed_batch`].
    async fn embed(&self, text: &str, task: EmbedTask) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_batch(&[text.to_string()], task.is_query()).await?;
        match vectors.pop() {
            Some(v) if vectors.is_empty() => Ok(v),
            _ => Err(EmbeddingError::Malformed("expected exactly one vector".into())),
        }
    }

    /// Embed many texts in one round trip, preserving order.
    async fn embed_batch(
        &self,
        texts: &[String],
        is_query: bool,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Identifier of the model behind this embedder, recorded in `schema_meta`.
    fn model(&self) -> &str;

    /// Release external resources, waiting at most `grace`.
    async fn shutdown(&self, _grace: Duration) {}
}

/// Create the embedder named by `config.provider`.
///
/// Returns `Ok(None)` when semantic indexing is disabled.
pub fn create_embedder(config: &EmbeddingConfig) -> anyhow::Result<Option<Arc<dyn Embedder>>> {
    match config.provider.as_str() {
        "process" => {
            let program = expand_tilde(&config.command).to_string_lossy().into_owned();
            let args: Vec<String> = config
                .args
                .iter()
                .map(|arg| expand_tilde(arg).to_string_lossy().into_owned())
                .collect();
            let launcher = process::CommandLauncher::new(&program, &args);
            let embedder = process::ProcessEmbedder::new(
                Box::new(launcher),
                &config.model,
                Duration::from_secs(config.request_timeout_secs),
                Duration::from_secs(config.init_timeout_secs),
            );
            Ok(Some(Arc::new(embedder)))
        }
        "disabled" => Ok(None),
        other => anyhow::bail!("unknown embedding provider: {other}. Supported: process, disabled"),
    }
}
