#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use mnemos::config::MnemosConfig;
use mnemos::db::{self, Database};
use mnemos::embedding::Embedder;
use mnemos::error::EmbeddingError;
use mnemos::memory::service::ContextService;
use rusqlite::Connection;

/// Open a fresh in-memory database with the schema applied.
pub fn test_db() -> Connection {
    db::open_memory_database().unwrap()
}

/// Fixed vocabulary; each word is one embedding axis.
pub const VOCAB: [&str; 8] = ["cat", "dog", "rust", "python", "coffee", "tea", "rain", "sun"];

/// Deterministic bag-of-words embedder over [`VOCAB`]. Texts sharing words
/// score high; texts with no vocabulary words embed to the zero vector.
#[derive(Default)]
pub struct KeywordEmbedder {
    pub calls: AtomicUsize,
}

pub fn keyword_vector(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    VOCAB
        .iter()
        .map(|word| lower.matches(word).count() as f32)
        .collect()
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed_batch(
        &self,
        texts: &[String],
        _is_query: bool,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }

    fn model(&self) -> &str {
        "keyword-test"
    }
}

/// Embedder that fails while `failing` is set and behaves like
/// [`KeywordEmbedder`] otherwise.
pub struct FlakyEmbedder {
    pub failing: AtomicBool,
}

impl FlakyEmbedder {
    pub fn failing() -> Self {
        Self {
            failing: AtomicBool::new(true),
        }
    }

    pub fn recover(&self) {
        self.failing.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl Embedder for FlakyEmbedder {
    async fn embed_batch(
        &self,
        texts: &[String],
        _is_query: bool,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EmbeddingError::ProcessExited);
        }
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }

    fn model(&self) -> &str {
        "flaky-test"
    }
}

/// Test config: indexing runs inline so writes are searchable on return.
pub fn test_config() -> MnemosConfig {
    let mut config = MnemosConfig::default();
    config.embedding.background = false;
    config
}

/// A service over a private in-memory database.
pub fn test_service(embedder: Option<Arc<dyn Embedder>>) -> ContextService {
    test_service_with(embedder, test_config())
}

pub fn test_service_with(embedder: Option<Arc<dyn Embedder>>, config: MnemosConfig) -> ContextService {
    ContextService::new(Arc::new(Database::in_memory()), embedder, Arc::new(config))
}
