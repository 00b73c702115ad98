//! Error taxonomy for the store and the embedding client.
//!
//! "Not found" is deliberately absent: missing items and namespaces are
//! reported as `None` / `false` by the operations themselves.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by item store and retrieval operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Bad caller input (blank namespace, key or query). Raised before storage is touched.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Store on an existing key or update on a missing one.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The storage engine failed; any open transaction was rolled back.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Lock poisoning or a panicked blocking task.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Failures while obtaining vectors from the embedding process.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("semantic indexing is disabled")]
    Disabled,

    #[error("embedding process is not initialized")]
    NotInitialized,

    #[error("failed to start embedding process: {0}")]
    Spawn(String),

    #[error("embedding channel I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("embedding process exited")]
    ProcessExited,

    #[error("embedding request timed out after {0:?}")]
    Timeout(Duration),

    /// The process answered with an `error` field.
    #[error("embedding process reported: {0}")]
    Remote(String),

    #[error("malformed embedding response: {0}")]
    Malformed(String),

    /// The byte stream could not be split into lines; the channel is out of sync.
    #[error("corrupt embedding channel: {0}")]
    Framing(String),

    #[error("vector dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },
}

impl EmbeddingError {
    /// Whether the channel to the process can no longer be trusted.
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(self, Self::Io(_) | Self::ProcessExited | Self::Framing(_))
    }
}
