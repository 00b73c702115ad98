//! Namespaced context memory for AI agents, with semantic retrieval.
//!
//! mnemos is an [MCP](https://modelcontextprotocol.io/) server that stores
//! arbitrary JSON values under a `(namespace, key)` pair. Values can be read
//! back by key or found by meaning: each value is split into chunks, the
//! chunks are embedded by an external model process, and queries are ranked
//! against them by cosine similarity.
//!
//! # Architecture
//!
//! - **Storage**: SQLite (WAL) holding namespaces, items and chunks; chunk
//!   vectors are little-endian `f32` BLOBs
//! - **Embeddings**: a long-lived child process spoken to over
//!   newline-delimited JSON on stdin/stdout
//! - **Search**: linear cosine scan, best chunk per item, thresholded top-K
//! - **Transport**: MCP over stdio (primary) or Streamable HTTP
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`db`]: SQLite handle, schema metadata and health checks
//! - [`chunker`]: Paragraph/sentence-aware text chunking with overlap
//! - [`embedding`]: The `Embedder` trait and the external-process client
//! - [`memory`]: Item store, ranking, search, and the `ContextService` boundary
//! - [`error`]: `StoreError` and `EmbeddingError`
//! - [`tools`] / [`server`]: MCP tool handler and transports

pub mod chunker;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod memory;
pub mod server;
pub mod tools;
