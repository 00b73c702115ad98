use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::chunker::ChunkerConfig;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct MnemosConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub chunking: ChunkerConfig,
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub transport: String,
    pub log_level: String,
    pub host: String,
    pub port: u16,
    /// Upper bound on shutdown: pending indexing, embedder exit.
    pub shutdown_grace_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `"process"` or `"disabled"`.
    pub provider: String,
    pub command: String,
    pub args: Vec<String>,
    pub model: String,
    pub request_timeout_secs: u64,
    pub init_timeout_secs: u64,
    pub batch_size: usize,
    /// Index chunks in a background task instead of before the write returns.
    pub background: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub chunk_threshold: f64,
    pub whole_item_threshold: f64,
    pub default_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: "stdio".into(),
            log_level: "info".into(),
            host: "127.0.0.1".into(),
            port: 7411,
            shutdown_grace_secs: 5,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_mnemos_dir()
            .join("context.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let script = default_mnemos_dir()
            .join("embedding_service.py")
            .to_string_lossy()
            .into_owned();
        Self {
            provider: "process".into(),
            command: "python3".into(),
            args: vec![script],
            model: "intfloat/multilingual-e5-large-instruct".into(),
            request_timeout_secs: 30,
            init_timeout_secs: 300,
            batch_size: 32,
            background: true,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            chunk_threshold: 0.5,
            whole_item_threshold: 0.7,
            default_limit: 10,
        }
    }
}

impl RetrievalConfig {
    /// Default similarity floor for the active indexing mode.
    pub fn default_threshold(&self, chunking_enabled: bool) -> f64 {
        if chunking_enabled {
            self.chunk_threshold
        } else {
            self.whole_item_threshold
        }
    }
}

/// Returns `~/.mnemos/`
pub fn default_mnemos_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mnemos")
}

/// Returns the default config file path: `~/.mnemos/config.toml`
pub fn default_config_path() -> PathBuf {
    default_mnemos_dir().join("config.toml")
}

impl MnemosConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            MnemosConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides (MNEMOS_DB, MNEMOS_LOG_LEVEL, MNEMOS_EMBEDDING_COMMAND).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("MNEMOS_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("MNEMOS_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("MNEMOS_EMBEDDING_COMMAND") {
            self.embedding.command = val;
        }
    }

    /// Reject settings the chunker and ranker cannot work with.
    pub fn validate(&self) -> Result<()> {
        let c = &self.chunking;
        ensure!(c.max_tokens > 0, "chunking.max_tokens must be positive");
        ensure!(c.chars_per_token > 0, "chunking.chars_per_token must be positive");
        ensure!(
            c.overlap_tokens < c.max_tokens,
            "chunking.overlap_tokens must be smaller than chunking.max_tokens"
        );

        let r = &self.retrieval;
        for (name, value) in [
            ("chunk_threshold", r.chunk_threshold),
            ("whole_item_threshold", r.whole_item_threshold),
        ] {
            ensure!(
                (-1.0..=1.0).contains(&value),
                "retrieval.{name} must be within [-1, 1], got {value}"
            );
        }
        ensure!(r.default_limit > 0, "retrieval.default_limit must be positive");
        ensure!(self.embedding.batch_size > 0, "embedding.batch_size must be positive");
        Ok(())
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
