//! CLI `reindex` command: embed chunks the write path could not index.

use anyhow::{Context, Result};
use std::time::Duration;

use super::progress_bar;
use mnemos::config::MnemosConfig;
use mnemos::server::setup_service;

/// Embed every pending chunk, optionally after discarding all stored vectors.
pub async fn reindex(config: MnemosConfig, namespace: Option<&str>, all: bool) -> Result<()> {
    let service = setup_service(config)?;
    let grace = Duration::from_secs(service.config().server.shutdown_grace_secs);
    let result = run(&service, namespace, all).await;
    service.shutdown(grace).await;
    result
}

async fn run(
    service: &mnemos::memory::service::ContextService,
    namespace: Option<&str>,
    all: bool,
) -> Result<()> {
    let model = service
        .embedder()
        .map(|e| e.model().to_string())
        .context("semantic indexing is disabled; set embedding.provider = \"process\"")?;

    if all {
        let cleared = service.reset_embeddings(namespace).await?;
        println!("Cleared {cleared} stored embedding(s).");
    }

    let pending: u64 = service
        .stats()
        .await?
        .iter()
        .filter(|s| namespace.map_or(true, |ns| s.namespace == ns))
        .map(|s| s.pending_chunks)
        .sum();
    if pending == 0 {
        println!("Nothing to reindex.");
        return Ok(());
    }

    println!("Embedding {pending} chunk(s) with model '{model}'...");
    let pb = progress_bar(pending)?;
    let batch = service.config().embedding.batch_size.max(1);
    loop {
        let picked = service
            .reindex_pending(namespace, batch)
            .await
            .context("embedding batch failed")?;
        if picked == 0 {
            break;
        }
        pb.inc(picked as u64);
    }
    pb.finish_and_clear();

    println!("Reindexed {pending} chunk(s).");
    Ok(())
}
