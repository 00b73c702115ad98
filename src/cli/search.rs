use anyhow::Result;

use super::preview;
use mnemos::config::MnemosConfig;
use mnemos::memory::types::value_text;
use mnemos::server::setup_service;

/// Run a semantic search from the terminal.
pub async fn search(
    config: MnemosConfig,
    namespace: &str,
    query: &str,
    threshold: Option<f64>,
    limit: Option<usize>,
) -> Result<()> {
    let service = setup_service(config)?;
    let grace = std::time::Duration::from_secs(service.config().server.shutdown_grace_secs);

    let result = service.semantic_search(namespace, query, threshold, limit).await;
    service.shutdown(grace).await;
    let hits = result?;

    if hits.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    println!("Found {} result(s) in '{namespace}'\n", hits.len());
    for (i, hit) in hits.iter().enumerate() {
        println!("  {}. {} (similarity: {:.4}, updated: {})", i + 1, hit.key, hit.similarity, hit.updated_at);
        println!("     value: {}", preview(&value_text(&hit.value), 120));
        println!("     match: {}", preview(&hit.matched_text, 120));
        println!();
    }

    Ok(())
}
