use anyhow::Result;

use mnemos::config::MnemosConfig;
use mnemos::db;
use mnemos::memory::stats::namespace_stats;

/// Display per-namespace counts in the terminal.
pub fn stats(config: &MnemosConfig) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = db::open_database(&db_path)?;
    let stats = namespace_stats(&conn)?;

    println!("Context Statistics");
    println!("{}", "=".repeat(60));
    if stats.is_empty() {
        println!("  (no namespaces)");
        return Ok(());
    }

    println!("  {:<24} {:>8} {:>8} {:>8} {:>8}", "namespace", "items", "chunks", "indexed", "pending");
    for s in &stats {
        println!(
            "  {:<24} {:>8} {:>8} {:>8} {:>8}",
            s.namespace, s.items, s.chunks, s.embedded_chunks, s.pending_chunks
        );
    }

    let pending: u64 = stats.iter().map(|s| s.pending_chunks).sum();
    if pending > 0 {
        println!();
        println!("{pending} chunk(s) await embedding. Run `mnemos reindex` to index them.");
    }
    Ok(())
}
