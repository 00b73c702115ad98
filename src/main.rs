mod cli;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use mnemos::config::MnemosConfig;
use mnemos::server;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mnemos", version, about = "Namespaced context memory MCP server with semantic retrieval")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the MCP server
    Serve {
        /// Transport to serve on: "stdio" or "http". Defaults to server.transport.
        #[arg(long)]
        transport: Option<String>,
    },
    /// Search a namespace by meaning
    Search {
        namespace: String,
        query: String,
        /// Minimum similarity (-1 to 1)
        #[arg(long)]
        threshold: Option<f64>,
        /// Maximum number of results
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Embed chunks that are still missing vectors
    Reindex {
        /// Only this namespace
        #[arg(long)]
        namespace: Option<String>,
        /// Discard every stored vector first and re-embed with the configured model
        #[arg(long)]
        all: bool,
    },
    /// Check database health and configuration
    Doctor,
    /// Show per-namespace counts
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config (for log level)
    let config = MnemosConfig::load()?;

    // Log to stderr so stdout stays clean for MCP JSON-RPC.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve { transport } => {
            let transport = transport.unwrap_or_else(|| config.server.transport.clone());
            match transport.as_str() {
                "stdio" => server::serve_stdio(config).await?,
                "http" => server::serve_http(config).await?,
                other => bail!("unknown transport: {other}. Supported: stdio, http"),
            }
        }
        Command::Search { namespace, query, threshold, limit } => {
            cli::search::search(config, &namespace, &query, threshold, limit).await?;
        }
        Command::Reindex { namespace, all } => {
            cli::reindex::reindex(config, namespace.as_deref(), all).await?;
        }
        Command::Doctor => cli::doctor::doctor(&config)?,
        Command::Stats => cli::stats::stats(&config)?,
    }

    Ok(())
}
