//! MCP server initialization for stdio and Streamable HTTP transports.
//!
//! Provides [`serve_stdio`] and [`serve_http`] entry points that wire up the
//! database, the embedder and the MCP tool handler into a running server, and
//! shut the [`ContextService`] down cleanly when the transport ends.

use crate::config::MnemosConfig;
use crate::db::{self, Database};
use crate::embedding;
use crate::memory::service::ContextService;
use crate::tools::MnemosTools;
use anyhow::{Context, Result};
use rmcp::ServiceExt;
use std::sync::Arc;
use std::time::Duration;

/// Shared setup: prepare the lazy database handle, create the embedder and
/// check that stored vectors came from the configured model.
pub fn setup_service(config: MnemosConfig) -> Result<Arc<ContextService>> {
    let db_path = config.resolved_db_path();
    let database = Arc::new(Database::at_path(&db_path));

    let embedder = embedding::create_embedder(&config.embedding)?;
    match &embedder {
        Some(embedder) => {
            check_embedding_model(&database, embedder.model())?;
            tracing::info!(model = embedder.model(), "embedder configured; process starts on first use");
        }
        None => tracing::info!("semantic indexing disabled"),
    }

    tracing::info!(db = %db_path.display(), "context service ready");
    Ok(Arc::new(ContextService::new(database, embedder, Arc::new(config))))
}

/// Record the model on first run; warn when it changed since vectors were stored.
fn check_embedding_model(database: &Database, model: &str) -> Result<()> {
    let shared = database.connection().context("failed to open database")?;
    let conn = shared
        .lock()
        .map_err(|e| anyhow::anyhow!("db lock poisoned: {e}"))?;

    match db::meta::get_embedding_model(&conn)? {
        Some(stored) if stored != model => {
            tracing::warn!(
                stored = %stored,
                configured = %model,
                "embedding model changed; run `mnemos reindex --all` to recompute vectors"
            );
        }
        Some(_) => {}
        None => db::meta::set_embedding_model(&conn, model)?,
    }
    Ok(())
}

fn grace_period(service: &ContextService) -> Duration {
    Duration::from_secs(service.config().server.shutdown_grace_secs)
}

/// Start the MCP server over stdio transport.
pub async fn serve_stdio(config: MnemosConfig) -> Result<()> {
    tracing::info!("starting mnemos MCP server on stdio");

    let service = setup_service(config)?;
    let grace = grace_period(&service);

    let tools = MnemosTools::new(Arc::clone(&service));
    let transport = rmcp::transport::stdio();

    let server = tools.serve(transport).await?;
    tracing::info!("MCP server running, waiting for client");

    tokio::select! {
        result = server.waiting() => {
            result?;
            tracing::info!("MCP client disconnected");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupt received");
        }
    }

    service.shutdown(grace).await;
    tracing::info!("MCP server shut down");
    Ok(())
}

/// Start the MCP server over Streamable HTTP transport at `/mcp`.
pub async fn serve_http(config: MnemosConfig) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!(addr = %bind_addr, "starting mnemos MCP server on HTTP");

    let service = setup_service(config)?;
    let grace = grace_period(&service);

    let shared = Arc::clone(&service);
    let http = rmcp::transport::streamable_http_server::StreamableHttpService::new(
        move || Ok(MnemosTools::new(Arc::clone(&shared))),
        rmcp::transport::streamable_http_server::session::local::LocalSessionManager::default()
            .into(),
        Default::default(),
    );

    let router = axum::Router::new().nest_service("/mcp", http);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "MCP server listening at http://{bind_addr}/mcp");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutting down HTTP server");
        })
        .await?;

    service.shutdown(grace).await;
    Ok(())
}
