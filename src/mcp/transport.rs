//! HTTP transport
//!
//! Mounts the streamable HTTP MCP endpoint next to a plain `/health` route.

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

use super::server::ToolServer;
use crate::core::ServerConfig;
use crate::tools::Dispatcher;

async fn health_handler() -> &'static str {
    "OK"
}

/// Build the router serving MCP on `config.mcp_path`
pub fn build_router(config: &ServerConfig, dispatcher: Arc<Dispatcher>) -> Router {
    let base_url = config.base_url.clone();

    let mcp_service = StreamableHttpService::new(
        move || Ok(ToolServer::new(dispatcher.clone(), base_url.clone())),
        LocalSessionManager::default().into(),
        StreamableHttpServerConfig::default(),
    );

    Router::new()
        .route("/health", get(health_handler))
        .nest_service(&config.mcp_path, mcp_service)
}

/// Bind and serve until `shutdown` resolves
pub async fn serve(
    config: &ServerConfig,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let address = config.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;

    tracing::info!(
        "[Transport] Listening on http://{}{} (health at /health)",
        listener.local_addr().map(|a| a.to_string()).unwrap_or(address),
        config.mcp_path
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server error")?;

    tracing::info!("[Transport] Server stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("[Transport] Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("[Transport] Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("[Transport] Received Ctrl-C, shutting down"),
        _ = terminate => tracing::info!("[Transport] Received SIGTERM, shutting down"),
    }
}
