use std::sync::Arc;

use token_api_mcp::core::ServerConfig;
use token_api_mcp::logging;
use token_api_mcp::mcp;
use token_api_mcp::openapi::{HttpSpecFetcher, SpecSource};
use token_api_mcp::runtime::{load_initial, ReloadScheduler};
use token_api_mcp::tools::{Dispatcher, ToolRegistry, ToolSynthesizer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is normal outside development
    let dotenv = dotenvy::dotenv();

    let config = ServerConfig::from_env()?;
    logging::init_logging(config.log_format)?;

    if let Ok(path) = dotenv {
        tracing::debug!("Loaded environment from {}", path.display());
    }

    tracing::info!("=== Token API MCP Server Starting ===");
    tracing::info!("Remote API: {}", config.base_url);
    tracing::info!("OpenAPI spec: {}", config.spec_url);

    let source: Arc<dyn SpecSource> = Arc::new(HttpSpecFetcher::new(
        &config.spec_url,
        config.auth_token.clone(),
        config.fetch_timeout,
    )?);
    let synthesizer = ToolSynthesizer::new(config.collision_policy);

    // No tools, no server
    let (snapshot, fingerprint) = load_initial(source.as_ref(), &synthesizer).await?;
    let registry = Arc::new(ToolRegistry::new(snapshot));

    let dispatcher = Arc::new(Dispatcher::new(
        registry.clone(),
        &config.base_url,
        config.auth_token.clone(),
        config.request_timeout,
    )?);

    let scheduler = ReloadScheduler::new(source, synthesizer, registry, config.reload_interval)
        .with_fingerprint(fingerprint)
        .start();

    let router = mcp::build_router(&config, dispatcher);
    let served = mcp::serve(&config, router, mcp::shutdown_signal()).await;

    scheduler.shutdown().await;

    tracing::info!("=== Token API MCP Server Shutting Down ===");

    served
}
