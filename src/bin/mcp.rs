use banking_agent_router::{agent::Orchestrator, config::AppConfig, mcp::BankingMcpServer};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    // stdout carries the protocol; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let config = AppConfig::from_env()?;
    info!(
        backend = %config.backend.base_url,
        tenant = %config.backend.tenant_id,
        "Initializing Mifos MCP server"
    );

    let orchestrator = Arc::new(Orchestrator::from_config(&config)?);
    BankingMcpServer::new(orchestrator).run_stdio().await
}
