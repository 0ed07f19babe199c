use banking_agent_router::{agent::Orchestrator, api::start_server, config::AppConfig};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env()?;

    info!("Banking Agent Router - API Server");
    info!(
        backend = %config.backend.base_url,
        tenant = %config.backend.tenant_id,
        model = %config.model.model,
        port = config.port,
        "Configuration loaded"
    );

    let orchestrator = Arc::new(Orchestrator::from_config(&config)?);
    info!(
        operations = orchestrator.catalog().len(),
        "Orchestrator initialized"
    );

    start_server(orchestrator, config.port).await?;

    Ok(())
}
