//! Efficacy web server.
//!
//! Run with: cargo run -p efficacy-web

use tracing::info;
use tracing_subscriber::EnvFilter;

use efficacy_common::EngineConfig;
use efficacy_engine::EfficacyOrchestrator;
use efficacy_web::{router::build_router, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting efficacy server, version {}", env!("CARGO_PKG_VERSION"));

    let config = EngineConfig::load()?;
    info!(
        models = config.scorers.models.len(),
        fusion = config.scorers.fusion_url.is_some(),
        deadline_ms = config.evidence.deadline_ms,
        "Configuration loaded"
    );

    let orchestrator = EfficacyOrchestrator::from_config(&config)?;
    let app = build_router(AppState::new(orchestrator));

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
