//! Viz bridge server binary

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;
use viz::api::{ApiState, create_router};
use viz::{AnalysisSession, HttpPredictProvider, ResultNormalizer, VizConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting Viz Server v{}", env!("CARGO_PKG_VERSION"));

    // Load config from file
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "viz.toml".to_string());

    let config = VizConfig::load(&config_path)
        .with_context(|| format!("Failed to load config file: {}", config_path))?;

    info!(
        config_path = config_path,
        endpoint = config.endpoint.base_url,
        timeout_secs = config.endpoint.timeout_secs,
        confidence_scale = ?config.endpoint.confidence_scale,
        "Loaded configuration"
    );

    let provider = HttpPredictProvider::new(&config.endpoint.base_url, config.request_timeout())
        .context("Failed to create HTTP client")?
        .with_confidence_scale(config.endpoint.confidence_scale);

    let session = AnalysisSession::with_normalizer(
        Arc::new(provider),
        config.request_timeout(),
        ResultNormalizer::from_seed(config.synthesis.seed),
    );

    let state = Arc::new(ApiState {
        session: Arc::new(session),
        endpoint: config.endpoint.base_url.clone(),
    });

    let app = create_router(state);

    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address: {}", config.server.bind))?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
