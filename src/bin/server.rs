//! Entrypoint: serves the FHIR/FDA/AI insight aggregator over HTTP.

use onco_aggregator::{router, AppState};
use onco_config::Settings;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let state = AppState::new(&settings.clients)?;
    let app = router(state);

    let port: u16 = std::env::var("PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(8080);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;

    tracing::info!(port, "starting insight aggregator");
    axum::serve(listener, app).await?;
    Ok(())
}
