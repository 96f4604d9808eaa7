//! # klk-api: Binary Entry Point
//!
//! Reads configuration from the environment, opens and migrates the
//! database, and serves the API on `0.0.0.0:$PORT` (default 8080).

use klk_api::config::{AppConfig, LogFormat};
use klk_api::AppState;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Subscriber first, so configuration warnings are visible.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match LogFormat::parse(std::env::var("LOG_FORMAT").ok().as_deref()) {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    let config = AppConfig::from_env()?;
    tracing::debug!(?config, "configuration loaded");

    let pool = klk_api::db::init_pool(&config.database_url).await.map_err(|e| {
        tracing::error!("database initialization failed: {e}");
        e
    })?;
    tokio::fs::create_dir_all(&config.media_root).await?;

    let port = config.port;
    let app = klk_api::app(AppState::new(pool, config));

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("KLK API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to install Ctrl+C handler: {e}");
        return;
    }
    tracing::info!("shutdown signal received");
}
