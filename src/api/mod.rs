pub mod routes;

use crate::config::Config;
use anyhow::{Context, Result};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Serves the JSON API on localhost until Ctrl+C.
pub async fn run_server(config: Arc<Config>) -> Result<()> {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, config.api_port));
    let app = routes::router(routes::ApiState {
        config: Arc::clone(&config),
    });

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind API server: {addr}"))?;
    info!(
        address = %addr,
        timezone = %config.timezone,
        db_path = %config.db_path.display(),
        "gitrecap API listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("API server failed")
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(error) => warn!(error = %error, "failed to listen for shutdown signal"),
    }
}
