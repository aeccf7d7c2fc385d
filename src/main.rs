use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

use market_view_hub::config::HubConfig;
use market_view_hub::reload::{Reloader, reload_all};
use market_view_hub::state::AppState;

#[tokio::main]
async fn main() {
    // Initialise tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = HubConfig::from_env();
    let addr: SocketAddr = match format!("{}:{}", cfg.bind, cfg.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!("invalid bind address {}:{}: {e}", cfg.bind, cfg.port);
            return;
        }
    };
    let reload_interval = cfg.reload_interval;

    let state = AppState::new(cfg);
    tracing::info!(
        roots = ?state.config.data_dirs,
        version = %state.config.version,
        "loading tick data"
    );

    // Serve even when the first pass fails; the periodic reload may recover.
    if let Err(e) = reload_all(&state).await {
        tracing::warn!("initial load failed: {e}");
    }

    let reloader = (!reload_interval.is_zero())
        .then(|| Reloader::spawn(std::sync::Arc::clone(&state), reload_interval));

    let app = market_view_hub::build_router(state);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("failed to bind {addr}: {e}");
            return;
        }
    };
    tracing::info!("market view hub listening on http://{addr}");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("server error: {e}");
    }

    if let Some(reloader) = reloader {
        reloader.shutdown().await;
    }
    tracing::info!("shutdown complete");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to install Ctrl+C handler: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, gracefully stopping…");
}
