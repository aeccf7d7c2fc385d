use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::state::AppState;

const SERVICE_NAME: &str = "market-view-hub";

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub uptime: String,
    pub time_utc: String,
    pub version: String,
    /// Index generation currently served; 0 before the first load.
    pub generation: u64,
    pub symbols: usize,
    pub files: usize,
    pub files_skipped: usize,
    pub rows: usize,
    pub rows_skipped: usize,
    pub sessions: usize,
}

/// Liveness and identity endpoints.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/status", get(status))
}

async fn health() -> &'static str {
    "ok"
}

async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let snapshot = state.store.snapshot();
    let stats = snapshot.stats();

    Json(StatusResponse {
        status: "ready",
        uptime: format_uptime(state.started_at.elapsed()),
        time_utc: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        version: state.config.version.clone(),
        generation: snapshot.generation(),
        symbols: snapshot.symbol_count(),
        files: stats.files,
        files_skipped: stats.files_skipped,
        rows: stats.rows,
        rows_skipped: stats.rows_skipped,
        sessions: state.sessions.len(),
    })
}

async fn index(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": SERVICE_NAME,
        "status": "ready",
        "version": state.config.version,
    }))
}

/// Whole seconds as `1h2m3s`, dropping leading zero units.
pub fn format_uptime(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}
