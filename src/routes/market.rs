use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::error::HubError;
use crate::query::{parse_resolution, parse_start_end};
use crate::state::AppState;
use crate::store::{BucketPlan, PriceOverview, TimeframeResponse};

// ── Query params ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct OverviewQuery {
    #[serde(default)]
    symbol: String,
    start: Option<String>,
    end: Option<String>,
    #[serde(default)]
    resolution: i64,
}

// ── Route definitions ────────────────────────────────────────────────────

/// Read-only HTTP mirrors of the WebSocket queries.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/symbols", get(api_symbols))
        .route("/api/timeframe", get(api_timeframe))
        .route("/api/price-overview", get(api_price_overview))
}

async fn api_symbols(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "symbols": state.store.list_symbols() }))
}

async fn api_timeframe(
    State(state): State<Arc<AppState>>,
) -> Result<Json<TimeframeResponse>, HubError> {
    let view = tokio::task::spawn_blocking(move || state.timeframe()).await?;
    Ok(Json(view.as_ref().clone()))
}

async fn api_price_overview(
    State(state): State<Arc<AppState>>,
    Query(q): Query<OverviewQuery>,
) -> Result<Json<PriceOverview>, HubError> {
    let symbol = q.symbol.trim().to_string();
    if symbol.is_empty() {
        return Err(HubError::BadRequest("missing symbol".to_string()));
    }
    let (start, end) = parse_start_end(q.start.as_deref(), q.end.as_deref(), chrono::Utc::now())?;
    let plan = BucketPlan::new(start, end, parse_resolution(q.resolution)?)?;

    let worker = Arc::clone(&state);
    let lookup = symbol.clone();
    let overview = tokio::task::spawn_blocking(move || {
        worker.store.snapshot().price_overview(&lookup, &plan)
    })
    .await??;

    overview
        .map(Json)
        .ok_or_else(|| HubError::NotFound(format!("unknown symbol: {symbol}")))
}
