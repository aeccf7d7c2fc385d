//! Market view hub: serves an in-memory index of uploaded tick files to
//! chart clients over a multiplexed WebSocket and a small read-only HTTP API.

pub mod cache;
pub mod config;
pub mod error;
pub mod ingest;
pub mod overview;
pub mod query;
pub mod reload;
pub mod routes;
pub mod session;
pub mod state;
pub mod store;
pub mod ws;

use axum::Router;
use axum::http::{HeaderValue, Method, header, request::Parts};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use state::AppState;

/// Full application router: HTTP API, `/ws`, CORS and request tracing.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(routes::api_router())
        .route("/ws", axum::routing::get(ws::ws_handler))
        .layer(cors_layer(&state))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(state: &AppState) -> CorsLayer {
    let config = state.config.clone();
    let allow_origin = AllowOrigin::predicate(move |origin: &HeaderValue, _: &Parts| {
        origin
            .to_str()
            .map(|o| config.origin_allowed(o))
            .unwrap_or(false)
    });

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}
