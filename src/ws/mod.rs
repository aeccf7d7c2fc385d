pub mod dispatch;
pub mod protocol;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures::SinkExt;
use futures::stream::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::Instrument;

use crate::error::HubError;
use crate::state::AppState;

use protocol::{WsResponse, decode_request};

/// WebSocket upgrade handler.
///
/// Rejects foreign origins, then resolves the client identity from the
/// session cookie (or `?session=`) and mints one when absent.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if let Some(origin) = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok()) {
        if !state.config.origin_allowed(origin) {
            tracing::warn!(origin, "ws upgrade rejected");
            return (StatusCode::FORBIDDEN, "origin not allowed").into_response();
        }
    }

    let presented = cookie_value(&headers, &state.config.session_cookie)
        .or_else(|| params.get("session").cloned());
    let (session_id, created) = state.sessions.resolve_id(presented.as_deref());
    let set_cookie = created.then(|| session_cookie(&state.config.session_cookie, &session_id));

    let mut response = ws.on_upgrade(move |socket| handle_socket(socket, state, session_id));
    if let Some(cookie) = set_cookie.and_then(|c| HeaderValue::from_str(&c).ok()) {
        response.headers_mut().insert(header::SET_COOKIE, cookie);
    }
    response
}

/// First value of cookie `name` in the request's `Cookie` headers.
fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
}

fn session_cookie(name: &str, id: &str) -> String {
    format!("{name}={id}; Path=/; HttpOnly; SameSite=Lax")
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, session_id: String) {
    let span = tracing::info_span!("ws", session_id = %session_id);
    serve_connection(socket, state, session_id).instrument(span).await;
}

/// One request at a time: read, dispatch, write, repeat. Responses therefore
/// leave in request order.
async fn serve_connection(socket: WebSocket, state: Arc<AppState>, session_id: String) {
    let (mut sender, mut receiver) = socket.split();
    tracing::debug!("ws connected");

    while let Some(frame) = receiver.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text.as_str().to_owned(),
            Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => text.to_owned(),
                Err(_) => {
                    let err = HubError::BadRequest("invalid request: binary frame is not UTF-8".into());
                    if send(&mut sender, &WsResponse::error("", &err)).await.is_err() {
                        break;
                    }
                    continue;
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!("ws read error: {e}");
                break;
            }
        };

        let response = match decode_request(&text) {
            Ok(req) => dispatch::dispatch(&state, &session_id, req).await,
            Err((request_id, err)) => WsResponse::error(&request_id, &err),
        };

        if let Err(e) = send(&mut sender, &response).await {
            tracing::debug!("ws write error: {e}");
            break;
        }
    }

    tracing::debug!("ws closed");
}

async fn send<S>(sender: &mut S, response: &WsResponse) -> Result<(), axum::Error>
where
    S: futures::Sink<Message, Error = axum::Error> + Unpin,
{
    sender.send(Message::Text(response.to_json().into())).await
}
