use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::error::HubError;
use crate::overview;
use crate::query::{parse_resolution, parse_start_end};
use crate::state::AppState;
use crate::store::BucketPlan;

use super::protocol::{WsRequest, WsResponse};

/// Answer one request. Always yields exactly one response with the same id.
pub async fn dispatch(state: &Arc<AppState>, session_id: &str, req: WsRequest) -> WsResponse {
    let kind = req.msg_type.trim().to_string();
    tracing::debug!(request_type = %kind, request_id = %req.request_id, "ws request");

    let result = match kind.as_str() {
        "timeframe" => timeframe(state).await,
        "price_overview" => price_overview(state, &req).await,
        "price_overview_batch" => price_overview_batch(state, &req).await,
        "state_get" => match state.sessions.get(session_id) {
            Some(session) => encode(&session),
            None => Ok(None),
        },
        "state_update" => match req.state.clone() {
            Some(session) => {
                state.sessions.replace(session_id, session);
                status_ok()
            }
            None => Err(HubError::BadRequest("missing state".to_string())),
        },
        "range_selection" => range_selection(state, session_id, &req),
        "state_reset" => encode(&state.sessions.reset(session_id)),
        "compute_mode" => compute_mode(state, &req).await,
        "increase_resolution" => increase_resolution(state, session_id, &req).await,
        _ => Err(HubError::BadRequest("unknown message type".to_string())),
    };

    match result {
        Ok(data) => {
            let reply_type = if kind == "state_get" { "state" } else { kind.as_str() };
            WsResponse::ok(reply_type, &req.request_id, data)
        }
        Err(e) => {
            tracing::debug!(request_type = %kind, "ws request failed: {e}");
            WsResponse::error(&req.request_id, &e)
        }
    }
}

type Reply = Result<Option<Value>, HubError>;

fn encode<T: Serialize>(value: &T) -> Reply {
    Ok(Some(serde_json::to_value(value)?))
}

fn status_ok() -> Reply {
    Ok(Some(json!({ "status": "ok" })))
}

/// Shared `start`/`end`/`resolution` validation, done before touching the store.
fn plan_for(req: &WsRequest) -> Result<BucketPlan, HubError> {
    let (start, end) = parse_start_end(req.start.as_deref(), req.end.as_deref(), chrono::Utc::now())?;
    let resolution = parse_resolution(req.resolution)?;
    BucketPlan::new(start, end, resolution)
}

/// Run store work on the blocking pool.
async fn blocking<T, F>(state: &Arc<AppState>, work: F) -> Result<T, HubError>
where
    T: Send + 'static,
    F: FnOnce(&AppState) -> Result<T, HubError> + Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || work(&state)).await?
}

/// A cache miss rebuilds under the cache's write lock, so keep it off the runtime threads.
async fn timeframe(state: &Arc<AppState>) -> Reply {
    let view = blocking(state, |s| Ok(s.timeframe())).await?;
    encode(view.as_ref())
}

async fn price_overview(state: &Arc<AppState>, req: &WsRequest) -> Reply {
    let symbol = req
        .symbol
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HubError::BadRequest("missing symbol".to_string()))?
        .to_string();
    let plan = plan_for(req)?;

    let overview = blocking(state, move |s| s.store.snapshot().price_overview(&symbol, &plan)).await?;
    match overview {
        Some(data) => encode(&data),
        None => Ok(None),
    }
}

async fn price_overview_batch(state: &Arc<AppState>, req: &WsRequest) -> Reply {
    let plan = plan_for(req)?;
    let symbols = req.symbols.clone();

    let items = blocking(state, move |s| {
        overview::build_batch(&s.store.snapshot(), &symbols, &plan)
    })
    .await?;
    encode(&items)
}

fn range_selection(state: &Arc<AppState>, session_id: &str, req: &WsRequest) -> Reply {
    let (start, end) = parse_start_end(req.start.as_deref(), req.end.as_deref(), chrono::Utc::now())?;
    state.sessions.update_range(
        session_id,
        start,
        end,
        req.range_start,
        req.range_end,
        req.compute_mode,
    );
    status_ok()
}

async fn compute_mode(state: &Arc<AppState>, req: &WsRequest) -> Reply {
    let (start, end) = parse_start_end(req.start.as_deref(), req.end.as_deref(), chrono::Utc::now())?;

    blocking(state, move |s| {
        s.store
            .load_range(&s.config.data_dirs, start, end)
            .map_err(load_failed)?;
        s.timeframe_cache.reset();
        Ok(())
    })
    .await?;
    status_ok()
}

async fn increase_resolution(state: &Arc<AppState>, session_id: &str, req: &WsRequest) -> Reply {
    let (start, end) = parse_start_end(req.start.as_deref(), req.end.as_deref(), chrono::Utc::now())?;
    let ticks = if req.ticks <= 0 {
        i64::from(state.config.default_resolution_ticks)
    } else {
        req.ticks
    };
    let symbols = req.symbols.clone();

    let reply = blocking(state, move |s| {
        overview::increase_resolution(
            &s.store,
            &s.timeframe_cache,
            &s.config.data_dirs,
            start,
            end,
            ticks,
            &symbols,
        )
        .map_err(load_failed)
    })
    .await?;

    state
        .sessions
        .record_resolution(session_id, ticks, reply.resolution_seconds);
    encode(&reply)
}

/// Validation errors pass through; scan failures are reported generically.
fn load_failed(e: HubError) -> HubError {
    match e {
        HubError::BadRequest(_) => e,
        other => {
            tracing::warn!("range load failed: {other}");
            HubError::Internal("could not load range".to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HubConfig;
    use std::fs;
    use std::path::Path;

    const BASE_S: i64 = 1_709_632_800; // 2024-03-05 10:00:00

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    fn loaded_state(root: &Path) -> Arc<AppState> {
        let state = AppState::new(HubConfig {
            data_dirs: vec![root.to_path_buf()],
            ..Default::default()
        });
        state.store.load(&state.config.data_dirs).unwrap();
        state
    }

    fn request(value: Value) -> WsRequest {
        serde_json::from_value(value).unwrap()
    }

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "2024-03-05/AAA/10_00.csv",
            &format!("t,p\n{},100.0\n{},101.5\n", BASE_S + 10, BASE_S + 125),
        );
        write(
            dir.path(),
            "2024-03-05/BBB/10_00.csv",
            &format!("t,p\n{},7\n", BASE_S),
        );
        dir
    }

    #[tokio::test]
    async fn price_overview_fills_gaps_with_null() {
        let dir = fixture();
        let state = loaded_state(dir.path());

        let req = request(json!({
            "type": "price_overview", "request_id": "r1", "symbol": "AAA",
            "start": BASE_S.to_string(), "end": (BASE_S + 179).to_string(), "resolution": 60,
        }));
        let resp = dispatch(&state, "s1", req).await;

        assert_eq!(resp.msg_type, "price_overview");
        assert_eq!(resp.request_id, "r1");
        let data = resp.data.unwrap();
        assert_eq!(data["prices"], json!([100.0, null, 101.5]));
        assert_eq!(data["resolution_label"], "60s");
        assert_eq!(data["datetimes"][0], "2024-03-05 10:00:00");
    }

    #[tokio::test]
    async fn price_overview_validates_input() {
        let dir = fixture();
        let state = loaded_state(dir.path());

        let resp = dispatch(&state, "s1", request(json!({"type": "price_overview", "request_id": "a"}))).await;
        assert_eq!(resp.msg_type, "error");
        assert_eq!(resp.message.as_deref(), Some("missing symbol"));

        let resp = dispatch(
            &state,
            "s1",
            request(json!({
                "type": "price_overview", "request_id": "b", "symbol": "AAA",
                "start": "2024-03-05T11:00:00Z", "end": "2024-03-05T10:00:00Z",
            })),
        )
        .await;
        assert_eq!(resp.request_id, "b");
        assert_eq!(resp.message.as_deref(), Some("end must be after start"));

        let resp = dispatch(
            &state,
            "s1",
            request(json!({"type": "price_overview", "request_id": "c", "symbol": "ZZZ"})),
        )
        .await;
        assert_eq!(resp.msg_type, "price_overview");
        assert!(resp.data.is_none());
    }

    #[tokio::test]
    async fn batch_returns_null_for_unknown_symbol() {
        let dir = fixture();
        let state = loaded_state(dir.path());

        let req = request(json!({
            "type": "price_overview_batch", "request_id": "r2",
            "symbols": ["AAA", "NOPE", "BBB"],
            "start": BASE_S.to_string(), "end": (BASE_S + 59).to_string(), "resolution": 60,
        }));
        let resp = dispatch(&state, "s1", req).await;

        assert_eq!(resp.msg_type, "price_overview_batch");
        let data = resp.data.unwrap();
        assert_eq!(data[0]["symbol"], "AAA");
        assert_eq!(data[0]["data"]["prices"], json!([100.0]));
        assert_eq!(data[1], json!({"symbol": "NOPE", "data": null}));
        assert_eq!(data[2]["data"]["prices"], json!([7.0]));
    }

    #[tokio::test]
    async fn session_requests_round_trip() {
        let state = AppState::new(HubConfig::default());

        let resp = dispatch(&state, "s1", request(json!({"type": "state_get", "request_id": "1"}))).await;
        assert_eq!(resp.msg_type, "state");
        assert!(resp.data.is_none());

        let resp = dispatch(&state, "s1", request(json!({"type": "state_update", "request_id": "2"}))).await;
        assert_eq!(resp.message.as_deref(), Some("missing state"));

        let resp = dispatch(
            &state,
            "s1",
            request(json!({
                "type": "state_update", "request_id": "3",
                "state": {"compute_mode": true, "last_symbol": "AAA", "markers": {"AAA": 4}},
            })),
        )
        .await;
        assert_eq!(resp.data, Some(json!({"status": "ok"})));

        let resp = dispatch(&state, "s1", request(json!({"type": "state_get", "request_id": "4"}))).await;
        let data = resp.data.unwrap();
        assert_eq!(data["last_symbol"], "AAA");
        assert_eq!(data["markers"]["AAA"], 4);
        assert_eq!(data["compute_mode"], true);

        let resp = dispatch(
            &state,
            "s1",
            request(json!({
                "type": "range_selection", "request_id": "5",
                "start": "2024-03-05T10:00:00Z", "end": "2024-03-05T11:00:00Z",
                "range_start": 3, "range_end": 9, "compute_mode": false,
            })),
        )
        .await;
        assert_eq!(resp.msg_type, "range_selection");
        let session = state.sessions.get("s1").unwrap();
        assert_eq!((session.range_start, session.range_end), (3, 9));
        assert!(!session.compute_mode);
        assert_eq!(session.last_symbol, "AAA");

        let resp = dispatch(&state, "s1", request(json!({"type": "state_reset", "request_id": "6"}))).await;
        assert_eq!(resp.msg_type, "state_reset");
        assert_eq!(resp.data.unwrap()["range_end"], 0);
        assert!(state.sessions.get("s1").unwrap().last_symbol.is_empty());

        // Other sessions are untouched.
        let resp = dispatch(&state, "s2", request(json!({"type": "state_get", "request_id": "7"}))).await;
        assert!(resp.data.is_none());
    }

    #[tokio::test]
    async fn compute_mode_narrows_the_store() {
        let dir = fixture();
        write(
            dir.path(),
            "2024-03-06/CCC/10_00.csv",
            &format!("t,p\n{},1\n", BASE_S + 86_400),
        );
        let state = loaded_state(dir.path());
        assert_eq!(state.store.list_symbols().len(), 3);

        let req = request(json!({
            "type": "compute_mode", "request_id": "c1",
            "start": "2024-03-05T09:00:00Z", "end": "2024-03-05T12:00:00Z",
        }));
        let resp = dispatch(&state, "s1", req).await;

        assert_eq!(resp.data, Some(json!({"status": "ok"})));
        assert_eq!(state.store.list_symbols(), vec!["AAA", "BBB"]);
        assert_eq!(state.timeframe().frame_quality.len(), 2);
    }

    #[tokio::test]
    async fn increase_resolution_records_session() {
        let dir = fixture();
        let state = loaded_state(dir.path());

        let req = request(json!({
            "type": "increase_resolution", "request_id": "i1",
            "start": BASE_S.to_string(), "end": (BASE_S + 180).to_string(),
            "ticks": 4, "symbols": ["AAA"],
        }));
        let resp = dispatch(&state, "s1", req).await;

        assert_eq!(resp.msg_type, "increase_resolution");
        let data = resp.data.unwrap();
        assert_eq!(data["resolution_seconds"], 60);
        assert_eq!(data["items"][0]["symbol"], "AAA");
        assert_eq!(data["items"][0]["data"]["prices"], json!([100.0, null, 101.5, null]));

        let session = state.sessions.get("s1").unwrap();
        assert_eq!(session.ticks_requested, 4);
        assert_eq!(session.custom_resolution_seconds, 60);
    }

    #[tokio::test]
    async fn timeframe_reflects_range_reload() {
        let dir = fixture();
        let state = loaded_state(dir.path());

        let resp = dispatch(&state, "s1", request(json!({"type": "timeframe", "request_id": "t1"}))).await;
        assert_eq!(resp.msg_type, "timeframe");
        let data = resp.data.unwrap();
        assert_eq!(data["resolution_label"], "1m");
        assert_eq!(data["frame_quality"][0]["symbol"], "AAA");
        assert_eq!(data["frame_quality"][0]["quality"], json!([1, 0, 1]));

        let req = request(json!({
            "type": "compute_mode", "request_id": "c1",
            "start": "2024-03-05T11:00:00Z", "end": "2024-03-05T12:00:00Z",
        }));
        dispatch(&state, "s1", req).await;

        let resp = dispatch(&state, "s1", request(json!({"type": "timeframe", "request_id": "t2"}))).await;
        assert_eq!(resp.data.unwrap()["frame_quality"], json!([]));
    }

    #[tokio::test]
    async fn unknown_type_is_an_error_with_the_same_id() {
        let state = AppState::new(HubConfig::default());
        let resp = dispatch(&state, "s1", request(json!({"type": "subscribe", "request_id": "x"}))).await;

        assert_eq!(resp.msg_type, "error");
        assert_eq!(resp.request_id, "x");
        assert_eq!(resp.message.as_deref(), Some("unknown message type"));
    }
}
