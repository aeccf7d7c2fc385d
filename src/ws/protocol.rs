//! Wire types for the multiplexed request/response channel.

use serde::{Deserialize, Deserializer, Serialize, de};
use serde_json::Value;

use crate::error::HubError;
use crate::session::SessionState;

/// One client request. Fields beyond `type`/`request_id` are per-type.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WsRequest {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub symbols: Vec<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub start: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub end: Option<String>,
    #[serde(default)]
    pub range_start: i64,
    #[serde(default)]
    pub range_end: i64,
    #[serde(default)]
    pub compute_mode: Option<bool>,
    #[serde(default)]
    pub resolution: i64,
    #[serde(default)]
    pub ticks: i64,
    #[serde(default)]
    pub state: Option<SessionState>,
}

/// Time fields arrive either as strings or as bare epoch integers.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(de::Error::custom(format!("expected a time value, got {other}"))),
    }
}

/// Exactly one of these is written per request, echoing its `request_id`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WsResponse {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl WsResponse {
    pub fn ok(msg_type: &str, request_id: &str, data: Option<Value>) -> Self {
        Self {
            msg_type: msg_type.to_string(),
            request_id: request_id.to_string(),
            data,
            message: None,
        }
    }

    pub fn error(request_id: &str, err: &HubError) -> Self {
        Self {
            msg_type: "error".to_string(),
            request_id: request_id.to_string(),
            data: None,
            message: Some(err.message().to_string()),
        }
    }

    pub fn to_json(&self) -> String {
        // A struct of strings and `Value`s always serializes.
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"error"}"#.to_string())
    }
}

/// Decode a frame; on failure, salvage the `request_id` so the error still correlates.
pub fn decode_request(text: &str) -> Result<WsRequest, (String, HubError)> {
    serde_json::from_str::<WsRequest>(text).map_err(|e| {
        let request_id = serde_json::from_str::<Value>(text)
            .ok()
            .and_then(|v| v.get("request_id").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_default();
        (request_id, HubError::BadRequest(format!("invalid request: {e}")))
    })
}
