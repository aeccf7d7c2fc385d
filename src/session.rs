use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Longest identity token accepted from a client.
const MAX_SESSION_ID_LEN: usize = 128;

/// Interactive chart state held per client identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// Identity token this state is stored under; set by the server on every write.
    #[serde(default, skip_deserializing, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default)]
    pub compute_mode: bool,
    #[serde(default)]
    pub range_start: i64,
    #[serde(default)]
    pub range_end: i64,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub markers: HashMap<String, i64>,
    #[serde(default)]
    pub ticks_requested: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_symbol: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub range_start_time: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub range_end_time: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resolution: String,
    #[serde(default)]
    pub custom_resolution_seconds: i64,
    /// Server-stamped on every write; ignored when sent by a client.
    #[serde(default, skip_deserializing)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Session table keyed by opaque identity token. Last writer wins.
#[derive(Default)]
pub struct SessionManager {
    sessions: RwLock<HashMap<String, SessionState>>,
}

/// Fresh random identity token (32 hex chars).
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Tokens are echoed into a cookie, so keep them to a safe alphabet.
pub fn is_valid_session_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_SESSION_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reuse a presented token when well-formed, otherwise mint one.
    /// The flag is `true` when the id is new and must be sent back.
    pub fn resolve_id(&self, presented: Option<&str>) -> (String, bool) {
        match presented.map(str::trim) {
            Some(id) if is_valid_session_id(id) => (id.to_string(), false),
            _ => (new_session_id(), true),
        }
    }

    pub fn get(&self, id: &str) -> Option<SessionState> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Full client-driven overwrite.
    pub fn replace(&self, id: &str, mut state: SessionState) {
        state.id = id.to_string();
        state.updated_at = Some(Utc::now());
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string(), state);
    }

    /// Partial update of the selected range; creates the session if absent.
    pub fn update_range(
        &self,
        id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        range_start: i64,
        range_end: i64,
        compute_mode: Option<bool>,
    ) {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let state = sessions.entry(id.to_string()).or_default();
        state.id = id.to_string();
        state.range_start = range_start;
        state.range_end = range_end;
        state.range_start_time = start.to_rfc3339_opts(SecondsFormat::Nanos, true);
        state.range_end_time = end.to_rfc3339_opts(SecondsFormat::Nanos, true);
        if let Some(mode) = compute_mode {
            state.compute_mode = mode;
        }
        state.updated_at = Some(Utc::now());
    }

    /// Remember the tick budget and derived resolution of the last
    /// increase-resolution request.
    pub fn record_resolution(&self, id: &str, ticks: i64, resolution_seconds: i64) {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let state = sessions.entry(id.to_string()).or_default();
        state.id = id.to_string();
        state.ticks_requested = ticks;
        state.custom_resolution_seconds = resolution_seconds;
        state.updated_at = Some(Utc::now());
    }

    /// Store and return the zero state.
    pub fn reset(&self, id: &str) -> SessionState {
        let state = SessionState {
            id: id.to_string(),
            updated_at: Some(Utc::now()),
            ..Default::default()
        };
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string(), state.clone());
        state
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_id_reuses_valid_tokens_only() {
        let mgr = SessionManager::new();

        assert_eq!(mgr.resolve_id(Some("abc-123_X")), ("abc-123_X".to_string(), false));

        let (fresh, created) = mgr.resolve_id(None);
        assert!(created);
        assert_eq!(fresh.len(), 32);
        assert!(is_valid_session_id(&fresh));

        assert!(mgr.resolve_id(Some("")).1);
        assert!(mgr.resolve_id(Some("a;b=c")).1);
        assert!(mgr.resolve_id(Some(&"x".repeat(129))).1);
    }

    #[test]
    fn get_is_none_until_written() {
        let mgr = SessionManager::new();
        assert!(mgr.get("s1").is_none());

        mgr.replace(
            "s1",
            SessionState {
                last_symbol: "PETR4".to_string(),
                ..Default::default()
            },
        );

        let state = mgr.get("s1").unwrap();
        assert_eq!(state.last_symbol, "PETR4");
        assert!(state.updated_at.is_some());
        assert!(mgr.get("s2").is_none());
    }

    #[test]
    fn update_range_keeps_other_fields() {
        let mgr = SessionManager::new();
        let mut markers = HashMap::new();
        markers.insert("PETR4".to_string(), 7);
        mgr.replace(
            "s1",
            SessionState {
                markers,
                compute_mode: true,
                ..Default::default()
            },
        );

        let start = DateTime::from_timestamp(1_709_632_800, 0).unwrap();
        let end = DateTime::from_timestamp(1_709_636_400, 0).unwrap();
        mgr.update_range("s1", start, end, 3, 9, None);

        let state = mgr.get("s1").unwrap();
        assert_eq!((state.range_start, state.range_end), (3, 9));
        assert_eq!(state.range_start_time, "2024-03-05T10:00:00.000000000Z");
        assert_eq!(state.range_end_time, "2024-03-05T11:00:00.000000000Z");
        assert!(state.compute_mode);
        assert_eq!(state.markers.get("PETR4"), Some(&7));

        mgr.update_range("s1", start, end, 0, 1, Some(false));
        assert!(!mgr.get("s1").unwrap().compute_mode);
    }

    #[test]
    fn reset_stores_zero_state() {
        let mgr = SessionManager::new();
        mgr.record_resolution("s1", 500, 12);

        let state = mgr.reset("s1");

        assert_eq!(state.ticks_requested, 0);
        assert_eq!(state.custom_resolution_seconds, 0);
        assert_eq!(mgr.get("s1").unwrap(), state);
        assert_eq!(mgr.len(), 1);
    }

    #[test]
    fn every_write_stamps_the_session_id() {
        let mgr = SessionManager::new();
        let start = DateTime::from_timestamp(1_709_632_800, 0).unwrap();

        mgr.update_range("a", start, start, 0, 0, None);
        mgr.record_resolution("b", 10, 60);
        mgr.replace("c", serde_json::from_str(r#"{"id":"spoofed","range_end":4}"#).unwrap());

        assert_eq!(mgr.get("a").unwrap().id, "a");
        assert_eq!(mgr.get("b").unwrap().id, "b");
        assert_eq!(mgr.get("c").unwrap().id, "c");
        assert_eq!(mgr.reset("c").id, "c");

        let json = serde_json::to_value(mgr.get("a").unwrap()).unwrap();
        assert_eq!(json["id"], "a");
    }

    #[test]
    fn client_supplied_updated_at_is_ignored() {
        let state: SessionState = serde_json::from_str(
            r#"{"range_start":1,"updated_at":"2020-01-01T00:00:00Z","markers":{"A":2}}"#,
        )
        .unwrap();
        assert_eq!(state.range_start, 1);
        assert_eq!(state.markers.get("A"), Some(&2));
        assert!(state.updated_at.is_none());
    }
}
