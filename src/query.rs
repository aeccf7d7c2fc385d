//! Time-window and resolution parameters shared by the WS and HTTP surfaces.

use chrono::{DateTime, Duration, DurationRound, NaiveDateTime, Utc};

use crate::error::HubError;
use crate::ingest::format::SECONDS_CUTOFF;
use crate::store::overview::DEFAULT_RESOLUTION_SECONDS;

/// Window used when the client omits `start`.
const DEFAULT_LOOKBACK_MINUTES: i64 = 60;

/// Accepts an epoch integer (ms above 10^10, else seconds), RFC 3339, or
/// `YYYY-MM-DD HH:MM:SS` in UTC.
pub fn parse_datetime(raw: &str) -> Result<DateTime<Utc>, HubError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(HubError::BadRequest("invalid datetime".to_string()));
    }

    if let Ok(ts) = raw.parse::<i64>() {
        let parsed = if ts > SECONDS_CUTOFF {
            DateTime::from_timestamp_millis(ts)
        } else {
            DateTime::from_timestamp(ts, 0)
        };
        return parsed.ok_or_else(|| HubError::BadRequest("datetime out of range".to_string()));
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(parsed.and_utc());
    }

    Err(HubError::BadRequest("invalid datetime format".to_string()))
}

/// Resolve an optional `[start, end]` pair against `now`.
///
/// Missing `end` is `now` truncated to the minute; missing `start` is an
/// hour before that.
pub fn parse_start_end(
    start: Option<&str>,
    end: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(DateTime<Utc>, DateTime<Utc>), HubError> {
    let now = now.duration_trunc(Duration::minutes(1)).unwrap_or(now);

    let start = match start.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => parse_datetime(raw)?,
        None => now - Duration::minutes(DEFAULT_LOOKBACK_MINUTES),
    };
    let end = match end.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => parse_datetime(raw)?,
        None => now,
    };

    if end < start {
        return Err(HubError::BadRequest("end must be after start".to_string()));
    }
    Ok((start, end))
}

/// `0` (or absent) selects the default; negative values are rejected.
pub fn parse_resolution(seconds: i64) -> Result<i64, HubError> {
    match seconds {
        0 => Ok(DEFAULT_RESOLUTION_SECONDS),
        s if s < 0 => Err(HubError::BadRequest(
            "resolution must be a positive integer in seconds".to_string(),
        )),
        s => Ok(s),
    }
}
