use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use super::snapshot::{Snapshot, minute_key};

/// Coverage bitmap for one symbol across the global window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolFrameQuality {
    pub symbol: String,
    pub quality: Vec<u8>,
}

/// Payload of a `timeframe` reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeframeResponse {
    pub start: String,
    pub end: String,
    pub resolution_label: String,
    pub frame_quality: Vec<SymbolFrameQuality>,
}

/// Coverage bucket width in minutes (and its label) for a window span.
pub fn coverage_resolution(total_minutes: i64) -> (i64, &'static str) {
    match total_minutes {
        m if m <= 120 => (1, "1m"),
        m if m <= 6 * 60 => (5, "5m"),
        m if m <= 24 * 60 => (10, "10m"),
        m if m <= 7 * 24 * 60 => (60, "1h"),
        _ => (12 * 60, "12h"),
    }
}

/// Upper bound on coverage flags per symbol.
pub const MAX_COVERAGE_BUCKETS: i64 = 50_000;

/// [`coverage_resolution`], widened when the tiered step would still exceed
/// [`MAX_COVERAGE_BUCKETS`].
fn bounded_resolution(total_minutes: i64) -> (i64, String) {
    let (resolution, label) = coverage_resolution(total_minutes);
    if total_minutes / resolution < MAX_COVERAGE_BUCKETS {
        return (resolution, label.to_string());
    }
    let steps = MAX_COVERAGE_BUCKETS - 1;
    let widened = total_minutes / steps + i64::from(total_minutes % steps != 0);
    let label = if widened % 60 == 0 {
        format!("{}h", widened / 60)
    } else {
        format!("{widened}m")
    };
    (widened, label)
}

pub(crate) fn rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn rfc3339_ms(ts_ms: i64) -> String {
    DateTime::from_timestamp_millis(ts_ms)
        .map(rfc3339)
        .unwrap_or_default()
}

impl Snapshot {
    /// Coverage view over the whole window; `now` stands in for both edges
    /// when nothing has been ingested.
    pub fn timeframe(&self, now: DateTime<Utc>) -> TimeframeResponse {
        let Some(window) = self.window().filter(|_| !self.is_empty()) else {
            let now = rfc3339(now);
            return TimeframeResponse {
                start: now.clone(),
                end: now,
                resolution_label: "1m".to_string(),
                frame_quality: Vec::new(),
            };
        };

        let start_minute = minute_key(window.start_ms);
        let total_minutes = (minute_key(window.end_ms) - start_minute).max(0);
        let (resolution, label) = bounded_resolution(total_minutes);
        let bucket_count = (total_minutes / resolution + 1) as usize;

        let mut ranked: Vec<(&String, usize)> = self
            .all_series()
            .map(|(symbol, series)| (symbol, series.len()))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        let frame_quality = ranked
            .into_iter()
            .map(|(symbol, _)| {
                let mut flags = vec![0u8; bucket_count];
                if let Some(series) = self.series(symbol) {
                    for &minute in series.keys() {
                        let index = (minute - start_minute) / resolution;
                        if (0..bucket_count as i64).contains(&index) {
                            flags[index as usize] = 1;
                        }
                    }
                }
                SymbolFrameQuality {
                    symbol: symbol.clone(),
                    quality: flags,
                }
            })
            .collect();

        TimeframeResponse {
            start: rfc3339_ms(window.start_ms),
            end: rfc3339_ms(window.end_ms),
            resolution_label: label,
            frame_quality,
        }
    }
}
