use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::HubError;

use super::snapshot::Snapshot;

pub const DEFAULT_RESOLUTION_SECONDS: i64 = 300;
/// Upper bound on buckets per overview, so one request cannot allocate unbounded memory.
pub const MAX_OVERVIEW_BUCKETS: i64 = 1_000_000;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Payload of a `price_overview` reply: one entry per bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceOverview {
    pub resolution_label: String,
    pub prices: Vec<Option<f64>>,
    /// Bucket start (inclusive), `YYYY-MM-DD HH:MM:SS` UTC.
    pub datetimes: Vec<String>,
}

/// Bucket layout for `[start, end]` at `resolution_seconds`, validated once per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketPlan {
    pub start_s: i64,
    pub end_s: i64,
    pub resolution_seconds: i64,
    pub buckets: i64,
}

impl BucketPlan {
    /// `end` before `start` collapses to a single bucket; a non-positive
    /// resolution falls back to the default.
    pub fn new(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        resolution_seconds: i64,
    ) -> Result<Self, HubError> {
        let start_s = start.timestamp();
        let end_s = end.timestamp().max(start_s);
        let resolution_seconds = if resolution_seconds <= 0 {
            DEFAULT_RESOLUTION_SECONDS
        } else {
            resolution_seconds
        };
        let buckets = (end_s - start_s) / resolution_seconds + 1;
        if buckets > MAX_OVERVIEW_BUCKETS {
            return Err(HubError::BadRequest(format!(
                "too many buckets ({buckets}); raise the resolution"
            )));
        }
        Ok(Self {
            start_s,
            end_s,
            resolution_seconds,
            buckets,
        })
    }

    /// Inclusive `[start, end]` seconds of bucket `i`.
    pub fn bucket_bounds(&self, i: i64) -> (i64, i64) {
        let start = self.start_s + i * self.resolution_seconds;
        let end = start
            .saturating_add(self.resolution_seconds - 1)
            .min(self.end_s);
        (start, end)
    }

    pub fn label(&self) -> String {
        format!("{}s", self.resolution_seconds)
    }
}

fn format_bucket_start(ts_s: i64) -> Result<String, HubError> {
    DateTime::from_timestamp(ts_s, 0)
        .map(|dt| dt.format(DATETIME_FORMAT).to_string())
        .ok_or_else(|| HubError::BadRequest(format!("timestamp out of range: {ts_s}")))
}

impl Snapshot {
    /// Latest price per bucket, `None` when the symbol has no points at all.
    ///
    /// Sub-minute buckets read exactly the minute holding the bucket end;
    /// wider buckets take the latest covered minute inside the bucket.
    pub fn price_overview(
        &self,
        symbol: &str,
        plan: &BucketPlan,
    ) -> Result<Option<PriceOverview>, HubError> {
        let Some(series) = self.series(symbol).filter(|s| !s.is_empty()) else {
            return Ok(None);
        };

        let capacity = plan.buckets as usize;
        let mut prices = Vec::with_capacity(capacity);
        let mut datetimes = Vec::with_capacity(capacity);

        for i in 0..plan.buckets {
            let (bucket_start, bucket_end) = plan.bucket_bounds(i);
            datetimes.push(format_bucket_start(bucket_start)?);

            let last_minute = bucket_end.div_euclid(60);
            let latest = if plan.resolution_seconds < 60 {
                series.get(&last_minute)
            } else {
                let first_minute = bucket_start.div_euclid(60);
                series
                    .range(first_minute..=last_minute)
                    .next_back()
                    .map(|(_, p)| p)
            };
            prices.push(latest.map(|p| p.price));
        }

        Ok(Some(PriceOverview {
            resolution_label: plan.label(),
            prices,
            datetimes,
        }))
    }
}
