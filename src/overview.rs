//! Multi-symbol overview orchestration on top of the store.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

use crate::cache::TimeframeCache;
use crate::error::HubError;
use crate::store::{BucketPlan, PriceOverview, Snapshot, TimeSeriesStore};

/// Resolution used when a tick budget cannot be turned into a step.
pub const FALLBACK_RESOLUTION_SECONDS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverviewItem {
    pub symbol: String,
    /// `null` when the symbol has no data.
    pub data: Option<PriceOverview>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncreaseResolution {
    pub resolution_seconds: i64,
    pub items: Vec<OverviewItem>,
}

/// Smallest step that fits `[start, end]` into `ticks` samples:
/// `ceil(window / (ticks - 1))`, at least one second.
pub fn resolution_for_ticks(start: DateTime<Utc>, end: DateTime<Utc>, ticks: i64) -> i64 {
    if ticks <= 1 {
        return FALLBACK_RESOLUTION_SECONDS;
    }
    let total_seconds = (end - start).num_seconds();
    if total_seconds <= 0 {
        return FALLBACK_RESOLUTION_SECONDS;
    }
    let steps = ticks - 1;
    let seconds = total_seconds / steps + i64::from(total_seconds % steps != 0);
    seconds.max(1)
}

/// Trimmed, non-blank symbols in request order.
fn clean_symbols(symbols: &[String]) -> impl Iterator<Item = &str> {
    symbols.iter().map(|s| s.trim()).filter(|s| !s.is_empty())
}

/// One overview per symbol, all from the same snapshot.
///
/// Unknown symbols become `{symbol, data: null}` and never fail their
/// siblings; only request-level problems fail the whole batch.
pub fn build_batch(
    snapshot: &Snapshot,
    symbols: &[String],
    plan: &BucketPlan,
) -> Result<Vec<OverviewItem>, HubError> {
    clean_symbols(symbols)
        .map(|symbol| -> Result<OverviewItem, HubError> {
            Ok(OverviewItem {
                symbol: symbol.to_string(),
                data: snapshot.price_overview(symbol, plan)?,
            })
        })
        .collect()
}

/// Reload `[start, end]` from disk, then answer at the resolution implied by
/// the tick budget. An empty symbol list means every known symbol.
pub fn increase_resolution(
    store: &TimeSeriesStore,
    cache: &TimeframeCache,
    roots: &[PathBuf],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    ticks: i64,
    symbols: &[String],
) -> Result<IncreaseResolution, HubError> {
    let resolution_seconds = resolution_for_ticks(start, end, ticks);
    let plan = BucketPlan::new(start, end, resolution_seconds)?;

    store.load_range(roots, start, end)?;
    cache.reset();

    let snapshot = store.snapshot();
    let requested: Vec<String> = if clean_symbols(symbols).next().is_none() {
        snapshot.symbols()
    } else {
        symbols.to_vec()
    };

    Ok(IncreaseResolution {
        resolution_seconds,
        items: build_batch(&snapshot, &requested, &plan)?,
    })
}
