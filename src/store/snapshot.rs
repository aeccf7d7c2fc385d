use std::collections::{BTreeMap, HashMap};

use crate::ingest::{ScanStats, TickPoint};

const MS_PER_MINUTE: i64 = 60_000;

/// Epoch-minute index of a millisecond timestamp.
pub fn minute_key(timestamp_ms: i64) -> i64 {
    timestamp_ms.div_euclid(MS_PER_MINUTE)
}

/// Latest observation kept for one symbol/minute.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinutePrice {
    pub timestamp_ms: i64,
    pub price: f64,
}

impl MinutePrice {
    /// Larger timestamp wins; an exact tie goes to the larger price so the
    /// outcome never depends on scan order.
    fn supersedes(&self, other: &MinutePrice) -> bool {
        match self.timestamp_ms.cmp(&other.timestamp_ms) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => self.price.total_cmp(&other.price).is_gt(),
        }
    }
}

/// `[min, max]` timestamp over every accepted tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalWindow {
    pub start_ms: i64,
    pub end_ms: i64,
}

/// Per-symbol minute series. Its key set is the coverage index, its values
/// the price index.
pub type MinuteSeries = BTreeMap<i64, MinutePrice>;

/// Immutable index produced by one scan pass.
#[derive(Debug, Default)]
pub struct Snapshot {
    generation: u64,
    window: Option<GlobalWindow>,
    series: HashMap<String, MinuteSeries>,
    stats: ScanStats,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    /// 0 for the initial empty snapshot, then strictly increasing per swap.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn window(&self) -> Option<GlobalWindow> {
        self.window
    }

    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn symbol_count(&self) -> usize {
        self.series.len()
    }

    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.series.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    pub fn series(&self, symbol: &str) -> Option<&MinuteSeries> {
        self.series.get(symbol)
    }

    pub(crate) fn all_series(&self) -> impl Iterator<Item = (&String, &MinuteSeries)> {
        self.series.iter()
    }

    #[cfg(test)]
    pub(crate) fn has_minute(&self, symbol: &str, minute: i64) -> bool {
        self.series
            .get(symbol)
            .is_some_and(|s| s.contains_key(&minute))
    }

    #[cfg(test)]
    pub(crate) fn price_at(&self, symbol: &str, minute: i64) -> Option<MinutePrice> {
        self.series.get(symbol).and_then(|s| s.get(&minute)).copied()
    }
}

/// Accumulates ticks for a replacement snapshot without touching the live one.
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    window: Option<GlobalWindow>,
    series: HashMap<String, MinuteSeries>,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, tick: TickPoint<'_>) {
        let ts = tick.timestamp_ms;
        self.window = Some(match self.window {
            None => GlobalWindow {
                start_ms: ts,
                end_ms: ts,
            },
            Some(w) => GlobalWindow {
                start_ms: w.start_ms.min(ts),
                end_ms: w.end_ms.max(ts),
            },
        });

        let candidate = MinutePrice {
            timestamp_ms: ts,
            price: tick.price,
        };
        if !self.series.contains_key(tick.symbol) {
            self.series
                .insert(tick.symbol.to_string(), MinuteSeries::new());
        }
        let Some(series) = self.series.get_mut(tick.symbol) else {
            return;
        };
        series
            .entry(minute_key(ts))
            .and_modify(|current| {
                if candidate.supersedes(current) {
                    *current = candidate;
                }
            })
            .or_insert(candidate);
    }

    pub fn finish(self, generation: u64, stats: ScanStats) -> Snapshot {
        Snapshot {
            generation,
            window: self.window,
            series: self.series,
            stats,
        }
    }
}
