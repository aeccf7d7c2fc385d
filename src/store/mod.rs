//! Process-wide time-series index with whole-snapshot swaps.

pub mod overview;
pub mod snapshot;
pub mod timeframe;

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::error::HubError;
use crate::ingest::{ScanFilter, ScanStats, scan_roots};

pub use overview::{BucketPlan, PriceOverview};
pub use snapshot::{GlobalWindow, MinutePrice, Snapshot, SnapshotBuilder};
pub use timeframe::{SymbolFrameQuality, TimeframeResponse};

/// Owner of the live [`Snapshot`].
///
/// Readers clone the current `Arc` under the read lock and work on it without
/// holding the lock. Loads build a complete replacement off to the side and
/// swap it in under the write lock, so no reader ever sees a partial index.
pub struct TimeSeriesStore {
    current: RwLock<Arc<Snapshot>>,
    /// Serializes loads so generations are swapped in the order they were built.
    load_lock: Mutex<()>,
    next_generation: AtomicU64,
}

impl TimeSeriesStore {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(Snapshot::empty())),
            load_lock: Mutex::new(()),
            next_generation: AtomicU64::new(1),
        }
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Full rescan of every root.
    pub fn load(&self, roots: &[PathBuf]) -> Result<ScanStats, HubError> {
        self.rebuild(roots, ScanFilter::All)
    }

    /// Rescan limited to files whose path time lies in `[start, end]`.
    pub fn load_range(
        &self,
        roots: &[PathBuf],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<ScanStats, HubError> {
        self.rebuild(
            roots,
            ScanFilter::Range {
                start_ms: start.timestamp_millis(),
                end_ms: end.timestamp_millis(),
            },
        )
    }

    fn rebuild(&self, roots: &[PathBuf], filter: ScanFilter) -> Result<ScanStats, HubError> {
        let _serial = self.load_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut builder = SnapshotBuilder::new();
        let stats = scan_roots(roots, filter, |tick| builder.push(tick))?;

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let fresh = Arc::new(builder.finish(generation, stats));
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = fresh;

        tracing::info!(
            generation,
            roots = stats.roots,
            files = stats.files,
            files_skipped = stats.files_skipped,
            rows = stats.rows,
            rows_skipped = stats.rows_skipped,
            "tick index swapped"
        );
        Ok(stats)
    }

    pub fn build_timeframe_response(&self) -> TimeframeResponse {
        self.snapshot().timeframe(Utc::now())
    }

    pub fn build_price_overview(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        resolution_seconds: i64,
    ) -> Result<Option<PriceOverview>, HubError> {
        let plan = BucketPlan::new(start, end, resolution_seconds)?;
        self.snapshot().price_overview(symbol, &plan)
    }

    pub fn list_symbols(&self) -> Vec<String> {
        self.snapshot().symbols()
    }
}

impl Default for TimeSeriesStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    const BASE_S: i64 = 1_709_632_800; // 2024-03-05 10:00:00

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    fn at(offset_s: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(BASE_S + offset_s, 0).unwrap()
    }

    /// Two symbols with one flat price across minutes 0..5.
    fn write_flat_tree(root: &Path, price: f64) {
        for symbol in ["AAA", "BBB"] {
            let mut body = String::from("t,p\n");
            for minute in 0..5 {
                body.push_str(&format!("{},{price}\n", BASE_S + minute * 60));
            }
            write(root, &format!("2024-03-05/{symbol}/10_00.csv"), &body);
        }
    }

    #[test]
    fn load_swaps_in_a_new_generation() {
        let dir = tempfile::tempdir().unwrap();
        write_flat_tree(dir.path(), 1.0);
        let store = TimeSeriesStore::new();
        assert_eq!(store.snapshot().generation(), 0);

        let stats = store.load(&[dir.path().to_path_buf()]).unwrap();

        assert_eq!(stats.rows, 10);
        assert_eq!(store.snapshot().generation(), 1);
        assert_eq!(store.list_symbols(), vec!["AAA", "BBB"]);
        assert_eq!(
            store.snapshot().window(),
            Some(GlobalWindow {
                start_ms: BASE_S * 1000,
                end_ms: (BASE_S + 240) * 1000
            })
        );
    }

    #[test]
    fn failed_load_keeps_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        write_flat_tree(dir.path(), 1.0);
        let store = TimeSeriesStore::new();
        store.load(&[dir.path().to_path_buf()]).unwrap();

        let bad_root = dir.path().join("file-root");
        fs::write(&bad_root, "x").unwrap();
        assert!(store.load(&[bad_root]).is_err());

        assert_eq!(store.snapshot().generation(), 1);
        assert_eq!(store.list_symbols(), vec!["AAA", "BBB"]);
    }

    #[test]
    fn reloading_an_unchanged_tree_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write_flat_tree(dir.path(), 2.5);
        let roots = vec![dir.path().to_path_buf()];
        let store = TimeSeriesStore::new();

        store.load(&roots).unwrap();
        let tf1 = serde_json::to_string(&store.snapshot().timeframe(at(0))).unwrap();
        let ov1 = serde_json::to_string(&store.build_price_overview("AAA", at(0), at(600), 60).unwrap()).unwrap();

        store.load(&roots).unwrap();
        let tf2 = serde_json::to_string(&store.snapshot().timeframe(at(0))).unwrap();
        let ov2 = serde_json::to_string(&store.build_price_overview("AAA", at(0), at(600), 60).unwrap()).unwrap();

        assert_eq!(tf1, tf2);
        assert_eq!(ov1, ov2);
    }

    #[test]
    fn load_range_restricts_to_path_window() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "2024-03-05/AAA/10_00.csv", &format!("t,p\n{},1\n", BASE_S));
        write(dir.path(), "2024-03-05/BBB/11_00.csv", &format!("t,p\n{},2\n", BASE_S + 3600));
        let store = TimeSeriesStore::new();

        store
            .load_range(&[dir.path().to_path_buf()], at(3000), at(3600))
            .unwrap();

        assert_eq!(store.list_symbols(), vec!["BBB"]);
    }

    #[test]
    fn concurrent_readers_never_mix_snapshots() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        write_flat_tree(dir_a.path(), 1.0);
        write_flat_tree(dir_b.path(), 2.0);
        let roots_a = vec![dir_a.path().to_path_buf()];
        let roots_b = vec![dir_b.path().to_path_buf()];

        let store = TimeSeriesStore::new();
        store.load(&roots_a).unwrap();

        std::thread::scope(|s| {
            s.spawn(|| {
                for i in 0..20 {
                    let roots = if i % 2 == 0 { &roots_b } else { &roots_a };
                    store.load(roots).unwrap();
                }
            });

            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..200 {
                        let snap = store.snapshot();
                        let plan = BucketPlan::new(at(0), at(299), 60).unwrap();
                        let mut seen: Vec<f64> = Vec::new();
                        for symbol in ["AAA", "BBB"] {
                            let ov = snap.price_overview(symbol, &plan).unwrap().unwrap();
                            seen.extend(ov.prices.into_iter().flatten());
                        }
                        assert_eq!(seen.len(), 10);
                        assert!(
                            seen.iter().all(|&p| p == seen[0]),
                            "mixed snapshot: {seen:?}"
                        );
                    }
                });
            }
        });
    }
}
