//! Directory walk over `root/YYYY-MM-DD/SYMBOL/<file>` tick trees.

pub mod format;
pub mod layout;

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::HubError;

use format::parse_ticks;
use layout::path_timestamp_ms;

/// One accepted tick, handed to the index builder and then dropped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickPoint<'a> {
    pub symbol: &'a str,
    pub timestamp_ms: i64,
    pub price: f64,
}

/// Which files a scan pass reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanFilter {
    All,
    /// Only files whose path-encoded time lies in `[start_ms, end_ms]`.
    Range { start_ms: i64, end_ms: i64 },
}

impl ScanFilter {
    fn admits(&self, date_dir: &str, file_name: &str) -> bool {
        match *self {
            Self::All => true,
            Self::Range { start_ms, end_ms } => path_timestamp_ms(date_dir, file_name)
                .is_some_and(|ts| ts >= start_ms && ts <= end_ms),
        }
    }
}

/// Counters reported after each scan pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub roots: usize,
    pub files: usize,
    pub files_skipped: usize,
    pub rows: usize,
    pub rows_skipped: usize,
}

fn dir_name(path: &Path) -> Option<String> {
    path.file_name().and_then(|n| n.to_str()).map(str::to_string)
}

/// List subdirectories (or files) of `dir`, sorted by name for a stable scan order.
fn sorted_entries(dir: &Path, want_dirs: bool) -> std::io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let Ok(kind) = entry.file_type() else {
            continue;
        };
        let name = entry.file_name();
        if name.to_string_lossy().starts_with('.') {
            continue;
        }
        if (want_dirs && kind.is_dir()) || (!want_dirs && kind.is_file()) {
            out.push(entry.path());
        }
    }
    out.sort();
    Ok(out)
}

/// Walk every root and feed each accepted tick to `sink`.
///
/// A root that does not exist is skipped; a root that exists but cannot be
/// listed fails the whole pass. Everything below the root level is best
/// effort: unreadable directories, files and rows are logged and skipped.
pub fn scan_roots<F>(roots: &[PathBuf], filter: ScanFilter, mut sink: F) -> Result<ScanStats, HubError>
where
    F: FnMut(TickPoint<'_>),
{
    let mut stats = ScanStats::default();

    for root in roots {
        let date_dirs = match sorted_entries(root, true) {
            Ok(dirs) => dirs,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!("data root missing, skipping: {}", root.display());
                continue;
            }
            Err(e) => {
                return Err(HubError::Io(format!(
                    "cannot read data root {}: {e}",
                    root.display()
                )));
            }
        };
        stats.roots += 1;

        for date_path in date_dirs {
            let Some(date_name) = dir_name(&date_path) else {
                continue;
            };
            let symbol_dirs = match sorted_entries(&date_path, true) {
                Ok(dirs) => dirs,
                Err(e) => {
                    tracing::warn!("skipping unreadable dir {}: {e}", date_path.display());
                    continue;
                }
            };

            for symbol_path in symbol_dirs {
                let Some(symbol) = dir_name(&symbol_path) else {
                    continue;
                };
                let files = match sorted_entries(&symbol_path, false) {
                    Ok(files) => files,
                    Err(e) => {
                        tracing::warn!("skipping unreadable dir {}: {e}", symbol_path.display());
                        continue;
                    }
                };

                for file_path in files {
                    let Some(file_name) = dir_name(&file_path) else {
                        continue;
                    };
                    if !filter.admits(&date_name, &file_name) {
                        continue;
                    }
                    scan_file(&file_path, &symbol, &mut stats, &mut sink);
                }
            }
        }
    }

    Ok(stats)
}

fn scan_file<F>(path: &Path, symbol: &str, stats: &mut ScanStats, sink: &mut F)
where
    F: FnMut(TickPoint<'_>),
{
    let parsed = fs::read(path)
        .map_err(HubError::from)
        .and_then(|bytes| parse_ticks(&String::from_utf8_lossy(&bytes)));

    let parsed = match parsed {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!("skipping tick file {}: {e}", path.display());
            stats.files_skipped += 1;
            return;
        }
    };

    stats.files += 1;
    stats.rows += parsed.ticks.len();
    stats.rows_skipped += parsed.rows_skipped;
    if parsed.rows_skipped > 0 {
        tracing::debug!(
            "{}: skipped {} malformed rows",
            path.display(),
            parsed.rows_skipped
        );
    }

    for tick in parsed.ticks {
        sink(TickPoint {
            symbol,
            timestamp_ms: tick.timestamp_ms,
            price: tick.price,
        });
    }
}
