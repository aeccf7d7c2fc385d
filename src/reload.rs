use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::HubError;
use crate::ingest::ScanStats;
use crate::state::AppState;

/// Full rescan of the configured roots on the blocking pool, followed by a
/// cache reset. On failure the previous snapshot stays live.
pub async fn reload_all(state: &Arc<AppState>) -> Result<ScanStats, HubError> {
    let worker = Arc::clone(state);
    let stats = tokio::task::spawn_blocking(move || {
        worker.store.load(&worker.config.data_dirs)
    })
    .await??;
    state.timeframe_cache.reset();
    Ok(stats)
}

/// Handle to the background full-reload loop.
pub struct Reloader {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Reloader {
    /// Start the loop; the first reload happens one `interval` from now.
    pub fn spawn(state: Arc<AppState>, interval: Duration) -> Self {
        let (stop, mut stopped) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match reload_all(&state).await {
                            Ok(stats) => tracing::info!(
                                files = stats.files,
                                rows = stats.rows,
                                "scheduled reload complete"
                            ),
                            Err(e) => tracing::warn!("scheduled reload failed: {e}"),
                        }
                    }
                    changed = stopped.changed() => {
                        if changed.is_err() || *stopped.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("reload loop stopped");
        });

        Self { stop, handle }
    }

    /// Signal the loop and wait for it; an in-flight reload finishes first.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.handle.await {
            tracing::warn!("reload task ended abnormally: {e}");
        }
    }
}
