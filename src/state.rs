use std::sync::Arc;
use std::time::Instant;

use crate::cache::TimeframeCache;
use crate::config::HubConfig;
use crate::session::SessionManager;
use crate::store::{TimeSeriesStore, TimeframeResponse};

/// Shared application state, passed to all route handlers via `axum::extract::State`.
pub struct AppState {
    pub config: HubConfig,
    pub store: TimeSeriesStore,
    pub timeframe_cache: TimeframeCache,
    pub sessions: SessionManager,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: HubConfig) -> Arc<Self> {
        let timeframe_cache = TimeframeCache::new(config.cache_ttl);

        Arc::new(Self {
            config,
            store: TimeSeriesStore::new(),
            timeframe_cache,
            sessions: SessionManager::new(),
            started_at: Instant::now(),
        })
    }

    /// Coverage view through the TTL cache.
    pub fn timeframe(&self) -> Arc<TimeframeResponse> {
        self.timeframe_cache
            .get_or_build(|| self.store.build_timeframe_response())
    }
}
