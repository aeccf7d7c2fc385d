use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use crate::store::TimeframeResponse;

struct Cached {
    payload: Arc<TimeframeResponse>,
    built_at: Instant,
}

/// TTL cache in front of the full coverage view.
///
/// Concurrent misses collapse into one rebuild: the first writer rebuilds,
/// the rest re-check under the write lock and reuse its result.
pub struct TimeframeCache {
    ttl: Duration,
    entry: RwLock<Option<Cached>>,
}

impl TimeframeCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: RwLock::new(None),
        }
    }

    fn fresh(&self, entry: &Option<Cached>) -> Option<Arc<TimeframeResponse>> {
        entry
            .as_ref()
            .filter(|c| c.built_at.elapsed() < self.ttl)
            .map(|c| Arc::clone(&c.payload))
    }

    pub fn get_or_build<F>(&self, build: F) -> Arc<TimeframeResponse>
    where
        F: FnOnce() -> TimeframeResponse,
    {
        {
            let entry = self.entry.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(payload) = self.fresh(&entry) {
                return payload;
            }
        }

        let mut entry = self.entry.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(payload) = self.fresh(&entry) {
            return payload;
        }

        let payload = Arc::new(build());
        *entry = Some(Cached {
            payload: Arc::clone(&payload),
            built_at: Instant::now(),
        });
        payload
    }

    /// Drop the cached payload; the next read rebuilds.
    pub fn reset(&self) {
        *self.entry.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
