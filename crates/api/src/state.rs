//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use ephemeral_store::EphemeralStore;
use moka::future::Cache;

use crate::recorder::Recorder;
use crate::response::TodayResponse;

/// Live view entries are recomputed at most this often per domain.
const TODAY_CACHE_TTL: Duration = Duration::from_secs(30);

const TODAY_CACHE_MAX_CAPACITY: u64 = 10_000;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub recorder: Arc<Recorder>,
    /// Read side of the ephemeral store, for the live view.
    pub ephemeral: Arc<dyn EphemeralStore>,
    /// `{day}:{domain}` -> live stats
    pub today_cache: Cache<String, TodayResponse>,
}

impl AppState {
    pub fn new(recorder: Recorder, ephemeral: Arc<dyn EphemeralStore>) -> Self {
        Self {
            recorder: Arc::new(recorder),
            ephemeral,
            today_cache: Cache::builder()
                .max_capacity(TODAY_CACHE_MAX_CAPACITY)
                .time_to_live(TODAY_CACHE_TTL)
                .build(),
        }
    }
}
