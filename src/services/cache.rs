//! In-process cache of resolved runs.
//!
//! Entries expire on whichever comes first: the absolute TTL counted from
//! insertion, or the idle timeout renewed on every hit. Only successful
//! resolutions are stored.

use std::sync::Arc;

use moka::sync::Cache;

use crate::config::CacheSettings;
use crate::models::{RunKey, TestRunResponse};

/// Run projection cache keyed by the composite run key.
#[derive(Clone)]
pub struct RunCache {
    cache: Cache<RunKey, Arc<TestRunResponse>>,
}

impl RunCache {
    pub fn new(settings: &CacheSettings) -> Self {
        let cache = Cache::builder()
            .max_capacity(settings.max_entries)
            .time_to_live(settings.ttl)
            .time_to_idle(settings.idle)
            .build();

        Self { cache }
    }

    /// Look up a run; a hit renews its idle timeout.
    pub fn get(&self, key: &RunKey) -> Option<Arc<TestRunResponse>> {
        self.cache.get(key)
    }

    /// Store a resolved run and return the shared copy.
    pub fn insert(&self, key: &RunKey, run: TestRunResponse) -> Arc<TestRunResponse> {
        let run = Arc::new(run);
        self.cache.insert(key.clone(), Arc::clone(&run));
        run
    }

    pub fn invalidate(&self, key: &RunKey) {
        self.cache.invalidate(key);
    }

    /// Number of entries currently in the cache.
    pub fn len(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
