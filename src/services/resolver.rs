//! Tiered run resolution: cache, then database, then the staging share.
//!
//! A run found only on the staging share is parsed, stored, archived and
//! cached in that order. Archiving is best-effort; once the database write has
//! committed the run is served even if the archive step fails.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::db::RunRepository;
use crate::error::AppResult;
use crate::models::{
    IMPORT_STATUS_IMPORTED, PagedRunsResponse, RunKey, RunListFilter, TestRunResponse,
};

use super::cache::RunCache;
use super::ensure_active;
use super::parser::parse_run;
use super::staging::RunStaging;

type Gate = Arc<tokio::sync::Mutex<()>>;

/// Resolves runs across the cache, the repository and the staging share.
pub struct RunResolver {
    repository: Arc<dyn RunRepository>,
    staging: Arc<dyn RunStaging>,
    cache: RunCache,
    /// One gate per key currently being resolved past the cache
    in_flight: Mutex<HashMap<RunKey, Gate>>,
}

/// Membership in a key's in-flight group; the last member removes the gate.
struct Flight<'a> {
    in_flight: &'a Mutex<HashMap<RunKey, Gate>>,
    key: RunKey,
    gate: Gate,
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        // One reference is ours, one is the map's
        if Arc::strong_count(&self.gate) <= 2
            && in_flight
                .get(&self.key)
                .is_some_and(|gate| Arc::ptr_eq(gate, &self.gate))
        {
            in_flight.remove(&self.key);
        }
    }
}

impl RunResolver {
    pub fn new(
        repository: Arc<dyn RunRepository>,
        staging: Arc<dyn RunStaging>,
        cache: RunCache,
    ) -> Self {
        Self {
            repository,
            staging,
            cache,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn cache(&self) -> &RunCache {
        &self.cache
    }

    /// Number of keys currently being resolved past the cache.
    pub fn in_flight(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Resolve one run. `Ok(None)` means neither the database nor the staging
    /// share knows the key; absence is never cached.
    pub async fn resolve(
        &self,
        key: &RunKey,
        cancel: &CancellationToken,
    ) -> AppResult<Option<Arc<TestRunResponse>>> {
        key.validate()?;

        if let Some(hit) = self.cache.get(key) {
            debug!(cache_key = %key.cache_key(), "Cache hit");
            return Ok(Some(hit));
        }
        debug!(cache_key = %key.cache_key(), "Cache miss");

        // Concurrent misses for the same key wait here instead of ingesting twice
        let flight = self.join_flight(key);
        let _turn = flight.gate.lock().await;

        if let Some(hit) = self.cache.get(key) {
            debug!(cache_key = %key.cache_key(), "Cache filled by concurrent resolution");
            return Ok(Some(hit));
        }

        self.resolve_uncached(key, cancel).await
    }

    /// List run summaries straight from the repository.
    pub async fn list(
        &self,
        page: u64,
        page_size: u64,
        filter: &RunListFilter,
    ) -> AppResult<PagedRunsResponse> {
        let (items, total) = self.repository.list_paged(page, page_size, filter).await?;
        Ok(PagedRunsResponse::new(items, total, page, page_size))
    }

    fn join_flight(&self, key: &RunKey) -> Flight<'_> {
        let gate = {
            let mut in_flight = self
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            Arc::clone(in_flight.entry(key.clone()).or_default())
        };

        Flight {
            in_flight: &self.in_flight,
            key: key.clone(),
            gate,
        }
    }

    async fn resolve_uncached(
        &self,
        key: &RunKey,
        cancel: &CancellationToken,
    ) -> AppResult<Option<Arc<TestRunResponse>>> {
        ensure_active(cancel)?;

        if let Some(run) = self.repository.get_by_key(key).await? {
            info!(host = %key.host, pdc = %key.pdc, run_id = %key.run_id, "Database hit");
            return Ok(Some(self.cache.insert(key, TestRunResponse::from(&run))));
        }

        info!(
            host = %key.host,
            pdc = %key.pdc,
            run_id = %key.run_id,
            "Database miss, checking staging share"
        );

        ensure_active(cancel)?;
        if !self.staging.exists(key, cancel).await? {
            warn!(host = %key.host, pdc = %key.pdc, run_id = %key.run_id, "Run not found on staging share");
            return Ok(None);
        }

        info!(host = %key.host, pdc = %key.pdc, run_id = %key.run_id, "Run found on staging share");

        ensure_active(cancel)?;
        let raw = self.staging.load_raw(key, cancel).await?;

        ensure_active(cancel)?;
        let parse_key = key.clone();
        let parsed = tokio::task::spawn_blocking(move || parse_run(&raw, &parse_key)).await?;
        let mut run = parsed.inspect_err(|e| {
            error!(
                host = %key.host,
                pdc = %key.pdc,
                run_id = %key.run_id,
                error = %e,
                "Failed to parse staged run"
            )
        })?;
        run.created_at = Utc::now();
        run.import_status = IMPORT_STATUS_IMPORTED.to_string();

        ensure_active(cancel)?;
        run.id = self.repository.upsert(&run).await?;
        info!(
            host = %key.host,
            pdc = %key.pdc,
            run_id = %key.run_id,
            tests = run.test_count,
            "Stored staged run in database"
        );

        // The run is durable from here on; archive failures only get logged
        match self.staging.archive(key, cancel).await {
            Ok(path) => info!(
                host = %key.host,
                pdc = %key.pdc,
                run_id = %key.run_id,
                archive = %path.display(),
                "Archived staged run"
            ),
            Err(e) => error!(
                host = %key.host,
                pdc = %key.pdc,
                run_id = %key.run_id,
                error = %e,
                "Failed to archive run; data is in the database and archiving can be retried"
            ),
        }

        Ok(Some(self.cache.insert(key, TestRunResponse::from(&run))))
    }
}
