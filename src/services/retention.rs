//! Retention sweeps over stored runs and archived bundles.
//!
//! Policies are independent and safe to repeat:
//! - runs created before the retention age are soft-deleted
//! - archive bundles last modified before the archive age are removed
//! - optionally, runs older than the purge age are removed from the database

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Months, Utc};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::config::RetentionSettings;
use crate::db::RunRepository;
use crate::error::{AppError, AppResult};

use super::ensure_active;

/// Point in time `years` before `now`.
pub fn years_before(now: DateTime<Utc>, years: u32) -> DateTime<Utc> {
    now.checked_sub_months(Months::new(years.saturating_mul(12)))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Counts from one sweep cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub soft_deleted: u64,
    pub purged: u64,
    pub archives_deleted: u64,
}

/// Applies the retention policies.
pub struct RetentionSweeper {
    repository: Arc<dyn RunRepository>,
    archive_root: PathBuf,
    settings: RetentionSettings,
}

impl RetentionSweeper {
    pub fn new(
        repository: Arc<dyn RunRepository>,
        archive_root: PathBuf,
        settings: RetentionSettings,
    ) -> Self {
        Self {
            repository,
            archive_root,
            settings,
        }
    }

    pub fn settings(&self) -> &RetentionSettings {
        &self.settings
    }

    /// Soft-delete runs older than the retention age.
    pub async fn sweep_expired_runs(&self, cancel: &CancellationToken) -> AppResult<u64> {
        ensure_active(cancel)?;

        let cutoff = years_before(Utc::now(), self.settings.soft_delete_after_years);
        info!(
            years = self.settings.soft_delete_after_years,
            cutoff = %cutoff,
            "Starting run retention sweep"
        );

        let count = self.repository.soft_delete_expired(cutoff).await?;
        info!(count, "Run retention sweep complete");
        Ok(count)
    }

    /// Permanently remove runs older than the purge age. `None` when purging is off.
    pub async fn purge_expired_runs(&self, cancel: &CancellationToken) -> AppResult<Option<u64>> {
        let Some(years) = self.settings.purge_after_years else {
            return Ok(None);
        };
        ensure_active(cancel)?;

        let cutoff = years_before(Utc::now(), years);
        info!(years, cutoff = %cutoff, "Starting run purge");

        let count = self.repository.delete_expired(cutoff).await?;
        info!(count, "Run purge complete");
        Ok(Some(count))
    }

    /// Delete archive bundles last modified before the archive retention age.
    pub async fn sweep_expired_archives(&self, cancel: &CancellationToken) -> AppResult<u64> {
        ensure_active(cancel)?;

        let is_dir = tokio::fs::metadata(&self.archive_root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            warn!(
                archive_root = %self.archive_root.display(),
                "Archive root does not exist, skipping archive sweep"
            );
            return Ok(0);
        }

        let cutoff = years_before(Utc::now(), self.settings.archive_retention_years);
        info!(
            years = self.settings.archive_retention_years,
            cutoff = %cutoff,
            "Starting archive retention sweep"
        );

        let root = self.archive_root.clone();
        let token = cancel.clone();
        let deleted =
            tokio::task::spawn_blocking(move || delete_bundles_before(&root, cutoff, &token))
                .await??;

        info!(count = deleted, "Archive retention sweep complete");
        Ok(deleted)
    }

    /// Run every policy once. A failing policy does not stop the others.
    pub async fn run_once(&self, cancel: &CancellationToken) -> SweepReport {
        let mut report = SweepReport::default();

        match self.sweep_expired_runs(cancel).await {
            Ok(count) => report.soft_deleted = count,
            Err(e) => error!(error = %e, "Run retention sweep failed"),
        }

        match self.purge_expired_runs(cancel).await {
            Ok(count) => report.purged = count.unwrap_or(0),
            Err(e) => error!(error = %e, "Run purge failed"),
        }

        match self.sweep_expired_archives(cancel).await {
            Ok(count) => report.archives_deleted = count,
            Err(e) => error!(error = %e, "Archive retention sweep failed"),
        }

        report
    }
}

/// Walk `root` and delete `*.zip` files modified before `cutoff`.
fn delete_bundles_before(
    root: &Path,
    cutoff: DateTime<Utc>,
    cancel: &CancellationToken,
) -> AppResult<u64> {
    let mut deleted = 0;

    for entry in WalkDir::new(root) {
        ensure_active(cancel)?;

        let entry = entry.map_err(|e| AppError::FileSystem(e.to_string()))?;
        let is_bundle = entry.file_type().is_file()
            && entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));
        if !is_bundle {
            continue;
        }

        let modified: DateTime<Utc> = entry
            .metadata()
            .map_err(|e| AppError::FileSystem(e.to_string()))?
            .modified()?
            .into();
        if modified < cutoff {
            match std::fs::remove_file(entry.path()) {
                Ok(()) => deleted += 1,
                Err(e) => warn!(
                    path = %entry.path().display(),
                    error = %e,
                    "Failed to delete expired archive"
                ),
            }
        }
    }

    Ok(deleted)
}

/// Start the retention background task.
///
/// Runs every policy once per configured interval until `shutdown` fires.
pub fn start_retention_task(
    sweeper: Arc<RetentionSweeper>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            retention_years = sweeper.settings.soft_delete_after_years,
            archive_years = sweeper.settings.archive_retention_years,
            interval_secs = sweeper.settings.interval.as_secs(),
            "Starting retention service"
        );

        let mut ticker = interval(sweeper.settings.interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Retention service stopped");
                    break;
                }
                _ = ticker.tick() => {}
            }

            let report = sweeper.run_once(&shutdown).await;
            info!(
                soft_deleted = report.soft_deleted,
                purged = report.purged,
                archives_deleted = report.archives_deleted,
                "Retention cycle complete"
            );
        }
    })
}
