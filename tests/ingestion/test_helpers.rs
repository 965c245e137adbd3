//! Shared helpers for ingestion tests.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use result_viewer_lib::config::{CacheSettings, StagingSettings};
use result_viewer_lib::db::{DbPool, RunRepository};
use result_viewer_lib::error::{AppError, AppResult};
use result_viewer_lib::models::{
    RawRunData, RunKey, RunListFilter, TestResult, TestRun, TestRunSummary,
};
use result_viewer_lib::services::{RunCache, RunResolver, RunStaging, StagingFileSystem};
use sea_orm::Database;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub const RESULT_XML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<test-run id="2" result="Failed" total="2" passed="1" failed="1" skipped="0" start-time="2024-05-01T22:00:01Z" end-time="2024-05-01T23:00:00Z">
  <test-suite type="TestFixture" name="Positioning">
    <test-case name="MovesTable" fullname="Acceptance.Positioning.MovesTable" result="Passed" duration="12.5"/>
    <test-case name="RotatesCArm" fullname="Acceptance.Positioning.RotatesCArm" result="Failed" duration="3.25">
      <failure><message><![CDATA[Expected angle 30 but was 28]]></message></failure>
    </test-case>
  </test-suite>
</test-run>"#;

/// A later, different delivery of the same run.
pub const RERUN_XML: &str = r#"<test-run id="3" result="Passed" total="1" passed="1" failed="0" skipped="0" start-time="2024-05-02T22:00:01Z" end-time="2024-05-02T22:30:00Z">
  <test-suite type="TestFixture" name="Dose">
    <test-case name="CalibratesTube" fullname="Acceptance.Dose.CalibratesTube" result="Passed" duration="4.0"/>
  </test-suite>
</test-run>"#;

pub const SYSTEM_INFO_XML: &str = r#"<SystemInfo>
  <SystemName>Suite 4</SystemName>
  <STM>STM-12</STM>
  <ProductFamily>Allura</ProductFamily>
</SystemInfo>"#;

pub const FINGERPRINT_XML: &str = r#"<MedicalSystem>
  <Test Name="Dose">
    <Measurement Name="TubeCurrent" Result="Passed" MeasurementUnit="mA">
      <MeasuredValue><Value><StringValue>5.2</StringValue></Value></MeasuredValue>
    </Measurement>
  </Test>
</MedicalSystem>"#;

/// Temporary database, staging share and archive root for one test.
pub struct TestEnv {
    pub tmp: TempDir,
    pub pool: Arc<DbPool>,
    pub settings: StagingSettings,
}

impl TestEnv {
    pub async fn new() -> Self {
        let tmp = TempDir::new().expect("Failed to create temp dir");
        let url = format!("sqlite://{}?mode=rwc", tmp.path().join("runs.db").display());
        let conn = Database::connect(&url)
            .await
            .expect("Failed to open SQLite database");
        let pool = DbPool::from_connection(conn);
        pool.run_migrations()
            .await
            .expect("Failed to run migrations");

        let settings = StagingSettings {
            staging_root: tmp.path().join("staging"),
            archive_root: tmp.path().join("archive"),
            ..StagingSettings::default()
        };

        TestEnv {
            tmp,
            pool: Arc::new(pool),
            settings,
        }
    }

    pub fn repository(&self) -> Arc<dyn RunRepository> {
        self.pool.clone()
    }

    pub fn staging(&self) -> Arc<CountingStaging> {
        Arc::new(CountingStaging::new(StagingFileSystem::new(
            self.settings.clone(),
        )))
    }

    pub fn resolver(&self, staging: Arc<CountingStaging>) -> RunResolver {
        RunResolver::new(
            self.repository(),
            staging,
            RunCache::new(&CacheSettings::default()),
        )
    }

    /// Resolver whose repository lookups are counted.
    pub fn counting_resolver(
        &self,
        staging: Arc<CountingStaging>,
    ) -> (RunResolver, Arc<CountingRepository>) {
        let repository = Arc::new(CountingRepository::new(self.repository()));
        let resolver = RunResolver::new(
            repository.clone(),
            staging,
            RunCache::new(&CacheSettings::default()),
        );
        (resolver, repository)
    }

    /// `{staging_root}/{host}/{pdc}/{run_id}`
    pub fn run_dir(&self, key: &RunKey) -> PathBuf {
        self.settings
            .staging_root
            .join(&key.host)
            .join(&key.pdc)
            .join(&key.run_id)
    }

    /// `{archive_root}/{host}/{pdc}/{run_id}.zip`
    pub fn archive_file(&self, key: &RunKey) -> PathBuf {
        self.settings
            .archive_root
            .join(&key.host)
            .join(&key.pdc)
            .join(format!("{}.zip", key.run_id))
    }

    /// Stage a run's documents in its output folder.
    pub fn stage_run(&self, key: &RunKey, result_xml: &str) {
        let output = self.run_dir(key).join(&self.settings.output_folder);
        write_file(&output.join(&self.settings.result_file), result_xml);
        write_file(
            &output.join(&self.settings.system_info_file),
            SYSTEM_INFO_XML,
        );
        write_file(
            &output.join(&self.settings.fingerprint_file),
            FINGERPRINT_XML,
        );
    }
}

pub fn write_file(path: &Path, content: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

pub fn key(host: &str, pdc: &str, run_id: &str) -> RunKey {
    RunKey::new(host, pdc, run_id).unwrap()
}

/// Generate a unique run id for test isolation.
pub fn unique_run_id(prefix: &str) -> String {
    format!(
        "{}-{}",
        prefix,
        Uuid::new_v4().to_string().split('-').next().unwrap()
    )
}

pub fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
}

/// A stored-run fixture with `results` passed test cases.
pub fn sample_run(key: &RunKey, start_time: DateTime<Utc>, results: usize) -> TestRun {
    let mut run = TestRun::new(key);
    run.start_time = start_time;
    run.end_time = start_time;
    run.overall_result = "Passed".to_string();
    run.raw_json = "<test-run/>".to_string();
    run.test_count = results as i32;
    run.passed_count = results as i32;
    run.test_results = (0..results)
        .map(|i| TestResult {
            id: Uuid::now_v7(),
            test_name: format!("Case{}", i),
            result: "Passed".to_string(),
            error_message: None,
            output: None,
            duration_seconds: i as f64,
        })
        .collect();
    run
}

/// Staging share wrapper counting loads, with optional latency and archive failure.
pub struct CountingStaging {
    inner: StagingFileSystem,
    loads: AtomicUsize,
    load_delay: Duration,
    fail_archive: bool,
}

impl CountingStaging {
    pub fn new(inner: StagingFileSystem) -> Self {
        Self {
            inner,
            loads: AtomicUsize::new(0),
            load_delay: Duration::ZERO,
            fail_archive: false,
        }
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    pub fn failing_archive(mut self) -> Self {
        self.fail_archive = true;
        self
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RunStaging for CountingStaging {
    async fn exists(&self, key: &RunKey, cancel: &CancellationToken) -> AppResult<bool> {
        self.inner.exists(key, cancel).await
    }

    async fn load_raw(&self, key: &RunKey, cancel: &CancellationToken) -> AppResult<RawRunData> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if !self.load_delay.is_zero() {
            tokio::time::sleep(self.load_delay).await;
        }
        self.inner.load_raw(key, cancel).await
    }

    async fn archive(&self, key: &RunKey, cancel: &CancellationToken) -> AppResult<PathBuf> {
        if self.fail_archive {
            return Err(AppError::Archive("archive share unavailable".to_string()));
        }
        self.inner.archive(key, cancel).await
    }
}

/// Repository wrapper counting key lookups.
pub struct CountingRepository {
    inner: Arc<dyn RunRepository>,
    lookups: AtomicUsize,
}

impl CountingRepository {
    pub fn new(inner: Arc<dyn RunRepository>) -> Self {
        Self {
            inner,
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RunRepository for CountingRepository {
    async fn get_by_key(&self, key: &RunKey) -> AppResult<Option<TestRun>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.get_by_key(key).await
    }

    async fn list_paged(
        &self,
        page: u64,
        page_size: u64,
        filter: &RunListFilter,
    ) -> AppResult<(Vec<TestRunSummary>, u64)> {
        self.inner.list_paged(page, page_size, filter).await
    }

    async fn upsert(&self, run: &TestRun) -> AppResult<Uuid> {
        self.inner.upsert(run).await
    }

    async fn soft_delete_expired(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        self.inner.soft_delete_expired(cutoff).await
    }

    async fn delete_expired(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        self.inner.delete_expired(cutoff).await
    }
}
