//! Test run aggregate: one run owning its test results, system info and measurements.

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Import status of runs ingested from the staging share.
pub const IMPORT_STATUS_IMPORTED: &str = "Imported";

/// Import status of runs written by other producers.
pub const IMPORT_STATUS_COMPLETED: &str = "Completed";

/// Composite key identifying one test run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunKey {
    pub host: String,
    pub pdc: String,
    pub run_id: String,
}

impl RunKey {
    /// Build a key, rejecting blank parts.
    pub fn new(
        host: impl Into<String>,
        pdc: impl Into<String>,
        run_id: impl Into<String>,
    ) -> AppResult<Self> {
        let key = RunKey {
            host: host.into(),
            pdc: pdc.into(),
            run_id: run_id.into(),
        };
        key.validate()?;
        Ok(key)
    }

    /// All three parts must be non-blank.
    pub fn validate(&self) -> AppResult<()> {
        if self.host.trim().is_empty()
            || self.pdc.trim().is_empty()
            || self.run_id.trim().is_empty()
        {
            return Err(AppError::InvalidInput(
                "host, pdc, and runId are required".to_string(),
            ));
        }
        Ok(())
    }

    /// Stable string form `run:{host}:{pdc}:{run_id}`, used to label log lines.
    ///
    /// `%` and `:` inside a part are percent-escaped so distinct keys never
    /// share a label.
    pub fn cache_key(&self) -> String {
        format!(
            "run:{}:{}:{}",
            escape_part(&self.host),
            escape_part(&self.pdc),
            escape_part(&self.run_id)
        )
    }
}

fn escape_part(part: &str) -> String {
    part.replace('%', "%25").replace(':', "%3A")
}

impl std::fmt::Display for RunKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.host, self.pdc, self.run_id)
    }
}

/// Timestamp used when a document carries no parseable time.
pub fn unknown_time() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Raw documents read from a staged run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRunData {
    /// Primary result document (required)
    pub test_result_xml: String,
    pub system_info_xml: Option<String>,
    pub fingerprint_xml: Option<String>,
    pub specflow_log: Option<String>,
}

/// A test run with its child collections.
///
/// Children are always persisted and replaced together with the run.
#[derive(Debug, Clone, PartialEq)]
pub struct TestRun {
    pub id: Uuid,
    pub host: String,
    pub pdc: String,
    pub run_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub overall_result: String,
    pub test_count: i32,
    pub passed_count: i32,
    pub failed_count: i32,
    pub skipped_count: i32,
    /// Raw primary result document
    pub raw_json: String,
    pub raw_fingerprint_xml: Option<String>,
    pub specflow_log: Option<String>,
    pub archive_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub import_status: String,
    pub is_deleted: bool,
    pub test_results: Vec<TestResult>,
    pub system_info: Option<SystemInfo>,
    pub measurements: Vec<Measurement>,
}

impl TestRun {
    /// Empty run for `key`, counters zeroed and times unknown.
    pub fn new(key: &RunKey) -> Self {
        TestRun {
            id: Uuid::now_v7(),
            host: key.host.clone(),
            pdc: key.pdc.clone(),
            run_id: key.run_id.clone(),
            start_time: unknown_time(),
            end_time: unknown_time(),
            overall_result: "Unknown".to_string(),
            test_count: 0,
            passed_count: 0,
            failed_count: 0,
            skipped_count: 0,
            raw_json: String::new(),
            raw_fingerprint_xml: None,
            specflow_log: None,
            archive_path: None,
            created_at: Utc::now(),
            import_status: IMPORT_STATUS_COMPLETED.to_string(),
            is_deleted: false,
            test_results: Vec::new(),
            system_info: None,
            measurements: Vec::new(),
        }
    }

    pub fn key(&self) -> RunKey {
        RunKey {
            host: self.host.clone(),
            pdc: self.pdc.clone(),
            run_id: self.run_id.clone(),
        }
    }
}

/// Outcome of one leaf test case.
#[derive(Debug, Clone, PartialEq)]
pub struct TestResult {
    pub id: Uuid,
    pub test_name: String,
    pub result: String,
    pub error_message: Option<String>,
    pub output: Option<String>,
    pub duration_seconds: f64,
}

/// Descriptive data about the system under test.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SystemInfo {
    pub id: Uuid,
    pub system_name: String,
    pub stm: String,
    pub msi_version: String,
    pub pdc_version: String,
    pub monoplane_or_biplane: String,
    pub frontal_stand_type: String,
    pub table_type: String,
    pub table_top_type: String,
    pub detector_name_frontal: String,
    pub detector_name_lateral: String,
    pub system_type: String,
    pub product_family: String,
    pub detector_type: String,
    pub lateral_stand_type: String,
    pub system_config_type: String,
    pub raw_xml: String,
}

/// One fingerprint reading with its error/warning spec ranges.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Measurement {
    pub id: Uuid,
    pub test_name: String,
    pub measurement_name: String,
    pub result: String,
    pub measurement_unit: Option<String>,
    pub description: Option<String>,
    pub measured_value: Option<String>,
    pub spec_error_upper: Option<String>,
    pub spec_error_lower: Option<String>,
    pub spec_warning_upper: Option<String>,
    pub spec_warning_lower: Option<String>,
}
