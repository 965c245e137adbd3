//! API projections of test runs and the list query contract.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::run::{Measurement, SystemInfo, TestResult, TestRun};
use crate::error::{AppError, AppResult};

/// Default list page size.
pub const DEFAULT_PAGE_SIZE: u64 = 20;

/// Largest accepted list page size.
pub const MAX_PAGE_SIZE: u64 = 100;

/// Full run projection returned by the single-run lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TestRunResponse {
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
    /// Always empty; the stored document is never sent to clients.
    pub raw_json: String,
    pub archive_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub import_status: String,
    pub specflow_log: Option<String>,
    pub indexed_results: Vec<TestResultResponse>,
    pub system_info: Option<SystemInfoResponse>,
    pub measurements: Vec<MeasurementResponse>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TestResultResponse {
    pub id: Uuid,
    pub test_name: String,
    pub result: String,
    pub error_message: Option<String>,
    pub output: Option<String>,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfoResponse {
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
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementResponse {
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

impl From<&TestRun> for TestRunResponse {
    fn from(run: &TestRun) -> Self {
        TestRunResponse {
            id: run.id,
            host: run.host.clone(),
            pdc: run.pdc.clone(),
            run_id: run.run_id.clone(),
            start_time: run.start_time,
            end_time: run.end_time,
            overall_result: run.overall_result.clone(),
            test_count: run.test_count,
            passed_count: run.passed_count,
            failed_count: run.failed_count,
            skipped_count: run.skipped_count,
            raw_json: String::new(),
            archive_path: run.archive_path.clone(),
            created_at: run.created_at,
            import_status: run.import_status.clone(),
            specflow_log: run.specflow_log.clone(),
            indexed_results: run.test_results.iter().map(Into::into).collect(),
            system_info: run.system_info.as_ref().map(Into::into),
            measurements: run.measurements.iter().map(Into::into).collect(),
        }
    }
}

impl From<&TestResult> for TestResultResponse {
    fn from(r: &TestResult) -> Self {
        TestResultResponse {
            id: r.id,
            test_name: r.test_name.clone(),
            result: r.result.clone(),
            error_message: r.error_message.clone(),
            output: r.output.clone(),
            duration_seconds: r.duration_seconds,
        }
    }
}

impl From<&SystemInfo> for SystemInfoResponse {
    fn from(s: &SystemInfo) -> Self {
        SystemInfoResponse {
            system_name: s.system_name.clone(),
            stm: s.stm.clone(),
            msi_version: s.msi_version.clone(),
            pdc_version: s.pdc_version.clone(),
            monoplane_or_biplane: s.monoplane_or_biplane.clone(),
            frontal_stand_type: s.frontal_stand_type.clone(),
            table_type: s.table_type.clone(),
            table_top_type: s.table_top_type.clone(),
            detector_name_frontal: s.detector_name_frontal.clone(),
            detector_name_lateral: s.detector_name_lateral.clone(),
            system_type: s.system_type.clone(),
            product_family: s.product_family.clone(),
            detector_type: s.detector_type.clone(),
            lateral_stand_type: s.lateral_stand_type.clone(),
            system_config_type: s.system_config_type.clone(),
        }
    }
}

impl From<&Measurement> for MeasurementResponse {
    fn from(m: &Measurement) -> Self {
        MeasurementResponse {
            test_name: m.test_name.clone(),
            measurement_name: m.measurement_name.clone(),
            result: m.result.clone(),
            measurement_unit: m.measurement_unit.clone(),
            description: m.description.clone(),
            measured_value: m.measured_value.clone(),
            spec_error_upper: m.spec_error_upper.clone(),
            spec_error_lower: m.spec_error_lower.clone(),
            spec_warning_upper: m.spec_warning_upper.clone(),
            spec_warning_lower: m.spec_warning_lower.clone(),
        }
    }
}

/// List row; carries no raw payloads and no children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TestRunSummary {
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
    pub archive_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub import_status: String,
}

/// One page of run summaries.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PagedRunsResponse {
    pub items: Vec<TestRunSummary>,
    pub total_count: u64,
    pub page: u64,
    pub page_size: u64,
    pub total_pages: u64,
}

impl PagedRunsResponse {
    pub fn new(items: Vec<TestRunSummary>, total_count: u64, page: u64, page_size: u64) -> Self {
        let total_pages = if page_size == 0 {
            0
        } else {
            total_count.div_ceil(page_size)
        };

        PagedRunsResponse {
            items,
            total_count,
            page,
            page_size,
            total_pages,
        }
    }
}

/// Query parameters of the run list endpoint.
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query, rename_all = "camelCase")]
pub struct ListRunsQuery {
    /// Page number, 1-based (values below 1 become 1)
    pub page: Option<i64>,
    /// Page size (default 20, max 100)
    pub page_size: Option<i64>,
    /// Substring match on host
    pub host: Option<String>,
    /// Substring match on PDC
    pub pdc: Option<String>,
    /// Substring match on overall result
    pub result: Option<String>,
    /// Inclusive lower bound on start time (RFC 3339 or YYYY-MM-DD)
    pub from_date: Option<String>,
    /// Inclusive upper bound on start time (RFC 3339 or YYYY-MM-DD)
    pub to_date: Option<String>,
}

/// Filters applied by the repository to a run listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunListFilter {
    pub host: Option<String>,
    pub pdc: Option<String>,
    pub result: Option<String>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
}

impl ListRunsQuery {
    /// Page number raised to at least 1.
    pub fn clamped_page(&self) -> u64 {
        match self.page {
            Some(p) if p >= 1 => p as u64,
            _ => 1,
        }
    }

    /// Page size defaulted when below 1 and capped at the maximum.
    pub fn clamped_page_size(&self) -> u64 {
        match self.page_size {
            Some(s) if s >= 1 => (s as u64).min(MAX_PAGE_SIZE),
            _ => DEFAULT_PAGE_SIZE,
        }
    }

    /// Convert into repository filters, parsing date bounds.
    pub fn to_filter(&self) -> AppResult<RunListFilter> {
        Ok(RunListFilter {
            host: non_blank(&self.host),
            pdc: non_blank(&self.pdc),
            result: non_blank(&self.result),
            from_date: parse_date_bound("fromDate", &self.from_date)?,
            to_date: parse_date_bound("toDate", &self.to_date)?,
        })
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_date_bound(name: &str, value: &Option<String>) -> AppResult<Option<DateTime<Utc>>> {
    let Some(raw) = non_blank(value) else {
        return Ok(None);
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }

    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Some(dt.and_utc()))
        .ok_or_else(|| AppError::InvalidInput(format!("{} is not a valid date: {}", name, raw)))
}
