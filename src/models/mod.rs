//! Domain models for the result viewer.

pub mod run;
pub mod run_response;

// Re-export commonly used types
pub use run::{
    IMPORT_STATUS_COMPLETED, IMPORT_STATUS_IMPORTED, Measurement, RawRunData, RunKey, SystemInfo,
    TestResult, TestRun, unknown_time,
};
pub use run_response::{
    DEFAULT_PAGE_SIZE, ListRunsQuery, MAX_PAGE_SIZE, MeasurementResponse, PagedRunsResponse,
    RunListFilter, SystemInfoResponse, TestResultResponse, TestRunResponse, TestRunSummary,
};
