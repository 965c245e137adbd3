//! OpenAPI documentation configuration.

use utoipa::OpenApi;

use crate::{api, error, models};

/// OpenAPI documentation.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Result Viewer Server",
        version = "0.1.0",
        description = "Serves automated test runs, ingesting them from the staging share on first request"
    ),
    servers(
        (url = "/", description = "Local server")
    ),
    paths(
        // Health endpoints
        api::health::health,
        api::health::ready,
        // Run endpoints
        api::runs::get_run,
        api::runs::list_runs,
    ),
    components(
        schemas(
            // Common
            error::ErrorResponse,
            // Health
            api::health::LivenessResponse,
            api::health::ReadinessResponse,
            // Runs
            api::runs::GetRunQuery,
            models::ListRunsQuery,
            models::TestRunResponse,
            models::TestResultResponse,
            models::SystemInfoResponse,
            models::MeasurementResponse,
            models::TestRunSummary,
            models::PagedRunsResponse,
        )
    ),
    tags(
        (name = "Health", description = "Liveness and readiness"),
        (name = "Runs", description = "Test run lookup and listing")
    )
)]
pub struct ApiDoc;
