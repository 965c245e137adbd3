//! Test run API handlers.

use actix_web::{HttpResponse, web};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use utoipa::{IntoParams, ToSchema};

use crate::error::{AppError, AppResult};
use crate::models::{ListRunsQuery, RunKey};
use crate::services::RunResolver;

/// Query parameters identifying a single run.
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query, rename_all = "camelCase")]
pub struct GetRunQuery {
    /// Host that executed the run
    pub host: Option<String>,
    /// PDC the run belongs to
    pub pdc: Option<String>,
    /// Run identifier, unique within host and PDC
    pub run_id: Option<String>,
}

impl GetRunQuery {
    fn to_key(&self) -> AppResult<RunKey> {
        RunKey::new(
            self.host.clone().unwrap_or_default(),
            self.pdc.clone().unwrap_or_default(),
            self.run_id.clone().unwrap_or_default(),
        )
    }
}

/// Get one run, ingesting it from the staging share on first request.
#[utoipa::path(
    get,
    path = "/api/v1/runs",
    tag = "Runs",
    params(GetRunQuery),
    responses(
        (status = 200, description = "Run with test results, system info and measurements", body = crate::models::TestRunResponse),
        (status = 400, description = "Missing host, pdc or runId", body = crate::error::ErrorResponse),
        (status = 404, description = "Run not found", body = crate::error::ErrorResponse),
        (status = 422, description = "Staged result document could not be parsed", body = crate::error::ErrorResponse),
    )
)]
pub async fn get_run(
    resolver: web::Data<RunResolver>,
    query: web::Query<GetRunQuery>,
) -> AppResult<HttpResponse> {
    let key = query.to_key()?;

    // Fires when the client disconnects and actix drops this future
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    match resolver.resolve(&key, &cancel).await? {
        Some(run) => Ok(HttpResponse::Ok().json(run.as_ref())),
        None => Err(AppError::NotFound(format!("Run {}", key))),
    }
}

/// List run summaries, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/runs/list",
    tag = "Runs",
    params(ListRunsQuery),
    responses(
        (status = 200, description = "Page of run summaries", body = crate::models::PagedRunsResponse),
        (status = 400, description = "Invalid date filter", body = crate::error::ErrorResponse),
    )
)]
pub async fn list_runs(
    resolver: web::Data<RunResolver>,
    query: web::Query<ListRunsQuery>,
) -> AppResult<HttpResponse> {
    let filter = query.to_filter()?;
    let response = resolver
        .list(query.clamped_page(), query.clamped_page_size(), &filter)
        .await?;

    Ok(HttpResponse::Ok().json(response))
}

/// Configure run routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/runs").route(web::get().to(get_run)))
        .service(web::resource("/runs/list").route(web::get().to(list_runs)));
}
