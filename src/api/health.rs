//! Liveness and readiness of the result viewer.
//!
//! Liveness never touches the run store. Readiness asks the store for a
//! trivial row so a load balancer stops routing lookups the server cannot
//! answer.

use actix_web::{HttpResponse, get, web};
use chrono::{DateTime, Utc};
use sea_orm::{ConnectionTrait, DatabaseBackend, Statement};
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::DbPool;
use crate::error::ErrorResponse;

/// The server process is up.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LivenessResponse {
    status: &'static str,
    version: &'static str,
    checked_at: DateTime<Utc>,
}

/// The run store answered.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessResponse {
    status: &'static str,
    run_store: &'static str,
}

fn backend_name(backend: DatabaseBackend) -> &'static str {
    match backend {
        DatabaseBackend::Postgres => "postgres",
        DatabaseBackend::Sqlite => "sqlite",
        _ => "other",
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "Health",
    responses(
        (status = 200, description = "Server process is up", body = LivenessResponse)
    )
)]
#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(LivenessResponse {
        status: "up",
        version: env!("CARGO_PKG_VERSION"),
        checked_at: Utc::now(),
    })
}

/// Ready once the run store answers `SELECT 1`.
#[utoipa::path(
    get,
    path = "/api/v1/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Run store reachable", body = ReadinessResponse),
        (status = 503, description = "Run store unreachable", body = ErrorResponse)
    )
)]
#[get("/ready")]
pub async fn ready(pool: web::Data<DbPool>) -> HttpResponse {
    let conn = pool.connection();
    let backend = conn.get_database_backend();
    let stmt = Statement::from_string(backend, "SELECT 1".to_owned());

    match conn.query_one_raw(stmt).await {
        Ok(_) => HttpResponse::Ok().json(ReadinessResponse {
            status: "ready",
            run_store: backend_name(backend),
        }),
        Err(e) => {
            tracing::warn!(backend = backend_name(backend), error = %e, "Run store did not answer");
            HttpResponse::ServiceUnavailable().json(ErrorResponse {
                error: "RUN_STORE_UNAVAILABLE".to_string(),
                message: "Run store is not reachable".to_string(),
            })
        }
    }
}

/// Register `/health` and `/ready`.
pub fn configure_health_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health).service(ready);
}
