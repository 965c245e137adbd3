//! HTTP route tests for run lookup and listing.

use actix_web::{App, dev::ServiceResponse, test, web};
use result_viewer_lib::api;
use result_viewer_lib::config::CORRELATION_ID_HEADER;
use result_viewer_lib::middleware::RequestLogger;
use serde_json::Value;

use super::test_helpers::*;

async fn create_test_app(
    env: &TestEnv,
) -> impl actix_web::dev::Service<actix_http::Request, Response = ServiceResponse, Error = actix_web::Error>
{
    let resolver = env.resolver(env.staging());

    test::init_service(
        App::new()
            .wrap(RequestLogger)
            .app_data(web::Data::from(env.pool.clone()))
            .app_data(web::Data::new(resolver))
            .service(
                web::scope("/api/v1")
                    .configure(api::configure_health_routes)
                    .configure(api::configure_run_routes),
            ),
    )
    .await
}

async fn get_json<S>(app: &S, uri: &str) -> (u16, Value)
where
    S: actix_web::dev::Service<
            actix_http::Request,
            Response = ServiceResponse,
            Error = actix_web::Error,
        >,
{
    let req = test::TestRequest::get().uri(uri).to_request();
    let resp = test::call_service(app, req).await;
    let status = resp.status().as_u16();
    let body: Value = test::read_body_json(resp).await;
    (status, body)
}

#[actix_rt::test]
async fn test_get_run_ingests_staged_run() {
    let env = TestEnv::new().await;
    let app = create_test_app(&env).await;
    env.stage_run(&key("host-a", "pdc-1", "r1"), RESULT_XML);

    let (status, body) = get_json(&app, "/api/v1/runs?host=host-a&pdc=pdc-1&runId=r1").await;

    assert_eq!(status, 200, "unexpected body: {}", body);
    assert_eq!(body["runId"], "r1");
    assert_eq!(body["overallResult"], "Failed");
    assert_eq!(body["testCount"], 2);
    assert_eq!(body["rawJson"], "");
    assert_eq!(body["importStatus"], "Imported");
    assert_eq!(body["indexedResults"].as_array().unwrap().len(), 2);
    assert_eq!(body["systemInfo"]["systemName"], "Suite 4");
    assert_eq!(body["measurements"][0]["measurementName"], "TubeCurrent");
}

#[actix_rt::test]
async fn test_get_run_not_found() {
    let env = TestEnv::new().await;
    let app = create_test_app(&env).await;

    let (status, body) = get_json(&app, "/api/v1/runs?host=h&pdc=p&runId=nope").await;
    assert_eq!(status, 404);
    assert_eq!(body["error"], "NOT_FOUND");
}

#[actix_rt::test]
async fn test_get_run_requires_all_key_parts() {
    let env = TestEnv::new().await;
    let app = create_test_app(&env).await;

    let (status, body) = get_json(&app, "/api/v1/runs?host=h&runId=r").await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "INVALID_INPUT");
}

#[actix_rt::test]
async fn test_get_run_with_broken_document_is_unprocessable() {
    let env = TestEnv::new().await;
    let app = create_test_app(&env).await;
    env.stage_run(&key("h", "p", "bad"), "<test-run>");

    let (status, body) = get_json(&app, "/api/v1/runs?host=h&pdc=p&runId=bad").await;
    assert_eq!(status, 422);
    assert_eq!(body["error"], "PARSE_ERROR");
}

#[actix_rt::test]
async fn test_list_runs_clamps_paging() {
    let env = TestEnv::new().await;
    let repo = env.repository();
    for day in 1..=3 {
        repo.upsert(&sample_run(&key("h", "p", &format!("r{}", day)), at(2024, 4, day), 1))
            .await
            .unwrap();
    }
    let app = create_test_app(&env).await;

    let (status, body) = get_json(&app, "/api/v1/runs/list?page=0&pageSize=0").await;
    assert_eq!(status, 200);
    assert_eq!(body["page"], 1);
    assert_eq!(body["pageSize"], 20);
    assert_eq!(body["totalCount"], 3);
    assert_eq!(body["totalPages"], 1);
    assert_eq!(body["items"][0]["runId"], "r3");
    assert!(body["items"][0].get("rawJson").is_none());

    let (_, body) = get_json(&app, "/api/v1/runs/list?pageSize=500").await;
    assert_eq!(body["pageSize"], 100);

    let (_, body) = get_json(&app, "/api/v1/runs/list?page=2&pageSize=2").await;
    assert_eq!(body["totalPages"], 2);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
}

#[actix_rt::test]
async fn test_list_runs_with_huge_page_is_empty() {
    let env = TestEnv::new().await;
    env.repository()
        .upsert(&sample_run(&key("h", "p", "r1"), at(2024, 4, 1), 1))
        .await
        .unwrap();
    let app = create_test_app(&env).await;

    let (status, body) = get_json(
        &app,
        "/api/v1/runs/list?page=9223372036854775807&pageSize=100",
    )
    .await;
    assert_eq!(status, 200, "unexpected body: {}", body);
    assert_eq!(body["totalCount"], 1);
    assert!(body["items"].as_array().unwrap().is_empty());
}

#[actix_rt::test]
async fn test_list_runs_rejects_bad_dates() {
    let env = TestEnv::new().await;
    let app = create_test_app(&env).await;

    let (status, _) = get_json(&app, "/api/v1/runs/list?fromDate=yesterday").await;
    assert_eq!(status, 400);

    let (status, body) = get_json(&app, "/api/v1/runs/list?fromDate=2024-01-01&toDate=2024-12-31").await;
    assert_eq!(status, 200);
    assert_eq!(body["totalCount"], 0);
}

#[actix_rt::test]
async fn test_health_and_ready() {
    let env = TestEnv::new().await;
    let app = create_test_app(&env).await;

    let (status, body) = get_json(&app, "/api/v1/health").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "up");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert!(body["checkedAt"].is_string());

    let (status, body) = get_json(&app, "/api/v1/ready").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ready");
    assert_eq!(body["runStore"], "sqlite");
}

#[actix_rt::test]
async fn test_correlation_id_round_trip() {
    let env = TestEnv::new().await;
    let app = create_test_app(&env).await;

    let req = test::TestRequest::get()
        .uri("/api/v1/health")
        .insert_header((CORRELATION_ID_HEADER, "corr-123"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.headers().get(CORRELATION_ID_HEADER).unwrap(), "corr-123");
}
