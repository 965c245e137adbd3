//! Result viewer server - main entry point.
//!
//! Starts the Actix-web server with configured routes, middleware and the
//! retention background task.

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, http::header, web};
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use result_viewer_lib::api;
use result_viewer_lib::config::{CORRELATION_ID_HEADER, Config};
use result_viewer_lib::db::{DbPool, RunRepository};
use result_viewer_lib::middleware::RequestLogger;
use result_viewer_lib::services::{
    RetentionSweeper, RunCache, RunResolver, RunStaging, StagingFileSystem, start_retention_task,
};

/// Perform health check (for Docker healthcheck).
fn health_check() -> bool {
    Config::from_env().is_ok()
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Check for --health-check flag (used by Docker HEALTHCHECK)
    if std::env::args().any(|arg| arg == "--health-check") {
        dotenvy::dotenv().ok();
        std::process::exit(if health_check() { 0 } else { 1 });
    }

    dotenvy::dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).map_err(std::io::Error::other)?;

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            error!("");
            error!("Please check your environment variables:");
            error!("  - RUST_ENV must be set to 'development' or 'production'");
            error!("  - In production, DATABASE_URL, RRV_STAGING_ROOT and RRV_ARCHIVE_ROOT must be set");
            error!("  - In production, values must not match development defaults");
            std::process::exit(1);
        }
    };

    info!("========================================");
    info!("  Result Viewer Server");
    info!("  Environment: {}", config.environment);
    info!("========================================");

    if config.is_development() {
        warn!("Running in DEVELOPMENT mode - do not use in production!");
    }

    let pool = DbPool::new(&config).await.map_err(std::io::Error::other)?;
    info!("Database connection established");
    pool.run_migrations().await.map_err(std::io::Error::other)?;

    let pool = Arc::new(pool);
    let repository: Arc<dyn RunRepository> = pool.clone();

    info!(
        staging_root = %config.staging.staging_root.display(),
        archive_root = %config.staging.archive_root.display(),
        "Staging share configured"
    );
    let staging: Arc<dyn RunStaging> = Arc::new(StagingFileSystem::new(config.staging.clone()));
    let cache = RunCache::new(&config.cache);
    let resolver = web::Data::new(RunResolver::new(repository.clone(), staging, cache));

    // Retention runs until the server stops
    let shutdown = CancellationToken::new();
    let sweeper = Arc::new(RetentionSweeper::new(
        repository,
        config.staging.archive_root.clone(),
        config.retention,
    ));
    let retention_task = start_retention_task(sweeper, shutdown.clone());

    let bind_address = config.bind_address();
    let is_development = config.is_development();
    let pool_data = web::Data::from(pool);

    let worker_count = if is_development {
        info!(
            "Starting server at http://{} (4 workers - development mode)",
            bind_address
        );
        4
    } else {
        let cpus = num_cpus::get();
        info!(
            "Starting server at http://{} ({} workers)",
            bind_address, cpus
        );
        cpus
    };

    let openapi = api::ApiDoc::openapi();

    let server = HttpServer::new(move || {
        let cors = if is_development {
            Cors::default()
                .allowed_origin("http://localhost:3000")
                .allowed_origin("http://127.0.0.1:3000")
                .allowed_methods(vec!["GET", "OPTIONS"])
                .allowed_headers(vec![header::ACCEPT, header::CONTENT_TYPE])
                .allowed_header(CORRELATION_ID_HEADER)
                .expose_headers(vec![CORRELATION_ID_HEADER])
                .max_age(3600)
        } else {
            // Same-origin only
            Cors::default()
                .allowed_methods(vec!["GET", "OPTIONS"])
                .allowed_headers(vec![header::ACCEPT, header::CONTENT_TYPE])
                .allowed_header(CORRELATION_ID_HEADER)
                .max_age(3600)
        };

        App::new()
            // CORS must wrap outermost
            .wrap(cors)
            .wrap(RequestLogger)
            .app_data(pool_data.clone())
            .app_data(resolver.clone())
            .service(
                web::scope("/api/v1")
                    .configure(api::configure_health_routes)
                    .configure(api::configure_run_routes),
            )
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", openapi.clone()),
            )
    });

    let result = server
        .workers(worker_count)
        .bind(&bind_address)?
        .run()
        .await;

    shutdown.cancel();
    if let Err(e) = retention_task.await {
        warn!("Retention task ended abnormally: {}", e);
    }
    info!("Server stopped");

    result
}
