//! Database module providing connection management, migrations, and run persistence.

pub mod test_runs;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use tracing::info;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::migration::Migrator;
use crate::models::{RunKey, RunListFilter, TestRun, TestRunSummary};

/// Persistence operations on the run aggregate.
#[async_trait]
pub trait RunRepository: Send + Sync {
    /// Load a non-deleted run with all of its children.
    async fn get_by_key(&self, key: &RunKey) -> AppResult<Option<TestRun>>;

    /// One page of non-deleted run summaries, newest start time first, plus the total match count.
    ///
    /// `page` and `page_size` are expected to be clamped already.
    async fn list_paged(
        &self,
        page: u64,
        page_size: u64,
        filter: &RunListFilter,
    ) -> AppResult<(Vec<TestRunSummary>, u64)>;

    /// Insert the run, or overwrite the existing row with the same key (reviving it)
    /// and replace all of its children. Returns the persisted run id.
    async fn upsert(&self, run: &TestRun) -> AppResult<Uuid>;

    /// Flag non-deleted runs created before `cutoff` as deleted.
    async fn soft_delete_expired(&self, cutoff: DateTime<Utc>) -> AppResult<u64>;

    /// Permanently remove runs created before `cutoff`, deleted or not.
    async fn delete_expired(&self, cutoff: DateTime<Utc>) -> AppResult<u64>;
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct DbPool {
    conn: DatabaseConnection,
}

impl DbPool {
    /// Connect using the configured URL and pool size.
    pub async fn new(config: &Config) -> AppResult<Self> {
        let mut options = ConnectOptions::new(config.database_url.clone());
        options
            .max_connections(config.db_max_connections)
            .sqlx_logging(false);

        let conn = Database::connect(options)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to database: {}", e)))?;

        Ok(DbPool { conn })
    }

    /// Wrap an existing connection.
    pub fn from_connection(conn: DatabaseConnection) -> Self {
        DbPool { conn }
    }

    /// Get access to the connection for executing queries.
    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Apply all pending migrations.
    pub async fn run_migrations(&self) -> AppResult<()> {
        Migrator::up(&self.conn, None)
            .await
            .map_err(|e| AppError::Database(format!("Failed to run migrations: {}", e)))?;
        info!("Database migrations complete");
        Ok(())
    }
}
