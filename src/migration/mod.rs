//! SeaORM database migrations.

pub use sea_orm_migration::prelude::*;

mod m20260218_000001_create_test_runs;
mod m20260218_000002_create_test_results;
mod m20260218_000003_create_system_infos;
mod m20260218_000004_create_measurements;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260218_000001_create_test_runs::Migration),
            Box::new(m20260218_000002_create_test_results::Migration),
            Box::new(m20260218_000003_create_system_infos::Migration),
            Box::new(m20260218_000004_create_measurements::Migration),
        ]
    }
}
