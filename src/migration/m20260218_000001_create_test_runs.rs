//! Migration: Create test_runs table.
//!
//! Root row of a run, unique on (host, pdc, run_id) regardless of soft-delete state.

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TestRuns::Table)
                    .if_not_exists()
                    .col(pk_uuid(TestRuns::Id))
                    .col(string_len(TestRuns::Host, 256))
                    .col(string_len(TestRuns::Pdc, 256))
                    .col(string_len(TestRuns::RunId, 256))
                    .col(timestamp_with_time_zone(TestRuns::StartTime))
                    .col(timestamp_with_time_zone(TestRuns::EndTime))
                    .col(string_len(TestRuns::OverallResult, 64))
                    .col(integer(TestRuns::TestCount).default(0))
                    .col(integer(TestRuns::PassedCount).default(0))
                    .col(integer(TestRuns::FailedCount).default(0))
                    .col(integer(TestRuns::SkippedCount).default(0))
                    .col(text(TestRuns::RawJson))
                    .col(text_null(TestRuns::RawFingerprintXml))
                    .col(text_null(TestRuns::SpecflowLog))
                    .col(string_len_null(TestRuns::ArchivePath, 1024))
                    .col(timestamp_with_time_zone(TestRuns::CreatedAt))
                    .col(string_len(TestRuns::ImportStatus, 64))
                    .col(boolean(TestRuns::IsDeleted).default(false))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_test_runs_host_pdc_run_id")
                    .table(TestRuns::Table)
                    .col(TestRuns::Host)
                    .col(TestRuns::Pdc)
                    .col(TestRuns::RunId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // List view ordering
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_test_runs_start_time")
                    .table(TestRuns::Table)
                    .col(TestRuns::StartTime)
                    .to_owned(),
            )
            .await?;

        // Retention sweeps
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_test_runs_created_at")
                    .table(TestRuns::Table)
                    .col(TestRuns::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_test_runs_is_deleted")
                    .table(TestRuns::Table)
                    .col(TestRuns::IsDeleted)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TestRuns::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
pub(super) enum TestRuns {
    Table,
    Id,
    Host,
    Pdc,
    RunId,
    StartTime,
    EndTime,
    OverallResult,
    TestCount,
    PassedCount,
    FailedCount,
    SkippedCount,
    RawJson,
    RawFingerprintXml,
    SpecflowLog,
    ArchivePath,
    CreatedAt,
    ImportStatus,
    IsDeleted,
}
