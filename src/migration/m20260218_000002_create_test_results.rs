//! Migration: Create test_results table.
//!
//! Leaf test case outcomes, replaced wholesale whenever the parent run is re-ingested.

use sea_orm_migration::{prelude::*, schema::*};

use super::m20260218_000001_create_test_runs::TestRuns;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TestResults::Table)
                    .if_not_exists()
                    .col(pk_uuid(TestResults::Id))
                    .col(uuid(TestResults::TestRunId))
                    .col(string_len(TestResults::TestName, 512))
                    .col(string_len(TestResults::Result, 64))
                    .col(text_null(TestResults::ErrorMessage))
                    .col(text_null(TestResults::Output))
                    .col(double(TestResults::DurationSeconds).default(0.0))
                    .col(integer(TestResults::Sequence).default(0))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_test_results_test_run_id")
                            .from(TestResults::Table, TestResults::TestRunId)
                            .to(TestRuns::Table, TestRuns::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_test_results_test_run_id")
                    .table(TestResults::Table)
                    .col(TestResults::TestRunId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TestResults::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum TestResults {
    Table,
    Id,
    TestRunId,
    TestName,
    Result,
    ErrorMessage,
    Output,
    DurationSeconds,
    Sequence,
}
