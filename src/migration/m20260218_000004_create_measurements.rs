//! Migration: Create measurements table.
//!
//! Fingerprint readings with their error/warning spec ranges.

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
                    .table(Measurements::Table)
                    .if_not_exists()
                    .col(pk_uuid(Measurements::Id))
                    .col(uuid(Measurements::TestRunId))
                    .col(string_len(Measurements::TestName, 512))
                    .col(string_len(Measurements::MeasurementName, 512))
                    .col(string_len(Measurements::Result, 64))
                    .col(string_len_null(Measurements::MeasurementUnit, 64))
                    .col(string_len_null(Measurements::Description, 1024))
                    .col(string_len_null(Measurements::MeasuredValue, 256))
                    .col(string_len_null(Measurements::SpecErrorUpper, 64))
                    .col(string_len_null(Measurements::SpecErrorLower, 64))
                    .col(string_len_null(Measurements::SpecWarningUpper, 64))
                    .col(string_len_null(Measurements::SpecWarningLower, 64))
                    .col(integer(Measurements::Sequence).default(0))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_measurements_test_run_id")
                            .from(Measurements::Table, Measurements::TestRunId)
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
                    .name("idx_measurements_test_run_id")
                    .table(Measurements::Table)
                    .col(Measurements::TestRunId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Measurements::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Measurements {
    Table,
    Id,
    TestRunId,
    TestName,
    MeasurementName,
    Result,
    MeasurementUnit,
    Description,
    MeasuredValue,
    SpecErrorUpper,
    SpecErrorLower,
    SpecWarningUpper,
    SpecWarningLower,
    Sequence,
}
