//! Migration: Create system_infos table.

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
                    .table(SystemInfos::Table)
                    .if_not_exists()
                    .col(pk_uuid(SystemInfos::Id))
                    .col(uuid(SystemInfos::TestRunId))
                    .col(string_len(SystemInfos::SystemName, 256))
                    .col(string_len(SystemInfos::Stm, 64))
                    .col(string_len(SystemInfos::MsiVersion, 64))
                    .col(string_len(SystemInfos::PdcVersion, 64))
                    .col(string_len(SystemInfos::MonoplaneOrBiplane, 64))
                    .col(string_len(SystemInfos::FrontalStandType, 128))
                    .col(string_len(SystemInfos::TableType, 128))
                    .col(string_len(SystemInfos::TableTopType, 128))
                    .col(string_len(SystemInfos::DetectorNameFrontal, 128))
                    .col(string_len(SystemInfos::DetectorNameLateral, 128))
                    .col(string_len(SystemInfos::SystemType, 256))
                    .col(string_len(SystemInfos::ProductFamily, 128))
                    .col(string_len(SystemInfos::DetectorType, 128))
                    .col(string_len(SystemInfos::LateralStandType, 128))
                    .col(string_len(SystemInfos::SystemConfigType, 64))
                    .col(text(SystemInfos::RawXml))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_system_infos_test_run_id")
                            .from(SystemInfos::Table, SystemInfos::TestRunId)
                            .to(TestRuns::Table, TestRuns::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // At most one system info per run
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_system_infos_test_run_id")
                    .table(SystemInfos::Table)
                    .col(SystemInfos::TestRunId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SystemInfos::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum SystemInfos {
    Table,
    Id,
    TestRunId,
    SystemName,
    Stm,
    MsiVersion,
    PdcVersion,
    MonoplaneOrBiplane,
    FrontalStandType,
    TableType,
    TableTopType,
    DetectorNameFrontal,
    DetectorNameLateral,
    SystemType,
    ProductFamily,
    DetectorType,
    LateralStandType,
    SystemConfigType,
    RawXml,
}
