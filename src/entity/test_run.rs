//! TestRun entity for SeaORM.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "test_runs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Composite key part 1 (unique together with `pdc` and `run_id`)
    pub host: String,
    pub pdc: String,
    pub run_id: String,
    pub start_time: DateTimeUtc,
    pub end_time: DateTimeUtc,
    pub overall_result: String,
    pub test_count: i32,
    pub passed_count: i32,
    pub failed_count: i32,
    pub skipped_count: i32,
    /// Raw primary result document. Never rendered by the API.
    #[sea_orm(column_type = "Text")]
    pub raw_json: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub raw_fingerprint_xml: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub specflow_log: Option<String>,
    pub archive_path: Option<String>,
    pub created_at: DateTimeUtc,
    pub import_status: String,
    pub is_deleted: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::test_result::Entity")]
    TestResults,
    #[sea_orm(has_one = "super::system_info::Entity")]
    SystemInfo,
    #[sea_orm(has_many = "super::measurement::Entity")]
    Measurements,
}

impl Related<super::test_result::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TestResults.def()
    }
}

impl Related<super::system_info::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SystemInfo.def()
    }
}

impl Related<super::measurement::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Measurements.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
