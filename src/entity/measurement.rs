//! Measurement entity extracted from the system fingerprint document.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "measurements")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub test_run_id: Uuid,
    pub test_name: String,
    pub measurement_name: String,
    pub result: String,
    pub measurement_unit: Option<String>,
    pub description: Option<String>,
    pub measured_value: Option<String>,
    pub spec_error_upper: Option<String>,
    pub spec_error_lower: Option<String>,
    pub spec_warning_upper: Option<String>,
    pub spec_warning_lower: Option<String>,
    pub sequence: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::test_run::Entity",
        from = "Column::TestRunId",
        to = "super::test_run::Column::Id",
        on_delete = "Cascade"
    )]
    TestRun,
}

impl Related<super::test_run::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TestRun.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
