//! TestResult entity: one leaf test case outcome of a run.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "test_results")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub test_run_id: Uuid,
    pub test_name: String,
    pub result: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,
    /// Captured console output of the test case
    #[sea_orm(column_type = "Text", nullable)]
    pub output: Option<String>,
    pub duration_seconds: f64,
    /// Document order within the run
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
