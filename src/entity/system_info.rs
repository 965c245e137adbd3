//! SystemInfo entity (at most one per run).

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "system_infos")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub test_run_id: Uuid,
    pub system_name: String,
    pub stm: String,
    pub msi_version: String,
    pub pdc_version: String,
    pub monoplane_or_biplane: String,
    pub frontal_stand_type: String,
    pub table_type: String,
    pub table_top_type: String,
    pub detector_name_frontal: String,
    pub detector_name_lateral: String,
    pub system_type: String,
    pub product_family: String,
    pub detector_type: String,
    pub lateral_stand_type: String,
    pub system_config_type: String,
    #[sea_orm(column_type = "Text")]
    pub raw_xml: String,
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
