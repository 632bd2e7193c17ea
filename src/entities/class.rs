use sea_orm::entity::prelude::*;

/// A training cohort ("ficha").
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "classes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub code: String,
    pub lead_instructor_id: Option<i32>,
    pub site_id: Option<i32>,
    pub shift_id: Option<i32>,
    pub venue: Option<String>,
    pub start_date: Option<Date>,
    pub end_date: Option<Date>,
    pub active: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
