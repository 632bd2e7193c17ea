use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "instructor_class_bindings")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub instructor_id: i32,
    pub class_id: i32,
    pub competency_id: Option<i32>,
    pub start_date: Option<Date>,
    pub end_date: Option<Date>,
    pub hour_budget: Option<i32>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
