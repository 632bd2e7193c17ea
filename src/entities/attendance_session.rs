use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "attendance_sessions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub instructor_binding_id: i32,
    pub class_id: i32,
    /// UTC midnight of the calendar day the session belongs to.
    pub session_date: DateTimeUtc,
    pub start_time: DateTimeUtc,
    pub end_time: Option<DateTimeUtc>,
    pub finished: bool,
    #[sea_orm(column_type = "Text")]
    pub notes: String,
    pub evidence_id: Option<i32>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::learner_attendance::Entity")]
    Records,
}

impl Related<super::learner_attendance::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Records.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
