use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "learner_attendances")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub session_id: i32,
    pub learner_binding_id: i32,
    pub instructor_binding_id: Option<i32>,
    pub ingress_time: Option<DateTimeUtc>,
    pub egress_time: Option<DateTimeUtc>,
    pub state: AttendanceState,
    pub requires_review: bool,
    #[sea_orm(column_type = "Text")]
    pub adjustment_reason: String,
    #[sea_orm(column_type = "Text")]
    pub notes: String,
}

impl Model {
    /// Ingress registered, egress still pending.
    pub fn is_open(&self) -> bool {
        self.ingress_time.is_some() && self.egress_time.is_none()
    }

    pub fn is_complete(&self) -> bool {
        self.ingress_time.is_some() && self.egress_time.is_some()
    }
}

/// Attendance classification of a record.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendanceState {
    #[sea_orm(string_value = "")]
    Unset,
    #[sea_orm(string_value = "COMPLETE")]
    Complete,
    #[sea_orm(string_value = "PARTIAL")]
    Partial,
    #[sea_orm(string_value = "ABANDONED")]
    Abandoned,
    #[sea_orm(string_value = "REVIEW")]
    Review,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::attendance_session::Entity",
        from = "Column::SessionId",
        to = "super::attendance_session::Column::Id",
        on_delete = "Cascade"
    )]
    Session,
}

impl Related<super::attendance_session::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Session.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
