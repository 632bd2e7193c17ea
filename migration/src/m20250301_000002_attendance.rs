use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Evidences::Table)
                    .if_not_exists()
                    .col(pk_auto(Evidences::Id))
                    .col(string(Evidences::Code))
                    .col(string(Evidences::Name))
                    .col(timestamp_with_time_zone(Evidences::CreatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AttendanceSessions::Table)
                    .if_not_exists()
                    .col(pk_auto(AttendanceSessions::Id))
                    .col(integer(AttendanceSessions::InstructorBindingId))
                    .col(integer(AttendanceSessions::ClassId))
                    .col(timestamp_with_time_zone(AttendanceSessions::SessionDate))
                    .col(timestamp_with_time_zone(AttendanceSessions::StartTime))
                    .col(timestamp_with_time_zone_null(AttendanceSessions::EndTime))
                    .col(boolean(AttendanceSessions::Finished).default(false))
                    .col(text(AttendanceSessions::Notes).default(""))
                    .col(integer_null(AttendanceSessions::EvidenceId))
                    .col(timestamp_with_time_zone(AttendanceSessions::CreatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_sessions_binding")
                            .from(
                                AttendanceSessions::Table,
                                AttendanceSessions::InstructorBindingId,
                            )
                            .to(InstructorClassBindings::Table, InstructorClassBindings::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_sessions_class")
                            .from(AttendanceSessions::Table, AttendanceSessions::ClassId)
                            .to(Classes::Table, Classes::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_sessions_evidence")
                            .from(AttendanceSessions::Table, AttendanceSessions::EvidenceId)
                            .to(Evidences::Table, Evidences::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_sessions_class_date")
                    .table(AttendanceSessions::Table)
                    .col(AttendanceSessions::ClassId)
                    .col(AttendanceSessions::SessionDate)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_sessions_binding")
                    .table(AttendanceSessions::Table)
                    .col(AttendanceSessions::InstructorBindingId)
                    .to_owned(),
            )
            .await?;

        // At most one non-finished session per class.
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX IF NOT EXISTS uq_sessions_open_class \
                 ON attendance_sessions (class_id) WHERE finished = false",
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(LearnerAttendances::Table)
                    .if_not_exists()
                    .col(pk_auto(LearnerAttendances::Id))
                    .col(integer(LearnerAttendances::SessionId))
                    .col(integer(LearnerAttendances::LearnerBindingId))
                    .col(integer_null(LearnerAttendances::InstructorBindingId))
                    .col(timestamp_with_time_zone_null(LearnerAttendances::IngressTime))
                    .col(timestamp_with_time_zone_null(LearnerAttendances::EgressTime))
                    .col(string_len(LearnerAttendances::State, 16).default(""))
                    .col(boolean(LearnerAttendances::RequiresReview).default(false))
                    .col(text(LearnerAttendances::AdjustmentReason).default(""))
                    .col(text(LearnerAttendances::Notes).default(""))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_records_session")
                            .from(LearnerAttendances::Table, LearnerAttendances::SessionId)
                            .to(AttendanceSessions::Table, AttendanceSessions::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_records_learner_binding")
                            .from(
                                LearnerAttendances::Table,
                                LearnerAttendances::LearnerBindingId,
                            )
                            .to(LearnerClassBindings::Table, LearnerClassBindings::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("uq_records_session_learner")
                    .table(LearnerAttendances::Table)
                    .col(LearnerAttendances::SessionId)
                    .col(LearnerAttendances::LearnerBindingId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_records_learner")
                    .table(LearnerAttendances::Table)
                    .col(LearnerAttendances::LearnerBindingId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(LearnerAttendances::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AttendanceSessions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Evidences::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Evidences {
    Table,
    Id,
    Code,
    Name,
    CreatedAt,
}

#[derive(DeriveIden)]
enum AttendanceSessions {
    Table,
    Id,
    InstructorBindingId,
    ClassId,
    SessionDate,
    StartTime,
    EndTime,
    Finished,
    Notes,
    EvidenceId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum LearnerAttendances {
    Table,
    Id,
    SessionId,
    LearnerBindingId,
    InstructorBindingId,
    IngressTime,
    EgressTime,
    State,
    RequiresReview,
    AdjustmentReason,
    Notes,
}

#[derive(DeriveIden)]
enum InstructorClassBindings {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum LearnerClassBindings {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Classes {
    Table,
    Id,
}
