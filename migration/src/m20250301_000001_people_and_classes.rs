use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        if manager.get_database_backend() == sea_orm::DatabaseBackend::Sqlite {
            manager
                .get_connection()
                .execute_unprepared("PRAGMA foreign_keys = ON")
                .await?;
        }

        manager
            .create_table(
                Table::create()
                    .table(Persons::Table)
                    .if_not_exists()
                    .col(pk_auto(Persons::Id))
                    .col(string_uniq(Persons::DocumentNumber))
                    .col(string(Persons::FirstName))
                    .col(string_null(Persons::SecondName))
                    .col(string(Persons::FirstSurname))
                    .col(string_null(Persons::SecondSurname))
                    .col(string_null(Persons::Email))
                    .col(boolean(Persons::Active).default(true))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(pk_auto(Users::Id))
                    .col(string_uniq(Users::Email))
                    .col(boolean(Users::Active).default(true))
                    .col(integer_null(Users::PersonId))
                    .col(timestamp_with_time_zone(Users::CreatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_users_person")
                            .from(Users::Table, Users::PersonId)
                            .to(Persons::Table, Persons::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Sites::Table)
                    .if_not_exists()
                    .col(pk_auto(Sites::Id))
                    .col(string(Sites::Name))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Shifts::Table)
                    .if_not_exists()
                    .col(pk_auto(Shifts::Id))
                    .col(string(Shifts::Name))
                    // "HH:MM"; null falls back to the named default window
                    .col(string_null(Shifts::StartTime))
                    .col(string_null(Shifts::EndTime))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Instructors::Table)
                    .if_not_exists()
                    .col(pk_auto(Instructors::Id))
                    .col(integer_uniq(Instructors::PersonId))
                    .col(boolean(Instructors::Active).default(true))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_instructors_person")
                            .from(Instructors::Table, Instructors::PersonId)
                            .to(Persons::Table, Persons::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Classes::Table)
                    .if_not_exists()
                    .col(pk_auto(Classes::Id))
                    .col(string_uniq(Classes::Code))
                    .col(integer_null(Classes::LeadInstructorId))
                    .col(integer_null(Classes::SiteId))
                    .col(integer_null(Classes::ShiftId))
                    .col(string_null(Classes::Venue))
                    .col(date_null(Classes::StartDate))
                    .col(date_null(Classes::EndDate))
                    .col(boolean(Classes::Active).default(true))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_classes_lead_instructor")
                            .from(Classes::Table, Classes::LeadInstructorId)
                            .to(Instructors::Table, Instructors::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_classes_site")
                            .from(Classes::Table, Classes::SiteId)
                            .to(Sites::Table, Sites::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_classes_shift")
                            .from(Classes::Table, Classes::ShiftId)
                            .to(Shifts::Table, Shifts::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(InstructorClassBindings::Table)
                    .if_not_exists()
                    .col(pk_auto(InstructorClassBindings::Id))
                    .col(integer(InstructorClassBindings::InstructorId))
                    .col(integer(InstructorClassBindings::ClassId))
                    .col(integer_null(InstructorClassBindings::CompetencyId))
                    .col(date_null(InstructorClassBindings::StartDate))
                    .col(date_null(InstructorClassBindings::EndDate))
                    .col(integer_null(InstructorClassBindings::HourBudget))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_icb_instructor")
                            .from(
                                InstructorClassBindings::Table,
                                InstructorClassBindings::InstructorId,
                            )
                            .to(Instructors::Table, Instructors::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_icb_class")
                            .from(
                                InstructorClassBindings::Table,
                                InstructorClassBindings::ClassId,
                            )
                            .to(Classes::Table, Classes::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("uq_icb_instructor_class")
                    .table(InstructorClassBindings::Table)
                    .col(InstructorClassBindings::InstructorId)
                    .col(InstructorClassBindings::ClassId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(LearnerClassBindings::Table)
                    .if_not_exists()
                    .col(pk_auto(LearnerClassBindings::Id))
                    .col(integer(LearnerClassBindings::PersonId))
                    .col(integer(LearnerClassBindings::ClassId))
                    .col(boolean(LearnerClassBindings::Active).default(true))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_lcb_person")
                            .from(LearnerClassBindings::Table, LearnerClassBindings::PersonId)
                            .to(Persons::Table, Persons::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_lcb_class")
                            .from(LearnerClassBindings::Table, LearnerClassBindings::ClassId)
                            .to(Classes::Table, Classes::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_lcb_class")
                    .table(LearnerClassBindings::Table)
                    .col(LearnerClassBindings::ClassId)
                    .to_owned(),
            )
            .await?;

        // At most one active binding per (person, class).
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX IF NOT EXISTS uq_lcb_active_person_class \
                 ON learner_class_bindings (person_id, class_id) WHERE active = true",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(LearnerClassBindings::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(InstructorClassBindings::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Classes::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Instructors::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Shifts::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Sites::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Persons::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Persons {
    Table,
    Id,
    DocumentNumber,
    FirstName,
    SecondName,
    FirstSurname,
    SecondSurname,
    Email,
    Active,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    Email,
    Active,
    PersonId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Sites {
    Table,
    Id,
    Name,
}

#[derive(DeriveIden)]
enum Shifts {
    Table,
    Id,
    Name,
    StartTime,
    EndTime,
}

#[derive(DeriveIden)]
enum Instructors {
    Table,
    Id,
    PersonId,
    Active,
}

#[derive(DeriveIden)]
enum Classes {
    Table,
    Id,
    Code,
    LeadInstructorId,
    SiteId,
    ShiftId,
    Venue,
    StartDate,
    EndDate,
    Active,
}

#[derive(DeriveIden)]
enum InstructorClassBindings {
    Table,
    Id,
    InstructorId,
    ClassId,
    CompetencyId,
    StartDate,
    EndDate,
    HourBudget,
}

#[derive(DeriveIden)]
enum LearnerClassBindings {
    Table,
    Id,
    PersonId,
    ClassId,
    Active,
}
