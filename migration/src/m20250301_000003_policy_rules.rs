use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ptype: "g" (user, role, -), "p" (role, obj, act), "p2" (user, obj, act)
        manager
            .create_table(
                Table::create()
                    .table(PolicyRules::Table)
                    .if_not_exists()
                    .col(pk_auto(PolicyRules::Id))
                    .col(string_len(PolicyRules::Ptype, 8))
                    .col(string(PolicyRules::V0))
                    .col(string(PolicyRules::V1))
                    .col(string(PolicyRules::V2).default(""))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("uq_policy_rules_tuple")
                    .table(PolicyRules::Table)
                    .col(PolicyRules::Ptype)
                    .col(PolicyRules::V0)
                    .col(PolicyRules::V1)
                    .col(PolicyRules::V2)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PolicyRules::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum PolicyRules {
    Table,
    Id,
    Ptype,
    V0,
    V1,
    V2,
}
