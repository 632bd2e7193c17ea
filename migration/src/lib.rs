pub use sea_orm_migration::prelude::*;

mod m20250301_000001_people_and_classes;
mod m20250301_000002_attendance;
mod m20250301_000003_policy_rules;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_people_and_classes::Migration),
            Box::new(m20250301_000002_attendance::Migration),
            Box::new(m20250301_000003_policy_rules::Migration),
        ]
    }
}
