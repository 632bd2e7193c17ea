//! Compound access predicates that depend on the request shape.

use crate::authz::catalog::{
    ACT_MANAGE_INSTRUCTORS, ACT_MANAGE_LEARNERS, ACT_VIEW, ACT_VIEW_ALL, OBJ_ATTENDANCE,
    OBJ_CLASS, ROLE_SUPER_ADMIN,
};
use crate::authz::Enforcer;

/// `class:VIEW_ALL`, or `attendance:VIEW` when only the caller's classes are asked for.
pub fn list_classes(enforcer: &Enforcer, user: &str, mine: bool) -> bool {
    enforcer.enforce(user, OBJ_CLASS, ACT_VIEW_ALL)
        || (mine && enforcer.enforce(user, OBJ_ATTENDANCE, ACT_VIEW))
}

pub fn class_instructors(enforcer: &Enforcer, user: &str, is_get: bool) -> bool {
    enforcer.enforce(user, OBJ_CLASS, ACT_MANAGE_INSTRUCTORS)
        || (is_get && enforcer.enforce(user, OBJ_ATTENDANCE, ACT_VIEW))
}

pub fn class_learners(enforcer: &Enforcer, user: &str, is_get: bool) -> bool {
    enforcer.enforce(user, OBJ_CLASS, ACT_MANAGE_LEARNERS)
        || (is_get && enforcer.enforce(user, OBJ_ATTENDANCE, ACT_VIEW))
}

/// Holds the super administrator role itself, not merely its permissions.
pub fn super_admin(enforcer: &Enforcer, user: &str) -> bool {
    enforcer.has_role(user, ROLE_SUPER_ADMIN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::catalog::{ROLE_COORDINATOR, ROLE_INSTRUCTOR};
    use migration::MigratorTrait;
    use sea_orm::Database;
    use tempfile::NamedTempFile;

    async fn enforcer() -> (Enforcer, NamedTempFile) {
        let temp_file = NamedTempFile::new().expect("Failed to create temp file");
        let db_url = format!(
            "sqlite://{}?mode=rwc",
            temp_file.path().to_str().expect("Invalid temp file path")
        );
        let db = Database::connect(&db_url).await.expect("Failed to connect");
        migration::Migrator::up(&db, None)
            .await
            .expect("Failed to run migrations");
        let enforcer = Enforcer::load(db).await.expect("Failed to load enforcer");
        crate::authz::catalog::seed_role_permissions(&enforcer)
            .await
            .expect("Failed to seed");
        (enforcer, temp_file)
    }

    #[tokio::test]
    async fn test_list_classes_gate() {
        let (e, _tmp) = enforcer().await;
        e.add_role_for_user("10", ROLE_INSTRUCTOR).await.unwrap();
        e.add_role_for_user("11", ROLE_COORDINATOR).await.unwrap();

        assert!(!list_classes(&e, "10", false));
        assert!(list_classes(&e, "10", true));
        assert!(list_classes(&e, "11", false));
        assert!(!list_classes(&e, "12", true));
    }

    #[tokio::test]
    async fn test_roster_gates_only_widen_reads() {
        let (e, _tmp) = enforcer().await;
        e.add_role_for_user("10", ROLE_INSTRUCTOR).await.unwrap();

        assert!(class_instructors(&e, "10", true));
        assert!(!class_instructors(&e, "10", false));
        assert!(class_learners(&e, "10", true));
        assert!(!class_learners(&e, "10", false));

        e.add_direct_permission("10", OBJ_CLASS, ACT_MANAGE_LEARNERS)
            .await
            .unwrap();
        assert!(class_learners(&e, "10", false));
    }

    #[tokio::test]
    async fn test_super_admin_requires_role_grant() {
        let (e, _tmp) = enforcer().await;
        e.add_direct_permission("20", "*", "*").await.unwrap();
        assert!(e.enforce("20", OBJ_CLASS, ACT_VIEW_ALL));
        assert!(!super_admin(&e, "20"));

        e.add_role_for_user("21", ROLE_SUPER_ADMIN).await.unwrap();
        assert!(super_admin(&e, "21"));
    }
}
