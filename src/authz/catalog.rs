//! Fixed roles, the permission catalog, and the default role permissions.

use serde::Serialize;

use crate::authz::enforcer::Enforcer;
use crate::authz::errors::AuthzError;
use crate::authz::types::WILDCARD;

pub const ROLE_SUPER_ADMIN: &str = "SUPER ADMINISTRATOR";
pub const ROLE_ADMIN: &str = "ADMINISTRATOR";
pub const ROLE_COORDINATOR: &str = "COORDINATOR";
pub const ROLE_INSTRUCTOR: &str = "INSTRUCTOR";
pub const ROLE_LEARNER: &str = "LEARNER";
pub const ROLE_VISITOR: &str = "VISITOR";
pub const ROLE_APPLICANT: &str = "APPLICANT";
pub const ROLE_SUPPLIER: &str = "SUPPLIER";
pub const ROLE_BOT: &str = "BOT";
pub const ROLE_GUARD: &str = "GUARD";

pub const ROLES: &[&str] = &[
    ROLE_SUPER_ADMIN,
    ROLE_ADMIN,
    ROLE_COORDINATOR,
    ROLE_INSTRUCTOR,
    ROLE_LEARNER,
    ROLE_VISITOR,
    ROLE_APPLICANT,
    ROLE_SUPPLIER,
    ROLE_BOT,
    ROLE_GUARD,
];

pub const OBJ_PERSON: &str = "person";
pub const OBJ_PROGRAM: &str = "program";
pub const OBJ_CLASS: &str = "class";
pub const OBJ_LEARNER: &str = "learner";
pub const OBJ_INSTRUCTOR: &str = "instructor";
pub const OBJ_ATTENDANCE: &str = "attendance";
pub const OBJ_USER: &str = "user";

pub const ACT_VIEW: &str = "VIEW";
pub const ACT_VIEW_ALL: &str = "VIEW_ALL";
pub const ACT_CREATE: &str = "CREATE";
pub const ACT_EDIT: &str = "EDIT";
pub const ACT_DELETE: &str = "DELETE";
pub const ACT_CHANGE_STATUS: &str = "CHANGE_STATUS";
pub const ACT_RESET_PASSWORD: &str = "RESET_PASSWORD";
pub const ACT_MANAGE_INSTRUCTORS: &str = "MANAGE_INSTRUCTORS";
pub const ACT_MANAGE_LEARNERS: &str = "MANAGE_LEARNERS";
pub const ACT_TAKE_ATTENDANCE: &str = "TAKE_ATTENDANCE";
pub const ACT_ASSIGN_PERMISSIONS: &str = "ASSIGN_PERMISSIONS";

/// Every assignable `(obj, [act])`.
pub const DEFINITIONS: &[(&str, &[&str])] = &[
    (
        OBJ_PERSON,
        &[
            ACT_VIEW_ALL,
            ACT_VIEW,
            ACT_CREATE,
            ACT_EDIT,
            ACT_DELETE,
            ACT_CHANGE_STATUS,
            ACT_RESET_PASSWORD,
        ],
    ),
    (
        OBJ_PROGRAM,
        &[ACT_VIEW_ALL, ACT_VIEW, ACT_CREATE, ACT_EDIT, ACT_DELETE],
    ),
    (
        OBJ_CLASS,
        &[
            ACT_VIEW_ALL,
            ACT_VIEW,
            ACT_CREATE,
            ACT_EDIT,
            ACT_DELETE,
            ACT_MANAGE_INSTRUCTORS,
            ACT_MANAGE_LEARNERS,
        ],
    ),
    (
        OBJ_LEARNER,
        &[ACT_VIEW_ALL, ACT_VIEW, ACT_CREATE, ACT_EDIT, ACT_DELETE],
    ),
    (
        OBJ_INSTRUCTOR,
        &[ACT_VIEW_ALL, ACT_VIEW, ACT_CREATE, ACT_EDIT, ACT_DELETE],
    ),
    (OBJ_ATTENDANCE, &[ACT_VIEW, ACT_TAKE_ATTENDANCE]),
    (OBJ_USER, &[ACT_CREATE, ACT_ASSIGN_PERMISSIONS]),
];

#[derive(Debug, Clone, Serialize)]
pub struct Definition {
    pub obj: &'static str,
    pub actions: Vec<&'static str>,
}

pub fn definitions() -> Vec<Definition> {
    DEFINITIONS
        .iter()
        .map(|(obj, actions)| Definition {
            obj: *obj,
            actions: actions.to_vec(),
        })
        .collect()
}

pub fn is_role(name: &str) -> bool {
    ROLES.contains(&name)
}

pub fn is_valid_permission(obj: &str, act: &str) -> bool {
    DEFINITIONS
        .iter()
        .any(|(o, actions)| *o == obj && actions.contains(&act))
}

pub fn ensure_valid_permission(obj: &str, act: &str) -> Result<(), AuthzError> {
    if is_valid_permission(obj, act) {
        Ok(())
    } else {
        Err(AuthzError::UnknownPermission {
            obj: obj.to_string(),
            act: act.to_string(),
        })
    }
}

pub fn ensure_role(name: &str) -> Result<(), AuthzError> {
    if is_role(name) {
        Ok(())
    } else {
        Err(AuthzError::UnknownRole(name.to_string()))
    }
}

/// Default permissions per role.
pub fn default_role_permissions() -> Vec<(&'static str, &'static str, &'static str)> {
    let mut perms = vec![(ROLE_SUPER_ADMIN, WILDCARD, WILDCARD)];

    for (obj, actions) in DEFINITIONS {
        if *obj == OBJ_USER {
            continue;
        }
        for act in *actions {
            perms.push((ROLE_ADMIN, *obj, *act));
        }
    }
    perms.push((ROLE_ADMIN, OBJ_USER, ACT_CREATE));

    for act in [
        ACT_VIEW_ALL,
        ACT_VIEW,
        ACT_EDIT,
        ACT_MANAGE_INSTRUCTORS,
        ACT_MANAGE_LEARNERS,
    ] {
        perms.push((ROLE_COORDINATOR, OBJ_CLASS, act));
    }
    for act in [ACT_VIEW_ALL, ACT_VIEW, ACT_CREATE, ACT_EDIT] {
        perms.push((ROLE_COORDINATOR, OBJ_LEARNER, act));
    }
    perms.push((ROLE_COORDINATOR, OBJ_PERSON, ACT_VIEW));
    perms.push((ROLE_COORDINATOR, OBJ_ATTENDANCE, ACT_VIEW));

    perms.push((ROLE_INSTRUCTOR, OBJ_CLASS, ACT_VIEW));
    perms.push((ROLE_INSTRUCTOR, OBJ_ATTENDANCE, ACT_VIEW));
    perms.push((ROLE_INSTRUCTOR, OBJ_ATTENDANCE, ACT_TAKE_ATTENDANCE));

    perms.push((ROLE_LEARNER, OBJ_ATTENDANCE, ACT_VIEW));
    perms
}

/// Adds the default role permissions; existing tuples are left alone.
pub async fn seed_role_permissions(enforcer: &Enforcer) -> Result<usize, AuthzError> {
    let mut added = 0;
    for (role, obj, act) in default_role_permissions() {
        if enforcer.add_policy(role, obj, act).await? {
            added += 1;
        }
    }
    tracing::info!(added, "Seeded default role permissions");
    Ok(added)
}
