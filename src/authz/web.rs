use axum::extract::{Path, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch, put};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};

use crate::authz::catalog::{self, Definition, ACT_ASSIGN_PERMISSIONS, OBJ_USER};
use crate::authz::types::Permission;
use crate::authz::{gates, subject, Enforcer};
use crate::errors::{AppError, ConflictKind};
use crate::storage;
use crate::token;
use crate::web::AppState;

/// Authenticated caller, stored in the request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: i32,
    pub email: String,
    pub person_id: Option<i32>,
}

impl CurrentUser {
    pub fn subject(&self) -> String {
        subject(self.id)
    }
}

/// Resolves the bearer credential to an active user.
pub async fn resolve_user(state: &AppState, credential: &str) -> Result<CurrentUser, AppError> {
    let user_id = state.tokens.verify(credential)?;
    let user = storage::get_user(&state.db, user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("unknown user".to_string()))?;
    if !user.active {
        tracing::info!(user_id, "Blocked inactive user");
        return Err(AppError::Unauthorized("user is inactive".to_string()));
    }
    Ok(CurrentUser {
        id: user.id,
        email: user.email,
        person_id: user.person_id,
    })
}

/// Rejects requests without a valid bearer credential of an active user.
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let credential = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(token::bearer)
        .map(str::to_string);
    let Some(credential) = credential else {
        return AppError::Unauthorized("missing bearer token".to_string()).into_response();
    };

    match resolve_user(&state, &credential).await {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    }
}

/// Per-route `(obj, act)` requirement.
pub fn require(
    enforcer: &Enforcer,
    user: &CurrentUser,
    obj: &str,
    act: &str,
) -> Result<(), AppError> {
    if enforcer.enforce(&user.subject(), obj, act) {
        Ok(())
    } else {
        tracing::info!(user_id = user.id, obj, act, "Permission denied");
        Err(AppError::forbidden(obj, act))
    }
}

/// Fails with FORBIDDEN naming `(obj, act)` when a compound gate denies.
pub fn require_gate(allowed: bool, obj: &str, act: &str) -> Result<(), AppError> {
    if allowed {
        Ok(())
    } else {
        Err(AppError::forbidden(obj, act))
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/permissions/definitions", get(permission_definitions))
        .route(
            "/users/{id}/permissions",
            get(user_permissions).post(add_user_permission),
        )
        .route(
            "/users/{id}/permissions/{obj}/{act}",
            delete(remove_user_permission),
        )
        .route("/users/{id}/roles", put(set_user_roles))
        .route("/users/{id}/status", patch(set_user_status))
}

async fn permission_definitions(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<Vec<Definition>>, AppError> {
    require(&state.enforcer, &user, OBJ_USER, ACT_ASSIGN_PERMISSIONS)?;
    Ok(Json(catalog::definitions()))
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct UserPermissions {
    pub user_id: i32,
    pub roles: Vec<String>,
    pub role_permissions: Vec<Permission>,
    pub direct_permissions: Vec<Permission>,
    pub effective_actions: Vec<String>,
}

async fn user_permissions(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Json<UserPermissions>, AppError> {
    require(&state.enforcer, &user, OBJ_USER, ACT_ASSIGN_PERMISSIONS)?;
    ensure_user_exists(&state, id).await?;

    let target = subject(id);
    let roles = state.enforcer.get_roles_for_user(&target);
    let mut role_permissions: Vec<Permission> = roles
        .iter()
        .flat_map(|role| state.enforcer.get_role_permissions(role))
        .collect();
    role_permissions.sort();
    role_permissions.dedup();

    Ok(Json(UserPermissions {
        user_id: id,
        direct_permissions: state.enforcer.get_direct_permissions(&target),
        effective_actions: state.enforcer.get_actions_for_user(&target),
        roles,
        role_permissions,
    }))
}

#[derive(Debug, Deserialize)]
struct PermissionBody {
    obj: String,
    act: String,
}

async fn add_user_permission(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i32>,
    Json(body): Json<PermissionBody>,
) -> Result<Json<UserPermissions>, AppError> {
    require(&state.enforcer, &user, OBJ_USER, ACT_ASSIGN_PERMISSIONS)?;
    forbid_self(&user, id)?;
    catalog::ensure_valid_permission(&body.obj, &body.act)?;
    ensure_user_exists(&state, id).await?;

    let added = state
        .enforcer
        .add_direct_permission(&subject(id), &body.obj, &body.act)
        .await?;
    tracing::info!(by = user.id, user_id = id, obj = %body.obj, act = %body.act, added, "Direct permission assigned");
    user_permissions(State(state), Extension(user), Path(id)).await
}

async fn remove_user_permission(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path((id, obj, act)): Path<(i32, String, String)>,
) -> Result<Json<UserPermissions>, AppError> {
    require(&state.enforcer, &user, OBJ_USER, ACT_ASSIGN_PERMISSIONS)?;
    forbid_self(&user, id)?;
    catalog::ensure_valid_permission(&obj, &act)?;
    ensure_user_exists(&state, id).await?;

    let removed = state
        .enforcer
        .remove_direct_permission(&subject(id), &obj, &act)
        .await?;
    if !removed {
        return Err(AppError::NotFound(format!("permission {obj}:{act} of user {id}")));
    }
    tracing::info!(by = user.id, user_id = id, %obj, %act, "Direct permission revoked");
    user_permissions(State(state), Extension(user), Path(id)).await
}

#[derive(Debug, Deserialize)]
struct RolesBody {
    roles: Vec<String>,
}

async fn set_user_roles(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i32>,
    Json(body): Json<RolesBody>,
) -> Result<Json<UserPermissions>, AppError> {
    require_gate(
        gates::super_admin(&state.enforcer, &user.subject()),
        OBJ_USER,
        ACT_ASSIGN_PERMISSIONS,
    )?;
    forbid_self(&user, id)?;
    for role in &body.roles {
        catalog::ensure_role(role)?;
    }
    ensure_user_exists(&state, id).await?;

    let mut roles: Vec<&str> = body.roles.iter().map(String::as_str).collect();
    roles.sort_unstable();
    roles.dedup();
    state.enforcer.set_roles_for_user(&subject(id), &roles).await?;
    tracing::info!(by = user.id, user_id = id, roles = ?roles, "Roles replaced");
    user_permissions(State(state), Extension(user), Path(id)).await
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    active: bool,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserStatus {
    pub id: i32,
    pub email: String,
    pub active: bool,
}

async fn set_user_status(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i32>,
    Json(body): Json<StatusBody>,
) -> Result<Json<UserStatus>, AppError> {
    require(&state.enforcer, &user, OBJ_USER, ACT_ASSIGN_PERMISSIONS)?;
    forbid_self(&user, id)?;

    let updated = storage::set_user_active(&state.db, id, body.active).await?;
    tracing::info!(by = user.id, user_id = id, active = updated.active, "User status changed");
    Ok(Json(UserStatus {
        id: updated.id,
        email: updated.email,
        active: updated.active,
    }))
}

fn forbid_self(user: &CurrentUser, target: i32) -> Result<(), AppError> {
    if user.id == target {
        return Err(AppError::Conflict(ConflictKind::SelfModification));
    }
    Ok(())
}

async fn ensure_user_exists(state: &AppState, id: i32) -> Result<(), AppError> {
    storage::get_user(&state.db, id)
        .await?
        .map(|_| ())
        .ok_or_else(|| AppError::NotFound(format!("user {id}")))
}
