use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use miette::Diagnostic;
use serde_json::json;
use thiserror::Error;

use crate::authz::errors::AuthzError;

/// Workflow invariants that a request would violate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    SessionAlreadyOpen,
    SessionFinished,
    NotAssignedToClass,
    NotInstructor,
    OutsideShiftWindow,
    OpenIngressElsewhere,
    AlreadyIngressed,
    NoIngress,
    AlreadyEgressed,
    PersonNotFound,
    NotLearnerOfClass,
    SelfModification,
}

impl ConflictKind {
    /// Stable machine-readable code returned to clients.
    pub fn code(&self) -> &'static str {
        match self {
            ConflictKind::SessionAlreadyOpen => "SESSION_ALREADY_OPEN",
            ConflictKind::SessionFinished => "SESSION_FINISHED",
            ConflictKind::NotAssignedToClass => "NOT_ASSIGNED_TO_CLASS",
            ConflictKind::NotInstructor => "NOT_INSTRUCTOR",
            ConflictKind::OutsideShiftWindow => "OUTSIDE_SHIFT_WINDOW",
            ConflictKind::OpenIngressElsewhere => "OPEN_INGRESS_ELSEWHERE",
            ConflictKind::AlreadyIngressed => "ALREADY_INGRESSED",
            ConflictKind::NoIngress => "NO_INGRESS",
            ConflictKind::AlreadyEgressed => "ALREADY_EGRESSED",
            ConflictKind::PersonNotFound => "PERSON_NOT_FOUND",
            ConflictKind::NotLearnerOfClass => "NOT_LEARNER_OF_CLASS",
            ConflictKind::SelfModification => "SELF_MODIFICATION",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ConflictKind::SessionAlreadyOpen => {
                "another attendance session is already open for this class"
            }
            ConflictKind::SessionFinished => "the attendance session is already finished",
            ConflictKind::NotAssignedToClass => "the instructor is not assigned to this class",
            ConflictKind::NotInstructor => "the account is not linked to an instructor",
            ConflictKind::OutsideShiftWindow => "the class shift is not currently in progress",
            ConflictKind::OpenIngressElsewhere => {
                "the learner has an open ingress in another session of this class today"
            }
            ConflictKind::AlreadyIngressed => "the learner already has an ingress in this session",
            ConflictKind::NoIngress => "the record has no ingress registered",
            ConflictKind::AlreadyEgressed => "the record already has an egress registered",
            ConflictKind::PersonNotFound => "no person matches the given document number",
            ConflictKind::NotLearnerOfClass => "the person is not an active learner of this class",
            ConflictKind::SelfModification => "users cannot modify their own access",
        }
    }
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum AppError {
    #[error("Invalid `{field}`: {message}")]
    #[diagnostic(code(cdattg::validation))]
    Validation { field: String, message: String },

    #[error("Unauthorized: {0}")]
    #[diagnostic(code(cdattg::unauthorized))]
    Unauthorized(String),

    #[error("Permission denied: {obj}:{act}")]
    #[diagnostic(code(cdattg::forbidden))]
    Forbidden { obj: String, act: String },

    #[error("{0} not found")]
    #[diagnostic(code(cdattg::not_found))]
    NotFound(String),

    #[error("{}: {}", .0.code(), .0.message())]
    #[diagnostic(code(cdattg::conflict))]
    Conflict(ConflictKind),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Authz(#[from] AuthzError),

    #[error("I/O error: {0}")]
    #[diagnostic(code(cdattg::io))]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    #[diagnostic(code(cdattg::config))]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(cdattg::serde))]
    Serde(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    #[diagnostic(code(cdattg::db))]
    Db(#[from] sea_orm::DbErr),

    #[error("JOSE error: {0}")]
    #[diagnostic(code(cdattg::jose))]
    Jose(String),

    #[error("Report error: {0}")]
    #[diagnostic(code(cdattg::report))]
    Report(String),
}

impl AppError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn forbidden(obj: &str, act: &str) -> Self {
        AppError::Forbidden {
            obj: obj.to_string(),
            act: act.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Validation { field, message } => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "VALIDATION", "field": field, "message": message }),
            ),
            AppError::Unauthorized(message) => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": "UNAUTHORIZED", "message": message }),
            ),
            AppError::Forbidden { obj, act } => (
                StatusCode::FORBIDDEN,
                json!({
                    "error": "FORBIDDEN",
                    "message": format!("permission denied: {obj}:{act}"),
                    "obj": obj,
                    "act": act,
                }),
            ),
            AppError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                json!({ "error": "NOT_FOUND", "message": format!("{what} not found") }),
            ),
            AppError::Conflict(kind) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": kind.code(), "message": kind.message() }),
            ),
            AppError::Authz(err) => return err.into_response(),
            other => {
                tracing::error!(error = %other, "Request failed on a dependency");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "INTERNAL", "message": "internal server error" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

impl From<printpdf::Error> for AppError {
    fn from(value: printpdf::Error) -> Self {
        AppError::Report(value.to_string())
    }
}

impl From<josekit::JoseError> for AppError {
    fn from(value: josekit::JoseError) -> Self {
        AppError::Jose(value.to_string())
    }
}
