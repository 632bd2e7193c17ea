use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use miette::Diagnostic;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum AuthzError {
    #[error("Policy storage error: {0}")]
    #[diagnostic(
        code(cdattg::authz::storage),
        help("The policy_rules table must exist; run the migrations before loading the enforcer")
    )]
    Storage(#[from] sea_orm::DbErr),

    #[error("Unknown permission `{obj}:{act}`")]
    #[diagnostic(
        code(cdattg::authz::unknown_permission),
        help("Valid pairs are listed by GET /permissions/definitions")
    )]
    UnknownPermission { obj: String, act: String },

    #[error("Unknown role `{0}`")]
    #[diagnostic(code(cdattg::authz::unknown_role))]
    UnknownRole(String),

    #[error("Corrupt policy row {id}: unknown ptype `{ptype}`")]
    #[diagnostic(code(cdattg::authz::corrupt_rule))]
    CorruptRule { id: i32, ptype: String },
}

impl IntoResponse for AuthzError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AuthzError::UnknownPermission { .. } | AuthzError::UnknownRole(_) => {
                (StatusCode::BAD_REQUEST, "VALIDATION")
            }
            AuthzError::Storage(_) | AuthzError::CorruptRule { .. } => {
                tracing::error!(error = %self, "Authorization storage failure");
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "INTERNAL", "message": "internal server error" })),
                )
                    .into_response();
            }
        };
        let body = json!({ "error": code, "message": self.to_string() });
        (status, Json(body)).into_response()
    }
}
