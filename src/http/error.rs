use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::engine::EngineError;
use crate::tenant::TenantError;

/// Error type for HTTP handlers.
///
/// Wraps [`EngineError`] for domain errors and adds request-level variants.
/// Renders as `{ "error": message, "code": CODE }`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Malformed or out-of-range request field.
    #[error("{0}")]
    Validation(String),

    #[error("missing X-User-Email header")]
    Unauthenticated,

    #[error(transparent)]
    Tenant(#[from] TenantError),
}

pub type ApiResult<T> = Result<T, ApiError>;

const INTERNAL: &str = "An internal error occurred";

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Engine(err) => match err {
                EngineError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string()),
                EngineError::BusinessRule(msg) => (StatusCode::BAD_REQUEST, "BUSINESS_RULE", msg.clone()),
                EngineError::Ownership(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
                EngineError::LimitExceeded(_) => (StatusCode::BAD_REQUEST, "LIMIT_EXCEEDED", err.to_string()),
                EngineError::Directory(e) => {
                    tracing::warn!(service = e.service, error = %e.message, "directory lookup failed");
                    (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", err.to_string())
                }
                EngineError::WalError(msg) => {
                    tracing::error!(error = %msg, "WAL error");
                    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", INTERNAL.to_string())
                }
            },
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            ApiError::Unauthenticated => (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED", self.to_string()),
            ApiError::Tenant(err) => match err {
                TenantError::NameTooLong | TenantError::EmptyName => {
                    (StatusCode::BAD_REQUEST, "INVALID_TENANT", err.to_string())
                }
                TenantError::TooMany => (StatusCode::SERVICE_UNAVAILABLE, "TENANT_LIMIT", err.to_string()),
                TenantError::Io(e) => {
                    tracing::error!(error = %e, "tenant open failed");
                    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", INTERNAL.to_string())
                }
            },
        };

        let body = json!({
            "error": message,
            "code": code,
        });
        (status, axum::Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::Validation(errors.to_string())
    }
}
