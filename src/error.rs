use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Request-level error taxonomy. Every variant is recoverable at the
/// request boundary; store failures roll back before surfacing here.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad input shape, length or format. Carries every failing
    /// message collected before the request was rejected.
    #[error("validation failed")]
    Validation(Vec<String>),

    /// Username or email already taken.
    #[error("{0}")]
    Conflict(String),

    /// Bad credentials. The message never distinguishes an unknown
    /// user from a wrong password.
    #[error("{0}")]
    Auth(String),

    /// Missing or mismatched CSRF token; rejected before any business
    /// logic runs.
    #[error("Invalid security token. Please try again.")]
    Csrf,

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, errors) = match self {
            AppError::Validation(msgs) => (StatusCode::UNPROCESSABLE_ENTITY, msgs),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, vec![msg]),
            AppError::Auth(msg) => (StatusCode::UNAUTHORIZED, vec![msg]),
            AppError::Csrf => (
                StatusCode::FORBIDDEN,
                vec!["Invalid security token. Please try again.".into()],
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, vec![msg]),
            AppError::Store(e) => {
                error!(error = %e, "store error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    vec!["Something went wrong. Please try again.".into()],
                )
            }
            AppError::Internal(e) => {
                error!(error = %e, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    vec!["Something went wrong. Please try again.".into()],
                )
            }
        };
        (status, Json(json!({ "errors": errors }))).into_response()
    }
}
