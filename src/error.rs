// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use crate::{repository::RepositoryError, services::GamificationError, store::StoreError};

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    // 500 Internal Server Error
    InternalServerError(String),

    // 400 Bad Request
    BadRequest(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict (award could not be recorded)
    Conflict(String),

    // 503 Service Unavailable (secondary store not configured or unreachable)
    ServiceUnavailable(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for AppError {}

/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::ServiceUnavailable(msg) => {
                tracing::warn!("Service unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, msg)
            }
        };
        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Allows using `?` operator on database queries.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Unavailable(msg) => AppError::ServiceUnavailable(msg),
            RepositoryError::Database(e) => AppError::InternalServerError(e.to_string()),
        }
    }
}

impl From<GamificationError> for AppError {
    fn from(err: GamificationError) -> Self {
        let message = err.to_string();
        match err {
            GamificationError::StoreUnavailable
            | GamificationError::Store(StoreError::Unavailable(_)) => {
                AppError::ServiceUnavailable(message)
            }
            GamificationError::AmbiguousIdentity { .. } => AppError::NotFound(message),
            GamificationError::InvalidAccount => AppError::BadRequest(message),
            GamificationError::TransactionConflict(_)
            | GamificationError::Store(StoreError::Conflict(_)) => {
                AppError::Conflict(message)
            }
            GamificationError::Repository(e) => e.into(),
            GamificationError::InvalidTransaction(_) | GamificationError::Store(_) => {
                AppError::InternalServerError(message)
            }
        }
    }
}
