use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde_json::json;

/// Error type shared by the lifecycle operations and the HTTP handlers.
///
/// Every variant maps to exactly one HTTP status so the presentation layer
/// can tell "no such note" (404) from "this note is gone for good" (410).
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A required field is missing or empty. Raised before any mutation.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// The tombstone still exists but its retention window has passed.
    #[error("Deleted note {id} expired at {expired_at}")]
    Expired { id: i64, expired_at: DateTime<Utc> },

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        AppError::NotFound { entity, id }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Expired { .. } => StatusCode::GONE,
            AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound { .. } => "NOT_FOUND",
            AppError::Expired { .. } => "EXPIRED",
            AppError::Storage(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = match &self {
            AppError::Storage(err) => {
                tracing::error!(error = %err, "Storage error");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let body = json!({
            "error": message,
            "code": self.code(),
        });

        (self.status(), axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_is_distinct_from_not_found() {
        let expired = AppError::Expired { id: 7, expired_at: Utc::now() };
        assert_eq!(expired.status(), StatusCode::GONE);
        assert_eq!(AppError::not_found("DeletedNote", 7).status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn storage_errors_hide_details() {
        let response = AppError::Storage(sqlx::Error::PoolTimedOut).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
