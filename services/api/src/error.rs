//! services/api/src/error.rs
//!
//! Defines the primary error type for the API service and the JSON error body
//! returned by the HTTP handlers.

use crate::config::ConfigError;
use attendance_core::AttendanceError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

/// The primary error type for the `attendance-api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

//=========================================================================================
// HTTP Error Responses
//=========================================================================================

/// The body of every non-2xx JSON response. `code` is stable and machine readable.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// A handler failure, rendered as a status code plus an `ErrorBody`.
#[derive(Debug)]
pub struct ErrorResponse {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ErrorResponse {
    pub fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code: code.to_string(),
                message: message.into(),
            },
        }
    }
}

impl From<AttendanceError> for ErrorResponse {
    fn from(e: AttendanceError) -> Self {
        let (status, code) = match &e {
            AttendanceError::InvalidToken => (StatusCode::BAD_REQUEST, "invalid_token"),
            AttendanceError::DuplicateSubmission => (StatusCode::CONFLICT, "duplicate_submission"),
            AttendanceError::NotFound(_) => (StatusCode::NOT_FOUND, "session_not_found"),
            AttendanceError::InvalidState(_) => (StatusCode::CONFLICT, "session_inactive"),
            AttendanceError::InvalidSubmission(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "invalid_submission")
            }
            AttendanceError::StorageFailure(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "storage_unavailable")
            }
        };
        // Storage details stay in the logs.
        let message = match &e {
            AttendanceError::StorageFailure(_) => {
                "Attendance storage is unavailable, please retry.".to_string()
            }
            other => other.to_string(),
        };
        Self::new(status, code, message)
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn rejections_map_to_distinct_codes() {
        let invalid = ErrorResponse::from(AttendanceError::InvalidToken);
        let duplicate = ErrorResponse::from(AttendanceError::DuplicateSubmission);
        assert_eq!(invalid.status, StatusCode::BAD_REQUEST);
        assert_eq!(duplicate.status, StatusCode::CONFLICT);
        assert_ne!(invalid.body.code, duplicate.body.code);

        let missing = ErrorResponse::from(AttendanceError::NotFound(Uuid::nil()));
        assert_eq!(missing.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn storage_details_are_not_exposed() {
        let outage = ErrorResponse::from(AttendanceError::StorageFailure(
            "password authentication failed for user admin".to_string(),
        ));
        assert_eq!(outage.status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!outage.body.message.contains("password"));
    }
}
