use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::{error, warn};

use attendance::AttendanceError;

use crate::schemas::ErrorResponse;

/// Status-coded error taxonomy for the API. Controllers return this and the
/// `IntoResponse` impl translates it into the JSON error envelope.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Missing or malformed input
    #[error("{0}")]
    BadRequest(String),

    /// Input parsed but failed field-level validation
    #[error("{0}")]
    Validation(String),

    /// Bad credentials or an invalid/expired token
    #[error("{0}")]
    Unauthorized(String),

    /// Role or verification gate
    #[error("{0}")]
    Forbidden(String),

    /// Entity does not exist (or is outside the caller's school)
    #[error("{0}")]
    NotFound(String),

    /// Uniqueness conflict or illegal state transition
    #[error("{0}")]
    Conflict(String),

    /// An external collaborator (recognizer, mailer) is unreachable
    #[error("{0}")]
    ServiceUnavailable(String),

    /// Error from the database operations
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Anything else
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Map a database error to 409 when it is a uniqueness violation,
    /// 500 otherwise. Mirrors the optimistic reliance on unique indexes:
    /// the database is the arbiter, the API just translates.
    pub fn from_db(err: sea_orm::DbErr, conflict_message: &str) -> Self {
        let msg = err.to_string().to_lowercase();
        if msg.contains("unique") || msg.contains("duplicate") {
            Self::Conflict(conflict_message.to_string())
        } else {
            Self::Database(err)
        }
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_FAILED"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
            Self::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl From<AttendanceError> for ApiError {
    fn from(err: AttendanceError) -> Self {
        match err {
            AttendanceError::NoImages => Self::BadRequest(err.to_string()),
            AttendanceError::ClassroomNotFound(_) | AttendanceError::SessionNotFound(_) => {
                Self::NotFound(err.to_string())
            }
            AttendanceError::SessionMismatch { .. } => Self::BadRequest(err.to_string()),
            AttendanceError::SessionFinalized(_) => Self::Conflict(err.to_string()),
            // Recognition failures abort processing outright; nothing was
            // applied, so the client may retry the whole upload.
            AttendanceError::Recognizer(e) => Self::ServiceUnavailable(e.to_string()),
            AttendanceError::Database(e) => Self::Database(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        if status.is_server_error() {
            error!(%status, code, "Request failed: {}", self);
        } else {
            warn!(%status, code, "Request rejected: {}", self);
        }

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
            success: false,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizer_failures_map_to_service_unavailable() {
        let err = ApiError::from(AttendanceError::Recognizer(
            attendance::RecognizerError::Transport("connection refused".to_string()),
        ));
        assert!(matches!(err, ApiError::ServiceUnavailable(_)));
    }

    #[test]
    fn unique_violations_map_to_conflict() {
        let db_err = sea_orm::DbErr::Custom("UNIQUE constraint failed: users.email".to_string());
        let err = ApiError::from_db(db_err, "email already exists");
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[test]
    fn other_db_errors_stay_internal() {
        let db_err = sea_orm::DbErr::Custom("connection reset".to_string());
        let err = ApiError::from_db(db_err, "email already exists");
        assert!(matches!(err, ApiError::Database(_)));
    }
}
