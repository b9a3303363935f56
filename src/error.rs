use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Authentication failed: {0}")]
    Unauthenticated(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Collaborator malfunction surfaced by the access gate; already logged there.
    #[error("Access check failed: {0}")]
    Fault(String),

    #[error("Storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Database(e) if is_conflict(e) => StatusCode::CONFLICT,
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Database(_)
            | AppError::Fault(_)
            | AppError::Io(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Unique and foreign-key violations are caller mistakes, not outages.
fn is_conflict(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|db| db.is_unique_violation() || db.is_foreign_key_violation())
        .unwrap_or(false)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (code, message) = match self {
            AppError::Database(ref e) if is_conflict(e) => {
                tracing::debug!("constraint rejected write: {}", e);
                (
                    "CONFLICT",
                    "Request conflicts with existing records".to_string(),
                )
            }
            AppError::Database(ref e) => {
                tracing::error!("database error: {}", e);
                ("DATABASE_ERROR", "Database operation failed".to_string())
            }
            AppError::Unauthenticated(ref msg) => ("AUTH_ERROR", msg.clone()),
            AppError::Forbidden(ref msg) => ("FORBIDDEN", msg.clone()),
            AppError::NotFound(ref msg) => ("NOT_FOUND", msg.clone()),
            AppError::BadRequest(ref msg) => ("BAD_REQUEST", msg.clone()),
            AppError::Conflict(ref msg) => ("CONFLICT", msg.clone()),
            AppError::PayloadTooLarge(ref msg) => ("PAYLOAD_TOO_LARGE", msg.clone()),
            AppError::Fault(_) => (
                "SERVICE_UNAVAILABLE",
                "Request could not be authorized right now".to_string(),
            ),
            AppError::Io(ref e) => {
                tracing::error!("storage error: {}", e);
                ("STORAGE_ERROR", "File storage failed".to_string())
            }
            AppError::Internal(ref msg) => {
                tracing::error!("internal error: {}", msg);
                ("INTERNAL_ERROR", "Internal server error".to_string())
            }
        };

        let body = Json(ErrorResponse {
            success: false,
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details: None,
            },
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denials_map_to_client_statuses() {
        assert_eq!(
            AppError::Unauthenticated("x".into()).into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::Forbidden("x".into()).into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::NotFound("x".into()).into_response().status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn faults_map_to_server_error() {
        assert_eq!(
            AppError::Fault("db down".into()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::Database(sqlx::Error::PoolTimedOut)
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[derive(Debug)]
    struct ConstraintViolation(sqlx::error::ErrorKind);

    impl std::fmt::Display for ConstraintViolation {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "constraint violated: {:?}", self.0)
        }
    }

    impl std::error::Error for ConstraintViolation {}

    impl sqlx::error::DatabaseError for ConstraintViolation {
        fn message(&self) -> &str {
            "constraint violated"
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            match self.0 {
                sqlx::error::ErrorKind::UniqueViolation => sqlx::error::ErrorKind::UniqueViolation,
                sqlx::error::ErrorKind::ForeignKeyViolation => {
                    sqlx::error::ErrorKind::ForeignKeyViolation
                }
                sqlx::error::ErrorKind::NotNullViolation => sqlx::error::ErrorKind::NotNullViolation,
                sqlx::error::ErrorKind::CheckViolation => sqlx::error::ErrorKind::CheckViolation,
                _ => sqlx::error::ErrorKind::Other,
            }
        }
    }

    fn violation(kind: sqlx::error::ErrorKind) -> AppError {
        AppError::Database(sqlx::Error::Database(Box::new(ConstraintViolation(kind))))
    }

    #[test]
    fn duplicate_row_is_a_conflict() {
        let err = violation(sqlx::error::ErrorKind::UniqueViolation);
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn deleting_referenced_row_is_a_conflict() {
        let err = violation(sqlx::error::ErrorKind::ForeignKeyViolation);
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn other_constraint_failures_stay_server_errors() {
        let err = violation(sqlx::error::ErrorKind::CheckViolation);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn missing_row_from_database_is_not_a_conflict() {
        assert!(!is_conflict(&sqlx::Error::RowNotFound));
    }
}
