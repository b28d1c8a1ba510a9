//! Error types for Orbis server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application error codes carried in every error response body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Success = 0,
    Failure = 1,
    DbFailure = 2,
    NoSuchBorrower = 3,
    NoSuchDocument = 4,
    NoSuchLoan = 5,
    NoSuchReservation = 6,
    BorrowerBlocked = 7,
    MaxLoansReached = 8,
    MaxReservationsReached = 9,
    DuplicateReservation = 10,
    AlreadyBorrowed = 11,
    DocumentAvailable = 12,
    NoCopyAvailable = 13,
    AlreadyReturned = 14,
    ReservationNotActive = 15,
    ReservationPending = 16,
    BadValue = 17,
    IntegrityViolation = 18,
    StoreUnavailable = 19,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// A referenced row does not exist
    #[error("Not found: {1}")]
    NotFound(ErrorCode, String),

    /// User-correctable rejection of a circulation request. Not retryable
    /// as-is; the code tells the caller exactly which precondition failed.
    #[error("Rejected: {1}")]
    Admission(ErrorCode, String),

    /// The request lost a race for the last available copy. Retryable after
    /// re-querying availability.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Stored state disagrees with source facts. Surfaced to operators via
    /// the audit report, never auto-corrected on the request path.
    #[error("Integrity violation: {0}")]
    Integrity(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Transaction timeout, deadlock or store outage. Retryable with backoff.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn no_such_borrower(id: i32) -> Self {
        AppError::NotFound(
            ErrorCode::NoSuchBorrower,
            format!("Borrower with id {} not found", id),
        )
    }

    pub fn no_such_document(id: i32) -> Self {
        AppError::NotFound(
            ErrorCode::NoSuchDocument,
            format!("Document with id {} not found", id),
        )
    }

    pub fn no_such_loan(id: i32) -> Self {
        AppError::NotFound(ErrorCode::NoSuchLoan, format!("Loan with id {} not found", id))
    }

    pub fn no_such_reservation(id: i32) -> Self {
        AppError::NotFound(
            ErrorCode::NoSuchReservation,
            format!("Reservation with id {} not found", id),
        )
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(code, msg) => (StatusCode::NOT_FOUND, *code, msg.clone()),
            AppError::Admission(code, msg) => (StatusCode::UNPROCESSABLE_ENTITY, *code, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, ErrorCode::NoCopyAvailable, msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, ErrorCode::BadValue, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ErrorCode::BadValue, msg.clone()),
            AppError::Integrity(msg) => {
                tracing::error!("Integrity violation: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::IntegrityViolation,
                    msg.clone(),
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::DbFailure,
                    "Database error".to_string(),
                )
            }
            AppError::Unavailable(msg) => {
                tracing::warn!("Store unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, ErrorCode::StoreUnavailable, msg.clone())
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::Failure,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admission_errors_are_unprocessable() {
        let resp = AppError::Admission(
            ErrorCode::DuplicateReservation,
            "already reserved".to_string(),
        )
        .into_response();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn availability_conflicts_map_to_conflict_status() {
        // 409 tells the caller the failure is a retryable race, not a policy rejection
        let resp = AppError::Conflict("lost the last copy".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn missing_rows_are_not_found() {
        let resp = AppError::no_such_document(42).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
