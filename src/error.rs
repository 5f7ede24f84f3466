use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::models::{BookingStatus, SeatId, SeatStatus};

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("seat {0} is not available")]
    SeatUnavailable(SeatId),

    #[error("booking {booking_id} is {actual}, expected {expected}")]
    InvalidStateTransition {
        booking_id: Uuid,
        expected: BookingStatus,
        actual: BookingStatus,
    },

    #[error("reservation {0} has expired")]
    ExpiredReservation(Uuid),

    #[error("storage conflict, retry the request")]
    StorageConflict,

    #[error("payment declined: {0}")]
    PaymentDeclined(String),

    /// A seat was not in a status the seat map operation accepts. Inside a
    /// unit of work this means the ledger and seat map disagree.
    #[error("seat {seat} is {status}")]
    InvalidSeatState { seat: SeatId, status: SeatStatus },

    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl BookingError {
    pub fn booking_not_found(id: Uuid) -> Self {
        BookingError::NotFound(format!("booking {id}"))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, BookingError::StorageConflict)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            BookingError::Validation(_) => StatusCode::BAD_REQUEST,
            BookingError::NotFound(_) => StatusCode::NOT_FOUND,
            BookingError::SeatUnavailable(_) => StatusCode::CONFLICT,
            BookingError::InvalidStateTransition { .. } => StatusCode::CONFLICT,
            BookingError::ExpiredReservation(_) => StatusCode::GONE,
            BookingError::StorageConflict => StatusCode::SERVICE_UNAVAILABLE,
            BookingError::PaymentDeclined(_) => StatusCode::PAYMENT_REQUIRED,
            BookingError::InvalidSeatState { .. }
            | BookingError::Database(_)
            | BookingError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            BookingError::Validation(_) => "validation_error",
            BookingError::NotFound(_) => "not_found",
            BookingError::SeatUnavailable(_) => "seat_unavailable",
            BookingError::InvalidStateTransition { .. } => "invalid_state_transition",
            BookingError::ExpiredReservation(_) => "expired_reservation",
            BookingError::StorageConflict => "storage_conflict",
            BookingError::PaymentDeclined(_) => "payment_declined",
            BookingError::InvalidSeatState { .. }
            | BookingError::Database(_)
            | BookingError::Internal(_) => "internal_error",
        }
    }
}

impl From<sqlx::Error> for BookingError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            // serialization_failure, deadlock_detected, unique_violation
            if matches!(db.code().as_deref(), Some("40001" | "40P01" | "23505")) {
                return BookingError::StorageConflict;
            }
        }
        BookingError::Database(err)
    }
}

impl IntoResponse for BookingError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "internal error while handling request");
            "Internal Server Error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": self.code(),
            "message": message,
            "retryable": self.is_retryable(),
        }));

        (status, body).into_response()
    }
}
