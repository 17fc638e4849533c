//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use booking::BookingError;
use reconcile::ReconcileError;
use refund::RefundError;
use store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Missing or unresolvable credential.
    Unauthorized,
    /// Bad request from the client.
    BadRequest(String),
    /// Hold/checkout error.
    Booking(BookingError),
    /// Reconciliation error.
    Reconcile(ReconcileError),
    /// Refund workflow error.
    Refund(RefundError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Booking(err) => booking_error_to_response(err),
            ApiError::Reconcile(err) => reconcile_error_to_response(err),
            ApiError::Refund(err) => refund_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn store_error_status(err: &StoreError) -> StatusCode {
    if err.is_conflict() {
        StatusCode::CONFLICT
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

fn booking_error_to_response(err: BookingError) -> (StatusCode, String) {
    let status = match &err {
        // Retryable races: the caller re-selects seats.
        BookingError::SeatsUnavailable { .. } | BookingError::SeatsTaken { .. } => {
            StatusCode::CONFLICT
        }
        BookingError::NoSeats | BookingError::UnknownSeats { .. } => StatusCode::BAD_REQUEST,
        BookingError::MethodNotFound | BookingError::OrderNotFound => StatusCode::NOT_FOUND,
        BookingError::MethodInactive => StatusCode::UNPROCESSABLE_ENTITY,
        BookingError::NotOwner => StatusCode::FORBIDDEN,
        // Operator error; never silently defaulted.
        BookingError::GatewayUnconfigured => StatusCode::INTERNAL_SERVER_ERROR,
        BookingError::Gateway(_) => StatusCode::BAD_GATEWAY,
        BookingError::Store(e) => store_error_status(e),
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %err, "internal server error");
    }
    (status, err.to_string())
}

fn reconcile_error_to_response(err: ReconcileError) -> (StatusCode, String) {
    let status = match &err {
        ReconcileError::BadSignature => StatusCode::FORBIDDEN,
        ReconcileError::Store(e) => store_error_status(e),
    };
    (status, err.to_string())
}

fn refund_error_to_response(err: RefundError) -> (StatusCode, String) {
    let status = match &err {
        RefundError::OrderNotFound | RefundError::RequestNotFound => StatusCode::NOT_FOUND,
        RefundError::NotOwner => StatusCode::FORBIDDEN,
        // Business-rule rejections: not retryable without changing the
        // request, reported with the current status.
        RefundError::OrderNotRefundable { .. }
        | RefundError::AlreadyRequested
        | RefundError::FullyRefunded
        | RefundError::AmountOutOfBounds { .. }
        | RefundError::NothingRefundable
        | RefundError::WrongStatus { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        RefundError::Store(e) => store_error_status(e),
    };
    (status, err.to_string())
}

impl From<BookingError> for ApiError {
    fn from(err: BookingError) -> Self {
        ApiError::Booking(err)
    }
}

impl From<ReconcileError> for ApiError {
    fn from(err: ReconcileError) -> Self {
        ApiError::Reconcile(err)
    }
}

impl From<RefundError> for ApiError {
    fn from(err: RefundError) -> Self {
        ApiError::Refund(err)
    }
}
