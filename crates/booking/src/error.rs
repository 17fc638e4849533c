use common::SeatId;
use store::StoreError;
use thiserror::Error;

/// Errors raised on the hold and checkout paths.
#[derive(Debug, Error)]
pub enum BookingError {
    /// No seats were selected.
    #[error("no seats selected")]
    NoSeats,

    /// Some requested seats do not exist for the event.
    #[error("some seats do not exist for this event: {seat_ids:?}")]
    UnknownSeats { seat_ids: Vec<SeatId> },

    /// Pre-check rejection: seats already sold or held by someone else.
    /// Retryable by re-selecting.
    #[error("seats unavailable or held: {seat_ids:?}")]
    SeatsUnavailable { seat_ids: Vec<SeatId> },

    /// Lost the commit race: a seat changed under us between the
    /// re-validation read and the conditioned write. Nothing was
    /// persisted; the caller must re-select.
    #[error("seats were claimed concurrently: {seat_ids:?}")]
    SeatsTaken { seat_ids: Vec<SeatId> },

    /// The requested payment method is not registered.
    #[error("payment method not found")]
    MethodNotFound,

    /// The requested payment method is disabled.
    #[error("payment method is inactive")]
    MethodInactive,

    /// Operator error: the payment method has no gateway key configured.
    #[error("payment method gateway is not configured")]
    GatewayUnconfigured,

    /// The payment-initiation collaborator failed.
    #[error("payment gateway error: {0}")]
    Gateway(String),

    /// Order not found.
    #[error("order not found")]
    OrderNotFound,

    /// The caller does not own the order.
    #[error("caller does not own this order")]
    NotOwner,

    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Convenience type alias for booking results.
pub type Result<T> = std::result::Result<T, BookingError>;
