use common::Money;
use domain::{OrderStatus, RefundStatus};
use store::StoreError;
use thiserror::Error;

/// Errors raised by refund actions.
#[derive(Debug, Error)]
pub enum RefundError {
    /// Order not found.
    #[error("order not found")]
    OrderNotFound,

    /// Refund request not found.
    #[error("refund request not found")]
    RequestNotFound,

    /// The caller does not own the order.
    #[error("caller does not own this order")]
    NotOwner,

    /// Refunds may only be requested against paid orders.
    #[error("order is not refundable in status {status}")]
    OrderNotRefundable { status: OrderStatus },

    /// Another refund request is already awaiting review.
    #[error("a pending refund request already exists for this order")]
    AlreadyRequested,

    /// Every successfully paid amount has already been returned.
    #[error("order has been fully refunded")]
    FullyRefunded,

    /// The requested amount falls outside the refundable remainder.
    #[error("refund amount {requested} is outside the refundable remainder {remaining}")]
    AmountOutOfBounds { requested: Money, remaining: Money },

    /// None of the selected tickets can be refunded.
    #[error("nothing refundable for the selected tickets")]
    NothingRefundable,

    /// The request is not in a status the action applies to. Reported
    /// with the current status so the caller can see what happened.
    #[error("refund request is {status}, cannot {action}")]
    WrongStatus {
        status: RefundStatus,
        action: &'static str,
    },

    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Convenience type alias for refund results.
pub type Result<T> = std::result::Result<T, RefundError>;
