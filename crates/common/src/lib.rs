//! Shared primitives for the seat-claim system.
//!
//! Typed identifiers, minor-unit money, and the optimistic-concurrency
//! version token carried by every contested inventory record.

pub mod ids;
pub mod money;
pub mod version;

pub use ids::{
    EventId, HoldId, LedgerEntryId, OrderId, PaymentId, PaymentMethodId, RefundRequestId, SeatId,
    TicketId, UserId,
};
pub use money::Money;
pub use version::Version;
