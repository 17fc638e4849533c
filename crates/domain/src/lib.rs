//! Domain layer for the seat-claim system.
//!
//! Entities and their status state machines: the seat inventory record,
//! temporary holds, orders with their tickets and payments, refund
//! requests, and the money-movement ledger. All persistence and
//! transaction discipline lives in the `store` crate; everything here is
//! plain data plus transition predicates.

pub mod hold;
pub mod ledger;
pub mod order;
pub mod payment;
pub mod refund;
pub mod seat;
pub mod ticket;

pub use hold::Hold;
pub use ledger::{LedgerDirection, LedgerEntry, LedgerPurpose, LedgerStatus};
pub use order::{Order, OrderStatus};
pub use payment::{Payment, PaymentMethod, PaymentStatus};
pub use refund::{RefundRequest, RefundRequestItem, RefundStatus};
pub use seat::{Identity, SeatAvailability, SeatClaim, SeatState};
pub use ticket::{Ticket, TicketStatus};
