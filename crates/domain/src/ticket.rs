//! Tickets: the durable claim an order owns on a seat.

use chrono::{DateTime, Utc};
use common::{EventId, Money, OrderId, SeatId, TicketId, UserId};
use serde::{Deserialize, Serialize};

/// The state of a ticket in its lifecycle.
///
/// State transitions:
/// ```text
/// Reserved ──► Issued ──► CheckedIn / NoShow
///    │            │
///    │            └──► PendingRefund ──► Refunded
///    │                       │
///    │                       └──► Issued   (refund rejected)
///    └──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TicketStatus {
    /// Created with a pending order; seat is claimed but payment is open.
    #[default]
    Reserved,

    /// Payment confirmed; the ticket is valid for entry.
    Issued,

    /// Order failed or was cancelled before payment (terminal).
    Cancelled,

    /// A refund request covering this ticket is in flight.
    PendingRefund,

    /// Money returned; the seat claim is relinquished (terminal).
    Refunded,

    /// Scanned at the venue entrance.
    CheckedIn,

    /// Issued but never scanned.
    NoShow,
}

impl TicketStatus {
    /// Returns true while this ticket keeps its seat out of inventory.
    ///
    /// This is the core-invariant predicate: a seat is referenced by at
    /// most one of {a live hold, a ticket for which this returns true}.
    pub fn holds_seat(&self) -> bool {
        !matches!(self, TicketStatus::Cancelled | TicketStatus::Refunded)
    }

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TicketStatus::Cancelled | TicketStatus::Refunded)
    }

    /// Returns true if a refund may target this ticket.
    pub fn refundable(&self) -> bool {
        matches!(self, TicketStatus::Issued)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Reserved => "Reserved",
            TicketStatus::Issued => "Issued",
            TicketStatus::Cancelled => "Cancelled",
            TicketStatus::PendingRefund => "PendingRefund",
            TicketStatus::Refunded => "Refunded",
            TicketStatus::CheckedIn => "CheckedIn",
            TicketStatus::NoShow => "NoShow",
        }
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One ticket per claimed seat per order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub order_id: OrderId,
    pub event_id: EventId,
    pub seat_id: SeatId,
    pub price: Money,
    pub attendee_id: UserId,
    pub status: TicketStatus,
    /// Signed payload for the entry QR, attached when the ticket issues.
    pub qr_payload: Option<String>,
    pub purchased_at: Option<DateTime<Utc>>,
}

impl Ticket {
    /// Creates a reserved ticket for a seat being claimed at checkout.
    pub fn reserve(
        order_id: OrderId,
        event_id: EventId,
        seat_id: SeatId,
        price: Money,
        attendee_id: UserId,
    ) -> Self {
        Self {
            id: TicketId::new(),
            order_id,
            event_id,
            seat_id,
            price,
            attendee_id,
            status: TicketStatus::Reserved,
            qr_payload: None,
            purchased_at: None,
        }
    }
}
