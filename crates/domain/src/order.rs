//! Orders and the order status state machine.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, UserId};
use serde::{Deserialize, Serialize};

use crate::ticket::TicketStatus;

/// The state of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──► Paid ──► PendingRefund ──► Refunded
///    │          │            │
///    │          └──► PartiallyRefunded ◄┘
///    └──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// Created at checkout; payment confirmation outstanding.
    #[default]
    Pending,

    /// Payment reconciled successfully; tickets issued.
    Paid,

    /// Payment failed, expired, or was manually cancelled (terminal).
    Cancelled,

    /// A refund covering every live ticket is in flight.
    PendingRefund,

    /// Some tickets refunded or refunding, others still active.
    PartiallyRefunded,

    /// Every ticket refunded (terminal).
    Refunded,
}

impl OrderStatus {
    /// Returns true if a provider success signal may still pay this order.
    pub fn can_mark_paid(&self) -> bool {
        matches!(self, OrderStatus::Pending)
    }

    /// Returns true if the order can still be cancelled.
    pub fn can_cancel(&self) -> bool {
        matches!(self, OrderStatus::Pending)
    }

    /// Returns true if a refund may be requested against this order.
    pub fn can_request_refund(&self) -> bool {
        matches!(self, OrderStatus::Paid)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Refunded)
    }

    /// Order status while a refund is in flight, derived from the ticket
    /// set: `PendingRefund` when nothing active remains, otherwise
    /// `PartiallyRefunded`.
    pub fn derive_refund_pending(tickets: &[TicketStatus]) -> OrderStatus {
        let any_active = tickets
            .iter()
            .any(|t| !matches!(t, TicketStatus::PendingRefund | TicketStatus::Refunded));
        if any_active {
            OrderStatus::PartiallyRefunded
        } else {
            OrderStatus::PendingRefund
        }
    }

    /// Order status once refunds settle, derived from the ticket set:
    /// `Refunded` when every ticket is refunded, `PartiallyRefunded` when
    /// some are, `Paid` when none are.
    pub fn derive_refund_settled(tickets: &[TicketStatus]) -> OrderStatus {
        if tickets.iter().all(|t| matches!(t, TicketStatus::Refunded)) {
            OrderStatus::Refunded
        } else if tickets.iter().any(|t| matches!(t, TicketStatus::Refunded)) {
            OrderStatus::PartiallyRefunded
        } else {
            OrderStatus::Paid
        }
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Paid => "Paid",
            OrderStatus::Cancelled => "Cancelled",
            OrderStatus::PendingRefund => "PendingRefund",
            OrderStatus::PartiallyRefunded => "PartiallyRefunded",
            OrderStatus::Refunded => "Refunded",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An order: owner of the seat claims held by its tickets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub total_amount: Money,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    /// While `status` is `Pending`: the instant after which the sweep may
    /// reclaim this order's seats.
    pub pending_expires_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Creates a pending order with the given expiry window.
    pub fn pending(
        user_id: UserId,
        total_amount: Money,
        created_at: DateTime<Utc>,
        pending_expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OrderId::new(),
            user_id,
            total_amount,
            status: OrderStatus::Pending,
            created_at,
            pending_expires_at: Some(pending_expires_at),
        }
    }

    /// True once the pending window has lapsed without payment.
    pub fn pending_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == OrderStatus::Pending
            && self.pending_expires_at.is_some_and(|at| at <= now)
    }
}
