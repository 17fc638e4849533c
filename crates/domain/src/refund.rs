//! Refund requests.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, RefundRequestId, TicketId, UserId};
use serde::{Deserialize, Serialize};

/// The state of a refund request.
///
/// State transitions:
/// ```text
/// Pending ──accept──► Approved ──complete──► Paid
///    │                   │
///    └───────reject──────┴──► Rejected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RefundStatus {
    /// Requested by the buyer, awaiting admin review.
    #[default]
    Pending,

    /// Admin accepted; money movement outstanding.
    Approved,

    /// Admin rejected (terminal).
    Rejected,

    /// Money returned (terminal).
    Paid,
}

impl RefundStatus {
    /// Returns true if an admin may accept from this state.
    pub fn can_accept(&self) -> bool {
        matches!(self, RefundStatus::Pending)
    }

    /// Returns true if an admin may reject from this state.
    pub fn can_reject(&self) -> bool {
        matches!(self, RefundStatus::Pending | RefundStatus::Approved)
    }

    /// Returns true if an admin may mark the refund paid from this state.
    pub fn can_complete(&self) -> bool {
        matches!(self, RefundStatus::Approved)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RefundStatus::Rejected | RefundStatus::Paid)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundStatus::Pending => "Pending",
            RefundStatus::Approved => "Approved",
            RefundStatus::Rejected => "Rejected",
            RefundStatus::Paid => "Paid",
        }
    }
}

impl std::fmt::Display for RefundStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A request to walk part or all of a paid order back to released money.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRequest {
    pub id: RefundRequestId,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub amount: Money,
    pub status: RefundStatus,
    pub reason: Option<String>,
    pub admin_note: Option<String>,
    /// Reference to the payout receipt, attached when marked paid.
    pub receipt_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub processed_by: Option<UserId>,
}

impl RefundRequest {
    /// Creates a pending refund request.
    pub fn pending(
        order_id: OrderId,
        user_id: UserId,
        amount: Money,
        reason: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RefundRequestId::new(),
            order_id,
            user_id,
            amount,
            status: RefundStatus::Pending,
            reason,
            admin_note: None,
            receipt_ref: None,
            created_at,
            processed_at: None,
            processed_by: None,
        }
    }
}

/// Per-ticket line of an itemized refund request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRequestItem {
    pub refund_request_id: RefundRequestId,
    pub ticket_id: TicketId,
    pub amount: Money,
}
