//! The money-movement ledger.

use chrono::{DateTime, Utc};
use common::{LedgerEntryId, Money, OrderId, RefundRequestId};
use serde::{Deserialize, Serialize};

/// Which way money moved relative to the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedgerDirection {
    /// Money came in (ticket sale).
    In,
    /// Money went out (refund payout).
    Out,
}

/// Why the money moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedgerPurpose {
    TicketSale,
    Refund,
}

/// Settlement state of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LedgerStatus {
    /// Recorded but not yet settled; excluded from the running balance.
    #[default]
    Pending,
    /// Settled; contributes its signed amount to the running balance.
    Success,
    /// Abandoned (e.g. the refund was rejected).
    Failed,
}

impl LedgerDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerDirection::In => "In",
            LedgerDirection::Out => "Out",
        }
    }
}

impl LedgerPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerPurpose::TicketSale => "TicketSale",
            LedgerPurpose::Refund => "Refund",
        }
    }
}

impl LedgerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerStatus::Pending => "Pending",
            LedgerStatus::Success => "Success",
            LedgerStatus::Failed => "Failed",
        }
    }
}

/// An append-mostly record of one monetary movement.
///
/// `running_balance` is stamped exactly once, when the entry settles, as
/// the sum of all previously settled entries' signed amounts plus this
/// one; it is never recomputed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub order_id: OrderId,
    pub refund_request_id: Option<RefundRequestId>,
    /// Magnitude of the movement; the sign lives in `direction`.
    pub amount: Money,
    pub direction: LedgerDirection,
    pub purpose: LedgerPurpose,
    pub status: LedgerStatus,
    pub running_balance: Money,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Creates a pending outflow for a refund request.
    pub fn pending_refund(
        order_id: OrderId,
        refund_request_id: RefundRequestId,
        amount: Money,
        note: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: LedgerEntryId::new(),
            order_id,
            refund_request_id: Some(refund_request_id),
            amount,
            direction: LedgerDirection::Out,
            purpose: LedgerPurpose::Refund,
            status: LedgerStatus::Pending,
            running_balance: Money::zero(),
            note,
            created_at,
        }
    }

    /// Creates an unsettled inflow for a reconciled ticket sale.
    pub fn sale(order_id: OrderId, amount: Money, created_at: DateTime<Utc>) -> Self {
        Self {
            id: LedgerEntryId::new(),
            order_id,
            refund_request_id: None,
            amount,
            direction: LedgerDirection::In,
            purpose: LedgerPurpose::TicketSale,
            status: LedgerStatus::Pending,
            running_balance: Money::zero(),
            note: None,
            created_at,
        }
    }

    /// The entry's contribution to the balance: positive for inflows,
    /// negative for outflows.
    pub fn signed_amount(&self) -> Money {
        match self.direction {
            LedgerDirection::In => self.amount.abs(),
            LedgerDirection::Out => -self.amount.abs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_amount_follows_direction() {
        let now = Utc::now();
        let sale = LedgerEntry::sale(OrderId::new(), Money::from_minor(1000), now);
        assert_eq!(sale.signed_amount().minor(), 1000);

        let refund = LedgerEntry::pending_refund(
            OrderId::new(),
            RefundRequestId::new(),
            Money::from_minor(400),
            None,
            now,
        );
        assert_eq!(refund.signed_amount().minor(), -400);
    }

    #[test]
    fn pending_refund_starts_unsettled() {
        let entry = LedgerEntry::pending_refund(
            OrderId::new(),
            RefundRequestId::new(),
            Money::from_minor(400),
            Some("changed plans".to_string()),
            Utc::now(),
        );
        assert_eq!(entry.status, LedgerStatus::Pending);
        assert!(entry.running_balance.is_zero());
    }
}
