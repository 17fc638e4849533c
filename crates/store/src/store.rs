//! The store trait and its atomic write batch.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    EventId, HoldId, LedgerEntryId, Money, OrderId, PaymentMethodId, RefundRequestId, SeatId,
    Version,
};
use domain::{
    Hold, LedgerEntry, LedgerStatus, Order, Payment, PaymentMethod, RefundRequest,
    RefundRequestItem, SeatClaim, Ticket,
};

use crate::Result;

/// One element of an atomic write batch.
///
/// `ClaimSeat` and `ReleaseSeat` are conditioned on the seat version read
/// beforehand; a mismatch fails the write, and with it the whole batch.
/// `PutHold` first discards an expired hold on the same seat, then refuses
/// if a live one remains. The `Put*` variants insert or replace by key.
#[derive(Debug, Clone)]
pub enum Write {
    PutSeat(SeatClaim),
    /// Flip a seat unavailable iff its version is unchanged since read.
    ClaimSeat {
        event_id: EventId,
        seat_id: SeatId,
        expected: Version,
    },
    /// Flip a seat back to available iff its version is unchanged since read.
    ReleaseSeat {
        event_id: EventId,
        seat_id: SeatId,
        expected: Version,
    },
    PutHold(Hold),
    DeleteHold(HoldId),
    PutOrder(Order),
    PutTicket(Ticket),
    PutPayment(Payment),
    PutPaymentMethod(PaymentMethod),
    PutRefundRequest(RefundRequest),
    PutRefundItem(RefundRequestItem),
    PutLedgerEntry(LedgerEntry),
    /// Move a ledger entry to its final status. On `Success` the store
    /// stamps `running_balance` under the commit lock as the sum of all
    /// previously settled signed amounts plus this entry's.
    SettleLedgerEntry {
        id: LedgerEntryId,
        status: LedgerStatus,
    },
}

/// The durable store every component mutates.
///
/// Reads are point-in-time snapshots; `apply` is the only mutation path
/// and commits its batch atomically.
#[async_trait]
pub trait Store: Send + Sync {
    /// Applies a batch of writes as one atomic unit.
    async fn apply(&self, writes: Vec<Write>) -> Result<()>;

    // Seats

    /// Looks up a single seat record.
    async fn seat(&self, event_id: EventId, seat_id: SeatId) -> Result<Option<SeatClaim>>;

    /// Returns the requested seat records that exist for the event.
    async fn seats(&self, event_id: EventId, seat_ids: &[SeatId]) -> Result<Vec<SeatClaim>>;

    /// Returns every seat record for the event.
    async fn seats_for_event(&self, event_id: EventId) -> Result<Vec<SeatClaim>>;

    /// Seats flagged unavailable that no live ticket references any
    /// more — abandoned claims awaiting release by the sweep.
    async fn orphaned_claimed_seats(&self) -> Result<Vec<SeatClaim>>;

    // Holds

    /// Seat ids with a hold whose expiry is still in the future.
    async fn active_held_seat_ids(
        &self,
        event_id: EventId,
        now: DateTime<Utc>,
    ) -> Result<HashSet<SeatId>>;

    /// Live holds on the given seats.
    async fn active_holds(
        &self,
        event_id: EventId,
        seat_ids: &[SeatId],
        now: DateTime<Utc>,
    ) -> Result<Vec<Hold>>;

    /// All holds (live or not) on the given seats.
    async fn holds_for_seats(&self, event_id: EventId, seat_ids: &[SeatId]) -> Result<Vec<Hold>>;

    /// Holds whose expiry has passed, across all events.
    async fn expired_holds(&self, now: DateTime<Utc>) -> Result<Vec<Hold>>;

    // Orders, tickets, payments

    async fn order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Pending orders whose pending window has lapsed.
    async fn expired_pending_orders(&self, now: DateTime<Utc>) -> Result<Vec<Order>>;

    async fn tickets_for_order(&self, order_id: OrderId) -> Result<Vec<Ticket>>;

    async fn payments_for_order(&self, order_id: OrderId) -> Result<Vec<Payment>>;

    /// Looks up the payment carrying the given provider reference.
    async fn payment_by_ref(&self, reference: &str) -> Result<Option<Payment>>;

    async fn payment_method(&self, id: PaymentMethodId) -> Result<Option<PaymentMethod>>;

    // Refunds and ledger

    async fn refund_request(&self, id: RefundRequestId) -> Result<Option<RefundRequest>>;

    async fn refund_items(&self, id: RefundRequestId) -> Result<Vec<RefundRequestItem>>;

    async fn refund_requests_for_order(&self, order_id: OrderId) -> Result<Vec<RefundRequest>>;

    async fn ledger_entries_for_refund(&self, id: RefundRequestId) -> Result<Vec<LedgerEntry>>;

    /// Sum of signed amounts across all settled ledger entries.
    async fn settled_balance(&self) -> Result<Money>;
}
