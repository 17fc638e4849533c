use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    EventId, HoldId, Money, OrderId, PaymentId, PaymentMethodId, RefundRequestId, SeatId, TicketId,
};
use domain::{
    Hold, LedgerEntry, LedgerStatus, Order, Payment, PaymentMethod, RefundRequest,
    RefundRequestItem, SeatClaim, Ticket,
};
use tokio::sync::RwLock;

use crate::{
    Result, StoreError,
    store::{Store, Write},
};

#[derive(Debug, Clone, Default)]
struct State {
    seats: HashMap<(EventId, SeatId), SeatClaim>,
    holds: HashMap<HoldId, Hold>,
    orders: HashMap<OrderId, Order>,
    tickets: HashMap<TicketId, Ticket>,
    payments: HashMap<PaymentId, Payment>,
    methods: HashMap<PaymentMethodId, PaymentMethod>,
    refunds: HashMap<RefundRequestId, RefundRequest>,
    refund_items: Vec<RefundRequestItem>,
    ledger: Vec<LedgerEntry>,
}

/// In-memory store implementation.
///
/// Provides the same interface and semantics as the PostgreSQL
/// implementation. A batch is staged against a copy of the state and
/// committed by swap, so a failed write leaves nothing behind.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
}

impl MemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of holds currently stored, live or not.
    pub async fn hold_count(&self) -> usize {
        self.state.read().await.holds.len()
    }

    /// Returns the total number of ledger entries.
    pub async fn ledger_len(&self) -> usize {
        self.state.read().await.ledger.len()
    }
}

fn apply_one(state: &mut State, write: Write) -> Result<()> {
    match write {
        Write::PutSeat(seat) => {
            state.seats.insert((seat.event_id, seat.seat_id), seat);
        }
        Write::ClaimSeat {
            event_id,
            seat_id,
            expected,
        } => {
            let seat = state
                .seats
                .get_mut(&(event_id, seat_id))
                .ok_or(StoreError::UnknownRecord { entity: "seat" })?;
            if seat.version != expected || !seat.available {
                return Err(StoreError::Conflict {
                    event_id,
                    seat_id,
                    expected,
                });
            }
            seat.available = false;
            seat.version = seat.version.next();
        }
        Write::ReleaseSeat {
            event_id,
            seat_id,
            expected,
        } => {
            let seat = state
                .seats
                .get_mut(&(event_id, seat_id))
                .ok_or(StoreError::UnknownRecord { entity: "seat" })?;
            if seat.version != expected {
                return Err(StoreError::Conflict {
                    event_id,
                    seat_id,
                    expected,
                });
            }
            seat.available = true;
            seat.version = seat.version.next();
        }
        Write::PutHold(hold) => {
            let now = Utc::now();
            // An expired hold on the same seat no longer blocks; drop it.
            state
                .holds
                .retain(|_, h| {
                    !(h.event_id == hold.event_id
                        && h.seat_id == hold.seat_id
                        && !h.is_active(now))
                });
            let taken = state
                .holds
                .values()
                .any(|h| h.event_id == hold.event_id && h.seat_id == hold.seat_id);
            if taken {
                return Err(StoreError::AlreadyHeld {
                    event_id: hold.event_id,
                    seat_id: hold.seat_id,
                });
            }
            state.holds.insert(hold.id, hold);
        }
        Write::DeleteHold(id) => {
            state.holds.remove(&id);
        }
        Write::PutOrder(order) => {
            state.orders.insert(order.id, order);
        }
        Write::PutTicket(ticket) => {
            state.tickets.insert(ticket.id, ticket);
        }
        Write::PutPayment(payment) => {
            state.payments.insert(payment.id, payment);
        }
        Write::PutPaymentMethod(method) => {
            state.methods.insert(method.id, method);
        }
        Write::PutRefundRequest(request) => {
            state.refunds.insert(request.id, request);
        }
        Write::PutRefundItem(item) => {
            state.refund_items.retain(|i| {
                !(i.refund_request_id == item.refund_request_id && i.ticket_id == item.ticket_id)
            });
            state.refund_items.push(item);
        }
        Write::PutLedgerEntry(entry) => {
            state.ledger.push(entry);
        }
        Write::SettleLedgerEntry { id, status } => {
            let balance: Money = state
                .ledger
                .iter()
                .filter(|e| e.status == LedgerStatus::Success)
                .map(LedgerEntry::signed_amount)
                .sum();
            let entry = state
                .ledger
                .iter_mut()
                .find(|e| e.id == id)
                .ok_or(StoreError::UnknownRecord {
                    entity: "ledger entry",
                })?;
            entry.status = status;
            if status == LedgerStatus::Success {
                entry.running_balance = balance + entry.signed_amount();
            }
        }
    }
    Ok(())
}

#[async_trait]
impl Store for MemoryStore {
    async fn apply(&self, writes: Vec<Write>) -> Result<()> {
        let mut guard = self.state.write().await;
        let mut staged = guard.clone();
        for write in writes {
            apply_one(&mut staged, write)?;
        }
        *guard = staged;
        Ok(())
    }

    async fn seat(&self, event_id: EventId, seat_id: SeatId) -> Result<Option<SeatClaim>> {
        let state = self.state.read().await;
        Ok(state.seats.get(&(event_id, seat_id)).cloned())
    }

    async fn seats(&self, event_id: EventId, seat_ids: &[SeatId]) -> Result<Vec<SeatClaim>> {
        let state = self.state.read().await;
        let mut seats: Vec<_> = seat_ids
            .iter()
            .filter_map(|seat_id| state.seats.get(&(event_id, *seat_id)).cloned())
            .collect();
        seats.sort_by_key(|s| s.seat_id);
        Ok(seats)
    }

    async fn seats_for_event(&self, event_id: EventId) -> Result<Vec<SeatClaim>> {
        let state = self.state.read().await;
        let mut seats: Vec<_> = state
            .seats
            .values()
            .filter(|s| s.event_id == event_id)
            .cloned()
            .collect();
        seats.sort_by_key(|s| s.seat_id);
        Ok(seats)
    }

    async fn orphaned_claimed_seats(&self) -> Result<Vec<SeatClaim>> {
        let state = self.state.read().await;
        let mut seats: Vec<_> = state
            .seats
            .values()
            .filter(|s| !s.available)
            .filter(|s| {
                !state.tickets.values().any(|t| {
                    t.event_id == s.event_id
                        && t.seat_id == s.seat_id
                        && t.status.holds_seat()
                })
            })
            .cloned()
            .collect();
        seats.sort_by_key(|s| s.seat_id);
        Ok(seats)
    }

    async fn active_held_seat_ids(
        &self,
        event_id: EventId,
        now: DateTime<Utc>,
    ) -> Result<HashSet<SeatId>> {
        let state = self.state.read().await;
        Ok(state
            .holds
            .values()
            .filter(|h| h.event_id == event_id && h.is_active(now))
            .map(|h| h.seat_id)
            .collect())
    }

    async fn active_holds(
        &self,
        event_id: EventId,
        seat_ids: &[SeatId],
        now: DateTime<Utc>,
    ) -> Result<Vec<Hold>> {
        let state = self.state.read().await;
        Ok(state
            .holds
            .values()
            .filter(|h| {
                h.event_id == event_id && seat_ids.contains(&h.seat_id) && h.is_active(now)
            })
            .cloned()
            .collect())
    }

    async fn holds_for_seats(&self, event_id: EventId, seat_ids: &[SeatId]) -> Result<Vec<Hold>> {
        let state = self.state.read().await;
        Ok(state
            .holds
            .values()
            .filter(|h| h.event_id == event_id && seat_ids.contains(&h.seat_id))
            .cloned()
            .collect())
    }

    async fn expired_holds(&self, now: DateTime<Utc>) -> Result<Vec<Hold>> {
        let state = self.state.read().await;
        let mut holds: Vec<_> = state
            .holds
            .values()
            .filter(|h| !h.is_active(now))
            .cloned()
            .collect();
        holds.sort_by_key(|h| h.expires_at);
        Ok(holds)
    }

    async fn order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state.orders.get(&order_id).cloned())
    }

    async fn expired_pending_orders(&self, now: DateTime<Utc>) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|o| o.pending_expired(now))
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }

    async fn tickets_for_order(&self, order_id: OrderId) -> Result<Vec<Ticket>> {
        let state = self.state.read().await;
        let mut tickets: Vec<_> = state
            .tickets
            .values()
            .filter(|t| t.order_id == order_id)
            .cloned()
            .collect();
        tickets.sort_by_key(|t| t.id);
        Ok(tickets)
    }

    async fn payments_for_order(&self, order_id: OrderId) -> Result<Vec<Payment>> {
        let state = self.state.read().await;
        let mut payments: Vec<_> = state
            .payments
            .values()
            .filter(|p| p.order_id == order_id)
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.id);
        Ok(payments)
    }

    async fn payment_by_ref(&self, reference: &str) -> Result<Option<Payment>> {
        let state = self.state.read().await;
        Ok(state
            .payments
            .values()
            .find(|p| p.transaction_ref.as_deref() == Some(reference))
            .cloned())
    }

    async fn payment_method(&self, id: PaymentMethodId) -> Result<Option<PaymentMethod>> {
        let state = self.state.read().await;
        Ok(state.methods.get(&id).cloned())
    }

    async fn refund_request(&self, id: RefundRequestId) -> Result<Option<RefundRequest>> {
        let state = self.state.read().await;
        Ok(state.refunds.get(&id).cloned())
    }

    async fn refund_items(&self, id: RefundRequestId) -> Result<Vec<RefundRequestItem>> {
        let state = self.state.read().await;
        Ok(state
            .refund_items
            .iter()
            .filter(|i| i.refund_request_id == id)
            .cloned()
            .collect())
    }

    async fn refund_requests_for_order(&self, order_id: OrderId) -> Result<Vec<RefundRequest>> {
        let state = self.state.read().await;
        let mut refunds: Vec<_> = state
            .refunds
            .values()
            .filter(|r| r.order_id == order_id)
            .cloned()
            .collect();
        refunds.sort_by_key(|r| r.created_at);
        Ok(refunds)
    }

    async fn ledger_entries_for_refund(&self, id: RefundRequestId) -> Result<Vec<LedgerEntry>> {
        let state = self.state.read().await;
        Ok(state
            .ledger
            .iter()
            .filter(|e| e.refund_request_id == Some(id))
            .cloned()
            .collect())
    }

    async fn settled_balance(&self) -> Result<Money> {
        let state = self.state.read().await;
        Ok(state
            .ledger
            .iter()
            .filter(|e| e.status == LedgerStatus::Success)
            .map(LedgerEntry::signed_amount)
            .sum())
    }
}
