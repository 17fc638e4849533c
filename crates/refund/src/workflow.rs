//! Refund actions: create, accept, reject, complete.

use std::collections::HashSet;

use chrono::Utc;
use common::{Money, OrderId, RefundRequestId, TicketId};
use domain::{
    Identity, LedgerEntry, LedgerStatus, OrderStatus, PaymentStatus, RefundRequest,
    RefundRequestItem, RefundStatus, Ticket, TicketStatus,
};
use store::{Store, Write};

use crate::error::{RefundError, Result};

/// A buyer's refund request.
#[derive(Debug, Clone)]
pub struct CreateRefund {
    pub order_id: OrderId,
    /// Restrict the refund to these tickets; `None` targets every ticket.
    pub ticket_ids: Option<Vec<TicketId>>,
    /// Cap the refunded amount; `None` refunds the full itemized total.
    pub amount: Option<Money>,
    pub reason: Option<String>,
}

/// Drives refund requests through their state machine.
///
/// `Pending --accept--> Approved --complete--> Paid`, with `reject`
/// allowed from Pending or Approved. Every action commits its status
/// write and its ledger effect in one atomic batch.
pub struct RefundWorkflow<S> {
    store: S,
}

impl<S: Store> RefundWorkflow<S> {
    /// Creates a refund workflow over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Files a refund request against a paid order.
    ///
    /// The amount must be positive and fit inside "successfully paid
    /// minus already refunded". Targeted tickets move to PendingRefund
    /// immediately; the order becomes PendingRefund when nothing active
    /// remains, else PartiallyRefunded.
    #[tracing::instrument(skip(self, caller, request), fields(user_id = %caller.user_id, order_id = %request.order_id))]
    pub async fn create(
        &self,
        caller: Identity,
        request: CreateRefund,
    ) -> Result<(RefundRequest, Vec<RefundRequestItem>)> {
        let mut order = self
            .store
            .order(request.order_id)
            .await?
            .ok_or(RefundError::OrderNotFound)?;
        if order.user_id != caller.user_id {
            return Err(RefundError::NotOwner);
        }
        if !order.status.can_request_refund() {
            return Err(RefundError::OrderNotRefundable {
                status: order.status,
            });
        }

        let open = self
            .store
            .refund_requests_for_order(order.id)
            .await?
            .iter()
            .any(|r| r.status == RefundStatus::Pending);
        if open {
            return Err(RefundError::AlreadyRequested);
        }

        let paid: Money = self
            .store
            .payments_for_order(order.id)
            .await?
            .iter()
            .filter(|p| p.status == PaymentStatus::Success)
            .map(|p| p.amount)
            .sum();
        let refunded: Money = self
            .store
            .refund_requests_for_order(order.id)
            .await?
            .iter()
            .filter(|r| r.status == RefundStatus::Paid)
            .map(|r| r.amount)
            .sum();
        let ceiling = paid.remaining_after(refunded);
        if !ceiling.is_positive() {
            return Err(RefundError::FullyRefunded);
        }

        let all_tickets = self.store.tickets_for_order(order.id).await?;
        let targeted: Vec<&Ticket> = match &request.ticket_ids {
            Some(ids) => {
                let wanted: HashSet<TicketId> = ids.iter().copied().collect();
                all_tickets
                    .iter()
                    .filter(|t| wanted.contains(&t.id))
                    .collect()
            }
            None => all_tickets.iter().collect(),
        };

        // Itemize: ticket price, capped at what remains of the ceiling.
        let now = Utc::now();
        let refund_id = RefundRequestId::new();
        let mut items = Vec::new();
        let mut total = Money::zero();
        for ticket in targeted.iter().filter(|t| t.status.refundable()) {
            let amount = ticket.price.abs();
            let capped = if total + amount > ceiling {
                ceiling.remaining_after(total)
            } else {
                amount
            };
            if !capped.is_positive() {
                break;
            }
            items.push(RefundRequestItem {
                refund_request_id: refund_id,
                ticket_id: ticket.id,
                amount: capped,
            });
            total += capped;
        }
        if items.is_empty() {
            return Err(RefundError::NothingRefundable);
        }

        let amount = match request.amount {
            Some(requested) => {
                if !requested.is_positive() || requested > total {
                    return Err(RefundError::AmountOutOfBounds {
                        requested,
                        remaining: total,
                    });
                }
                requested
            }
            None => total,
        };

        let mut refund = RefundRequest::pending(
            order.id,
            caller.user_id,
            amount,
            request.reason.clone(),
            now,
        );
        refund.id = refund_id;

        let ledger = LedgerEntry::pending_refund(
            order.id,
            refund_id,
            amount,
            request.reason.clone(),
            now,
        );

        let mut writes = vec![Write::PutRefundRequest(refund.clone())];
        for item in &items {
            writes.push(Write::PutRefundItem(item.clone()));
        }
        writes.push(Write::PutLedgerEntry(ledger));

        let item_ids: HashSet<TicketId> = items.iter().map(|i| i.ticket_id).collect();
        let statuses =
            self.flip_tickets(&all_tickets, &item_ids, TicketStatus::PendingRefund, &mut writes);
        order.status = OrderStatus::derive_refund_pending(&statuses);
        writes.push(Write::PutOrder(order));

        self.store.apply(writes).await?;
        metrics::counter!("refunds_requested_total").increment(1);

        Ok((refund, items))
    }

    /// Admin accepts a pending request.
    #[tracing::instrument(skip(self, admin), fields(admin_id = %admin.user_id))]
    pub async fn accept(
        &self,
        admin: Identity,
        id: RefundRequestId,
        note: Option<String>,
    ) -> Result<()> {
        let mut refund = self
            .store
            .refund_request(id)
            .await?
            .ok_or(RefundError::RequestNotFound)?;
        if !refund.status.can_accept() {
            return Err(RefundError::WrongStatus {
                status: refund.status,
                action: "accept",
            });
        }

        refund.status = RefundStatus::Approved;
        refund.admin_note = note;
        refund.processed_at = Some(Utc::now());
        refund.processed_by = Some(admin.user_id);

        let mut writes = vec![Write::PutRefundRequest(refund.clone())];
        if let Some(mut order) = self.store.order(refund.order_id).await? {
            let all_tickets = self.store.tickets_for_order(order.id).await?;
            let affected = self.affected_ticket_ids(id).await?;
            let statuses =
                self.flip_tickets(&all_tickets, &affected, TicketStatus::PendingRefund, &mut writes);
            order.status = OrderStatus::derive_refund_pending(&statuses);
            writes.push(Write::PutOrder(order));
        }

        self.store.apply(writes).await?;
        Ok(())
    }

    /// Admin rejects a pending or approved request.
    ///
    /// Affected tickets revert to Issued, the order status is recomputed
    /// from the actual ticket set, and any still-pending ledger entry is
    /// marked failed.
    #[tracing::instrument(skip(self, admin), fields(admin_id = %admin.user_id))]
    pub async fn reject(
        &self,
        admin: Identity,
        id: RefundRequestId,
        note: Option<String>,
    ) -> Result<()> {
        let mut refund = self
            .store
            .refund_request(id)
            .await?
            .ok_or(RefundError::RequestNotFound)?;
        if !refund.status.can_reject() {
            return Err(RefundError::WrongStatus {
                status: refund.status,
                action: "reject",
            });
        }

        refund.status = RefundStatus::Rejected;
        refund.admin_note = note;
        refund.processed_at = Some(Utc::now());
        refund.processed_by = Some(admin.user_id);

        let mut writes = vec![Write::PutRefundRequest(refund.clone())];
        if let Some(mut order) = self.store.order(refund.order_id).await? {
            let all_tickets = self.store.tickets_for_order(order.id).await?;
            let affected = self.affected_ticket_ids(id).await?;
            let mut statuses = Vec::new();
            for ticket in &all_tickets {
                if affected.contains(&ticket.id) && ticket.status == TicketStatus::PendingRefund {
                    let mut reverted = ticket.clone();
                    reverted.status = TicketStatus::Issued;
                    statuses.push(reverted.status);
                    writes.push(Write::PutTicket(reverted));
                } else {
                    statuses.push(ticket.status);
                }
            }
            order.status = OrderStatus::derive_refund_settled(&statuses);
            writes.push(Write::PutOrder(order));
        }

        for entry in self.store.ledger_entries_for_refund(id).await? {
            if entry.status == LedgerStatus::Pending {
                writes.push(Write::SettleLedgerEntry {
                    id: entry.id,
                    status: LedgerStatus::Failed,
                });
            }
        }

        self.store.apply(writes).await?;
        metrics::counter!("refunds_rejected_total").increment(1);
        Ok(())
    }

    /// Admin marks an approved refund as paid out.
    ///
    /// Tickets become Refunded, the order is recomputed, and the ledger
    /// entry settles as a success with the running balance stamped at
    /// commit. Replaying the action on an already-paid request changes
    /// nothing.
    #[tracing::instrument(skip(self, admin), fields(admin_id = %admin.user_id))]
    pub async fn complete(
        &self,
        admin: Identity,
        id: RefundRequestId,
        receipt_ref: Option<String>,
        note: Option<String>,
    ) -> Result<()> {
        let mut refund = self
            .store
            .refund_request(id)
            .await?
            .ok_or(RefundError::RequestNotFound)?;
        if !refund.status.can_complete() {
            return Err(RefundError::WrongStatus {
                status: refund.status,
                action: "complete",
            });
        }

        let now = Utc::now();
        refund.status = RefundStatus::Paid;
        refund.receipt_ref = receipt_ref;
        refund.admin_note = note;
        refund.processed_at = Some(now);
        refund.processed_by = Some(admin.user_id);

        let mut writes = vec![Write::PutRefundRequest(refund.clone())];
        if let Some(mut order) = self.store.order(refund.order_id).await? {
            let all_tickets = self.store.tickets_for_order(order.id).await?;
            let affected = self.affected_ticket_ids(id).await?;
            let statuses =
                self.flip_tickets(&all_tickets, &affected, TicketStatus::Refunded, &mut writes);
            order.status = OrderStatus::derive_refund_settled(&statuses);
            writes.push(Write::PutOrder(order));
        }

        let entries = self.store.ledger_entries_for_refund(id).await?;
        match entries.iter().find(|e| e.status == LedgerStatus::Pending) {
            Some(entry) => {
                writes.push(Write::SettleLedgerEntry {
                    id: entry.id,
                    status: LedgerStatus::Success,
                });
            }
            None => {
                // No pending entry survived (e.g. seeded data); record the
                // outflow now so the balance still moves exactly once.
                let entry = LedgerEntry::pending_refund(
                    refund.order_id,
                    id,
                    refund.amount,
                    refund.admin_note.clone(),
                    now,
                );
                let entry_id = entry.id;
                writes.push(Write::PutLedgerEntry(entry));
                writes.push(Write::SettleLedgerEntry {
                    id: entry_id,
                    status: LedgerStatus::Success,
                });
            }
        }

        self.store.apply(writes).await?;
        metrics::counter!("refunds_paid_total").increment(1);
        Ok(())
    }

    /// Ticket ids covered by a request's items.
    async fn affected_ticket_ids(&self, id: RefundRequestId) -> Result<HashSet<TicketId>> {
        Ok(self
            .store
            .refund_items(id)
            .await?
            .iter()
            .map(|i| i.ticket_id)
            .collect())
    }

    /// Queues status flips for the affected tickets and returns the
    /// resulting status of every ticket on the order.
    fn flip_tickets(
        &self,
        all_tickets: &[Ticket],
        affected: &HashSet<TicketId>,
        to: TicketStatus,
        writes: &mut Vec<Write>,
    ) -> Vec<TicketStatus> {
        let mut statuses = Vec::with_capacity(all_tickets.len());
        for ticket in all_tickets {
            if affected.contains(&ticket.id) && ticket.status != to {
                let mut flipped = ticket.clone();
                flipped.status = to;
                statuses.push(to);
                writes.push(Write::PutTicket(flipped));
            } else {
                statuses.push(ticket.status);
            }
        }
        statuses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use common::{EventId, SeatId, UserId};
    use domain::{Order, Payment, PaymentMethod, SeatClaim};
    use store::MemoryStore;

    struct Fixture {
        store: MemoryStore,
        workflow: RefundWorkflow<MemoryStore>,
        owner: Identity,
        admin: Identity,
        order: Order,
        tickets: Vec<Ticket>,
    }

    /// Seeds a paid order with issued tickets — the state reconciliation
    /// leaves behind — including the settled sale ledger entry.
    async fn paid_order(prices: &[i64]) -> Fixture {
        let store = MemoryStore::new();
        let now = Utc::now();
        let owner = Identity::new(UserId::new());
        let event_id = EventId::new();

        let mut writes = Vec::new();
        let mut order = Order::pending(
            owner.user_id,
            prices.iter().copied().map(Money::from_minor).sum(),
            now,
            now + Duration::minutes(10),
        );
        order.status = OrderStatus::Paid;
        order.pending_expires_at = None;

        let mut tickets = Vec::new();
        for price in prices {
            let seat = SeatClaim::new(event_id, SeatId::new(), "GA", Money::from_minor(*price));
            let mut ticket = Ticket::reserve(
                order.id,
                event_id,
                seat.seat_id,
                seat.price,
                owner.user_id,
            );
            ticket.status = TicketStatus::Issued;
            ticket.purchased_at = Some(now);
            writes.push(Write::PutSeat(SeatClaim {
                available: false,
                version: seat.version.next(),
                ..seat
            }));
            writes.push(Write::PutTicket(ticket.clone()));
            tickets.push(ticket);
        }

        let method = PaymentMethod::new("Bank transfer", "PAY2S");
        let mut payment = Payment::pending(
            order.id,
            method.id,
            order.total_amount,
            "EMP2SREFUND000001",
        );
        payment.status = PaymentStatus::Success;
        payment.transaction_date = Some(now);

        let sale = LedgerEntry::sale(order.id, order.total_amount, now);
        let sale_id = sale.id;

        writes.push(Write::PutOrder(order.clone()));
        writes.push(Write::PutPaymentMethod(method));
        writes.push(Write::PutPayment(payment));
        writes.push(Write::PutLedgerEntry(sale));
        writes.push(Write::SettleLedgerEntry {
            id: sale_id,
            status: LedgerStatus::Success,
        });
        store.apply(writes).await.unwrap();

        Fixture {
            workflow: RefundWorkflow::new(store.clone()),
            store,
            owner,
            admin: Identity::new(UserId::new()),
            order,
            tickets,
        }
    }

    fn full_request(order_id: OrderId) -> CreateRefund {
        CreateRefund {
            order_id,
            ticket_ids: None,
            amount: None,
            reason: Some("event cancelled for me".to_string()),
        }
    }

    #[tokio::test]
    async fn create_full_refund_moves_order_to_pending_refund() {
        let f = paid_order(&[3000, 2000]).await;
        let (refund, items) = f
            .workflow
            .create(f.owner, full_request(f.order.id))
            .await
            .unwrap();

        assert_eq!(refund.status, RefundStatus::Pending);
        assert_eq!(refund.amount.minor(), 5000);
        assert_eq!(items.len(), 2);

        let order = f.store.order(f.order.id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::PendingRefund);

        let tickets = f.store.tickets_for_order(f.order.id).await.unwrap();
        assert!(tickets.iter().all(|t| t.status == TicketStatus::PendingRefund));

        // The outflow is recorded but unsettled.
        let entries = f.store.ledger_entries_for_refund(refund.id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, LedgerStatus::Pending);
        assert_eq!(f.store.settled_balance().await.unwrap().minor(), 5000);
    }

    #[tokio::test]
    async fn create_itemized_refund_leaves_order_partially_refunded() {
        let f = paid_order(&[3000, 2000]).await;
        let request = CreateRefund {
            order_id: f.order.id,
            ticket_ids: Some(vec![f.tickets[0].id]),
            amount: None,
            reason: None,
        };
        let (refund, items) = f.workflow.create(f.owner, request).await.unwrap();

        assert_eq!(refund.amount.minor(), 3000);
        assert_eq!(items.len(), 1);

        let order = f.store.order(f.order.id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::PartiallyRefunded);

        let tickets = f.store.tickets_for_order(f.order.id).await.unwrap();
        let by_id = |id| tickets.iter().find(|t| t.id == id).unwrap().status;
        assert_eq!(by_id(f.tickets[0].id), TicketStatus::PendingRefund);
        assert_eq!(by_id(f.tickets[1].id), TicketStatus::Issued);
    }

    #[tokio::test]
    async fn create_rejects_unpaid_orders_and_strangers() {
        let f = paid_order(&[1000]).await;

        let stranger = Identity::new(UserId::new());
        assert!(matches!(
            f.workflow.create(stranger, full_request(f.order.id)).await,
            Err(RefundError::NotOwner)
        ));

        let mut order = f.order.clone();
        order.status = OrderStatus::Pending;
        f.store.apply(vec![Write::PutOrder(order)]).await.unwrap();
        assert!(matches!(
            f.workflow.create(f.owner, full_request(f.order.id)).await,
            Err(RefundError::OrderNotRefundable {
                status: OrderStatus::Pending
            })
        ));
    }

    #[tokio::test]
    async fn create_rejects_amount_above_itemized_total() {
        let f = paid_order(&[1000]).await;
        let request = CreateRefund {
            order_id: f.order.id,
            ticket_ids: None,
            amount: Some(Money::from_minor(1001)),
            reason: None,
        };
        assert!(matches!(
            f.workflow.create(f.owner, request).await,
            Err(RefundError::AmountOutOfBounds { .. })
        ));
    }

    #[tokio::test]
    async fn only_one_pending_request_at_a_time() {
        let f = paid_order(&[1000, 2000]).await;
        f.workflow
            .create(
                f.owner,
                CreateRefund {
                    order_id: f.order.id,
                    ticket_ids: Some(vec![f.tickets[0].id]),
                    amount: None,
                    reason: None,
                },
            )
            .await
            .unwrap();

        assert!(matches!(
            f.workflow.create(f.owner, full_request(f.order.id)).await,
            Err(RefundError::AlreadyRequested)
        ));
    }

    #[tokio::test]
    async fn accept_then_complete_settles_the_ledger() {
        let f = paid_order(&[3000, 2000]).await;
        let (refund, _) = f
            .workflow
            .create(f.owner, full_request(f.order.id))
            .await
            .unwrap();

        f.workflow.accept(f.admin, refund.id, None).await.unwrap();
        let stored = f.store.refund_request(refund.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RefundStatus::Approved);
        assert_eq!(stored.processed_by, Some(f.admin.user_id));

        f.workflow
            .complete(f.admin, refund.id, Some("receipt-7".to_string()), None)
            .await
            .unwrap();

        let order = f.store.order(f.order.id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Refunded);

        let tickets = f.store.tickets_for_order(f.order.id).await.unwrap();
        assert!(tickets.iter().all(|t| t.status == TicketStatus::Refunded));

        // 5000 in from the sale, 5000 back out.
        assert_eq!(f.store.settled_balance().await.unwrap().minor(), 0);
        let entries = f.store.ledger_entries_for_refund(refund.id).await.unwrap();
        assert_eq!(entries[0].status, LedgerStatus::Success);
        assert_eq!(entries[0].running_balance.minor(), 0);
    }

    #[tokio::test]
    async fn replayed_complete_does_not_move_the_balance() {
        let f = paid_order(&[1000]).await;
        let (refund, _) = f
            .workflow
            .create(f.owner, full_request(f.order.id))
            .await
            .unwrap();
        f.workflow.accept(f.admin, refund.id, None).await.unwrap();
        f.workflow
            .complete(f.admin, refund.id, None, None)
            .await
            .unwrap();
        let balance = f.store.settled_balance().await.unwrap();

        let replay = f.workflow.complete(f.admin, refund.id, None, None).await;
        assert!(matches!(
            replay,
            Err(RefundError::WrongStatus {
                status: RefundStatus::Paid,
                action: "complete"
            })
        ));
        assert_eq!(f.store.settled_balance().await.unwrap(), balance);
        assert_eq!(
            f.store
                .ledger_entries_for_refund(refund.id)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn complete_requires_approval_first() {
        let f = paid_order(&[1000]).await;
        let (refund, _) = f
            .workflow
            .create(f.owner, full_request(f.order.id))
            .await
            .unwrap();

        assert!(matches!(
            f.workflow.complete(f.admin, refund.id, None, None).await,
            Err(RefundError::WrongStatus {
                status: RefundStatus::Pending,
                action: "complete"
            })
        ));
    }

    #[tokio::test]
    async fn reject_approved_request_reverts_tickets_and_ledger() {
        let f = paid_order(&[3000, 2000]).await;
        let (refund, _) = f
            .workflow
            .create(f.owner, full_request(f.order.id))
            .await
            .unwrap();
        f.workflow.accept(f.admin, refund.id, None).await.unwrap();

        f.workflow
            .reject(f.admin, refund.id, Some("receipt missing".to_string()))
            .await
            .unwrap();

        let stored = f.store.refund_request(refund.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RefundStatus::Rejected);

        let order = f.store.order(f.order.id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Paid);

        let tickets = f.store.tickets_for_order(f.order.id).await.unwrap();
        assert!(tickets.iter().all(|t| t.status == TicketStatus::Issued));

        let entries = f.store.ledger_entries_for_refund(refund.id).await.unwrap();
        assert_eq!(entries[0].status, LedgerStatus::Failed);
        // Only the sale remains on the balance.
        assert_eq!(f.store.settled_balance().await.unwrap().minor(), 5000);
    }

    #[tokio::test]
    async fn partial_refund_leaves_order_partially_refunded_after_completion() {
        let f = paid_order(&[3000, 2000]).await;
        let (refund, _) = f
            .workflow
            .create(
                f.owner,
                CreateRefund {
                    order_id: f.order.id,
                    ticket_ids: Some(vec![f.tickets[1].id]),
                    amount: None,
                    reason: None,
                },
            )
            .await
            .unwrap();
        f.workflow.accept(f.admin, refund.id, None).await.unwrap();
        f.workflow
            .complete(f.admin, refund.id, None, None)
            .await
            .unwrap();

        let order = f.store.order(f.order.id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::PartiallyRefunded);
        assert_eq!(f.store.settled_balance().await.unwrap().minor(), 3000);
    }
}
