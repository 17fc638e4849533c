//! The idempotent settlement state machine.

use chrono::{DateTime, Utc};
use common::Money;
use domain::{LedgerEntry, LedgerStatus, Order, OrderStatus, Payment, PaymentStatus, Ticket, TicketStatus};
use store::{Store, Write};

use crate::error::Result;
use crate::issue::{ConfirmationSender, QrCodeIssuer};

/// A provider signal, normalised from either entry shape.
#[derive(Debug, Clone, Copy)]
pub enum Signal {
    /// Money arrived.
    Success { amount: Money, at: DateTime<Utc> },
    /// Authorized but not yet captured; a later capture signal follows.
    Provisional { at: DateTime<Utc> },
    /// Declined or reversed.
    Failure { at: DateTime<Utc> },
}

/// What settling one signal did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Payment succeeded; the order is paid and its tickets issued.
    Issued,
    /// Payment failed; the order and its tickets are cancelled. Seats are
    /// not released here — that is the cleanup sweep's job.
    Cancelled,
    /// Provisional signal recorded; order and tickets untouched.
    Recorded,
    /// Unknown or already-terminal reference; deliberately a no-op so the
    /// provider stops retrying.
    Ignored,
}

/// Matches provider signals to pending payments and performs the state
/// transition exactly once.
///
/// All writes for one reconciled signal commit in one atomic batch;
/// the terminal payment status is the idempotency guard against duplicate
/// delivery.
pub struct ReconciliationHandler<S, Q, C> {
    store: S,
    qr: Q,
    confirm: C,
}

impl<S: Store, Q: QrCodeIssuer, C: ConfirmationSender> ReconciliationHandler<S, Q, C> {
    /// Creates a handler issuing QR payloads and confirmations through
    /// the given collaborators.
    pub fn new(store: S, qr: Q, confirm: C) -> Self {
        Self { store, qr, confirm }
    }

    /// Settles one provider signal against the payment carrying the
    /// given reference.
    ///
    /// Amount policy: a success signal settles iff its amount covers the
    /// expected payment (`>=`); overpayment never voids a claim, anything
    /// short fails closed.
    #[tracing::instrument(skip(self, signal))]
    pub async fn settle(&self, reference: &str, signal: Signal) -> Result<Outcome> {
        let Some(payment) = self.store.payment_by_ref(reference).await? else {
            metrics::counter!("reconcile_ignored_total").increment(1);
            tracing::debug!(reference, "signal for unknown reference ignored");
            return Ok(Outcome::Ignored);
        };
        if payment.status.is_terminal() {
            metrics::counter!("reconcile_ignored_total").increment(1);
            tracing::debug!(reference, status = %payment.status, "duplicate signal ignored");
            return Ok(Outcome::Ignored);
        }

        match signal {
            Signal::Success { amount, at } if amount >= payment.amount => {
                self.mark_paid(payment, at).await
            }
            Signal::Success { amount, at } => {
                tracing::warn!(
                    reference,
                    received = %amount,
                    expected = %payment.amount,
                    "amount mismatch, failing closed"
                );
                self.mark_failed(payment, at).await
            }
            Signal::Failure { at } => self.mark_failed(payment, at).await,
            Signal::Provisional { at } => self.record_provisional(payment, at).await,
        }
    }

    async fn mark_paid(&self, mut payment: Payment, at: DateTime<Utc>) -> Result<Outcome> {
        payment.status = PaymentStatus::Success;
        payment.transaction_date = Some(at);

        let mut writes = vec![Write::PutPayment(payment.clone())];

        let mut confirmed: Option<(Order, Vec<Ticket>)> = None;
        if let Some(mut order) = self.store.order(payment.order_id).await? {
            order.status = OrderStatus::Paid;
            order.pending_expires_at = None;
            writes.push(Write::PutOrder(order.clone()));

            let mut issued = Vec::new();
            for mut ticket in self.store.tickets_for_order(payment.order_id).await? {
                ticket.status = TicketStatus::Issued;
                ticket.purchased_at = Some(at);
                ticket.qr_payload = Some(self.qr.ticket_payload(&ticket));
                writes.push(Write::PutTicket(ticket.clone()));
                issued.push(ticket);
            }
            confirmed = Some((order, issued));
        }

        let sale = LedgerEntry::sale(payment.order_id, payment.amount, at);
        let sale_id = sale.id;
        writes.push(Write::PutLedgerEntry(sale));
        writes.push(Write::SettleLedgerEntry {
            id: sale_id,
            status: LedgerStatus::Success,
        });

        self.store.apply(writes).await?;
        metrics::counter!("reconcile_issued_total").increment(1);

        if let Some((order, tickets)) = confirmed {
            self.confirm.order_confirmed(&order, &tickets).await;
        }

        Ok(Outcome::Issued)
    }

    async fn mark_failed(&self, mut payment: Payment, at: DateTime<Utc>) -> Result<Outcome> {
        payment.status = PaymentStatus::Failed;
        payment.transaction_date = Some(at);

        let mut writes = vec![Write::PutPayment(payment.clone())];
        if let Some(mut order) = self.store.order(payment.order_id).await? {
            order.status = OrderStatus::Cancelled;
            order.pending_expires_at = None;
            writes.push(Write::PutOrder(order));

            for mut ticket in self.store.tickets_for_order(payment.order_id).await? {
                ticket.status = TicketStatus::Cancelled;
                writes.push(Write::PutTicket(ticket));
            }
        }

        self.store.apply(writes).await?;
        metrics::counter!("reconcile_cancelled_total").increment(1);
        Ok(Outcome::Cancelled)
    }

    async fn record_provisional(&self, mut payment: Payment, at: DateTime<Utc>) -> Result<Outcome> {
        // Keep the payment pending and note the provider contact; the
        // order and tickets wait for the capture signal.
        payment.transaction_date = Some(at);
        self.store.apply(vec![Write::PutPayment(payment)]).await?;
        Ok(Outcome::Recorded)
    }
}
