//! The cleanup sweep and its run loop.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use booking::SeatNotifier;
use chrono::{DateTime, Utc};
use common::{EventId, SeatId};
use domain::{OrderStatus, PaymentStatus, TicketStatus};
use store::{Store, StoreError, Write};
use tokio::sync::watch;

/// What one sweep accomplished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub holds_removed: usize,
    pub orders_cancelled: usize,
    pub seats_released: usize,
    /// Seat releases skipped because another process won the race.
    pub conflicts_skipped: usize,
}

impl SweepReport {
    /// True when the sweep found nothing to do.
    pub fn is_noop(&self) -> bool {
        *self == SweepReport::default()
    }
}

/// Reclaims abandoned claims on a fixed interval.
pub struct CleanupSweeper<S, N> {
    store: S,
    notifier: N,
    interval: Duration,
}

impl<S: Store, N: SeatNotifier> CleanupSweeper<S, N> {
    /// Creates a sweeper ticking at the given interval.
    pub fn new(store: S, notifier: N, interval: Duration) -> Self {
        Self {
            store,
            notifier,
            interval,
        }
    }

    /// Runs sweeps until the shutdown signal fires.
    ///
    /// The first sweep runs immediately. Each iteration's errors are
    /// logged and swallowed; shutdown stops the loop between ticks
    /// without throwing (partial sweeps are safe by design).
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(interval_secs = self.interval.as_secs(), "cleanup sweeper running");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_once(Utc::now()).await {
                        Ok(report) if !report.is_noop() => {
                            tracing::info!(
                                holds = report.holds_removed,
                                orders = report.orders_cancelled,
                                seats = report.seats_released,
                                conflicts = report.conflicts_skipped,
                                "sweep reclaimed abandoned claims"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => tracing::error!(error = %e, "sweep iteration failed"),
                    }
                }
                _ = shutdown.changed() => {
                    tracing::info!("cleanup sweeper stopping");
                    break;
                }
            }
        }
    }

    /// One sweep, in three phases.
    ///
    /// Order cancellations commit before any seat is touched, so that
    /// progress survives seat conflicts; each seat release is then its
    /// own conditioned write.
    #[tracing::instrument(skip(self))]
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<SweepReport, StoreError> {
        let mut report = SweepReport::default();
        let mut released: HashMap<EventId, BTreeSet<SeatId>> = HashMap::new();

        // Phase 1: expired holds.
        let expired_holds = self.store.expired_holds(now).await?;
        if !expired_holds.is_empty() {
            let writes = expired_holds.iter().map(|h| Write::DeleteHold(h.id)).collect();
            self.store.apply(writes).await?;
            report.holds_removed = expired_holds.len();
            for hold in &expired_holds {
                released.entry(hold.event_id).or_default().insert(hold.seat_id);
            }
        }

        // Phase 2: expired pending orders. One durable batch per order:
        // fail its open payments, cancel the order and its tickets.
        let expired_orders = self.store.expired_pending_orders(now).await?;
        for order in &expired_orders {
            let mut writes = Vec::new();
            for mut payment in self.store.payments_for_order(order.id).await? {
                if payment.status == PaymentStatus::Pending {
                    payment.status = PaymentStatus::Failed;
                    payment.transaction_date = Some(now);
                    writes.push(Write::PutPayment(payment));
                }
            }
            let mut cancelled = order.clone();
            cancelled.status = OrderStatus::Cancelled;
            cancelled.pending_expires_at = None;
            writes.push(Write::PutOrder(cancelled));
            for mut ticket in self.store.tickets_for_order(order.id).await? {
                if !ticket.status.is_terminal() {
                    ticket.status = TicketStatus::Cancelled;
                    writes.push(Write::PutTicket(ticket));
                }
            }
            self.store.apply(writes).await?;
            report.orders_cancelled += 1;
        }

        // Phase 3: walk orphaned seats back into inventory, one
        // conditioned write each. A seat is orphaned once it is flagged
        // unavailable but no live ticket references it any more — the
        // orders cancelled above, orders cancelled by reconciliation
        // failures, and completed refunds all land here. A conflict
        // means another process already moved the seat; skip it, the
        // next sweep self-heals.
        for seat in self.store.orphaned_claimed_seats().await? {
            match self
                .store
                .apply(vec![Write::ReleaseSeat {
                    event_id: seat.event_id,
                    seat_id: seat.seat_id,
                    expected: seat.version,
                }])
                .await
            {
                Ok(()) => {
                    report.seats_released += 1;
                    released
                        .entry(seat.event_id)
                        .or_default()
                        .insert(seat.seat_id);
                }
                Err(StoreError::Conflict { .. }) => {
                    report.conflicts_skipped += 1;
                    tracing::warn!(
                        event_id = %seat.event_id,
                        seat_id = %seat.seat_id,
                        "seat release lost a race, skipping"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        metrics::counter!("sweeps_total").increment(1);
        metrics::counter!("sweep_seats_released_total")
            .increment(report.seats_released as u64);

        // Best-effort notifications; failures must not undo the sweep.
        for (event_id, seats) in released {
            if !seats.is_empty() {
                let seats: Vec<SeatId> = seats.into_iter().collect();
                self.notifier.seats_released(event_id, &seats).await;
            }
        }

        Ok(report)
    }
}
