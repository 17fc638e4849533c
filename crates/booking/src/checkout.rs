//! The checkout orchestrator: selection in, durable seat claim out.

use chrono::{Duration, Utc};
use common::{EventId, Money, OrderId, PaymentMethodId, SeatId};
use domain::{Identity, Order, OrderStatus, Payment, PaymentStatus, Ticket, TicketStatus};
use store::{Store, StoreError, Write};

use crate::error::{BookingError, Result};
use crate::gateway::PaymentGateway;
use crate::holds::dedupe;
use crate::notify::SeatNotifier;

/// A checkout submission.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub event_id: EventId,
    pub seat_ids: Vec<SeatId>,
    pub payment_method_id: PaymentMethodId,
    /// Where the provider sends the buyer after paying.
    pub return_url: String,
}

/// What a successful checkout hands back.
#[derive(Debug, Clone)]
pub struct CheckoutReceipt {
    pub order: Order,
    pub tickets: Vec<Ticket>,
    pub payment: Payment,
    pub redirect_url: String,
}

/// Converts a validated seat selection into an Order + Tickets + Payment.
///
/// A successful return means the caller's seats are durably claimed and
/// no concurrent checkout can claim them; a `SeatsTaken` error means
/// nothing was persisted and the caller must re-select.
pub struct CheckoutOrchestrator<S, G, N> {
    store: S,
    gateway: G,
    notifier: N,
    pending_window: Duration,
}

impl<S: Store, G: PaymentGateway, N: SeatNotifier> CheckoutOrchestrator<S, G, N> {
    /// Creates an orchestrator with the given order-pending window.
    pub fn new(store: S, gateway: G, notifier: N, pending_window: Duration) -> Self {
        Self {
            store,
            gateway,
            notifier,
            pending_window,
        }
    }

    /// Runs the checkout algorithm.
    ///
    /// Seats are re-validated immediately before commit (holds can expire
    /// between selection and submission), then claimed with writes
    /// conditioned on the versions just read — the losing side of any
    /// race aborts wholesale.
    #[tracing::instrument(skip(self, caller, request), fields(user_id = %caller.user_id, event_id = %request.event_id))]
    pub async fn checkout(
        &self,
        caller: Identity,
        request: CheckoutRequest,
    ) -> Result<CheckoutReceipt> {
        let seat_ids = dedupe(&request.seat_ids);
        if seat_ids.is_empty() {
            return Err(BookingError::NoSeats);
        }

        let method = self
            .store
            .payment_method(request.payment_method_id)
            .await?
            .ok_or(BookingError::MethodNotFound)?;
        if !method.active {
            return Err(BookingError::MethodInactive);
        }
        if method
            .gateway_key
            .as_deref()
            .is_none_or(|key| key.trim().is_empty())
        {
            return Err(BookingError::GatewayUnconfigured);
        }

        let now = Utc::now();
        let seats = self.store.seats(request.event_id, &seat_ids).await?;
        if seats.len() != seat_ids.len() {
            let found: Vec<SeatId> = seats.iter().map(|s| s.seat_id).collect();
            let missing = seat_ids
                .iter()
                .copied()
                .filter(|id| !found.contains(id))
                .collect();
            return Err(BookingError::UnknownSeats { seat_ids: missing });
        }

        // Holds placed by the caller do not block their own checkout.
        let holds = self
            .store
            .active_holds(request.event_id, &seat_ids, now)
            .await?;
        let offending: Vec<SeatId> = seats
            .iter()
            .filter(|s| {
                !s.available
                    || holds
                        .iter()
                        .any(|h| h.seat_id == s.seat_id && h.user_id != caller.user_id)
            })
            .map(|s| s.seat_id)
            .collect();
        if !offending.is_empty() {
            metrics::counter!("checkouts_rejected_total").increment(1);
            return Err(BookingError::SeatsUnavailable {
                seat_ids: offending,
            });
        }

        let total: Money = seats.iter().map(|s| s.price).sum();
        let order = Order::pending(caller.user_id, total, now, now + self.pending_window);
        let order_id = order.id;

        // Initiate with the provider before writing anything; a gateway
        // failure must leave no state behind.
        let init = self
            .gateway
            .initiate(order_id, total, &request.return_url)
            .await?;

        let tickets: Vec<Ticket> = seats
            .iter()
            .map(|seat| {
                Ticket::reserve(
                    order_id,
                    request.event_id,
                    seat.seat_id,
                    seat.price,
                    caller.user_id,
                )
            })
            .collect();
        let payment = Payment::pending(order_id, method.id, total, init.transaction_ref);

        let mut writes = vec![Write::PutOrder(order.clone())];
        for ticket in &tickets {
            writes.push(Write::PutTicket(ticket.clone()));
        }
        for seat in &seats {
            writes.push(Write::ClaimSeat {
                event_id: seat.event_id,
                seat_id: seat.seat_id,
                expected: seat.version,
            });
        }
        // The order now owns these seats; their holds are redundant.
        for hold in self
            .store
            .holds_for_seats(request.event_id, &seat_ids)
            .await?
        {
            writes.push(Write::DeleteHold(hold.id));
        }
        writes.push(Write::PutPayment(payment.clone()));

        match self.store.apply(writes).await {
            Ok(()) => {}
            Err(StoreError::Conflict { seat_id, .. }) => {
                metrics::counter!("checkouts_conflicted_total").increment(1);
                return Err(BookingError::SeatsTaken {
                    seat_ids: vec![seat_id],
                });
            }
            Err(e) => return Err(e.into()),
        }

        metrics::counter!("checkouts_completed_total").increment(1);
        self.notifier
            .seats_unavailable(request.event_id, &seat_ids, order.pending_expires_at)
            .await;

        Ok(CheckoutReceipt {
            order,
            tickets,
            payment,
            redirect_url: init.redirect_url,
        })
    }

    /// Manually cancels the caller's own pending order.
    ///
    /// Pending payments fail, the order and its tickets cancel, and the
    /// seats release best-effort (a lost seat race is skipped, the sweep
    /// self-heals it). Orders already terminal acknowledge idempotently.
    #[tracing::instrument(skip(self, caller), fields(user_id = %caller.user_id))]
    pub async fn cancel_pending_order(&self, caller: Identity, order_id: OrderId) -> Result<()> {
        let mut order = self
            .store
            .order(order_id)
            .await?
            .ok_or(BookingError::OrderNotFound)?;
        if order.user_id != caller.user_id {
            return Err(BookingError::NotOwner);
        }
        if !order.status.can_cancel() {
            // Already paid or cancelled; nothing to do.
            return Ok(());
        }

        let now = Utc::now();
        let mut writes = Vec::new();
        for mut payment in self.store.payments_for_order(order_id).await? {
            if payment.status == PaymentStatus::Pending {
                payment.status = PaymentStatus::Failed;
                payment.transaction_date = Some(now);
                writes.push(Write::PutPayment(payment));
            }
        }
        order.status = OrderStatus::Cancelled;
        order.pending_expires_at = None;
        writes.push(Write::PutOrder(order));

        let tickets = self.store.tickets_for_order(order_id).await?;
        for mut ticket in tickets.clone() {
            ticket.status = TicketStatus::Cancelled;
            writes.push(Write::PutTicket(ticket));
        }
        self.store.apply(writes).await?;

        // Seat releases ride outside the cancel batch: each is its own
        // conditioned write, and a conflict means another process already
        // moved the seat.
        let mut released: Vec<SeatId> = Vec::new();
        for ticket in &tickets {
            let Some(seat) = self.store.seat(ticket.event_id, ticket.seat_id).await? else {
                continue;
            };
            if seat.available {
                continue;
            }
            match self
                .store
                .apply(vec![Write::ReleaseSeat {
                    event_id: seat.event_id,
                    seat_id: seat.seat_id,
                    expected: seat.version,
                }])
                .await
            {
                Ok(()) => released.push(seat.seat_id),
                Err(StoreError::Conflict { .. }) => {
                    tracing::warn!(seat_id = %seat.seat_id, "seat release lost a race, skipping");
                }
                Err(e) => return Err(e.into()),
            }
        }

        if let Some(ticket) = tickets.first()
            && !released.is_empty()
        {
            self.notifier
                .seats_released(ticket.event_id, &released)
                .await;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::UserId;
    use domain::{PaymentMethod, SeatClaim};
    use store::MemoryStore;

    use crate::gateway::MemoryGateway;
    use crate::holds::HoldManager;
    use crate::notify::{MemoryNotifier, SeatEvent};

    struct Fixture {
        store: MemoryStore,
        gateway: MemoryGateway,
        notifier: MemoryNotifier,
        orchestrator: CheckoutOrchestrator<MemoryStore, MemoryGateway, MemoryNotifier>,
        event_id: EventId,
        seat_ids: Vec<SeatId>,
        method_id: PaymentMethodId,
    }

    async fn fixture(seats: usize) -> Fixture {
        let store = MemoryStore::new();
        let gateway = MemoryGateway::new();
        let notifier = MemoryNotifier::new();

        let event_id = EventId::new();
        let mut seat_ids = Vec::new();
        for _ in 0..seats {
            let seat = SeatClaim::new(event_id, SeatId::new(), "GA", Money::from_minor(2500));
            seat_ids.push(seat.seat_id);
            store.apply(vec![Write::PutSeat(seat)]).await.unwrap();
        }

        let method = PaymentMethod::new("Bank transfer", "PAY2S");
        let method_id = method.id;
        store
            .apply(vec![Write::PutPaymentMethod(method)])
            .await
            .unwrap();

        let orchestrator = CheckoutOrchestrator::new(
            store.clone(),
            gateway.clone(),
            notifier.clone(),
            Duration::minutes(10),
        );

        Fixture {
            store,
            gateway,
            notifier,
            orchestrator,
            event_id,
            seat_ids,
            method_id,
        }
    }

    fn request(f: &Fixture) -> CheckoutRequest {
        CheckoutRequest {
            event_id: f.event_id,
            seat_ids: f.seat_ids.clone(),
            payment_method_id: f.method_id,
            return_url: "https://shop.example/done".to_string(),
        }
    }

    #[tokio::test]
    async fn checkout_happy_path() {
        let f = fixture(2).await;
        let receipt = f
            .orchestrator
            .checkout(Identity::new(UserId::new()), request(&f))
            .await
            .unwrap();

        assert_eq!(receipt.order.status, OrderStatus::Pending);
        assert_eq!(receipt.order.total_amount.minor(), 5000);
        assert_eq!(receipt.tickets.len(), 2);
        assert!(receipt.tickets.iter().all(|t| t.status == TicketStatus::Reserved));
        assert_eq!(receipt.payment.status, PaymentStatus::Pending);
        assert!(receipt.payment.transaction_ref.is_some());

        // Seats are durably claimed.
        for seat_id in &f.seat_ids {
            let seat = f.store.seat(f.event_id, *seat_id).await.unwrap().unwrap();
            assert!(!seat.available);
        }
        assert!(matches!(
            f.notifier.events().last(),
            Some(SeatEvent::Unavailable(_, _))
        ));
    }

    #[tokio::test]
    async fn checkout_consumes_own_holds() {
        let f = fixture(2).await;
        let user = Identity::new(UserId::new());

        let holds_mgr =
            HoldManager::new(f.store.clone(), f.notifier.clone(), Duration::minutes(10));
        holds_mgr
            .create_holds(f.event_id, &f.seat_ids, user)
            .await
            .unwrap();

        // The holder can check out through their own holds.
        f.orchestrator.checkout(user, request(&f)).await.unwrap();

        // The holds were consumed by the order.
        let remaining = f
            .store
            .holds_for_seats(f.event_id, &f.seat_ids)
            .await
            .unwrap();
        assert!(remaining.is_empty());
    }

    #[tokio::test]
    async fn checkout_rejects_seats_held_by_someone_else() {
        let f = fixture(2).await;
        let holder = Identity::new(UserId::new());
        let buyer = Identity::new(UserId::new());

        let holds_mgr =
            HoldManager::new(f.store.clone(), f.notifier.clone(), Duration::minutes(10));
        holds_mgr
            .create_holds(f.event_id, &f.seat_ids[..1], holder)
            .await
            .unwrap();

        let result = f.orchestrator.checkout(buyer, request(&f)).await;
        match result {
            Err(BookingError::SeatsUnavailable { seat_ids }) => {
                assert_eq!(seat_ids, vec![f.seat_ids[0]]);
            }
            other => panic!("expected SeatsUnavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn only_one_of_two_concurrent_checkouts_wins() {
        let f = fixture(1).await;
        let a = Identity::new(UserId::new());
        let b = Identity::new(UserId::new());

        let first = f.orchestrator.checkout(a, request(&f)).await;
        assert!(first.is_ok());

        // The loser re-validates and is told the seat is gone.
        let second = f.orchestrator.checkout(b, request(&f)).await;
        assert!(matches!(
            second,
            Err(BookingError::SeatsUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn gateway_failure_leaves_no_state() {
        let f = fixture(1).await;
        f.gateway.set_fail_on_initiate(true);

        let result = f
            .orchestrator
            .checkout(Identity::new(UserId::new()), request(&f))
            .await;
        assert!(matches!(result, Err(BookingError::Gateway(_))));

        let seat = f
            .store
            .seat(f.event_id, f.seat_ids[0])
            .await
            .unwrap()
            .unwrap();
        assert!(seat.available, "failed initiation must not claim seats");
    }

    #[tokio::test]
    async fn inactive_method_is_rejected() {
        let f = fixture(1).await;
        let mut method = PaymentMethod::new("Disabled", "PAY2S");
        method.active = false;
        let method_id = method.id;
        f.store
            .apply(vec![Write::PutPaymentMethod(method)])
            .await
            .unwrap();

        let mut req = request(&f);
        req.payment_method_id = method_id;
        let result = f
            .orchestrator
            .checkout(Identity::new(UserId::new()), req)
            .await;
        assert!(matches!(result, Err(BookingError::MethodInactive)));
    }

    #[tokio::test]
    async fn blank_gateway_key_is_unconfigured() {
        let f = fixture(1).await;
        let mut method = PaymentMethod::new("Broken", "PAY2S");
        method.gateway_key = Some("  ".to_string());
        let method_id = method.id;
        f.store
            .apply(vec![Write::PutPaymentMethod(method)])
            .await
            .unwrap();

        let mut req = request(&f);
        req.payment_method_id = method_id;
        let result = f
            .orchestrator
            .checkout(Identity::new(UserId::new()), req)
            .await;
        assert!(matches!(result, Err(BookingError::GatewayUnconfigured)));
    }

    #[tokio::test]
    async fn manual_cancel_releases_seats() {
        let f = fixture(2).await;
        let user = Identity::new(UserId::new());
        let receipt = f.orchestrator.checkout(user, request(&f)).await.unwrap();

        f.orchestrator
            .cancel_pending_order(user, receipt.order.id)
            .await
            .unwrap();

        let order = f.store.order(receipt.order.id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert!(order.pending_expires_at.is_none());

        let tickets = f.store.tickets_for_order(receipt.order.id).await.unwrap();
        assert!(tickets.iter().all(|t| t.status == TicketStatus::Cancelled));

        let payments = f.store.payments_for_order(receipt.order.id).await.unwrap();
        assert!(payments.iter().all(|p| p.status == PaymentStatus::Failed));

        for seat_id in &f.seat_ids {
            let seat = f.store.seat(f.event_id, *seat_id).await.unwrap().unwrap();
            assert!(seat.available);
        }
    }

    #[tokio::test]
    async fn manual_cancel_requires_ownership() {
        let f = fixture(1).await;
        let owner = Identity::new(UserId::new());
        let receipt = f.orchestrator.checkout(owner, request(&f)).await.unwrap();

        let result = f
            .orchestrator
            .cancel_pending_order(Identity::new(UserId::new()), receipt.order.id)
            .await;
        assert!(matches!(result, Err(BookingError::NotOwner)));
    }

    #[tokio::test]
    async fn manual_cancel_is_idempotent() {
        let f = fixture(1).await;
        let user = Identity::new(UserId::new());
        let receipt = f.orchestrator.checkout(user, request(&f)).await.unwrap();

        f.orchestrator
            .cancel_pending_order(user, receipt.order.id)
            .await
            .unwrap();
        // Second cancel acknowledges without touching anything.
        f.orchestrator
            .cancel_pending_order(user, receipt.order.id)
            .await
            .unwrap();
    }
}
