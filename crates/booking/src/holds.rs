//! The hold manager: short-lived soft locks on seats.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use common::{EventId, SeatId};
use domain::{Hold, Identity, SeatAvailability, SeatState};
use store::{Store, StoreError, Write};

use crate::error::{BookingError, Result};
use crate::notify::SeatNotifier;

/// Creates, queries, and exposes temporary seat holds.
///
/// Holds are advisory: they do not block reads, only inform other
/// checkout attempts which seats to reject. Expiry is an absolute
/// instant; the cleanup sweep reaps what lapses.
pub struct HoldManager<S, N> {
    store: S,
    notifier: N,
    ttl: Duration,
}

impl<S: Store, N: SeatNotifier> HoldManager<S, N> {
    /// Creates a hold manager placing holds with the given time-to-live.
    pub fn new(store: S, notifier: N, ttl: Duration) -> Self {
        Self {
            store,
            notifier,
            ttl,
        }
    }

    /// Places one hold per requested seat, all or nothing.
    ///
    /// Every seat must exist, be available, and carry no live hold; if
    /// any fails, the whole batch is rejected naming the offending seats.
    /// The store re-enforces hold uniqueness inside the atomic batch, so
    /// a concurrent duplicate loses cleanly.
    #[tracing::instrument(skip(self, caller), fields(user_id = %caller.user_id))]
    pub async fn create_holds(
        &self,
        event_id: EventId,
        seat_ids: &[SeatId],
        caller: Identity,
    ) -> Result<Vec<Hold>> {
        let seat_ids = dedupe(seat_ids);
        if seat_ids.is_empty() {
            return Err(BookingError::NoSeats);
        }

        let now = Utc::now();
        let seats = self.store.seats(event_id, &seat_ids).await?;
        if seats.len() != seat_ids.len() {
            let found: HashSet<SeatId> = seats.iter().map(|s| s.seat_id).collect();
            let missing = seat_ids
                .iter()
                .copied()
                .filter(|id| !found.contains(id))
                .collect();
            return Err(BookingError::UnknownSeats { seat_ids: missing });
        }

        let held = self.store.active_held_seat_ids(event_id, now).await?;
        let offending: Vec<SeatId> = seats
            .iter()
            .filter(|s| !s.available || held.contains(&s.seat_id))
            .map(|s| s.seat_id)
            .collect();
        if !offending.is_empty() {
            return Err(BookingError::SeatsUnavailable {
                seat_ids: offending,
            });
        }

        let expires_at = now + self.ttl;
        let holds: Vec<Hold> = seat_ids
            .iter()
            .map(|seat_id| Hold::new(event_id, *seat_id, caller.user_id, expires_at))
            .collect();

        let writes = holds.iter().cloned().map(Write::PutHold).collect();
        match self.store.apply(writes).await {
            Ok(()) => {}
            Err(StoreError::AlreadyHeld { seat_id, .. }) => {
                return Err(BookingError::SeatsUnavailable {
                    seat_ids: vec![seat_id],
                });
            }
            Err(e) => return Err(e.into()),
        }

        metrics::counter!("holds_created_total").increment(holds.len() as u64);
        self.notifier
            .seats_held(event_id, &seat_ids, expires_at)
            .await;

        Ok(holds)
    }

    /// Seat ids with a hold that has not yet expired.
    pub async fn active_held_seat_ids(
        &self,
        event_id: EventId,
        now: DateTime<Utc>,
    ) -> Result<HashSet<SeatId>> {
        Ok(self.store.active_held_seat_ids(event_id, now).await?)
    }

    /// Per-seat availability view: free, held by someone, or owned by a
    /// ticket.
    pub async fn availability(&self, event_id: EventId) -> Result<Vec<SeatAvailability>> {
        let now = Utc::now();
        let seats = self.store.seats_for_event(event_id).await?;
        let seat_ids: Vec<SeatId> = seats.iter().map(|s| s.seat_id).collect();
        let holds = self.store.active_holds(event_id, &seat_ids, now).await?;

        Ok(seats
            .into_iter()
            .map(|seat| {
                let hold = holds.iter().find(|h| h.seat_id == seat.seat_id);
                let (state, held_until) = if !seat.available {
                    (SeatState::Claimed, None)
                } else if let Some(hold) = hold {
                    (SeatState::Held, Some(hold.expires_at))
                } else {
                    (SeatState::Available, None)
                };
                SeatAvailability {
                    seat_id: seat.seat_id,
                    category: seat.category,
                    price: seat.price,
                    state,
                    held_until,
                }
            })
            .collect())
    }
}

/// Sorts and deduplicates a seat selection.
pub(crate) fn dedupe(seat_ids: &[SeatId]) -> Vec<SeatId> {
    let mut ids = seat_ids.to_vec();
    ids.sort();
    ids.dedup();
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Money, UserId};
    use domain::SeatClaim;
    use store::MemoryStore;

    use crate::notify::{MemoryNotifier, SeatEvent};

    async fn seed_event(store: &MemoryStore, seats: usize) -> (EventId, Vec<SeatId>) {
        let event_id = EventId::new();
        let mut seat_ids = Vec::new();
        for _ in 0..seats {
            let seat = SeatClaim::new(event_id, SeatId::new(), "GA", Money::from_minor(1000));
            seat_ids.push(seat.seat_id);
            store.apply(vec![Write::PutSeat(seat)]).await.unwrap();
        }
        (event_id, seat_ids)
    }

    fn manager(store: MemoryStore, notifier: MemoryNotifier) -> HoldManager<MemoryStore, MemoryNotifier> {
        HoldManager::new(store, notifier, Duration::minutes(10))
    }

    #[tokio::test]
    async fn create_holds_happy_path() {
        let store = MemoryStore::new();
        let notifier = MemoryNotifier::new();
        let (event_id, seat_ids) = seed_event(&store, 2).await;
        let holds_mgr = manager(store.clone(), notifier.clone());

        let holds = holds_mgr
            .create_holds(event_id, &seat_ids, Identity::new(UserId::new()))
            .await
            .unwrap();

        assert_eq!(holds.len(), 2);
        let held = holds_mgr
            .active_held_seat_ids(event_id, Utc::now())
            .await
            .unwrap();
        assert_eq!(held.len(), 2);
        assert!(matches!(notifier.events()[0], SeatEvent::Held(_, _)));
    }

    #[tokio::test]
    async fn hold_on_already_held_seat_fails_whole_batch() {
        let store = MemoryStore::new();
        let notifier = MemoryNotifier::new();
        let (event_id, seat_ids) = seed_event(&store, 2).await;
        let holds_mgr = manager(store.clone(), notifier.clone());

        holds_mgr
            .create_holds(event_id, &seat_ids[..1], Identity::new(UserId::new()))
            .await
            .unwrap();

        // A different shopper wants both seats; one is held, so nothing
        // may be placed.
        let result = holds_mgr
            .create_holds(event_id, &seat_ids, Identity::new(UserId::new()))
            .await;
        match result {
            Err(BookingError::SeatsUnavailable { seat_ids: bad }) => {
                assert_eq!(bad, vec![seat_ids[0]]);
            }
            other => panic!("expected SeatsUnavailable, got {other:?}"),
        }

        let held = holds_mgr
            .active_held_seat_ids(event_id, Utc::now())
            .await
            .unwrap();
        assert_eq!(held.len(), 1, "no partial batch may exist");
    }

    #[tokio::test]
    async fn hold_succeeds_after_previous_expires() {
        let store = MemoryStore::new();
        let notifier = MemoryNotifier::new();
        let (event_id, seat_ids) = seed_event(&store, 1).await;

        // Expired immediately.
        let short = HoldManager::new(store.clone(), notifier.clone(), Duration::minutes(-1));
        short
            .create_holds(event_id, &seat_ids, Identity::new(UserId::new()))
            .await
            .unwrap();

        let holds_mgr = manager(store.clone(), notifier.clone());
        let holds = holds_mgr
            .create_holds(event_id, &seat_ids, Identity::new(UserId::new()))
            .await
            .unwrap();
        assert_eq!(holds.len(), 1);
    }

    #[tokio::test]
    async fn unknown_seats_are_reported() {
        let store = MemoryStore::new();
        let notifier = MemoryNotifier::new();
        let (event_id, mut seat_ids) = seed_event(&store, 1).await;
        let stranger = SeatId::new();
        seat_ids.push(stranger);

        let holds_mgr = manager(store, notifier);
        let result = holds_mgr
            .create_holds(event_id, &seat_ids, Identity::new(UserId::new()))
            .await;
        match result {
            Err(BookingError::UnknownSeats { seat_ids: bad }) => {
                assert_eq!(bad, vec![stranger]);
            }
            other => panic!("expected UnknownSeats, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_selection_is_rejected() {
        let store = MemoryStore::new();
        let holds_mgr = manager(store, MemoryNotifier::new());
        let result = holds_mgr
            .create_holds(EventId::new(), &[], Identity::new(UserId::new()))
            .await;
        assert!(matches!(result, Err(BookingError::NoSeats)));
    }

    #[tokio::test]
    async fn availability_distinguishes_states() {
        let store = MemoryStore::new();
        let notifier = MemoryNotifier::new();
        let (event_id, seat_ids) = seed_event(&store, 3).await;
        let holds_mgr = manager(store.clone(), notifier);

        // Hold seat 0, claim seat 1, leave seat 2 free.
        holds_mgr
            .create_holds(event_id, &seat_ids[..1], Identity::new(UserId::new()))
            .await
            .unwrap();
        let seat = store.seat(event_id, seat_ids[1]).await.unwrap().unwrap();
        store
            .apply(vec![Write::ClaimSeat {
                event_id,
                seat_id: seat_ids[1],
                expected: seat.version,
            }])
            .await
            .unwrap();

        let view = holds_mgr.availability(event_id).await.unwrap();
        let state_of = |id: SeatId| view.iter().find(|v| v.seat_id == id).unwrap().state;
        assert_eq!(state_of(seat_ids[0]), SeatState::Held);
        assert_eq!(state_of(seat_ids[1]), SeatState::Claimed);
        assert_eq!(state_of(seat_ids[2]), SeatState::Available);
    }
}
