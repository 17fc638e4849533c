//! Realtime seat-event publishing seam.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{EventId, SeatId};
use std::sync::{Arc, RwLock};

/// Pushes seat-state changes to live viewers of an event.
///
/// Delivery is fire-and-forget: implementations must swallow transport
/// failures, and callers never let a publish outcome affect the
/// transaction that triggered it.
#[async_trait]
pub trait SeatNotifier: Send + Sync {
    /// Seats were soft-held until the given instant.
    async fn seats_held(&self, event_id: EventId, seat_ids: &[SeatId], expires_at: DateTime<Utc>);

    /// Seats became unavailable because an order's pending window opened.
    async fn seats_unavailable(
        &self,
        event_id: EventId,
        seat_ids: &[SeatId],
        pending_expires_at: Option<DateTime<Utc>>,
    );

    /// Seats returned to the sellable pool.
    async fn seats_released(&self, event_id: EventId, seat_ids: &[SeatId]);
}

/// Notifier that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

#[async_trait]
impl SeatNotifier for NullNotifier {
    async fn seats_held(&self, _: EventId, _: &[SeatId], _: DateTime<Utc>) {}
    async fn seats_unavailable(&self, _: EventId, _: &[SeatId], _: Option<DateTime<Utc>>) {}
    async fn seats_released(&self, _: EventId, _: &[SeatId]) {}
}

/// One recorded notifier emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeatEvent {
    Held(EventId, Vec<SeatId>),
    Unavailable(EventId, Vec<SeatId>),
    Released(EventId, Vec<SeatId>),
}

/// In-memory notifier recording emissions, for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryNotifier {
    events: Arc<RwLock<Vec<SeatEvent>>>,
}

impl MemoryNotifier {
    /// Creates a new recording notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all recorded emissions in order.
    pub fn events(&self) -> Vec<SeatEvent> {
        self.events.read().expect("notifier lock").clone()
    }

    /// Returns how many emissions were recorded.
    pub fn len(&self) -> usize {
        self.events.read().expect("notifier lock").len()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SeatNotifier for MemoryNotifier {
    async fn seats_held(&self, event_id: EventId, seat_ids: &[SeatId], _: DateTime<Utc>) {
        self.events
            .write()
            .expect("notifier lock")
            .push(SeatEvent::Held(event_id, seat_ids.to_vec()));
    }

    async fn seats_unavailable(
        &self,
        event_id: EventId,
        seat_ids: &[SeatId],
        _: Option<DateTime<Utc>>,
    ) {
        self.events
            .write()
            .expect("notifier lock")
            .push(SeatEvent::Unavailable(event_id, seat_ids.to_vec()));
    }

    async fn seats_released(&self, event_id: EventId, seat_ids: &[SeatId]) {
        self.events
            .write()
            .expect("notifier lock")
            .push(SeatEvent::Released(event_id, seat_ids.to_vec()));
    }
}
