//! Temporary seat holds.

use chrono::{DateTime, Utc};
use common::{EventId, HoldId, OrderId, SeatId, UserId};
use serde::{Deserialize, Serialize};

/// A time-bounded, non-durable claim on a seat, placed before payment.
///
/// Holds are advisory soft locks: they do not block reads, only inform
/// other checkout attempts which seats to reject. At most one live hold
/// may exist per (event, seat); the store enforces that uniqueness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hold {
    pub id: HoldId,
    pub event_id: EventId,
    pub seat_id: SeatId,
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
    /// Set once an order has consumed this hold.
    pub order_id: Option<OrderId>,
}

impl Hold {
    /// Creates a hold expiring at the given instant.
    pub fn new(
        event_id: EventId,
        seat_id: SeatId,
        user_id: UserId,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: HoldId::new(),
            event_id,
            seat_id,
            user_id,
            expires_at,
            order_id: None,
        }
    }

    /// A hold is active iff its expiry is still in the future.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}
