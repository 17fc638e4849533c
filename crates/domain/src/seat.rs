//! The per-seat-per-event inventory record.

use chrono::{DateTime, Utc};
use common::{EventId, Money, SeatId, UserId, Version};
use serde::{Deserialize, Serialize};

/// One sellable unit: a seat within an event.
///
/// Created at event setup and never deleted while the event exists. The
/// `available` flag plus the `version` token form the only truly contested
/// resource in the system; every mutation of this record is a
/// compare-and-swap on `version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatClaim {
    pub event_id: EventId,
    pub seat_id: SeatId,
    /// Ticket tier this seat sells under.
    pub category: String,
    pub price: Money,
    pub available: bool,
    pub version: Version,
}

impl SeatClaim {
    /// Creates an available seat record at the initial version.
    pub fn new(
        event_id: EventId,
        seat_id: SeatId,
        category: impl Into<String>,
        price: Money,
    ) -> Self {
        Self {
            event_id,
            seat_id,
            category: category.into(),
            price,
            available: true,
            version: Version::initial(),
        }
    }
}

/// How a seat currently presents to a shopper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatState {
    /// Free to hold or buy.
    Available,
    /// Soft-held by some shopper until the given instant.
    Held,
    /// Owned by a ticket on some order.
    Claimed,
}

/// Availability view row returned to seat-map queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatAvailability {
    pub seat_id: SeatId,
    pub category: String,
    pub price: Money,
    pub state: SeatState,
    /// Set when `state` is `Held`.
    pub held_until: Option<DateTime<Utc>>,
}

/// Resolved caller identity, produced by an external credential check.
///
/// The core never parses tokens; it receives this already-resolved value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
}

impl Identity {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id }
    }
}
