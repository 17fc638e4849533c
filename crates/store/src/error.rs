use common::{EventId, SeatId, Version};
use thiserror::Error;

/// Errors surfaced by the durable store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A conditioned seat write found a different version than expected.
    /// The writer lost the race; the surrounding batch was rolled back.
    #[error("seat {seat_id} in event {event_id} was modified concurrently (expected version {expected})")]
    Conflict {
        event_id: EventId,
        seat_id: SeatId,
        expected: Version,
    },

    /// A hold insert collided with a live hold on the same seat.
    #[error("seat {seat_id} in event {event_id} already has an active hold")]
    AlreadyHeld { event_id: EventId, seat_id: SeatId },

    /// A write referenced a record that does not exist.
    #[error("unknown {entity} referenced by write")]
    UnknownRecord { entity: &'static str },

    /// A stored column held a value no enum variant matches.
    #[error("invalid {column} value in stored row: {value}")]
    Decode { column: &'static str, value: String },

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Returns true for races the caller may resolve by re-selecting.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::Conflict { .. } | StoreError::AlreadyHeld { .. }
        )
    }
}

/// Convenience type alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;
