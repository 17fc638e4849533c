//! The one durable store behind every seat-claim component.
//!
//! All state mutation funnels through [`Store::apply`], a batch of
//! [`Write`]s that commits atomically or leaves no trace. Seat flips are
//! compare-and-swap on the seat's [`common::Version`]; losing the race
//! surfaces as [`StoreError::Conflict`] and the whole batch aborts.
//!
//! Two implementations share the trait: [`MemoryStore`] (reference
//! semantics, test substrate) and [`PgStore`] (sqlx/PostgreSQL, one
//! database transaction per `apply`).

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use store::{Store, Write};
