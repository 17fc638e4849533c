//! Periodic cleanup of abandoned seat claims.
//!
//! A single background task that, each tick, deletes expired holds,
//! cancels expired pending orders, and walks their seats back into
//! inventory. Runs out-of-band and concurrent with everything else, so
//! every seat release is an individually conditioned write: losing one
//! race is logged and skipped, and the next sweep self-heals.

pub mod sweeper;

pub use sweeper::{CleanupSweeper, SweepReport};
