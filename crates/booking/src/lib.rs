//! Seat holds and checkout orchestration.
//!
//! The request-path half of the seat-claim lifecycle: [`HoldManager`]
//! places short-lived soft locks, [`CheckoutOrchestrator`] converts a
//! seat selection into an Order + Tickets + Payment in one atomic batch.
//! Payment initiation and realtime push are trait seams with in-memory
//! implementations for tests.

pub mod checkout;
pub mod error;
pub mod gateway;
pub mod holds;
pub mod notify;

pub use checkout::{CheckoutOrchestrator, CheckoutReceipt, CheckoutRequest};
pub use error::{BookingError, Result};
pub use gateway::{MemoryGateway, PaymentGateway, PaymentInit, reference_code};
pub use holds::HoldManager;
pub use notify::{MemoryNotifier, NullNotifier, SeatEvent, SeatNotifier};
