//! Payment-provider signal reconciliation.
//!
//! Two asynchronous entry shapes — a batch of bank-transfer records and a
//! single typed gateway callback — funnel into one idempotent settlement
//! state machine keyed by the payment's transaction reference. Duplicate
//! and unknown signals are deliberate no-ops; amounts below the expected
//! payment fail closed.

pub mod callback;
pub mod error;
pub mod handler;
pub mod issue;
pub mod verify;
pub mod webhook;

pub use callback::{CallbackPayload, RESULT_AUTHORIZED, RESULT_SUCCESS};
pub use error::{ReconcileError, Result};
pub use handler::{Outcome, ReconciliationHandler, Signal};
pub use issue::{ConfirmationSender, MemoryConfirmation, MemoryQrIssuer, QrCodeIssuer};
pub use verify::SignatureVerifier;
pub use webhook::{BatchReport, TransferBatch, TransferRecord};
