use store::StoreError;
use thiserror::Error;

/// Errors raised on the reconciliation path.
///
/// Unknown or already-terminal references are not errors; they surface as
/// [`crate::Outcome::Ignored`] so the provider still receives a success
/// acknowledgment and stops retrying.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Signature verification is enabled and the payload failed it.
    /// Rejected before any state mutation.
    #[error("invalid or missing provider signature")]
    BadSignature,

    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Convenience type alias for reconciliation results.
pub type Result<T> = std::result::Result<T, ReconcileError>;
