//! The provider's direct callback (IPN) entry point.

use chrono::Utc;
use common::Money;
use serde::{Deserialize, Serialize};
use store::Store;

use crate::error::{ReconcileError, Result};
use crate::handler::{Outcome, ReconciliationHandler, Signal};
use crate::issue::{ConfirmationSender, QrCodeIssuer};
use crate::verify::SignatureVerifier;

/// Result code for a captured payment.
pub const RESULT_SUCCESS: i32 = 0;
/// Result code for an authorization that has not yet been captured.
pub const RESULT_AUTHORIZED: i32 = 9000;

/// The typed payment-result callback payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackPayload {
    #[serde(default)]
    pub partner_code: Option<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
    /// The reference code correlating back to a payment.
    pub order_info: String,
    #[serde(default)]
    pub order_type: Option<String>,
    #[serde(default)]
    pub trans_id: Option<String>,
    #[serde(default)]
    pub pay_type: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub response_time: Option<i64>,
    #[serde(default)]
    pub extra_data: Option<String>,
    pub amount: i64,
    pub result_code: i32,
    #[serde(default)]
    pub signature: Option<String>,
}

impl<S: Store, Q: QrCodeIssuer, C: ConfirmationSender> ReconciliationHandler<S, Q, C> {
    /// Processes a direct gateway callback.
    ///
    /// When a verifier is supplied, a missing or invalid signature
    /// rejects the payload before any state is touched. Result code 0
    /// settles as success, the authorized code records provisionally,
    /// anything else fails the payment.
    #[tracing::instrument(skip(self, payload, verifier), fields(result_code = payload.result_code))]
    pub async fn process_callback(
        &self,
        payload: &CallbackPayload,
        verifier: Option<&SignatureVerifier>,
    ) -> Result<Outcome> {
        if let Some(verifier) = verifier
            && !verifier.verify(payload)
        {
            return Err(ReconcileError::BadSignature);
        }

        let reference = payload.order_info.trim().to_uppercase();
        if reference.is_empty() {
            return Ok(Outcome::Ignored);
        }

        let at = Utc::now();
        let signal = match payload.result_code {
            RESULT_SUCCESS => Signal::Success {
                amount: Money::from_minor(payload.amount),
                at,
            },
            RESULT_AUTHORIZED => Signal::Provisional { at },
            _ => Signal::Failure { at },
        };

        self.settle(&reference, signal).await
    }
}
