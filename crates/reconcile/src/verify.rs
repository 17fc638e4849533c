//! HMAC signature verification for the direct callback.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::callback::CallbackPayload;

type HmacSha256 = Hmac<Sha256>;

/// Verifies provider signatures over a canonical field concatenation.
///
/// The signed string is the alphabetically ordered `key=value&...` join
/// of the payload's non-empty fields, excluding the signature itself,
/// HMAC-SHA256'd with the shared secret.
pub struct SignatureVerifier {
    secret: String,
}

impl SignatureVerifier {
    /// Creates a verifier with the given shared secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Checks the payload's signature; missing or mismatched fails.
    pub fn verify(&self, payload: &CallbackPayload) -> bool {
        let Some(provided) = payload.signature.as_deref() else {
            return false;
        };
        if provided.is_empty() {
            return false;
        }
        self.signature_for(payload).eq_ignore_ascii_case(provided)
    }

    /// Computes the expected signature for a payload. Exposed so tests
    /// and sandbox tooling can build validly signed payloads.
    pub fn signature_for(&self, payload: &CallbackPayload) -> String {
        hmac_hex(&canonical_string(payload), &self.secret)
    }
}

fn canonical_string(payload: &CallbackPayload) -> String {
    let mut fields: Vec<(&str, String)> = vec![
        ("accessKey", payload.access_key.clone().unwrap_or_default()),
        ("amount", payload.amount.to_string()),
        ("extraData", payload.extra_data.clone().unwrap_or_default()),
        ("message", payload.message.clone().unwrap_or_default()),
        ("orderId", payload.order_id.clone().unwrap_or_default()),
        ("orderInfo", payload.order_info.clone()),
        ("orderType", payload.order_type.clone().unwrap_or_default()),
        (
            "partnerCode",
            payload.partner_code.clone().unwrap_or_default(),
        ),
        ("payType", payload.pay_type.clone().unwrap_or_default()),
        ("requestId", payload.request_id.clone().unwrap_or_default()),
        (
            "responseTime",
            payload
                .response_time
                .filter(|t| *t > 0)
                .map(|t| t.to_string())
                .unwrap_or_default(),
        ),
        ("resultCode", payload.result_code.to_string()),
        ("transId", payload.trans_id.clone().unwrap_or_default()),
    ];

    fields.retain(|(_, value)| !value.is_empty());
    fields.sort_by(|a, b| a.0.cmp(b.0));

    fields
        .into_iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

fn hmac_hex(data: &str, secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(data.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}
