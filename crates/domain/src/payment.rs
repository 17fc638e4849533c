//! Payment attempts and configured payment methods.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, PaymentId, PaymentMethodId};
use serde::{Deserialize, Serialize};

/// The state of a payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PaymentStatus {
    /// Initiated; awaiting a provider signal.
    #[default]
    Pending,

    /// Provider confirmed the transfer (terminal).
    Success,

    /// Declined, mismatched, or expired (terminal).
    Failed,
}

impl PaymentStatus {
    /// Returns true once no provider signal can change this payment.
    ///
    /// Terminal status is the idempotency guard against duplicate
    /// provider deliveries.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Success | PaymentStatus::Failed)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Success => "Success",
            PaymentStatus::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One payment attempt against an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub method_id: PaymentMethodId,
    pub amount: Money,
    pub status: PaymentStatus,
    /// Idempotency key correlating provider callbacks back to this record.
    pub transaction_ref: Option<String>,
    pub transaction_date: Option<DateTime<Utc>>,
}

impl Payment {
    /// Creates a pending payment carrying the provider reference.
    pub fn pending(
        order_id: OrderId,
        method_id: PaymentMethodId,
        amount: Money,
        transaction_ref: impl Into<String>,
    ) -> Self {
        Self {
            id: PaymentId::new(),
            order_id,
            method_id,
            amount,
            status: PaymentStatus::Pending,
            transaction_ref: Some(transaction_ref.into()),
            transaction_date: None,
        }
    }
}

/// A configured payment method (gateway route).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: PaymentMethodId,
    pub name: String,
    /// Which gateway adapter handles this method; operator configuration,
    /// never defaulted.
    pub gateway_key: Option<String>,
    pub active: bool,
}

impl PaymentMethod {
    pub fn new(name: impl Into<String>, gateway_key: impl Into<String>) -> Self {
        Self {
            id: PaymentMethodId::new(),
            name: name.into(),
            gateway_key: Some(gateway_key.into()),
            active: true,
        }
    }
}
