//! Payment-initiation seam.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{Money, OrderId};

use crate::error::{BookingError, Result};

/// What a successful payment initiation hands back.
#[derive(Debug, Clone)]
pub struct PaymentInit {
    /// Where to send the buyer to complete payment.
    pub redirect_url: String,
    /// Reference code the provider will echo back in its signals.
    pub transaction_ref: String,
}

/// Trait for the external payment-initiation collaborator.
///
/// The core needs only this minimal contract; request signing and the
/// concrete wire shape belong to the gateway adapter.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Initiates a payment and returns the redirect target plus the
    /// reference code to correlate provider callbacks with.
    async fn initiate(
        &self,
        order_id: OrderId,
        amount: Money,
        return_url: &str,
    ) -> Result<PaymentInit>;
}

/// Derives the provider reference code for an order.
///
/// `EM` + gateway tag + the first 15 hex digits of the order id, upper
/// case — 10 to 32 alphanumeric characters, the shape the provider echoes
/// back in transfer free text.
pub fn reference_code(order_id: OrderId) -> String {
    let hex = order_id.as_uuid().simple().to_string().to_uppercase();
    format!("EMP2S{}", &hex[..15])
}

#[derive(Debug, Default)]
struct MemoryGatewayState {
    initiated: HashMap<String, (OrderId, Money)>,
    fail_on_initiate: bool,
}

/// In-memory payment gateway for testing.
#[derive(Debug, Clone, Default)]
pub struct MemoryGateway {
    state: Arc<RwLock<MemoryGatewayState>>,
}

impl MemoryGateway {
    /// Creates a new in-memory gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the gateway to fail on the next initiate call.
    pub fn set_fail_on_initiate(&self, fail: bool) {
        self.state.write().expect("gateway lock").fail_on_initiate = fail;
    }

    /// Returns the number of initiated payments.
    pub fn initiated_count(&self) -> usize {
        self.state.read().expect("gateway lock").initiated.len()
    }

    /// Returns the amount initiated under the given reference, if any.
    pub fn initiated_amount(&self, reference: &str) -> Option<Money> {
        self.state
            .read()
            .expect("gateway lock")
            .initiated
            .get(reference)
            .map(|(_, amount)| *amount)
    }
}

#[async_trait]
impl PaymentGateway for MemoryGateway {
    async fn initiate(
        &self,
        order_id: OrderId,
        amount: Money,
        return_url: &str,
    ) -> Result<PaymentInit> {
        let mut state = self.state.write().expect("gateway lock");

        if state.fail_on_initiate {
            return Err(BookingError::Gateway("provider rejected create".to_string()));
        }

        let transaction_ref = reference_code(order_id);
        state
            .initiated
            .insert(transaction_ref.clone(), (order_id, amount));

        let _ = return_url;
        Ok(PaymentInit {
            redirect_url: format!("https://pay.example/checkout/{transaction_ref}"),
            transaction_ref,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_code_shape() {
        let code = reference_code(OrderId::new());
        assert!(code.starts_with("EMP2S"));
        assert_eq!(code.len(), 20);
        assert!(code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn reference_code_is_deterministic_per_order() {
        let order_id = OrderId::new();
        assert_eq!(reference_code(order_id), reference_code(order_id));
        assert_ne!(reference_code(order_id), reference_code(OrderId::new()));
    }

    #[tokio::test]
    async fn initiate_records_payment() {
        let gateway = MemoryGateway::new();
        let order_id = OrderId::new();

        let init = gateway
            .initiate(order_id, Money::from_minor(5000), "https://shop.example/done")
            .await
            .unwrap();

        assert!(init.redirect_url.contains(&init.transaction_ref));
        assert_eq!(gateway.initiated_count(), 1);
        assert_eq!(
            gateway.initiated_amount(&init.transaction_ref),
            Some(Money::from_minor(5000))
        );
    }

    #[tokio::test]
    async fn initiate_can_fail() {
        let gateway = MemoryGateway::new();
        gateway.set_fail_on_initiate(true);

        let result = gateway
            .initiate(OrderId::new(), Money::from_minor(100), "")
            .await;
        assert!(matches!(result, Err(BookingError::Gateway(_))));
        assert_eq!(gateway.initiated_count(), 0);
    }
}
