//! Ticket-issuance collaborators: QR payloads and confirmation delivery.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::OrderId;
use domain::{Order, Ticket};

/// Builds the signed payload embedded in a ticket's entry QR code.
///
/// Rasterising the image and signing belong to the external collaborator;
/// the core only stores the payload string it returns.
pub trait QrCodeIssuer: Send + Sync {
    fn ticket_payload(&self, ticket: &Ticket) -> String;
}

/// Plain-text QR issuer for tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryQrIssuer;

impl QrCodeIssuer for MemoryQrIssuer {
    fn ticket_payload(&self, ticket: &Ticket) -> String {
        format!(
            "TKT:{}:{}:{}:{}",
            ticket.id, ticket.order_id, ticket.event_id, ticket.attendee_id
        )
    }
}

/// Delivers a purchase confirmation once an order's tickets issue.
///
/// Best-effort: implementations swallow transport failures, and a failed
/// delivery never affects the settlement that triggered it.
#[async_trait]
pub trait ConfirmationSender: Send + Sync {
    async fn order_confirmed(&self, order: &Order, tickets: &[Ticket]);
}

/// In-memory confirmation sender recording deliveries, for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryConfirmation {
    sent: Arc<RwLock<Vec<OrderId>>>,
}

impl MemoryConfirmation {
    /// Creates a new recording sender.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the orders confirmed so far, in delivery order.
    pub fn confirmed_orders(&self) -> Vec<OrderId> {
        self.sent.read().expect("confirmation lock").clone()
    }
}

#[async_trait]
impl ConfirmationSender for MemoryConfirmation {
    async fn order_confirmed(&self, order: &Order, _tickets: &[Ticket]) {
        self.sent.write().expect("confirmation lock").push(order.id);
    }
}
