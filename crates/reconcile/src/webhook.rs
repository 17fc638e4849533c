//! The provider's batch transfer-notification entry point.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use common::Money;
use regex::Regex;
use serde::{Deserialize, Serialize};
use store::Store;

use crate::handler::{Outcome, ReconciliationHandler, Signal};
use crate::issue::{ConfirmationSender, QrCodeIssuer};

/// Reference codes are embedded in transfer free text; this is their shape.
static REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"EM[A-Z0-9]{8,30}").expect("reference pattern is valid")
});

/// One generic transfer record as the provider reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub transaction_number: Option<String>,
    /// `IN` for money received, `OUT` for money reversed.
    pub transfer_type: String,
    pub transfer_amount: i64,
    /// Free text; the payment reference is pattern-matched out of it.
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub transaction_date: Option<String>,
}

/// The webhook body: a batch of transfer records.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferBatch {
    #[serde(default)]
    pub transactions: Vec<TransferRecord>,
}

/// Summary of one processed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Records carrying a recognisable reference code.
    pub matched: usize,
    pub issued: usize,
    pub cancelled: usize,
    pub ignored: usize,
    /// Records whose settlement hit a store error; already-committed
    /// records are unaffected and the provider will redeliver.
    pub errors: usize,
}

/// Extracts the payment reference embedded in transfer free text.
pub fn extract_reference(content: &str) -> Option<String> {
    REFERENCE
        .find(&content.to_uppercase())
        .map(|m| m.as_str().to_string())
}

fn parse_transfer_date(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(|s| {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
    .unwrap_or_else(Utc::now)
}

impl<S: Store, Q: QrCodeIssuer, C: ConfirmationSender> ReconciliationHandler<S, Q, C> {
    /// Processes a webhook batch, one record at a time.
    ///
    /// Records without a transfer direction or reference code are
    /// skipped. Each record settles in its own atomic unit, so a failure
    /// on one loses only that record's progress; the provider's retry
    /// redelivers it and the idempotency guard absorbs the rest.
    #[tracing::instrument(skip(self, batch), fields(records = batch.transactions.len()))]
    pub async fn process_webhook(&self, batch: TransferBatch) -> BatchReport {
        let mut report = BatchReport::default();

        for record in &batch.transactions {
            let direction = record.transfer_type.trim().to_uppercase();
            if direction != "IN" && direction != "OUT" {
                continue;
            }
            let Some(reference) = extract_reference(&record.content) else {
                continue;
            };
            report.matched += 1;

            let at = parse_transfer_date(record.transaction_date.as_deref());
            let signal = if direction == "IN" {
                Signal::Success {
                    amount: Money::from_minor(record.transfer_amount),
                    at,
                }
            } else {
                Signal::Failure { at }
            };

            match self.settle(&reference, signal).await {
                Ok(Outcome::Issued) => report.issued += 1,
                Ok(Outcome::Cancelled) => report.cancelled += 1,
                Ok(Outcome::Recorded) | Ok(Outcome::Ignored) => report.ignored += 1,
                Err(e) => {
                    report.errors += 1;
                    tracing::error!(reference, error = %e, "webhook record failed, continuing");
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_reference_from_free_text() {
        assert_eq!(
            extract_reference("CK 0123 chuyen tien EMP2S0123456789ABCDE don hang"),
            Some("EMP2S0123456789ABCDE".to_string())
        );
        // Lower case input still matches after normalisation.
        assert_eq!(
            extract_reference("ref emp2s0123456789abcde"),
            Some("EMP2S0123456789ABCDE".to_string())
        );
        assert_eq!(extract_reference("no reference here"), None);
        // Too short to be a reference.
        assert_eq!(extract_reference("EM1234"), None);
    }

    #[test]
    fn transfer_date_parsing_falls_back_to_now() {
        let parsed = parse_transfer_date(Some("2026-08-01T10:30:00+07:00"));
        assert_eq!(parsed.to_rfc3339(), "2026-08-01T03:30:00+00:00");

        let before = Utc::now();
        let fallback = parse_transfer_date(Some("not a date"));
        assert!(fallback >= before);
    }

    #[tokio::test]
    async fn batch_settles_matching_records_and_skips_the_rest() {
        use chrono::Duration;
        use common::{EventId, SeatId, UserId};
        use domain::{Order, OrderStatus, Payment, PaymentMethod, SeatClaim, Ticket};
        use store::{MemoryStore, Store, Write};

        use crate::issue::{MemoryConfirmation, MemoryQrIssuer};

        let store = MemoryStore::new();
        let now = Utc::now();
        let user = UserId::new();
        let event_id = EventId::new();
        let seat = SeatClaim::new(event_id, SeatId::new(), "GA", Money::from_minor(5000));
        let order = Order::pending(
            user,
            Money::from_minor(5000),
            now,
            now + Duration::minutes(10),
        );
        let ticket = Ticket::reserve(order.id, event_id, seat.seat_id, seat.price, user);
        let method = PaymentMethod::new("Bank transfer", "PAY2S");
        let payment = Payment::pending(
            order.id,
            method.id,
            Money::from_minor(5000),
            "EMP2SREF000000001",
        );
        store
            .apply(vec![
                Write::PutSeat(seat),
                Write::PutOrder(order.clone()),
                Write::PutTicket(ticket),
                Write::PutPaymentMethod(method),
                Write::PutPayment(payment),
            ])
            .await
            .unwrap();

        let handler = ReconciliationHandler::new(
            store.clone(),
            MemoryQrIssuer,
            MemoryConfirmation::new(),
        );

        let batch = TransferBatch {
            transactions: vec![
                // No direction we understand.
                TransferRecord {
                    id: None,
                    transaction_number: None,
                    transfer_type: "INTERNAL".to_string(),
                    transfer_amount: 1,
                    content: "EMP2SREF000000001".to_string(),
                    transaction_date: None,
                },
                // Unknown reference: matched but ignored.
                TransferRecord {
                    id: None,
                    transaction_number: None,
                    transfer_type: "IN".to_string(),
                    transfer_amount: 5000,
                    content: "chuyen tien EMP2SNOSUCHREF99".to_string(),
                    transaction_date: None,
                },
                // The real one.
                TransferRecord {
                    id: Some("tx-1".to_string()),
                    transaction_number: None,
                    transfer_type: "in".to_string(),
                    transfer_amount: 5000,
                    content: "thanh toan EMP2SREF000000001".to_string(),
                    transaction_date: None,
                },
            ],
        };

        let report = handler.process_webhook(batch).await;
        assert_eq!(report.matched, 2);
        assert_eq!(report.issued, 1);
        assert_eq!(report.ignored, 1);
        assert_eq!(report.errors, 0);

        let settled = store.order(order.id).await.unwrap().unwrap();
        assert_eq!(settled.status, OrderStatus::Paid);
    }

    #[test]
    fn batch_deserializes_from_provider_json() {
        let json = r#"{
            "transactions": [
                {
                    "id": "tx-1",
                    "transferType": "IN",
                    "transferAmount": 5000,
                    "content": "thanh toan EMP2SABCDEF0123456",
                    "transactionDate": "2026-08-01T10:30:00Z"
                }
            ]
        }"#;
        let batch: TransferBatch = serde_json::from_str(json).unwrap();
        assert_eq!(batch.transactions.len(), 1);
        assert_eq!(batch.transactions[0].transfer_amount, 5000);
    }
}
