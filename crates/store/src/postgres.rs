use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    EventId, HoldId, LedgerEntryId, Money, OrderId, PaymentId, PaymentMethodId, RefundRequestId,
    SeatId, TicketId, UserId, Version,
};
use domain::{
    Hold, LedgerDirection, LedgerEntry, LedgerPurpose, LedgerStatus, Order, OrderStatus, Payment,
    PaymentMethod, PaymentStatus, RefundRequest, RefundRequestItem, RefundStatus, SeatClaim,
    Ticket, TicketStatus,
};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    store::{Store, Write},
};

/// PostgreSQL-backed store implementation.
///
/// Every `apply` runs inside one database transaction; a failed
/// conditioned write returns an error, which drops and rolls back the
/// transaction.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }
}

fn decode<T>(column: &'static str, value: &str, parsed: Option<T>) -> Result<T> {
    parsed.ok_or_else(|| StoreError::Decode {
        column,
        value: value.to_string(),
    })
}

fn order_status(value: &str) -> Result<OrderStatus> {
    let parsed = match value {
        "Pending" => Some(OrderStatus::Pending),
        "Paid" => Some(OrderStatus::Paid),
        "Cancelled" => Some(OrderStatus::Cancelled),
        "PendingRefund" => Some(OrderStatus::PendingRefund),
        "PartiallyRefunded" => Some(OrderStatus::PartiallyRefunded),
        "Refunded" => Some(OrderStatus::Refunded),
        _ => None,
    };
    decode("order.status", value, parsed)
}

fn ticket_status(value: &str) -> Result<TicketStatus> {
    let parsed = match value {
        "Reserved" => Some(TicketStatus::Reserved),
        "Issued" => Some(TicketStatus::Issued),
        "Cancelled" => Some(TicketStatus::Cancelled),
        "PendingRefund" => Some(TicketStatus::PendingRefund),
        "Refunded" => Some(TicketStatus::Refunded),
        "CheckedIn" => Some(TicketStatus::CheckedIn),
        "NoShow" => Some(TicketStatus::NoShow),
        _ => None,
    };
    decode("ticket.status", value, parsed)
}

fn payment_status(value: &str) -> Result<PaymentStatus> {
    let parsed = match value {
        "Pending" => Some(PaymentStatus::Pending),
        "Success" => Some(PaymentStatus::Success),
        "Failed" => Some(PaymentStatus::Failed),
        _ => None,
    };
    decode("payment.status", value, parsed)
}

fn refund_status(value: &str) -> Result<RefundStatus> {
    let parsed = match value {
        "Pending" => Some(RefundStatus::Pending),
        "Approved" => Some(RefundStatus::Approved),
        "Rejected" => Some(RefundStatus::Rejected),
        "Paid" => Some(RefundStatus::Paid),
        _ => None,
    };
    decode("refund.status", value, parsed)
}

fn ledger_direction(value: &str) -> Result<LedgerDirection> {
    let parsed = match value {
        "In" => Some(LedgerDirection::In),
        "Out" => Some(LedgerDirection::Out),
        _ => None,
    };
    decode("ledger.direction", value, parsed)
}

fn ledger_purpose(value: &str) -> Result<LedgerPurpose> {
    let parsed = match value {
        "TicketSale" => Some(LedgerPurpose::TicketSale),
        "Refund" => Some(LedgerPurpose::Refund),
        _ => None,
    };
    decode("ledger.purpose", value, parsed)
}

fn ledger_status(value: &str) -> Result<LedgerStatus> {
    let parsed = match value {
        "Pending" => Some(LedgerStatus::Pending),
        "Success" => Some(LedgerStatus::Success),
        "Failed" => Some(LedgerStatus::Failed),
        _ => None,
    };
    decode("ledger.status", value, parsed)
}

fn row_to_seat(row: &PgRow) -> Result<SeatClaim> {
    Ok(SeatClaim {
        event_id: EventId::from_uuid(row.try_get::<Uuid, _>("event_id")?),
        seat_id: SeatId::from_uuid(row.try_get::<Uuid, _>("seat_id")?),
        category: row.try_get("category")?,
        price: Money::from_minor(row.try_get("price")?),
        available: row.try_get("available")?,
        version: Version::new(row.try_get("version")?),
    })
}

fn row_to_hold(row: &PgRow) -> Result<Hold> {
    Ok(Hold {
        id: HoldId::from_uuid(row.try_get::<Uuid, _>("id")?),
        event_id: EventId::from_uuid(row.try_get::<Uuid, _>("event_id")?),
        seat_id: SeatId::from_uuid(row.try_get::<Uuid, _>("seat_id")?),
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        expires_at: row.try_get("expires_at")?,
        order_id: row
            .try_get::<Option<Uuid>, _>("order_id")?
            .map(OrderId::from_uuid),
    })
}

fn row_to_order(row: &PgRow) -> Result<Order> {
    let status: String = row.try_get("status")?;
    Ok(Order {
        id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        total_amount: Money::from_minor(row.try_get("total_amount")?),
        status: order_status(&status)?,
        created_at: row.try_get("created_at")?,
        pending_expires_at: row.try_get("pending_expires_at")?,
    })
}

fn row_to_ticket(row: &PgRow) -> Result<Ticket> {
    let status: String = row.try_get("status")?;
    Ok(Ticket {
        id: TicketId::from_uuid(row.try_get::<Uuid, _>("id")?),
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        event_id: EventId::from_uuid(row.try_get::<Uuid, _>("event_id")?),
        seat_id: SeatId::from_uuid(row.try_get::<Uuid, _>("seat_id")?),
        price: Money::from_minor(row.try_get("price")?),
        attendee_id: UserId::from_uuid(row.try_get::<Uuid, _>("attendee_id")?),
        status: ticket_status(&status)?,
        qr_payload: row.try_get("qr_payload")?,
        purchased_at: row.try_get("purchased_at")?,
    })
}

fn row_to_payment(row: &PgRow) -> Result<Payment> {
    let status: String = row.try_get("status")?;
    Ok(Payment {
        id: PaymentId::from_uuid(row.try_get::<Uuid, _>("id")?),
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        method_id: PaymentMethodId::from_uuid(row.try_get::<Uuid, _>("method_id")?),
        amount: Money::from_minor(row.try_get("amount")?),
        status: payment_status(&status)?,
        transaction_ref: row.try_get("transaction_ref")?,
        transaction_date: row.try_get("transaction_date")?,
    })
}

fn row_to_method(row: &PgRow) -> Result<PaymentMethod> {
    Ok(PaymentMethod {
        id: PaymentMethodId::from_uuid(row.try_get::<Uuid, _>("id")?),
        name: row.try_get("name")?,
        gateway_key: row.try_get("gateway_key")?,
        active: row.try_get("active")?,
    })
}

fn row_to_refund(row: &PgRow) -> Result<RefundRequest> {
    let status: String = row.try_get("status")?;
    Ok(RefundRequest {
        id: RefundRequestId::from_uuid(row.try_get::<Uuid, _>("id")?),
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        amount: Money::from_minor(row.try_get("amount")?),
        status: refund_status(&status)?,
        reason: row.try_get("reason")?,
        admin_note: row.try_get("admin_note")?,
        receipt_ref: row.try_get("receipt_ref")?,
        created_at: row.try_get("created_at")?,
        processed_at: row.try_get("processed_at")?,
        processed_by: row
            .try_get::<Option<Uuid>, _>("processed_by")?
            .map(UserId::from_uuid),
    })
}

fn row_to_refund_item(row: &PgRow) -> Result<RefundRequestItem> {
    Ok(RefundRequestItem {
        refund_request_id: RefundRequestId::from_uuid(
            row.try_get::<Uuid, _>("refund_request_id")?,
        ),
        ticket_id: TicketId::from_uuid(row.try_get::<Uuid, _>("ticket_id")?),
        amount: Money::from_minor(row.try_get("amount")?),
    })
}

fn row_to_ledger(row: &PgRow) -> Result<LedgerEntry> {
    let direction: String = row.try_get("direction")?;
    let purpose: String = row.try_get("purpose")?;
    let status: String = row.try_get("status")?;
    Ok(LedgerEntry {
        id: LedgerEntryId::from_uuid(row.try_get::<Uuid, _>("id")?),
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        refund_request_id: row
            .try_get::<Option<Uuid>, _>("refund_request_id")?
            .map(RefundRequestId::from_uuid),
        amount: Money::from_minor(row.try_get("amount")?),
        direction: ledger_direction(&direction)?,
        purpose: ledger_purpose(&purpose)?,
        status: ledger_status(&status)?,
        running_balance: Money::from_minor(row.try_get("running_balance")?),
        note: row.try_get("note")?,
        created_at: row.try_get("created_at")?,
    })
}

async fn apply_write(tx: &mut Transaction<'_, Postgres>, write: Write) -> Result<()> {
    match write {
        Write::PutSeat(seat) => {
            sqlx::query(
                "INSERT INTO seats (event_id, seat_id, category, price, available, version)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (event_id, seat_id) DO UPDATE
                 SET category = $3, price = $4, available = $5, version = $6",
            )
            .bind(seat.event_id.as_uuid())
            .bind(seat.seat_id.as_uuid())
            .bind(&seat.category)
            .bind(seat.price.minor())
            .bind(seat.available)
            .bind(seat.version.as_i64())
            .execute(&mut **tx)
            .await?;
        }
        Write::ClaimSeat {
            event_id,
            seat_id,
            expected,
        } => {
            let result = sqlx::query(
                "UPDATE seats SET available = FALSE, version = version + 1
                 WHERE event_id = $1 AND seat_id = $2 AND version = $3 AND available",
            )
            .bind(event_id.as_uuid())
            .bind(seat_id.as_uuid())
            .bind(expected.as_i64())
            .execute(&mut **tx)
            .await?;
            if result.rows_affected() == 0 {
                return Err(seat_write_failure(tx, event_id, seat_id, expected).await);
            }
        }
        Write::ReleaseSeat {
            event_id,
            seat_id,
            expected,
        } => {
            let result = sqlx::query(
                "UPDATE seats SET available = TRUE, version = version + 1
                 WHERE event_id = $1 AND seat_id = $2 AND version = $3",
            )
            .bind(event_id.as_uuid())
            .bind(seat_id.as_uuid())
            .bind(expected.as_i64())
            .execute(&mut **tx)
            .await?;
            if result.rows_affected() == 0 {
                return Err(seat_write_failure(tx, event_id, seat_id, expected).await);
            }
        }
        Write::PutHold(hold) => {
            sqlx::query(
                "DELETE FROM holds
                 WHERE event_id = $1 AND seat_id = $2 AND expires_at <= NOW()",
            )
            .bind(hold.event_id.as_uuid())
            .bind(hold.seat_id.as_uuid())
            .execute(&mut **tx)
            .await?;

            let result = sqlx::query(
                "INSERT INTO holds (id, event_id, seat_id, user_id, expires_at, order_id)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (event_id, seat_id) DO NOTHING",
            )
            .bind(hold.id.as_uuid())
            .bind(hold.event_id.as_uuid())
            .bind(hold.seat_id.as_uuid())
            .bind(hold.user_id.as_uuid())
            .bind(hold.expires_at)
            .bind(hold.order_id.map(|id| id.as_uuid()))
            .execute(&mut **tx)
            .await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::AlreadyHeld {
                    event_id: hold.event_id,
                    seat_id: hold.seat_id,
                });
            }
        }
        Write::DeleteHold(id) => {
            sqlx::query("DELETE FROM holds WHERE id = $1")
                .bind(id.as_uuid())
                .execute(&mut **tx)
                .await?;
        }
        Write::PutOrder(order) => {
            sqlx::query(
                "INSERT INTO orders (id, user_id, total_amount, status, created_at, pending_expires_at)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (id) DO UPDATE
                 SET status = $4, pending_expires_at = $6",
            )
            .bind(order.id.as_uuid())
            .bind(order.user_id.as_uuid())
            .bind(order.total_amount.minor())
            .bind(order.status.as_str())
            .bind(order.created_at)
            .bind(order.pending_expires_at)
            .execute(&mut **tx)
            .await?;
        }
        Write::PutTicket(ticket) => {
            sqlx::query(
                "INSERT INTO tickets (id, order_id, event_id, seat_id, price, attendee_id, status, qr_payload, purchased_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                 ON CONFLICT (id) DO UPDATE
                 SET status = $7, qr_payload = $8, purchased_at = $9",
            )
            .bind(ticket.id.as_uuid())
            .bind(ticket.order_id.as_uuid())
            .bind(ticket.event_id.as_uuid())
            .bind(ticket.seat_id.as_uuid())
            .bind(ticket.price.minor())
            .bind(ticket.attendee_id.as_uuid())
            .bind(ticket.status.as_str())
            .bind(&ticket.qr_payload)
            .bind(ticket.purchased_at)
            .execute(&mut **tx)
            .await?;
        }
        Write::PutPayment(payment) => {
            sqlx::query(
                "INSERT INTO payments (id, order_id, method_id, amount, status, transaction_ref, transaction_date)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)
                 ON CONFLICT (id) DO UPDATE
                 SET status = $5, transaction_ref = $6, transaction_date = $7",
            )
            .bind(payment.id.as_uuid())
            .bind(payment.order_id.as_uuid())
            .bind(payment.method_id.as_uuid())
            .bind(payment.amount.minor())
            .bind(payment.status.as_str())
            .bind(&payment.transaction_ref)
            .bind(payment.transaction_date)
            .execute(&mut **tx)
            .await?;
        }
        Write::PutPaymentMethod(method) => {
            sqlx::query(
                "INSERT INTO payment_methods (id, name, gateway_key, active)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (id) DO UPDATE
                 SET name = $2, gateway_key = $3, active = $4",
            )
            .bind(method.id.as_uuid())
            .bind(&method.name)
            .bind(&method.gateway_key)
            .bind(method.active)
            .execute(&mut **tx)
            .await?;
        }
        Write::PutRefundRequest(request) => {
            sqlx::query(
                "INSERT INTO refund_requests (id, order_id, user_id, amount, status, reason, admin_note, receipt_ref, created_at, processed_at, processed_by)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                 ON CONFLICT (id) DO UPDATE
                 SET status = $5, admin_note = $7, receipt_ref = $8, processed_at = $10, processed_by = $11",
            )
            .bind(request.id.as_uuid())
            .bind(request.order_id.as_uuid())
            .bind(request.user_id.as_uuid())
            .bind(request.amount.minor())
            .bind(request.status.as_str())
            .bind(&request.reason)
            .bind(&request.admin_note)
            .bind(&request.receipt_ref)
            .bind(request.created_at)
            .bind(request.processed_at)
            .bind(request.processed_by.map(|id| id.as_uuid()))
            .execute(&mut **tx)
            .await?;
        }
        Write::PutRefundItem(item) => {
            sqlx::query(
                "INSERT INTO refund_request_items (refund_request_id, ticket_id, amount)
                 VALUES ($1, $2, $3)
                 ON CONFLICT (refund_request_id, ticket_id) DO UPDATE SET amount = $3",
            )
            .bind(item.refund_request_id.as_uuid())
            .bind(item.ticket_id.as_uuid())
            .bind(item.amount.minor())
            .execute(&mut **tx)
            .await?;
        }
        Write::PutLedgerEntry(entry) => {
            sqlx::query(
                "INSERT INTO ledger_entries (id, order_id, refund_request_id, amount, direction, purpose, status, running_balance, note, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            )
            .bind(entry.id.as_uuid())
            .bind(entry.order_id.as_uuid())
            .bind(entry.refund_request_id.map(|id| id.as_uuid()))
            .bind(entry.amount.minor())
            .bind(entry.direction.as_str())
            .bind(entry.purpose.as_str())
            .bind(entry.status.as_str())
            .bind(entry.running_balance.minor())
            .bind(&entry.note)
            .bind(entry.created_at)
            .execute(&mut **tx)
            .await?;
        }
        Write::SettleLedgerEntry { id, status } => {
            let row = sqlx::query("SELECT amount, direction FROM ledger_entries WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&mut **tx)
                .await?
                .ok_or(StoreError::UnknownRecord {
                    entity: "ledger entry",
                })?;

            if status == LedgerStatus::Success {
                let balance: i64 = sqlx::query_scalar(
                    "SELECT COALESCE(SUM(CASE WHEN direction = 'In' THEN ABS(amount) ELSE -ABS(amount) END), 0)
                     FROM ledger_entries WHERE status = 'Success'",
                )
                .fetch_one(&mut **tx)
                .await?;

                let amount: i64 = row.try_get("amount")?;
                let direction: String = row.try_get("direction")?;
                let signed = match ledger_direction(&direction)? {
                    LedgerDirection::In => amount.abs(),
                    LedgerDirection::Out => -amount.abs(),
                };

                sqlx::query(
                    "UPDATE ledger_entries SET status = $2, running_balance = $3 WHERE id = $1",
                )
                .bind(id.as_uuid())
                .bind(status.as_str())
                .bind(balance + signed)
                .execute(&mut **tx)
                .await?;
            } else {
                sqlx::query("UPDATE ledger_entries SET status = $2 WHERE id = $1")
                    .bind(id.as_uuid())
                    .bind(status.as_str())
                    .execute(&mut **tx)
                    .await?;
            }
        }
    }
    Ok(())
}

/// Distinguishes "seat gone" from "lost the race" after a zero-row update.
async fn seat_write_failure(
    tx: &mut Transaction<'_, Postgres>,
    event_id: EventId,
    seat_id: SeatId,
    expected: Version,
) -> StoreError {
    let exists = sqlx::query("SELECT 1 FROM seats WHERE event_id = $1 AND seat_id = $2")
        .bind(event_id.as_uuid())
        .bind(seat_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await;
    match exists {
        Ok(Some(_)) => StoreError::Conflict {
            event_id,
            seat_id,
            expected,
        },
        Ok(None) => StoreError::UnknownRecord { entity: "seat" },
        Err(e) => StoreError::Database(e),
    }
}

#[async_trait]
impl Store for PgStore {
    #[tracing::instrument(skip(self, writes), fields(writes = writes.len()))]
    async fn apply(&self, writes: Vec<Write>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for write in writes {
            apply_write(&mut tx, write).await?;
        }
        tx.commit().await?;
        metrics::counter!("store_batches_committed").increment(1);
        Ok(())
    }

    async fn seat(&self, event_id: EventId, seat_id: SeatId) -> Result<Option<SeatClaim>> {
        let row = sqlx::query("SELECT * FROM seats WHERE event_id = $1 AND seat_id = $2")
            .bind(event_id.as_uuid())
            .bind(seat_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_seat).transpose()
    }

    async fn seats(&self, event_id: EventId, seat_ids: &[SeatId]) -> Result<Vec<SeatClaim>> {
        let ids: Vec<Uuid> = seat_ids.iter().map(|id| id.as_uuid()).collect();
        let rows = sqlx::query(
            "SELECT * FROM seats WHERE event_id = $1 AND seat_id = ANY($2) ORDER BY seat_id",
        )
        .bind(event_id.as_uuid())
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_seat).collect()
    }

    async fn seats_for_event(&self, event_id: EventId) -> Result<Vec<SeatClaim>> {
        let rows = sqlx::query("SELECT * FROM seats WHERE event_id = $1 ORDER BY seat_id")
            .bind(event_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_seat).collect()
    }

    async fn orphaned_claimed_seats(&self) -> Result<Vec<SeatClaim>> {
        let rows = sqlx::query(
            "SELECT * FROM seats s
             WHERE NOT s.available
               AND NOT EXISTS (
                   SELECT 1 FROM tickets t
                   WHERE t.event_id = s.event_id
                     AND t.seat_id = s.seat_id
                     AND t.status NOT IN ('Cancelled', 'Refunded')
               )
             ORDER BY s.seat_id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_seat).collect()
    }

    async fn active_held_seat_ids(
        &self,
        event_id: EventId,
        now: DateTime<Utc>,
    ) -> Result<HashSet<SeatId>> {
        let rows =
            sqlx::query("SELECT seat_id FROM holds WHERE event_id = $1 AND expires_at > $2")
                .bind(event_id.as_uuid())
                .bind(now)
                .fetch_all(&self.pool)
                .await?;
        rows.iter()
            .map(|row| Ok(SeatId::from_uuid(row.try_get::<Uuid, _>("seat_id")?)))
            .collect()
    }

    async fn active_holds(
        &self,
        event_id: EventId,
        seat_ids: &[SeatId],
        now: DateTime<Utc>,
    ) -> Result<Vec<Hold>> {
        let ids: Vec<Uuid> = seat_ids.iter().map(|id| id.as_uuid()).collect();
        let rows = sqlx::query(
            "SELECT * FROM holds
             WHERE event_id = $1 AND seat_id = ANY($2) AND expires_at > $3",
        )
        .bind(event_id.as_uuid())
        .bind(&ids)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_hold).collect()
    }

    async fn holds_for_seats(&self, event_id: EventId, seat_ids: &[SeatId]) -> Result<Vec<Hold>> {
        let ids: Vec<Uuid> = seat_ids.iter().map(|id| id.as_uuid()).collect();
        let rows = sqlx::query("SELECT * FROM holds WHERE event_id = $1 AND seat_id = ANY($2)")
            .bind(event_id.as_uuid())
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_hold).collect()
    }

    async fn expired_holds(&self, now: DateTime<Utc>) -> Result<Vec<Hold>> {
        let rows = sqlx::query("SELECT * FROM holds WHERE expires_at <= $1 ORDER BY expires_at")
            .bind(now)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_hold).collect()
    }

    async fn order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT * FROM orders WHERE id = $1")
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_order).transpose()
    }

    async fn expired_pending_orders(&self, now: DateTime<Utc>) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            "SELECT * FROM orders
             WHERE status = 'Pending' AND pending_expires_at IS NOT NULL AND pending_expires_at <= $1
             ORDER BY created_at",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_order).collect()
    }

    async fn tickets_for_order(&self, order_id: OrderId) -> Result<Vec<Ticket>> {
        let rows = sqlx::query("SELECT * FROM tickets WHERE order_id = $1 ORDER BY id")
            .bind(order_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_ticket).collect()
    }

    async fn payments_for_order(&self, order_id: OrderId) -> Result<Vec<Payment>> {
        let rows = sqlx::query("SELECT * FROM payments WHERE order_id = $1 ORDER BY id")
            .bind(order_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_payment).collect()
    }

    async fn payment_by_ref(&self, reference: &str) -> Result<Option<Payment>> {
        let row = sqlx::query("SELECT * FROM payments WHERE transaction_ref = $1")
            .bind(reference)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_payment).transpose()
    }

    async fn payment_method(&self, id: PaymentMethodId) -> Result<Option<PaymentMethod>> {
        let row = sqlx::query("SELECT * FROM payment_methods WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_method).transpose()
    }

    async fn refund_request(&self, id: RefundRequestId) -> Result<Option<RefundRequest>> {
        let row = sqlx::query("SELECT * FROM refund_requests WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_refund).transpose()
    }

    async fn refund_items(&self, id: RefundRequestId) -> Result<Vec<RefundRequestItem>> {
        let rows = sqlx::query("SELECT * FROM refund_request_items WHERE refund_request_id = $1")
            .bind(id.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_refund_item).collect()
    }

    async fn refund_requests_for_order(&self, order_id: OrderId) -> Result<Vec<RefundRequest>> {
        let rows =
            sqlx::query("SELECT * FROM refund_requests WHERE order_id = $1 ORDER BY created_at")
                .bind(order_id.as_uuid())
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(row_to_refund).collect()
    }

    async fn ledger_entries_for_refund(&self, id: RefundRequestId) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query(
            "SELECT * FROM ledger_entries WHERE refund_request_id = $1 ORDER BY created_at",
        )
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_ledger).collect()
    }

    async fn settled_balance(&self) -> Result<Money> {
        let balance: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(CASE WHEN direction = 'In' THEN ABS(amount) ELSE -ABS(amount) END), 0)
             FROM ledger_entries WHERE status = 'Success'",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(Money::from_minor(balance))
    }
}
