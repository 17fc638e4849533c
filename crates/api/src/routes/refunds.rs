//! Refund workflow endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use common::{Money, OrderId, RefundRequestId, TicketId};
use refund::CreateRefund;
use serde::{Deserialize, Serialize};
use store::Store;
use uuid::Uuid;

use crate::AppState;
use crate::error::ApiError;
use crate::routes::require_identity;

#[derive(Deserialize)]
pub struct CreateRefundRequest {
    pub order_id: Uuid,
    #[serde(default)]
    pub ticket_ids: Option<Vec<Uuid>>,
    #[serde(default)]
    pub amount_minor: Option<i64>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct ReviewRequest {
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct CompleteRequest {
    #[serde(default)]
    pub receipt_ref: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Serialize)]
pub struct RefundItemView {
    pub ticket_id: Uuid,
    pub amount_minor: i64,
}

#[derive(Serialize)]
pub struct RefundCreatedResponse {
    pub refund_request_id: Uuid,
    pub status: String,
    pub amount_minor: i64,
    pub items: Vec<RefundItemView>,
}

/// POST /refunds — file a refund request against a paid order.
pub async fn create<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(request): Json<CreateRefundRequest>,
) -> Result<(StatusCode, Json<RefundCreatedResponse>), ApiError> {
    let caller = require_identity(&state, &headers)?;

    let (refund, items) = state
        .refunds
        .create(
            caller,
            CreateRefund {
                order_id: OrderId::from_uuid(request.order_id),
                ticket_ids: request
                    .ticket_ids
                    .map(|ids| ids.into_iter().map(TicketId::from_uuid).collect()),
                amount: request.amount_minor.map(Money::from_minor),
                reason: request.reason,
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RefundCreatedResponse {
            refund_request_id: refund.id.as_uuid(),
            status: refund.status.to_string(),
            amount_minor: refund.amount.minor(),
            items: items
                .iter()
                .map(|item| RefundItemView {
                    ticket_id: item.ticket_id.as_uuid(),
                    amount_minor: item.amount.minor(),
                })
                .collect(),
        }),
    ))
}

/// POST /refunds/{id}/accept — admin accepts a pending request.
pub async fn accept<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    body: Option<Json<ReviewRequest>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let admin = require_identity(&state, &headers)?;
    let note = body.map(|Json(b)| b.note).unwrap_or_default();
    state
        .refunds
        .accept(admin, RefundRequestId::from_uuid(id), note)
        .await?;
    Ok(Json(serde_json::json!({ "accepted": true })))
}

/// POST /refunds/{id}/reject — admin rejects a pending or approved request.
pub async fn reject<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    body: Option<Json<ReviewRequest>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let admin = require_identity(&state, &headers)?;
    let note = body.map(|Json(b)| b.note).unwrap_or_default();
    state
        .refunds
        .reject(admin, RefundRequestId::from_uuid(id), note)
        .await?;
    Ok(Json(serde_json::json!({ "rejected": true })))
}

/// POST /refunds/{id}/complete — admin marks an approved refund paid.
pub async fn complete<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    body: Option<Json<CompleteRequest>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let admin = require_identity(&state, &headers)?;
    let body = body.map(|Json(b)| b).unwrap_or_default();
    state
        .refunds
        .complete(
            admin,
            RefundRequestId::from_uuid(id),
            body.receipt_ref,
            body.note,
        )
        .await?;
    Ok(Json(serde_json::json!({ "paid": true })))
}
