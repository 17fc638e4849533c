//! Checkout and order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use booking::{BookingError, CheckoutRequest};
use common::{EventId, OrderId, PaymentMethodId, SeatId};
use serde::{Deserialize, Serialize};
use store::Store;
use uuid::Uuid;

use crate::AppState;
use crate::error::ApiError;
use crate::routes::require_identity;

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub event_id: Uuid,
    pub seat_ids: Vec<Uuid>,
    pub payment_method_id: Uuid,
    #[serde(default)]
    pub return_url: String,
}

#[derive(Serialize)]
pub struct TicketView {
    pub ticket_id: Uuid,
    pub seat_id: Uuid,
    pub price_minor: i64,
    pub status: String,
}

#[derive(Serialize)]
pub struct OrderCreatedResponse {
    pub order_id: Uuid,
    pub status: String,
    pub total_minor: i64,
    pub payment_id: Uuid,
    pub transaction_ref: Option<String>,
    pub redirect_url: String,
    pub tickets: Vec<TicketView>,
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub order_id: Uuid,
    pub status: String,
    pub total_minor: i64,
    pub tickets: Vec<TicketView>,
}

/// POST /orders — convert a seat selection into a durable claim.
pub async fn create<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderCreatedResponse>), ApiError> {
    let caller = require_identity(&state, &headers)?;

    let receipt = state
        .checkout
        .checkout(
            caller,
            CheckoutRequest {
                event_id: EventId::from_uuid(request.event_id),
                seat_ids: request.seat_ids.into_iter().map(SeatId::from_uuid).collect(),
                payment_method_id: PaymentMethodId::from_uuid(request.payment_method_id),
                return_url: request.return_url,
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(OrderCreatedResponse {
            order_id: receipt.order.id.as_uuid(),
            status: receipt.order.status.to_string(),
            total_minor: receipt.order.total_amount.minor(),
            payment_id: receipt.payment.id.as_uuid(),
            transaction_ref: receipt.payment.transaction_ref.clone(),
            redirect_url: receipt.redirect_url,
            tickets: receipt
                .tickets
                .iter()
                .map(|t| TicketView {
                    ticket_id: t.id.as_uuid(),
                    seat_id: t.seat_id.as_uuid(),
                    price_minor: t.price.minor(),
                    status: t.status.to_string(),
                })
                .collect(),
        }),
    ))
}

/// GET /orders/{id} — the caller's own order with its tickets.
pub async fn get<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(order_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<OrderResponse>, ApiError> {
    let caller = require_identity(&state, &headers)?;
    let order_id = OrderId::from_uuid(order_id);

    let order = state
        .store
        .order(order_id)
        .await
        .map_err(BookingError::from)?
        .ok_or(ApiError::Booking(BookingError::OrderNotFound))?;
    if order.user_id != caller.user_id {
        return Err(ApiError::Booking(BookingError::NotOwner));
    }

    let tickets = state
        .store
        .tickets_for_order(order_id)
        .await
        .map_err(BookingError::from)?;

    Ok(Json(OrderResponse {
        order_id: order.id.as_uuid(),
        status: order.status.to_string(),
        total_minor: order.total_amount.minor(),
        tickets: tickets
            .iter()
            .map(|t| TicketView {
                ticket_id: t.id.as_uuid(),
                seat_id: t.seat_id.as_uuid(),
                price_minor: t.price.minor(),
                status: t.status.to_string(),
            })
            .collect(),
    }))
}

/// POST /orders/{id}/cancel — manually cancel the caller's pending order.
pub async fn cancel<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(order_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let caller = require_identity(&state, &headers)?;
    state
        .checkout
        .cancel_pending_order(caller, OrderId::from_uuid(order_id))
        .await?;
    Ok(Json(serde_json::json!({ "cancelled": true })))
}
