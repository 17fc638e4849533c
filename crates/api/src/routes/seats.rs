//! Seat availability and hold endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use chrono::{DateTime, Utc};
use common::{EventId, SeatId};
use domain::SeatState;
use serde::{Deserialize, Serialize};
use store::Store;
use uuid::Uuid;

use crate::AppState;
use crate::error::ApiError;
use crate::routes::require_identity;

#[derive(Serialize)]
pub struct SeatView {
    pub seat_id: Uuid,
    pub category: String,
    pub price_minor: i64,
    pub state: &'static str,
    pub held_until: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
pub struct HoldRequest {
    pub seat_ids: Vec<Uuid>,
}

#[derive(Serialize)]
pub struct HoldView {
    pub hold_id: Uuid,
    pub seat_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct HoldsResponse {
    pub holds: Vec<HoldView>,
}

fn seat_state_name(state: SeatState) -> &'static str {
    match state {
        SeatState::Available => "available",
        SeatState::Held => "held",
        SeatState::Claimed => "claimed",
    }
}

/// GET /events/{id}/seats — the per-seat availability view.
pub async fn availability<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<Vec<SeatView>>, ApiError> {
    let view = state
        .holds
        .availability(EventId::from_uuid(event_id))
        .await?;
    Ok(Json(
        view.into_iter()
            .map(|seat| SeatView {
                seat_id: seat.seat_id.as_uuid(),
                category: seat.category,
                price_minor: seat.price.minor(),
                state: seat_state_name(seat.state),
                held_until: seat.held_until,
            })
            .collect(),
    ))
}

/// POST /events/{id}/holds — place holds on a seat selection.
pub async fn create_holds<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(event_id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<HoldRequest>,
) -> Result<(StatusCode, Json<HoldsResponse>), ApiError> {
    let caller = require_identity(&state, &headers)?;
    let seat_ids: Vec<SeatId> = request.seat_ids.into_iter().map(SeatId::from_uuid).collect();

    let holds = state
        .holds
        .create_holds(EventId::from_uuid(event_id), &seat_ids, caller)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(HoldsResponse {
            holds: holds
                .into_iter()
                .map(|hold| HoldView {
                    hold_id: hold.id.as_uuid(),
                    seat_id: hold.seat_id.as_uuid(),
                    expires_at: hold.expires_at,
                })
                .collect(),
        }),
    ))
}
