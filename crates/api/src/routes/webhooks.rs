//! Payment-provider callback endpoints.
//!
//! Both endpoints acknowledge ignored signals with success so the
//! provider stops retrying; only a failed signature check rejects.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use reconcile::{BatchReport, CallbackPayload, Outcome, TransferBatch};
use serde::Serialize;
use store::Store;

use crate::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
pub struct CallbackAck {
    pub acknowledged: bool,
    pub outcome: &'static str,
}

fn outcome_name(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Issued => "issued",
        Outcome::Cancelled => "cancelled",
        Outcome::Recorded => "recorded",
        Outcome::Ignored => "ignored",
    }
}

/// POST /webhooks/transfer — the provider's batch transfer notification.
pub async fn transfer<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(batch): Json<TransferBatch>,
) -> Json<BatchReport> {
    Json(state.reconcile.process_webhook(batch).await)
}

/// POST /webhooks/ipn — the provider's direct payment-result callback.
pub async fn ipn<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(payload): Json<CallbackPayload>,
) -> Result<Json<CallbackAck>, ApiError> {
    let outcome = state
        .reconcile
        .process_callback(&payload, state.verifier.as_ref())
        .await?;
    Ok(Json(CallbackAck {
        acknowledged: true,
        outcome: outcome_name(outcome),
    }))
}
