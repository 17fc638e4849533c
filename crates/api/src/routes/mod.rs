//! HTTP route handlers.

pub mod health;
pub mod metrics;
pub mod orders;
pub mod refunds;
pub mod seats;
pub mod webhooks;

use axum::http::HeaderMap;
use domain::Identity;
use store::Store;

use crate::AppState;
use crate::error::ApiError;

/// Resolves the caller identity from the Authorization header.
pub(crate) fn require_identity<S: Store + Clone>(
    state: &AppState<S>,
    headers: &HeaderMap,
) -> Result<Identity, ApiError> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|credential| state.resolver.resolve(credential))
        .ok_or(ApiError::Unauthorized)
}
