//! HTTP API server for the seat-claim system.
//!
//! Thin axum layer over the booking, reconciliation, and refund
//! services, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod identity;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use booking::{CheckoutOrchestrator, HoldManager, MemoryGateway, NullNotifier};
use metrics_exporter_prometheus::PrometheusHandle;
use reconcile::{MemoryConfirmation, MemoryQrIssuer, ReconciliationHandler, SignatureVerifier};
use refund::RefundWorkflow;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use identity::{BearerUuidResolver, CredentialResolver};

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store + Clone> {
    pub holds: HoldManager<S, NullNotifier>,
    pub checkout: CheckoutOrchestrator<S, MemoryGateway, NullNotifier>,
    pub reconcile: ReconciliationHandler<S, MemoryQrIssuer, MemoryConfirmation>,
    pub refunds: RefundWorkflow<S>,
    pub verifier: Option<SignatureVerifier>,
    pub resolver: Box<dyn CredentialResolver>,
    pub store: S,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/events/{id}/seats", get(routes::seats::availability::<S>))
        .route("/events/{id}/holds", post(routes::seats::create_holds::<S>))
        .route("/orders", post(routes::orders::create::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<S>))
        .route("/webhooks/transfer", post(routes::webhooks::transfer::<S>))
        .route("/webhooks/ipn", post(routes::webhooks::ipn::<S>))
        .route("/refunds", post(routes::refunds::create::<S>))
        .route("/refunds/{id}/accept", post(routes::refunds::accept::<S>))
        .route("/refunds/{id}/reject", post(routes::refunds::reject::<S>))
        .route(
            "/refunds/{id}/complete",
            post(routes::refunds::complete::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the default application state over the given store.
pub fn create_default_state<S: Store + Clone + 'static>(
    store: S,
    config: &Config,
) -> Arc<AppState<S>> {
    let holds = HoldManager::new(store.clone(), NullNotifier, config.hold_ttl());
    let checkout = CheckoutOrchestrator::new(
        store.clone(),
        MemoryGateway::new(),
        NullNotifier,
        config.pending_window(),
    );
    let reconcile =
        ReconciliationHandler::new(store.clone(), MemoryQrIssuer, MemoryConfirmation::new());
    let refunds = RefundWorkflow::new(store.clone());
    let verifier = config
        .webhook_secret
        .as_deref()
        .map(SignatureVerifier::new);

    Arc::new(AppState {
        holds,
        checkout,
        reconcile,
        refunds,
        verifier,
        resolver: Box::new(BearerUuidResolver),
        store,
    })
}
