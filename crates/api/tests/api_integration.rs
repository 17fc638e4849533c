//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{EventId, Money, SeatId, UserId};
use domain::{PaymentMethod, SeatClaim};
use metrics_exporter_prometheus::PrometheusHandle;
use store::{MemoryStore, Store, Write};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    app: axum::Router,
    store: MemoryStore,
    event_id: EventId,
    seat_ids: Vec<SeatId>,
    method_id: uuid::Uuid,
}

async fn setup(seats: usize) -> TestApp {
    let store = MemoryStore::new();
    let config = api::config::Config::default();
    let state = api::create_default_state(store.clone(), &config);
    let app = api::create_app(state, get_metrics_handle());

    let event_id = EventId::new();
    let mut seat_ids = Vec::new();
    for _ in 0..seats {
        let seat = SeatClaim::new(event_id, SeatId::new(), "GA", Money::from_minor(2000));
        seat_ids.push(seat.seat_id);
        store.apply(vec![Write::PutSeat(seat)]).await.unwrap();
    }
    let method = PaymentMethod::new("Bank transfer", "PAY2S");
    let method_id = method.id.as_uuid();
    store
        .apply(vec![Write::PutPaymentMethod(method)])
        .await
        .unwrap();

    TestApp {
        app,
        store,
        event_id,
        seat_ids,
        method_id,
    }
}

fn bearer(user: UserId) -> String {
    format!("Bearer {}", user.as_uuid())
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let t = setup(0).await;

    let response = t
        .app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_availability_view() {
    let t = setup(2).await;

    let response = t
        .app
        .oneshot(
            Request::builder()
                .uri(format!("/events/{}/seats", t.event_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json.as_array().unwrap().len(), 2);
    assert_eq!(json[0]["state"], "available");
    assert_eq!(json[0]["price_minor"], 2000);
}

#[tokio::test]
async fn test_hold_requires_identity() {
    let t = setup(1).await;

    let response = t
        .app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/events/{}/holds", t.event_id))
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({ "seat_ids": [t.seat_ids[0].as_uuid()] }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_hold_then_conflicting_hold() {
    let t = setup(1).await;
    let alice = UserId::new();
    let bob = UserId::new();

    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/events/{}/holds", t.event_id))
                .header("content-type", "application/json")
                .header("authorization", bearer(alice))
                .body(Body::from(
                    serde_json::json!({ "seat_ids": [t.seat_ids[0].as_uuid()] }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = t
        .app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/events/{}/holds", t.event_id))
                .header("content-type", "application/json")
                .header("authorization", bearer(bob))
                .body(Body::from(
                    serde_json::json!({ "seat_ids": [t.seat_ids[0].as_uuid()] }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_checkout_and_order_view() {
    let t = setup(2).await;
    let buyer = UserId::new();

    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/orders")
                .header("content-type", "application/json")
                .header("authorization", bearer(buyer))
                .body(Body::from(
                    serde_json::json!({
                        "event_id": t.event_id.as_uuid(),
                        "seat_ids": t.seat_ids.iter().map(|s| s.as_uuid()).collect::<Vec<_>>(),
                        "payment_method_id": t.method_id,
                        "return_url": "https://shop.example/done"
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["status"], "Pending");
    assert_eq!(json["total_minor"], 4000);
    assert_eq!(json["tickets"].as_array().unwrap().len(), 2);
    let order_id = json["order_id"].as_str().unwrap().to_string();

    // The owner can read the order back.
    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/orders/{order_id}"))
                .header("authorization", bearer(buyer))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // A stranger cannot.
    let response = t
        .app
        .oneshot(
            Request::builder()
                .uri(format!("/orders/{order_id}"))
                .header("authorization", bearer(UserId::new()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_checkout_conflict_reports_seats() {
    let t = setup(1).await;

    let checkout = |user: UserId| {
        let app = t.app.clone();
        let body = serde_json::json!({
            "event_id": t.event_id.as_uuid(),
            "seat_ids": [t.seat_ids[0].as_uuid()],
            "payment_method_id": t.method_id,
            "return_url": ""
        })
        .to_string();
        async move {
            app.oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/orders")
                    .header("content-type", "application/json")
                    .header("authorization", bearer(user))
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap()
        }
    };

    assert_eq!(checkout(UserId::new()).await.status(), StatusCode::CREATED);

    let losing = checkout(UserId::new()).await;
    assert_eq!(losing.status(), StatusCode::CONFLICT);
    let json = body_json(losing).await;
    assert!(
        json["error"]
            .as_str()
            .unwrap()
            .contains(&t.seat_ids[0].to_string()),
        "conflict must name the offending seat"
    );
}

#[tokio::test]
async fn test_unknown_webhook_reference_is_acknowledged() {
    let t = setup(0).await;

    let response = t
        .app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/ipn")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({
                        "orderInfo": "EMP2SNOSUCHREFERENCE",
                        "amount": 1000,
                        "resultCode": 0
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    // The provider must see success so it stops retrying.
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["acknowledged"], true);
    assert_eq!(json["outcome"], "ignored");
}

#[tokio::test]
async fn test_transfer_webhook_settles_payment() {
    let t = setup(1).await;
    let buyer = UserId::new();

    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/orders")
                .header("content-type", "application/json")
                .header("authorization", bearer(buyer))
                .body(Body::from(
                    serde_json::json!({
                        "event_id": t.event_id.as_uuid(),
                        "seat_ids": [t.seat_ids[0].as_uuid()],
                        "payment_method_id": t.method_id,
                        "return_url": ""
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    let json = body_json(response).await;
    let reference = json["transaction_ref"].as_str().unwrap().to_string();

    let response = t
        .app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/transfer")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({
                        "transactions": [{
                            "transferType": "IN",
                            "transferAmount": 2000,
                            "content": format!("payment {reference}")
                        }]
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let report = body_json(response).await;
    assert_eq!(report["issued"], 1);

    let payment = t.store.payment_by_ref(&reference).await.unwrap().unwrap();
    assert_eq!(payment.status, domain::PaymentStatus::Success);
}
