pub mod utils;

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;
use sqlx::PgPool;
use utils::{create_memory_test_app, create_memory_test_app_with_config, create_test_app, create_test_config};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::api::models::notifications::{IdempotencyKeyResponse, NotificationResponse};
use crate::db::handlers::Customers;
use crate::seed_customers;
use crate::store::InMemoryStore;

async fn wait_until_delivered(app: &axum_test::TestServer, key: uuid::Uuid) {
    for _ in 0..100 {
        let notification: NotificationResponse = app.get(&format!("/notifications/{key}")).await.json();
        if notification.delivered {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("notification {key} was never delivered");
}

async fn wait_for_requests(server: &MockServer, count: usize) {
    for _ in 0..100 {
        if server.received_requests().await.unwrap_or_default().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("mock server never received {count} requests");
}

/// Configure a webhook, report a payment, and watch the notification go from pending to
/// delivered.
#[sqlx::test]
#[test_log::test]
async fn test_e2e_payment_notification(pool: PgPool) {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(header("authorization", "Bearer abc"))
        .and(body_partial_json(json!({
            "token": "abc",
            "details": {
                "reference_id": "ref1",
                "amount": 100.0,
                "currency": "SGD",
                "channel_code": "card",
                "market": "SG"
            }
        })))
        // Hold the response so the pending state is observable
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(300)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (app, bg_services) = create_test_app(pool.clone()).await;

    app.post("/notifications")
        .add_header("authorization", "Bearer abc")
        .json(&json!({
            "is_test": false,
            "secret_key": "",
            "customer_id": 1,
            "url": format!("{}/hook", mock_server.uri())
        }))
        .await
        .assert_status(StatusCode::CREATED);

    let response = app
        .post("/payments")
        .json(&json!({
            "customer_id": 1,
            "details": {
                "reference_id": "ref1",
                "amount": 100.0,
                "currency": "SGD",
                "channel_code": "card",
                "market": "SG"
            }
        }))
        .await;
    response.assert_status(StatusCode::ACCEPTED);
    let key = response.json::<IdempotencyKeyResponse>().idempotency_key;

    let pending: NotificationResponse = app.get(&format!("/notifications/{key}")).await.json();
    assert_eq!(pending.customer_id, 1);
    assert_eq!(pending.details.reference_id, "ref1");
    assert!(!pending.delivered);

    wait_until_delivered(&app, key).await;

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notifications")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);

    bg_services.shutdown().await;
}

/// A notification whose delivery was exhausted stays pending until a resend succeeds.
#[sqlx::test]
#[test_log::test]
async fn test_e2e_resend_after_exhausted_delivery(pool: PgPool) {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let (app, bg_services) = create_test_app(pool).await;

    app.post("/notifications")
        .json(&json!({
            "customer_id": 2,
            "url": mock_server.uri(),
            "token": "def"
        }))
        .await
        .assert_status(StatusCode::CREATED);

    let key = app
        .post("/payments")
        .json(&json!({
            "customer_id": 2,
            "details": {
                "reference_id": "ref2",
                "amount": 12.5,
                "currency": "SGD",
                "channel_code": "paynow",
                "market": "SG"
            }
        }))
        .await
        .json::<IdempotencyKeyResponse>()
        .idempotency_key;

    // All five attempts fail
    wait_for_requests(&mock_server, 5).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 5);
    let pending: NotificationResponse = app.get(&format!("/notifications/{key}")).await.json();
    assert!(!pending.delivered);

    // Endpoint recovers
    mock_server.reset().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"idempotency_key": key.to_string()})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    app.post("/notifications/resend")
        .json(&json!({
            "customer_id": 2,
            "token": "def",
            "secret_key": "",
            "idempotency_key": key
        }))
        .await
        .assert_status(StatusCode::ACCEPTED);

    wait_until_delivered(&app, key).await;

    bg_services.shutdown().await;
}

#[sqlx::test]
#[test_log::test]
async fn test_payment_for_unconfigured_seeded_customer(pool: PgPool) {
    let (app, bg_services) = create_test_app(pool.clone()).await;

    app.post("/payments")
        .json(&json!({
            "customer_id": 1,
            "details": {
                "reference_id": "ref1",
                "amount": 1.0,
                "currency": "SGD",
                "channel_code": "card",
                "market": "SG"
            }
        }))
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notifications")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);

    bg_services.shutdown().await;
}

#[sqlx::test]
#[test_log::test]
async fn test_seed_customers_only_seeds_empty_table(pool: PgPool) {
    seed_customers(&pool, 3).await.unwrap();
    seed_customers(&pool, 5).await.unwrap();

    let mut conn = pool.acquire().await.unwrap();
    let mut customers = Customers::new(&mut conn);
    assert_eq!(customers.count().await.unwrap(), 3);

    let first = customers.get_by_id(1).await.unwrap().unwrap();
    assert_eq!(first.name, "customer 0");
    assert!(first.notification_url.is_none());
}

#[tokio::test]
async fn test_healthz() {
    let (app, bg_services) = create_memory_test_app(std::sync::Arc::new(InMemoryStore::new()));

    let response = app.get("/healthz").await;
    response.assert_status_ok();
    response.assert_text("OK");

    bg_services.shutdown().await;
}

// The Prometheus recorder is process-global, so this is the only test that enables it
#[tokio::test]
async fn test_metrics_endpoint() {
    let mut config = create_test_config();
    config.enable_metrics = true;
    let (app, bg_services) = create_memory_test_app_with_config(std::sync::Arc::new(InMemoryStore::new()), config);

    app.get("/healthz").await.assert_status_ok();

    let response = app.get("/internal/metrics").await;
    response.assert_status_ok();
    assert!(response.text().contains("axum_http_requests_total"));

    bg_services.shutdown().await;
}
