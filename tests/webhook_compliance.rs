//! Webhook verification and compliance flows against the router
//!
//! The contract under test: signature failures are 401 and touch nothing,
//! duplicate deliveries are suppressed, shop/redact erases every trace of
//! a tenant, and ordinary events apply in the background.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chrono::Utc;
use common::*;
use serde_json::json;
use std::time::Duration;
use tower::ServiceExt;

use shopbridge::store::{OrderLineItem, SyncedOrder, SyncedProduct};
use shopbridge::webhook::{SHOP_DOMAIN_HEADER, SIGNATURE_HEADER};

async fn seed_synced_data(state: &std::sync::Arc<shopbridge::http::AppState>, shop: &str) {
    for id in 1..=3 {
        state
            .sync_store
            .upsert_product(SyncedProduct {
                shop_domain: shop.to_string(),
                product_id: id,
                title: format!("P{id}"),
                handle: format!("p{id}"),
                status: "active".to_string(),
                product_type: None,
                vendor: None,
                tags: None,
                remote_updated_at: None,
                last_synced: Utc::now(),
            })
            .await
            .unwrap();
    }
    for id in [1001, 1002] {
        state
            .sync_store
            .upsert_order(
                SyncedOrder {
                    shop_domain: shop.to_string(),
                    order_id: id,
                    order_number: format!("#{id}"),
                    financial_status: Some("paid".to_string()),
                    fulfillment_status: None,
                    total_price: "15.00".to_string(),
                    currency: "USD".to_string(),
                    customer_email: Some("c@example.com".to_string()),
                    remote_updated_at: None,
                    last_synced: Utc::now(),
                },
                vec![OrderLineItem {
                    shop_domain: shop.to_string(),
                    order_id: id,
                    line_item_id: id * 10,
                    product_id: Some(1),
                    variant_id: None,
                    title: "item".to_string(),
                    quantity: 1,
                    price: "15.00".to_string(),
                    sku: None,
                }],
            )
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn shop_redact_erases_tenant_completely() {
    let platform = StubPlatform::new();
    let (state, app) = spawn_app(platform);
    install_tenant(&state, "shop1.example", "tok").await;
    seed_synced_data(&state, "shop1.example").await;

    let body = json!({"shop_domain": "shop1.example"}).to_string();
    let response =
        post_signed_webhook(&app, "/webhooks/shop/redact", "shop1.example", "d-redact-1", &body)
            .await;
    let response_body = expect_json(response, StatusCode::OK).await;
    assert_eq!(response_body["status"], "success");

    assert!(state.sync_store.products_for("shop1.example").await.unwrap().is_empty());
    assert!(state.sync_store.orders_for("shop1.example").await.unwrap().is_empty());
    assert!(state
        .sync_store
        .line_items_for("shop1.example", 1001)
        .await
        .unwrap()
        .is_empty());
    assert!(state.credentials.get("shop1.example").await.unwrap().is_none());
    // Receipt log was purged too (including this delivery's own receipt).
    assert!(state.receipts.receipts_for("shop1.example").await.unwrap().is_empty());

    // Redelivery with a fresh delivery id: no-op success, not an error.
    let response =
        post_signed_webhook(&app, "/webhooks/shop/redact", "shop1.example", "d-redact-2", &body)
            .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn invalid_signature_is_401_and_touches_nothing() {
    let platform = StubPlatform::new();
    let (state, app) = spawn_app(platform);
    install_tenant(&state, "shop1.example", "tok").await;
    seed_synced_data(&state, "shop1.example").await;

    let body = json!({"shop_domain": "shop1.example"}).to_string();
    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/shop/redact")
        .header(header::CONTENT_TYPE, "application/json")
        .header(SIGNATURE_HEADER, "AAAAinvalidAAAA")
        .header(SHOP_DOMAIN_HEADER, "shop1.example")
        .body(Body::from(body))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();

    let response_body = expect_json(response, StatusCode::UNAUTHORIZED).await;
    assert_eq!(response_body["error"], "Invalid signature");

    // Nothing was deleted and the credential survives.
    assert_eq!(state.sync_store.products_for("shop1.example").await.unwrap().len(), 3);
    assert!(state.credentials.get("shop1.example").await.unwrap().is_some());
    assert_eq!(state.metrics.webhooks_rejected(), 1);
}

#[tokio::test]
async fn missing_signature_header_is_401() {
    let platform = StubPlatform::new();
    let (_state, app) = spawn_app(platform);

    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/orders/create")
        .header(header::CONTENT_TYPE, "application/json")
        .header(SHOP_DOMAIN_HEADER, "shop1.example")
        .body(Body::from(r#"{"id":1}"#))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();

    let body = expect_json(response, StatusCode::UNAUTHORIZED).await;
    assert_eq!(body["error"], "Invalid signature");
}

#[tokio::test]
async fn duplicate_delivery_is_suppressed() {
    let platform = StubPlatform::new();
    let (state, app) = spawn_app(platform);
    install_tenant(&state, "shop1.example", "tok").await;

    let body = json!({"id": 7, "title": "Widget", "handle": "widget"}).to_string();
    let first =
        post_signed_webhook(&app, "/webhooks/products/create", "shop1.example", "dup-1", &body)
            .await;
    assert_eq!(first.status(), StatusCode::OK);

    let second =
        post_signed_webhook(&app, "/webhooks/products/create", "shop1.example", "dup-1", &body)
            .await;
    let second_body = expect_json(second, StatusCode::OK).await;
    assert_eq!(second_body["status"], "duplicate");
    assert_eq!(state.metrics.webhooks_duplicate(), 1);
}

#[tokio::test]
async fn customer_redact_removes_named_orders() {
    let platform = StubPlatform::new();
    let (state, app) = spawn_app(platform);
    install_tenant(&state, "shop1.example", "tok").await;
    seed_synced_data(&state, "shop1.example").await;

    let body = json!({
        "shop_domain": "shop1.example",
        "customer": {"id": 42, "email": "c@example.com"},
        "orders_to_redact": [1001]
    })
    .to_string();
    let response =
        post_signed_webhook(&app, "/webhooks/customers/redact", "shop1.example", "cr-1", &body)
            .await;
    assert_eq!(response.status(), StatusCode::OK);

    let orders = state.sync_store.orders_for("shop1.example").await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].order_id, 1002);
    assert_eq!(orders[0].customer_email, None);
}

#[tokio::test]
async fn data_request_acknowledges_quickly() {
    let platform = StubPlatform::new();
    let (state, app) = spawn_app(platform);
    install_tenant(&state, "shop1.example", "tok").await;
    seed_synced_data(&state, "shop1.example").await;

    let body = json!({
        "shop_domain": "shop1.example",
        "customer": {"id": 42, "email": "c@example.com"}
    })
    .to_string();
    let response = post_signed_webhook(
        &app,
        "/webhooks/customers/data_request",
        "shop1.example",
        "dr-1",
        &body,
    )
    .await;
    let response_body = expect_json(response, StatusCode::OK).await;
    assert_eq!(response_body["status"], "success");

    // The delivery is durably recorded.
    let receipts = state.receipts.receipts_for("shop1.example").await.unwrap();
    assert!(receipts.iter().any(|r| r.delivery_id == "dr-1"));
}

#[tokio::test]
async fn ordinary_product_webhook_applies_in_background() {
    let platform = StubPlatform::new();
    let (state, app) = spawn_app(platform);
    install_tenant(&state, "shop1.example", "tok").await;

    let body = json!({"id": 99, "title": "Hat", "handle": "hat"}).to_string();
    let response =
        post_signed_webhook(&app, "/webhooks/products/create", "shop1.example", "pc-1", &body)
            .await;
    assert_eq!(response.status(), StatusCode::OK);

    // Applied asynchronously; poll briefly.
    let mut found = false;
    for _ in 0..50 {
        if !state.sync_store.products_for("shop1.example").await.unwrap().is_empty() {
            found = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(found, "product webhook was not applied");
}

#[tokio::test]
async fn unknown_topic_is_acknowledged_not_processed() {
    let platform = StubPlatform::new();
    let (state, app) = spawn_app(platform);

    let body = json!({"id": 5}).to_string();
    let response =
        post_signed_webhook(&app, "/webhooks/carts/update", "shop1.example", "ct-1", &body).await;
    let response_body = expect_json(response, StatusCode::OK).await;
    assert_eq!(response_body["status"], "ignored");

    let receipts = state.receipts.receipts_for("shop1.example").await.unwrap();
    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts[0].topic, "carts/update");
}
