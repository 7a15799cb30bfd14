//! Sync trigger API and read API against the router
//!
//! Covers the concurrency contract end to end: while a background sync
//! holds the (shop, orders) lease, a second trigger answers 409.

mod common;

use axum::http::StatusCode;
use common::*;
use serde_json::json;
use std::time::Duration;

use shopbridge::platform::types::{Page, RemoteLineItem, RemoteOrder, RemoteProduct};

fn product(id: i64, title: &str) -> RemoteProduct {
    RemoteProduct {
        id,
        title: title.to_string(),
        handle: title.to_lowercase(),
        status: "active".to_string(),
        product_type: None,
        vendor: None,
        tags: None,
        updated_at: None,
    }
}

fn order(id: i64) -> RemoteOrder {
    RemoteOrder {
        id,
        order_number: Some(1000 + id),
        financial_status: Some("paid".to_string()),
        fulfillment_status: None,
        total_price: "42.00".to_string(),
        currency: "USD".to_string(),
        email: None,
        updated_at: None,
        line_items: vec![RemoteLineItem {
            id: id * 10,
            product_id: Some(1),
            variant_id: None,
            title: "line".to_string(),
            quantity: 1,
            price: "42.00".to_string(),
            sku: None,
        }],
    }
}

#[tokio::test]
async fn sync_products_end_to_end() {
    let platform = StubPlatform::new();
    platform.push_product_page(Ok(Page::with_next(
        vec![product(1, "Hat"), product(2, "Mug")],
        "cursor2",
    )));
    platform.push_product_page(Ok(Page::last(vec![product(3, "Pin")])));
    let (state, app) = spawn_app(platform);
    install_tenant(&state, "shop1.example", "tok").await;

    let response = post_json(
        &app,
        "/api/sync/products",
        &json!({"shop": "shop1.example"}).to_string(),
    )
    .await;
    let body = expect_json(response, StatusCode::ACCEPTED).await;
    assert_eq!(body["status"], "accepted");
    assert_eq!(body["resource"], "products");
    assert!(body["task_id"].is_string());

    // Background sync converges shortly.
    let mut synced = 0;
    for _ in 0..100 {
        synced = state.sync_store.products_for("shop1.example").await.unwrap().len();
        if synced == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(synced, 3);

    let body = expect_json(
        get(&app, "/api/products?shop=shop1.example").await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(body["count"], 3);
    assert_eq!(body["products"][0]["title"], "Hat");
}

#[tokio::test]
async fn read_api_without_install_is_shop_not_found() {
    let platform = StubPlatform::new();
    let (_state, app) = spawn_app(platform);

    let body = expect_json(
        get(&app, "/api/products?shop=ghost.example").await,
        StatusCode::NOT_FOUND,
    )
    .await;
    assert_eq!(body["error"], "Shop not found");

    let body = expect_json(
        post_json(
            &app,
            "/api/sync/orders",
            &json!({"shop": "ghost.example"}).to_string(),
        )
        .await,
        StatusCode::NOT_FOUND,
    )
    .await;
    assert_eq!(body["error"], "Shop not found");
}

#[tokio::test]
async fn unknown_resource_kind_is_rejected() {
    let platform = StubPlatform::new();
    let (state, app) = spawn_app(platform);
    install_tenant(&state, "shop1.example", "tok").await;

    let response = get(&app, "/api/customers?shop=shop1.example").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn concurrent_order_syncs_one_runs_one_409() {
    let platform = StubPlatform::new();
    let gate = platform.gate_order_fetches();
    platform.push_order_page(Ok(Page::last(vec![order(1)])));
    let (state, app) = spawn_app(platform);
    install_tenant(&state, "shop1.example", "tok").await;

    // First trigger: accepted, worker acquires the lease and blocks on
    // the gated fetch.
    let response = post_json(
        &app,
        "/api/sync/orders",
        &json!({"shop": "shop1.example"}).to_string(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let mut lease_held = false;
    for _ in 0..100 {
        if state
            .leases
            .is_held("shop1.example", shopbridge::ResourceKind::Orders)
        {
            lease_held = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(lease_held, "first sync never started");

    // Second trigger while the first is in flight: 409.
    let body = expect_json(
        post_json(
            &app,
            "/api/sync/orders",
            &json!({"shop": "shop1.example"}).to_string(),
        )
        .await,
        StatusCode::CONFLICT,
    )
    .await;
    assert_eq!(body["code"], "sync_in_progress");

    // A different resource kind is not blocked.
    let response = post_json(
        &app,
        "/api/sync/products",
        &json!({"shop": "shop1.example"}).to_string(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    // Release the gate; exactly one order sync completes.
    gate.notify_one();
    let mut completed = 0;
    for _ in 0..100 {
        completed = state.sync_store.orders_for("shop1.example").await.unwrap().len();
        if completed == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(completed, 1);
}

#[tokio::test]
async fn orders_read_api_embeds_line_items() {
    let platform = StubPlatform::new();
    platform.push_order_page(Ok(Page::last(vec![order(5)])));
    let (state, app) = spawn_app(platform);
    install_tenant(&state, "shop1.example", "tok").await;

    post_json(
        &app,
        "/api/sync/orders",
        &json!({"shop": "shop1.example"}).to_string(),
    )
    .await;

    let mut ready = false;
    for _ in 0..100 {
        if !state.sync_store.orders_for("shop1.example").await.unwrap().is_empty() {
            ready = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(ready);

    let body = expect_json(
        get(&app, "/api/orders?shop=shop1.example").await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["orders"][0]["order_number"], "1005");
    assert_eq!(body["orders"][0]["line_items"][0]["line_item_id"], 50);
}
