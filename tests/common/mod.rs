//! Shared fixtures for the integration suites: a scripted platform stub,
//! app construction over the test config, and request helpers.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Notify;
use tower::ServiceExt;

use shopbridge::config::AppConfig;
use shopbridge::error::PlatformError;
use shopbridge::http::{router, AppState};
use shopbridge::platform::types::{
    AccessTokenResponse, Page, RemoteInventoryLevel, RemoteOrder, RemoteProduct,
};
use shopbridge::platform::PlatformApi;
use shopbridge::store::{AccessToken, TenantCredential};
use shopbridge::webhook::{SignatureVerifier, DELIVERY_ID_HEADER, SHOP_DOMAIN_HEADER, SIGNATURE_HEADER};

type PageScript<T> = Mutex<VecDeque<Result<Page<T>, PlatformError>>>;

/// Scripted platform: configurable token exchange, replayed pages, and an
/// optional gate that blocks order fetches until released.
#[derive(Default)]
pub struct StubPlatform {
    pub exchange_token: Mutex<Option<String>>,
    pub registered: Mutex<Vec<(String, String)>>,
    pub product_pages: PageScript<RemoteProduct>,
    pub order_pages: PageScript<RemoteOrder>,
    pub inventory_pages: PageScript<RemoteInventoryLevel>,
    pub order_fetch_gate: Mutex<Option<Arc<Notify>>>,
}

impl StubPlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_exchange_token(&self, token: &str) {
        *self.exchange_token.lock() = Some(token.to_string());
    }

    pub fn push_product_page(&self, page: Result<Page<RemoteProduct>, PlatformError>) {
        self.product_pages.lock().push_back(page);
    }

    pub fn push_order_page(&self, page: Result<Page<RemoteOrder>, PlatformError>) {
        self.order_pages.lock().push_back(page);
    }

    /// Install a gate: the next order fetch blocks until `Notify::notify_one`
    pub fn gate_order_fetches(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.order_fetch_gate.lock() = Some(Arc::clone(&gate));
        gate
    }
}

fn pop<T>(script: &PageScript<T>) -> Result<Page<T>, PlatformError> {
    script
        .lock()
        .pop_front()
        .unwrap_or_else(|| Ok(Page::last(vec![])))
}

#[async_trait]
impl PlatformApi for StubPlatform {
    async fn exchange_code(
        &self,
        _shop: &str,
        _code: &str,
    ) -> Result<AccessTokenResponse, PlatformError> {
        match self.exchange_token.lock().clone() {
            Some(token) => Ok(AccessTokenResponse {
                access_token: token,
                scope: None,
            }),
            None => Err(PlatformError::Api {
                status: 400,
                message: "invalid authorization code".to_string(),
            }),
        }
    }

    async fn fetch_products(
        &self,
        _shop: &str,
        _token: &AccessToken,
        _page_info: Option<&str>,
    ) -> Result<Page<RemoteProduct>, PlatformError> {
        pop(&self.product_pages)
    }

    async fn fetch_orders(
        &self,
        _shop: &str,
        _token: &AccessToken,
        _page_info: Option<&str>,
    ) -> Result<Page<RemoteOrder>, PlatformError> {
        let gate = self.order_fetch_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        pop(&self.order_pages)
    }

    async fn fetch_inventory_levels(
        &self,
        _shop: &str,
        _token: &AccessToken,
        _page_info: Option<&str>,
    ) -> Result<Page<RemoteInventoryLevel>, PlatformError> {
        pop(&self.inventory_pages)
    }

    async fn register_webhook(
        &self,
        _shop: &str,
        _token: &AccessToken,
        topic: &str,
        address: &str,
    ) -> Result<(), PlatformError> {
        self.registered
            .lock()
            .push((topic.to_string(), address.to_string()));
        Ok(())
    }
}

/// Build the app over the test config with workers running
pub fn spawn_app(platform: Arc<StubPlatform>) -> (Arc<AppState>, Router) {
    let (state, workers) = AppState::new(AppConfig::test_config(), platform);
    workers.spawn();
    let app = router(Arc::clone(&state));
    (state, app)
}

/// Install a tenant credential directly, skipping the OAuth dance
pub async fn install_tenant(state: &Arc<AppState>, shop: &str, token: &str) {
    state
        .credentials
        .upsert(TenantCredential::new(shop, AccessToken::new(token)))
        .await
        .unwrap();
}

/// The signer matching `AppConfig::test_config()`'s webhook secret
pub fn test_signer() -> SignatureVerifier {
    SignatureVerifier::new("test-webhook-secret")
}

/// Send a signed webhook with explicit shop and delivery headers
pub async fn post_signed_webhook(
    app: &Router,
    path: &str,
    shop: &str,
    delivery_id: &str,
    body: &str,
) -> Response<Body> {
    let signature = test_signer().sign(body.as_bytes());
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .header(SIGNATURE_HEADER, signature)
        .header(SHOP_DOMAIN_HEADER, shop)
        .header(DELIVERY_ID_HEADER, delivery_id)
        .body(Body::from(body.to_string()))
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

/// Send a GET and return the response
pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.clone().oneshot(request).await.unwrap()
}

/// Send a JSON POST and return the response
pub async fn post_json(app: &Router, uri: &str, body: &str) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

/// Read a response body as JSON
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Assert a status and return the parsed JSON body
pub async fn expect_json(response: Response<Body>, status: StatusCode) -> Value {
    assert_eq!(response.status(), status);
    body_json(response).await
}
