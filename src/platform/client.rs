//! HTTP client for the platform Admin API
//!
//! Three concerns live here and nowhere else:
//!
//! - URL construction from the shop domain and configured API version
//! - cursor pagination via the `Link` response header (`page_info`)
//! - error classification, so the sync engine can tell "back off and
//!   retry" (429 with a `Retry-After` hint, 5xx, network) from "stop"
//!   (4xx)
//!
//! The token exchange authenticates with the OAuth client id and client
//! secret; Admin API calls authenticate with the tenant's access token.
//! The webhook signing secret is never used here.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, LINK, RETRY_AFTER};
use reqwest::{Response, StatusCode};
use serde_json::json;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::error::PlatformError;
use crate::platform::types::{
    AccessTokenResponse, InventoryEnvelope, OrdersEnvelope, Page, ProductsEnvelope,
    RemoteInventoryLevel, RemoteOrder, RemoteProduct,
};
use crate::store::AccessToken;

/// Header carrying the tenant credential on Admin API requests
const ACCESS_TOKEN_HEADER: &str = "X-Shopify-Access-Token";

/// Fallback backoff when a 429 arrives without a usable `Retry-After`
const DEFAULT_RETRY_AFTER_SECS: u64 = 2;

/// Operations the service needs from the remote platform
#[async_trait]
pub trait PlatformApi: Send + Sync + 'static {
    /// Exchange an authorization code for an access token
    async fn exchange_code(
        &self,
        shop_domain: &str,
        code: &str,
    ) -> Result<AccessTokenResponse, PlatformError>;

    /// Fetch one page of products; `page_info` of `None` means the first page
    async fn fetch_products(
        &self,
        shop_domain: &str,
        token: &AccessToken,
        page_info: Option<&str>,
    ) -> Result<Page<RemoteProduct>, PlatformError>;

    /// Fetch one page of orders (any status)
    async fn fetch_orders(
        &self,
        shop_domain: &str,
        token: &AccessToken,
        page_info: Option<&str>,
    ) -> Result<Page<RemoteOrder>, PlatformError>;

    /// Fetch one page of inventory levels
    async fn fetch_inventory_levels(
        &self,
        shop_domain: &str,
        token: &AccessToken,
        page_info: Option<&str>,
    ) -> Result<Page<RemoteInventoryLevel>, PlatformError>;

    /// Register a webhook subscription for `topic` delivering to `address`.
    ///
    /// Idempotent: registering an already-registered (topic, address) pair
    /// succeeds without creating a duplicate.
    async fn register_webhook(
        &self,
        shop_domain: &str,
        token: &AccessToken,
        topic: &str,
        address: &str,
    ) -> Result<(), PlatformError>;
}

/// `PlatformApi` over HTTPS via reqwest
#[derive(Debug, Clone)]
pub struct HttpPlatformClient {
    http: reqwest::Client,
    config: AppConfig,
}

impl HttpPlatformClient {
    /// Build a client with the configured per-request timeout
    pub fn new(config: AppConfig) -> Result<Self, PlatformError> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(PlatformError::from)?;
        Ok(Self { http, config })
    }

    fn token_url(&self, shop_domain: &str) -> String {
        format!("https://{shop_domain}/admin/oauth/access_token")
    }

    fn admin_url(&self, shop_domain: &str, resource: &str) -> String {
        format!(
            "https://{shop_domain}/admin/api/{}/{resource}.json",
            self.config.api_version
        )
    }

    /// Fetch one page of `resource`, deserializing the envelope with
    /// `unwrap_envelope`, and carry the next cursor out of the Link header.
    async fn fetch_page<T, E, F>(
        &self,
        shop_domain: &str,
        token: &AccessToken,
        resource: &str,
        extra_params: &[(&str, &str)],
        page_info: Option<&str>,
        unwrap_envelope: F,
    ) -> Result<Page<T>, PlatformError>
    where
        E: serde::de::DeserializeOwned,
        F: FnOnce(E) -> Vec<T>,
    {
        let limit = self.config.page_size.to_string();
        let mut params: Vec<(&str, &str)> = vec![("limit", limit.as_str())];
        match page_info {
            // A page_info cursor cannot be combined with filter params.
            Some(cursor) => params.push(("page_info", cursor)),
            None => params.extend_from_slice(extra_params),
        }

        let response = self
            .http
            .get(self.admin_url(shop_domain, resource))
            .header(ACCESS_TOKEN_HEADER, token.expose())
            .query(&params)
            .send()
            .await
            .map_err(PlatformError::from)?;

        let response = check_status(response).await?;
        let next = next_page_info(response.headers());
        let envelope: E = response
            .json()
            .await
            .map_err(|e| PlatformError::MalformedResponse(e.to_string()))?;

        Ok(Page {
            items: unwrap_envelope(envelope),
            next_page_info: next,
        })
    }
}

#[async_trait]
impl PlatformApi for HttpPlatformClient {
    async fn exchange_code(
        &self,
        shop_domain: &str,
        code: &str,
    ) -> Result<AccessTokenResponse, PlatformError> {
        debug!(shop = %shop_domain, "exchanging authorization code");
        let response = self
            .http
            .post(self.token_url(shop_domain))
            .json(&json!({
                "client_id": self.config.api_key,
                "client_secret": self.config.api_secret,
                "code": code,
            }))
            .send()
            .await
            .map_err(PlatformError::from)?;

        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| PlatformError::MalformedResponse(e.to_string()))
    }

    async fn fetch_products(
        &self,
        shop_domain: &str,
        token: &AccessToken,
        page_info: Option<&str>,
    ) -> Result<Page<RemoteProduct>, PlatformError> {
        self.fetch_page(shop_domain, token, "products", &[], page_info, |e: ProductsEnvelope| {
            e.products
        })
        .await
    }

    async fn fetch_orders(
        &self,
        shop_domain: &str,
        token: &AccessToken,
        page_info: Option<&str>,
    ) -> Result<Page<RemoteOrder>, PlatformError> {
        self.fetch_page(
            shop_domain,
            token,
            "orders",
            &[("status", "any")],
            page_info,
            |e: OrdersEnvelope| e.orders,
        )
        .await
    }

    async fn fetch_inventory_levels(
        &self,
        shop_domain: &str,
        token: &AccessToken,
        page_info: Option<&str>,
    ) -> Result<Page<RemoteInventoryLevel>, PlatformError> {
        self.fetch_page(
            shop_domain,
            token,
            "inventory_levels",
            &[],
            page_info,
            |e: InventoryEnvelope| e.inventory_levels,
        )
        .await
    }

    async fn register_webhook(
        &self,
        shop_domain: &str,
        token: &AccessToken,
        topic: &str,
        address: &str,
    ) -> Result<(), PlatformError> {
        let response = self
            .http
            .post(self.admin_url(shop_domain, "webhooks"))
            .header(ACCESS_TOKEN_HEADER, token.expose())
            .json(&json!({
                "webhook": {
                    "topic": topic,
                    "address": address,
                    "format": "json",
                }
            }))
            .send()
            .await
            .map_err(PlatformError::from)?;

        // 422 means the (topic, address) pair already exists.
        if response.status() == StatusCode::UNPROCESSABLE_ENTITY {
            debug!(shop = %shop_domain, topic, "webhook already registered");
            return Ok(());
        }

        check_status(response).await?;
        Ok(())
    }
}

/// Map a non-success response to the retryability taxonomy
async fn check_status(response: Response) -> Result<Response, PlatformError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = retry_after_secs(response.headers());
        warn!(retry_after_secs, "platform throttled the request");
        return Err(PlatformError::RateLimited { retry_after_secs });
    }

    let message = response.text().await.unwrap_or_default();
    if status.is_server_error() {
        return Err(PlatformError::Transient(format!("status {status}: {message}")));
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(PlatformError::Unauthorized(status.as_u16()));
    }
    Err(PlatformError::Api {
        status: status.as_u16(),
        message,
    })
}

/// Parse the `Retry-After` header (delta-seconds form)
fn retry_after_secs(headers: &HeaderMap) -> u64 {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .map(|secs| secs.ceil().max(1.0) as u64)
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
}

/// Extract the `page_info` cursor from a `Link` header's `rel="next"` entry.
///
/// The platform sends e.g.:
/// `<https://shop/admin/api/2023-10/products.json?page_info=abc&limit=250>; rel="next"`
fn next_page_info(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(LINK)?.to_str().ok()?;
    for entry in link.split(',') {
        let entry = entry.trim();
        if !entry.contains("rel=\"next\"") {
            continue;
        }
        let url_part = entry.split(';').next()?.trim();
        let raw_url = url_part.strip_prefix('<')?.strip_suffix('>')?;
        let parsed = url::Url::parse(raw_url).ok()?;
        return parsed
            .query_pairs()
            .find(|(k, _)| k == "page_info")
            .map(|(_, v)| v.into_owned());
    }
    None
}
