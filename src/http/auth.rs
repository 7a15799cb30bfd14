//! OAuth HTTP handlers
//!
//! `GET /auth` starts the flow with a 302 to the platform's authorization
//! endpoint; `GET /auth/callback` completes it. Failures surface as the
//! error taxonomy's JSON bodies — the raw exchange error never reaches
//! the merchant's browser.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse};
use serde::Deserialize;
use tracing::instrument;

use crate::error::{Error, Result};
use crate::http::AppState;

/// 302 Found — the redirect status the platform's OAuth dance expects
fn found(location: String) -> impl IntoResponse {
    (StatusCode::FOUND, [(header::LOCATION, location)])
}

/// Query parameters for `GET /auth`
#[derive(Debug, Deserialize)]
pub struct BeginAuthQuery {
    /// Shop domain asking to install; `tenant` is accepted as an alias
    #[serde(alias = "tenant")]
    pub shop: Option<String>,
}

/// Query parameters for `GET /auth/callback`
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    /// Authorization code to exchange
    pub code: Option<String>,
    /// Shop domain the platform says is authorizing
    pub shop: Option<String>,
    /// Anti-forgery nonce issued at initiation
    pub state: Option<String>,
}

/// Query parameters for `GET /installed`
#[derive(Debug, Deserialize)]
pub struct InstalledQuery {
    /// Freshly installed shop domain
    pub shop: Option<String>,
}

/// `GET /auth?shop=` — 302 to the platform authorization endpoint
#[instrument(skip_all)]
pub async fn begin_auth(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BeginAuthQuery>,
) -> Result<impl IntoResponse> {
    let shop = query
        .shop
        .ok_or_else(|| Error::InvalidPayload("shop parameter is required".to_string()))?;

    let redirect = state.oauth.initiate(&shop).await?;
    Ok(found(redirect.url))
}

/// `GET /auth/callback?code=&shop=&state=` — complete the exchange
#[instrument(skip_all)]
pub async fn auth_callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
) -> Result<impl IntoResponse> {
    // A missing state is indistinguishable from a forged callback.
    let nonce = query.state.ok_or(Error::InvalidState)?;
    let shop = query
        .shop
        .ok_or_else(|| Error::InvalidPayload("shop parameter is required".to_string()))?;
    let code = query
        .code
        .ok_or_else(|| Error::InvalidPayload("code parameter is required".to_string()))?;

    let credential = state.oauth.callback(&shop, &nonce, &code).await?;
    state.metrics.record_install();

    Ok(found(format!("/installed?shop={}", credential.shop_domain)))
}

/// `GET /installed` — human-readable success page.
///
/// Deliberately never echoes the access token.
#[instrument(skip_all)]
pub async fn installed_page(Query(query): Query<InstalledQuery>) -> impl IntoResponse {
    let shop = query.shop.unwrap_or_else(|| "your shop".to_string());
    Html(format!(
        "<!doctype html>\n<html><head><title>Installed</title></head>\
         <body><h1>Installation complete</h1>\
         <p>{shop} is now connected. You can close this window.</p></body></html>"
    ))
}
