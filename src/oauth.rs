//! OAuth install flow
//!
//! Drives the authorization-code exchange that turns a visiting merchant
//! into an installed tenant. The anti-forgery state is a random, single-use
//! nonce persisted server-side in the attempt store — its validity never
//! depends on a cookie surviving the cross-site redirect, and any instance
//! sharing the store can validate the callback.
//!
//! Per-tenant state machine:
//!
//! ```text
//! uninstalled --initiate--> pending(nonce) --callback--> installed
//!      ^                        |                            |
//!      +-------- expiry --------+        (re-auth loops back to pending;
//!      +------------------- shop/redact erases installed ----+
//! ```

use std::sync::Arc;

use rand::RngCore;
use tracing::{info, warn};
use url::Url;

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::platform::PlatformApi;
use crate::store::{
    AccessToken, AuthAttempt, AuthAttemptStore, CredentialStore, TenantCredential,
};
use crate::webhook::events::WebhookTopic;

/// Outcome of starting an OAuth flow
#[derive(Debug, Clone)]
pub struct AuthorizeRedirect {
    /// Where to send the merchant's browser
    pub url: String,
    /// The nonce bound to this attempt (also present in `url`)
    pub nonce: String,
}

/// Coordinates the authorization-code flow against the stores and platform
#[derive(Clone)]
pub struct OAuthController {
    config: AppConfig,
    attempts: Arc<dyn AuthAttemptStore>,
    credentials: Arc<dyn CredentialStore>,
    platform: Arc<dyn PlatformApi>,
}

impl OAuthController {
    /// Wire the controller to its collaborators
    pub fn new(
        config: AppConfig,
        attempts: Arc<dyn AuthAttemptStore>,
        credentials: Arc<dyn CredentialStore>,
        platform: Arc<dyn PlatformApi>,
    ) -> Self {
        Self {
            config,
            attempts,
            credentials,
            platform,
        }
    }

    /// Validate and normalize a shop domain supplied by a caller.
    ///
    /// Accepts `<label>` + the configured suffix, where the label is
    /// non-empty `[a-z0-9-]`. Anything else is `InvalidTenant`.
    pub fn validate_shop_domain(&self, raw: &str) -> Result<String> {
        let domain = raw.trim().to_ascii_lowercase();
        let suffix = &self.config.domain_suffix;

        let label = domain
            .strip_suffix(suffix.as_str())
            .ok_or_else(|| Error::InvalidTenant(raw.to_string()))?;

        let valid_label = !label.is_empty()
            && label
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            && !label.starts_with('-')
            && !label.ends_with('-');

        if !valid_label {
            return Err(Error::InvalidTenant(raw.to_string()));
        }
        Ok(domain)
    }

    /// Start an OAuth flow for `shop`.
    ///
    /// Persists a single-use attempt keyed by a fresh random nonce and
    /// returns the authorization redirect carrying client id, scopes,
    /// callback URL, and the nonce as `state`.
    pub async fn initiate(&self, shop: &str) -> Result<AuthorizeRedirect> {
        let shop = self.validate_shop_domain(shop)?;
        let nonce = generate_nonce();

        self.attempts
            .insert(AuthAttempt::new(
                nonce.clone(),
                shop.clone(),
                self.config.state_ttl,
            ))
            .await?;

        let mut url = Url::parse(&format!("https://{shop}/admin/oauth/authorize"))
            .map_err(|e| Error::internal(format!("authorize URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.api_key)
            .append_pair("scope", &self.config.scopes)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("state", &nonce);

        info!(shop = %shop, nonce_prefix = &nonce[..8], "oauth flow initiated");

        Ok(AuthorizeRedirect {
            url: url.into(),
            nonce,
        })
    }

    /// Complete an OAuth flow from the platform's callback redirect.
    ///
    /// The nonce is consumed exactly once, whatever happens afterwards: a
    /// second callback with the same `state` fails with `InvalidState`
    /// even if this one fails at the exchange.
    pub async fn callback(
        &self,
        shop: &str,
        state: &str,
        code: &str,
    ) -> Result<TenantCredential> {
        let shop = self.validate_shop_domain(shop)?;

        // Single-use: consume the attempt before inspecting it.
        let attempt = self
            .attempts
            .consume(state)
            .await?
            .ok_or(Error::InvalidState)?;

        if attempt.is_expired(chrono::Utc::now()) {
            warn!(shop = %shop, "oauth callback with expired state");
            return Err(Error::InvalidState);
        }
        if attempt.shop_domain != shop {
            warn!(
                shop = %shop,
                bound_shop = %attempt.shop_domain,
                "oauth callback shop does not match attempt"
            );
            return Err(Error::InvalidState);
        }

        let token_response = self
            .platform
            .exchange_code(&shop, code)
            .await
            .map_err(|e| Error::TokenExchangeFailed(e.to_string()))?;

        let credential =
            TenantCredential::new(shop.clone(), AccessToken::new(token_response.access_token));
        self.credentials.upsert(credential.clone()).await?;

        info!(shop = %shop, "tenant installed");

        self.register_compliance_webhooks(&shop, &credential.access_token)
            .await;

        Ok(credential)
    }

    /// Register the three mandated compliance topics for a fresh install.
    ///
    /// Registration is idempotent on the platform side; a single topic
    /// failing must not fail the install, so errors are logged and the
    /// loop continues.
    async fn register_compliance_webhooks(&self, shop: &str, token: &AccessToken) {
        for topic in WebhookTopic::COMPLIANCE {
            let address = match self.webhook_address(topic) {
                Ok(address) => address,
                Err(err) => {
                    warn!(topic = %topic, error = %err, "could not build webhook address");
                    continue;
                }
            };
            if let Err(err) = self
                .platform
                .register_webhook(shop, token, topic.as_str(), &address)
                .await
            {
                warn!(shop = %shop, topic = %topic, error = %err, "webhook registration failed");
            }
        }
    }

    /// Public delivery address for `topic`, derived from the callback URL
    fn webhook_address(&self, topic: WebhookTopic) -> Result<String> {
        let mut url = Url::parse(&self.config.redirect_uri)
            .map_err(|e| Error::internal(format!("redirect URI: {e}")))?;
        url.set_path(&format!("/webhooks/{}", topic.as_str()));
        url.set_query(None);
        Ok(url.into())
    }
}

/// 128-bit random nonce, hex-encoded
fn generate_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
