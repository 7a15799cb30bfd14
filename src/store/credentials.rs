//! Tenant credential store
//!
//! One record per installed shop: the domain plus the opaque access
//! credential obtained from the OAuth exchange. A fresh OAuth completion
//! overwrites the prior credential (re-authentication); only the
//! shop-redact compliance flow deletes it.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::error::Result;

/// Opaque platform access token.
///
/// Wrapped so the secret never appears in `Debug` output or log fields.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wrap a raw token string
    pub fn new<S: Into<String>>(token: S) -> Self {
        Self(token.into())
    }

    /// Borrow the raw secret for an outbound request header
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// An installed tenant: shop identity plus its live credential
#[derive(Debug, Clone)]
pub struct TenantCredential {
    /// Unique shop domain, lowercase
    pub shop_domain: String,
    /// Access credential for Admin API calls on the shop's behalf
    pub access_token: AccessToken,
    /// First successful install
    pub installed_at: DateTime<Utc>,
    /// Most recent token refresh (re-auth)
    pub updated_at: DateTime<Utc>,
}

impl TenantCredential {
    /// Build a credential installed right now
    pub fn new<S: Into<String>>(shop_domain: S, access_token: AccessToken) -> Self {
        let now = Utc::now();
        Self {
            shop_domain: shop_domain.into(),
            access_token,
            installed_at: now,
            updated_at: now,
        }
    }
}

/// Storage for installed-tenant credentials
#[async_trait]
pub trait CredentialStore: Send + Sync + 'static {
    /// Insert or overwrite the credential for a shop domain.
    ///
    /// On overwrite the original `installed_at` is preserved and
    /// `updated_at` is bumped.
    async fn upsert(&self, credential: TenantCredential) -> Result<()>;

    /// Fetch the live credential for a shop, if installed
    async fn get(&self, shop_domain: &str) -> Result<Option<TenantCredential>>;

    /// Remove a shop's credential. Returns whether one existed.
    async fn delete(&self, shop_domain: &str) -> Result<bool>;

    /// All installed shop domains
    async fn installed_domains(&self) -> Result<Vec<String>>;
}

/// In-memory credential store for single-instance deployments and tests
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    inner: RwLock<HashMap<String, TenantCredential>>,
}

impl InMemoryCredentialStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn upsert(&self, mut credential: TenantCredential) -> Result<()> {
        let mut map = self.inner.write();
        if let Some(existing) = map.get(&credential.shop_domain) {
            credential.installed_at = existing.installed_at;
            credential.updated_at = Utc::now();
        }
        map.insert(credential.shop_domain.clone(), credential);
        Ok(())
    }

    async fn get(&self, shop_domain: &str) -> Result<Option<TenantCredential>> {
        Ok(self.inner.read().get(shop_domain).cloned())
    }

    async fn delete(&self, shop_domain: &str) -> Result<bool> {
        Ok(self.inner.write().remove(shop_domain).is_some())
    }

    async fn installed_domains(&self) -> Result<Vec<String>> {
        let mut domains: Vec<String> = self.inner.read().keys().cloned().collect();
        domains.sort();
        Ok(domains)
    }
}
