//! Authorization-attempt store
//!
//! Holds the anti-forgery state for in-flight OAuth flows: a random nonce
//! bound to the shop domain that started the flow, with a bounded lifetime.
//! The store is keyed by the nonce itself and lives server-side, so the
//! callback can be validated without any cookie surviving the cross-site
//! redirect and by whichever instance happens to receive it.
//!
//! A nonce is single-use: `consume` atomically removes the record, so a
//! second callback presenting the same nonce finds nothing — regardless of
//! whether the first callback succeeded.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;

use crate::error::Result;

/// One in-flight OAuth authorization attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthAttempt {
    /// Random single-use nonce, also the storage key
    pub nonce: String,
    /// Shop domain this attempt is bound to
    pub shop_domain: String,
    /// When the flow started
    pub created_at: DateTime<Utc>,
    /// Hard expiry, independent of consumption
    pub expires_at: DateTime<Utc>,
}

impl AuthAttempt {
    /// Build an attempt expiring `ttl` from now
    pub fn new<N, S>(nonce: N, shop_domain: S, ttl: std::time::Duration) -> Self
    where
        N: Into<String>,
        S: Into<String>,
    {
        let now = Utc::now();
        let ttl = ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::seconds(600));
        Self {
            nonce: nonce.into(),
            shop_domain: shop_domain.into(),
            created_at: now,
            expires_at: now + ttl,
        }
    }

    /// Whether the attempt has passed its expiry
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Storage for in-flight authorization attempts
#[async_trait]
pub trait AuthAttemptStore: Send + Sync + 'static {
    /// Persist a new attempt keyed by its nonce
    async fn insert(&self, attempt: AuthAttempt) -> Result<()>;

    /// Atomically remove and return the attempt for `nonce`.
    ///
    /// Returns the record even when expired — the caller decides how to
    /// fail — but in all cases the nonce is gone afterwards.
    async fn consume(&self, nonce: &str) -> Result<Option<AuthAttempt>>;

    /// Drop every expired attempt, returning how many were removed
    async fn sweep_expired(&self) -> Result<usize>;
}

/// In-memory attempt store for single-instance deployments and tests
#[derive(Debug, Default)]
pub struct InMemoryAuthAttemptStore {
    inner: Mutex<HashMap<String, AuthAttempt>>,
}

impl InMemoryAuthAttemptStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of attempts currently held (expired ones included until swept)
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether no attempts are held
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[async_trait]
impl AuthAttemptStore for InMemoryAuthAttemptStore {
    async fn insert(&self, attempt: AuthAttempt) -> Result<()> {
        self.inner.lock().insert(attempt.nonce.clone(), attempt);
        Ok(())
    }

    async fn consume(&self, nonce: &str) -> Result<Option<AuthAttempt>> {
        Ok(self.inner.lock().remove(nonce))
    }

    async fn sweep_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let mut map = self.inner.lock();
        let before = map.len();
        map.retain(|_, attempt| !attempt.is_expired(now));
        Ok(before - map.len())
    }
}
