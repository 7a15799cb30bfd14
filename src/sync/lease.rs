//! Per-(shop, resource) sync leases
//!
//! The only exclusive resource in the service: while a lease is held, no
//! second sync for the same (shop, kind) may start. Leases expire on their
//! own, so a worker that dies mid-run cannot block future syncs — the next
//! acquire after expiry reclaims the slot. Release is tied to guard drop,
//! which also covers a task being cancelled at an await point.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::Error;
use crate::sync::ResourceKind;

#[derive(Debug, Clone)]
struct LeaseEntry {
    id: Uuid,
    expires_at: Instant,
}

/// Table of active sync leases
#[derive(Debug)]
pub struct SyncLeases {
    ttl: Duration,
    inner: Mutex<HashMap<(String, ResourceKind), LeaseEntry>>,
}

impl SyncLeases {
    /// Create a lease table with the given lease lifetime
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire the lease for (shop, kind).
    ///
    /// Fails with `ConcurrentSyncRejected` while an unexpired lease exists;
    /// an expired one is silently reclaimed.
    pub fn acquire(
        &self,
        shop_domain: &str,
        kind: ResourceKind,
    ) -> Result<SyncLeaseGuard<'_>, Error> {
        let key = (shop_domain.to_string(), kind);
        let now = Instant::now();
        let mut map = self.inner.lock();

        if let Some(entry) = map.get(&key) {
            if entry.expires_at > now {
                return Err(Error::ConcurrentSyncRejected {
                    shop: shop_domain.to_string(),
                    kind: kind.as_str().to_string(),
                });
            }
        }

        let id = Uuid::new_v4();
        map.insert(
            key.clone(),
            LeaseEntry {
                id,
                expires_at: now + self.ttl,
            },
        );

        Ok(SyncLeaseGuard {
            leases: self,
            key,
            id,
        })
    }

    /// Whether an unexpired lease is currently held for (shop, kind)
    pub fn is_held(&self, shop_domain: &str, kind: ResourceKind) -> bool {
        let key = (shop_domain.to_string(), kind);
        let now = Instant::now();
        self.inner
            .lock()
            .get(&key)
            .map(|entry| entry.expires_at > now)
            .unwrap_or(false)
    }

    /// Number of unexpired leases
    pub fn active(&self) -> usize {
        let now = Instant::now();
        self.inner
            .lock()
            .values()
            .filter(|entry| entry.expires_at > now)
            .count()
    }

    fn release(&self, key: &(String, ResourceKind), id: Uuid) {
        let mut map = self.inner.lock();
        // Only the holder may release: an expired lease that was reclaimed
        // by a newer run has a different id.
        if map.get(key).map(|entry| entry.id) == Some(id) {
            map.remove(key);
        }
    }
}

/// Holds a lease until dropped
#[derive(Debug)]
pub struct SyncLeaseGuard<'a> {
    leases: &'a SyncLeases,
    key: (String, ResourceKind),
    id: Uuid,
}

impl Drop for SyncLeaseGuard<'_> {
    fn drop(&mut self) {
        self.leases.release(&self.key, self.id);
    }
}
