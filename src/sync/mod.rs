//! Data synchronization engine
//!
//! Pulls paginated resource collections from the platform and upserts them
//! into the sync store, as background work decoupled from request threads:
//!
//! ```text
//! POST /api/sync/:resource --> SyncQueue --> worker pool --> SyncEngine
//!                                                |              |
//!                                        deadline + redelivery  |
//!                                                               v
//!                                      lease(shop, kind) -> page loop -> upserts
//! ```
//!
//! Invariants: at most one in-flight run per (shop, resource kind),
//! enforced by an expiring lease; upserts idempotent, so at-least-once
//! task redelivery and partial progress both re-converge.

pub mod engine;
pub mod lease;
pub mod queue;

pub use engine::{SyncEngine, SyncSummary};
pub use lease::{SyncLeaseGuard, SyncLeases};
pub use queue::{SyncQueue, SyncQueueRunner, SyncTask};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The resource collections the engine can synchronize
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// Product catalog
    Products,
    /// Orders with line items
    Orders,
    /// Inventory levels
    Inventory,
}

impl ResourceKind {
    /// All kinds, in no particular order of importance
    pub const ALL: [ResourceKind; 3] = [
        ResourceKind::Products,
        ResourceKind::Orders,
        ResourceKind::Inventory,
    ];

    /// Path segment / display name
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Products => "products",
            ResourceKind::Orders => "orders",
            ResourceKind::Inventory => "inventory",
        }
    }

    /// Parse a path segment; unknown kinds are a client error
    pub fn parse(s: &str) -> Result<Self, Error> {
        match s {
            "products" => Ok(ResourceKind::Products),
            "orders" => Ok(ResourceKind::Orders),
            "inventory" => Ok(ResourceKind::Inventory),
            other => Err(Error::InvalidPayload(format!(
                "unknown resource kind: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
