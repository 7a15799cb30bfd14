//! ShopBridge - Merchant-Platform Integration Service
//!
//! This crate connects merchant stores on a remote commerce platform to a
//! local data store: it installs tenants via OAuth, ingests signed webhook
//! notifications (including the mandated data-subject-rights topics), and
//! synchronizes catalog, order, and inventory data in the background.
//!
//! # Architecture
//!
//! ```text
//! Merchant ──▶ OAuth Controller ──▶ Credential Store
//!                                        │
//! Platform ──▶ Webhook Verifier ──▶ Compliance Handler ──▶ erasure/export
//!                   │                     │
//!                   ▼                     ▼
//!             Receipt Log          Sync Store ◀── Sync Engine ◀── work queue
//!                                                     │
//!                                              Platform API client
//! ```
//!
//! Three invariants run through everything:
//!
//! - OAuth state is a server-side, expiring, single-use nonce
//! - webhook bodies are verified (HMAC, constant time) before any parse
//!   or store access
//! - every write is an idempotent upsert keyed by (shop, remote id), so
//!   at-least-once delivery and retried syncs re-converge

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod oauth;
pub mod platform;
pub mod store;
pub mod sync;
pub mod webhook;

// Re-exports for convenience
pub use config::AppConfig;
pub use error::{Error, Result};
pub use http::{router, AppState, BackgroundWorkers};
pub use oauth::OAuthController;
pub use sync::{ResourceKind, SyncEngine};
pub use webhook::{ComplianceHandler, SignatureVerifier, WebhookTopic};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
