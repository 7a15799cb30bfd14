//! Durable state for installed tenants and synchronized data
//!
//! Every store is a trait seam with an in-memory implementation. The traits
//! are what the rest of the service programs against; a deployment that
//! needs cross-instance durability implements the same traits over its
//! database of choice. Keys and invariants:
//!
//! - credentials: one live access credential per shop domain
//! - attempts: single-use, expiring OAuth nonces keyed by the nonce itself
//!   (server-side, never cookie-bound)
//! - entities: products/orders/line items/inventory keyed by
//!   (shop, remote id), idempotent upserts
//! - receipts: webhook delivery log keyed by (shop, delivery id) for
//!   duplicate suppression and audit

pub mod attempts;
pub mod credentials;
pub mod entities;
pub mod receipts;

pub use attempts::{AuthAttempt, AuthAttemptStore, InMemoryAuthAttemptStore};
pub use credentials::{AccessToken, CredentialStore, InMemoryCredentialStore, TenantCredential};
pub use entities::{
    InMemorySyncStore, InventoryLevel, OrderLineItem, SyncStore, SyncedOrder, SyncedProduct,
    TenantDeletion, Upserted,
};
pub use receipts::{
    InMemoryReceiptLog, ProcessingOutcome, ReceiptLog, VerificationOutcome, WebhookReceipt,
};
