//! Webhook ingestion: verification, dispatch, compliance
//!
//! This module implements the inbound half of the platform integration:
//!
//! - **Signature Verification**: HMAC-SHA256 over the raw request body,
//!   constant-time comparison against the signature header
//! - **Topic Dispatch**: a closed set of topics with an explicit `Unknown`
//!   case — no silent fallthrough
//! - **Compliance Handling**: the three mandated data-subject-rights
//!   topics, each idempotent under the platform's at-least-once redelivery
//! - **Async Processing**: ordinary catalog/order events acknowledged
//!   immediately and applied on a background task
//!
//! ```text
//! Request -> Signature Verify -> Receipt Dedup -> Dispatch
//!                 |                    |             |
//!                 v                    v             +-> compliance (inline, 200/5xx)
//!             401 + audit        200 (duplicate)     +-> ordinary (queued, 200)
//!                                                    +-> unknown (acknowledged, logged)
//! ```

pub mod compliance;
pub mod events;
pub mod processor;
pub mod signature;

pub use compliance::{ComplianceHandler, CustomerDataExport, ExportSink, LoggingExportSink};
pub use events::{
    CustomerRedactPayload, CustomerRef, DataRequestPayload, ShopRedactPayload, WebhookTopic,
};
pub use processor::{OrdinaryEvent, ProcessorHandle, WebhookProcessor};
pub use signature::SignatureVerifier;

/// Header carrying the platform-computed HMAC signature
pub const SIGNATURE_HEADER: &str = "X-Shopify-Hmac-Sha256";

/// Header naming the shop a delivery belongs to
pub const SHOP_DOMAIN_HEADER: &str = "X-Shopify-Shop-Domain";

/// Header carrying the platform's unique delivery id
pub const DELIVERY_ID_HEADER: &str = "X-Shopify-Webhook-Id";
