//! Webhook receipt log
//!
//! One record per inbound delivery attempt, keyed by (shop, delivery id).
//! The platform delivers at-least-once; recording the delivery id first and
//! refusing to record it twice is what keeps redeliveries from being
//! processed twice. Receipts also serve as the audit trail for signature
//! rejections.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Signature-verification outcome for a delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationOutcome {
    /// HMAC matched
    Accepted,
    /// HMAC missing or mismatched
    Rejected,
}

/// Processing outcome for a delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingOutcome {
    /// Accepted and queued or running
    Pending,
    /// Handler completed
    Succeeded,
    /// Handler failed; the platform will redeliver
    Failed,
    /// Same delivery id seen before; skipped
    Duplicate,
    /// Topic outside the dispatch set; acknowledged and dropped
    Ignored,
}

/// One inbound webhook delivery attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookReceipt {
    /// Shop the delivery was attributed to
    pub shop_domain: String,
    /// Platform delivery id, or a derived hash when the header is absent
    pub delivery_id: String,
    /// Topic string, e.g. `orders/create`
    pub topic: String,
    /// Signature verification result
    pub verification: VerificationOutcome,
    /// Processing result, updated as the handler runs
    pub processing: ProcessingOutcome,
    /// Handler error message, when processing failed
    pub error: Option<String>,
    /// Arrival time
    pub received_at: DateTime<Utc>,
}

impl WebhookReceipt {
    /// Build an accepted, pending receipt
    pub fn accepted<S: Into<String>, D: Into<String>, T: Into<String>>(
        shop_domain: S,
        delivery_id: D,
        topic: T,
    ) -> Self {
        Self {
            shop_domain: shop_domain.into(),
            delivery_id: delivery_id.into(),
            topic: topic.into(),
            verification: VerificationOutcome::Accepted,
            processing: ProcessingOutcome::Pending,
            error: None,
            received_at: Utc::now(),
        }
    }

    /// Build a rejected receipt for the audit trail
    pub fn rejected<S: Into<String>, D: Into<String>, T: Into<String>>(
        shop_domain: S,
        delivery_id: D,
        topic: T,
    ) -> Self {
        Self {
            verification: VerificationOutcome::Rejected,
            processing: ProcessingOutcome::Ignored,
            ..Self::accepted(shop_domain, delivery_id, topic)
        }
    }
}

/// Storage for the webhook receipt log
#[async_trait]
pub trait ReceiptLog: Send + Sync + 'static {
    /// Record a delivery. Returns `false` (and stores nothing) when a
    /// receipt with the same (shop, delivery id) already exists — the
    /// duplicate-suppression primitive.
    async fn record(&self, receipt: WebhookReceipt) -> Result<bool>;

    /// Update the processing outcome for a recorded delivery
    async fn set_processing(
        &self,
        shop_domain: &str,
        delivery_id: &str,
        outcome: ProcessingOutcome,
        error: Option<String>,
    ) -> Result<()>;

    /// All receipts for a shop, newest first
    async fn receipts_for(&self, shop_domain: &str) -> Result<Vec<WebhookReceipt>>;

    /// Remove every receipt for a shop, returning how many were removed
    async fn delete_tenant(&self, shop_domain: &str) -> Result<usize>;
}

/// In-memory receipt log for single-instance deployments and tests
#[derive(Debug, Default)]
pub struct InMemoryReceiptLog {
    inner: RwLock<HashMap<(String, String), WebhookReceipt>>,
}

impl InMemoryReceiptLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReceiptLog for InMemoryReceiptLog {
    async fn record(&self, receipt: WebhookReceipt) -> Result<bool> {
        let key = (receipt.shop_domain.clone(), receipt.delivery_id.clone());
        let mut map = self.inner.write();
        if map.contains_key(&key) {
            return Ok(false);
        }
        map.insert(key, receipt);
        Ok(true)
    }

    async fn set_processing(
        &self,
        shop_domain: &str,
        delivery_id: &str,
        outcome: ProcessingOutcome,
        error: Option<String>,
    ) -> Result<()> {
        let key = (shop_domain.to_string(), delivery_id.to_string());
        if let Some(receipt) = self.inner.write().get_mut(&key) {
            receipt.processing = outcome;
            receipt.error = error;
        }
        Ok(())
    }

    async fn receipts_for(&self, shop_domain: &str) -> Result<Vec<WebhookReceipt>> {
        let mut rows: Vec<WebhookReceipt> = self
            .inner
            .read()
            .values()
            .filter(|r| r.shop_domain == shop_domain)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        Ok(rows)
    }

    async fn delete_tenant(&self, shop_domain: &str) -> Result<usize> {
        let mut map = self.inner.write();
        let before = map.len();
        map.retain(|(shop, _), _| shop != shop_domain);
        Ok(before - map.len())
    }
}
