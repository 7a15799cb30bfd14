//! Compliance-event handlers
//!
//! The three mandated data-subject-rights topics, invoked only after the
//! signature verifier has accepted the delivery. The platform redelivers
//! on any non-2xx, so every handler is written to be re-run safely:
//! deleting what is already gone succeeds, and partial completion resumes
//! from wherever the previous attempt stopped.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::store::{
    CredentialStore, InventoryLevel, OrderLineItem, ReceiptLog, SyncStore, SyncedOrder,
    SyncedProduct,
};
use crate::webhook::events::{CustomerRedactPayload, DataRequestPayload, ShopRedactPayload};

/// Exportable snapshot produced for a data-access request
#[derive(Debug, Clone, Serialize)]
pub struct CustomerDataExport {
    /// Shop the request concerns
    pub shop_domain: String,
    /// Customer email the snapshot was filtered to, when named
    pub customer_email: Option<String>,
    /// When the snapshot was assembled
    pub generated_at: DateTime<Utc>,
    /// Products held for the shop
    pub products: Vec<SyncedProduct>,
    /// Orders in scope of the request
    pub orders: Vec<SyncedOrder>,
    /// Line items belonging to the in-scope orders
    pub line_items: Vec<OrderLineItem>,
    /// Inventory levels held for the shop
    pub inventory_levels: Vec<InventoryLevel>,
}

/// Destination for assembled data exports.
///
/// Export transport (mail, object storage, notification) is an external
/// collaborator; the compliance handler's contract ends at handing over
/// the snapshot.
#[async_trait]
pub trait ExportSink: Send + Sync + 'static {
    /// Deliver an assembled export
    async fn deliver(&self, export: CustomerDataExport) -> anyhow::Result<()>;
}

/// Default sink: logs a summary of what would be exported
#[derive(Debug, Clone, Default)]
pub struct LoggingExportSink;

#[async_trait]
impl ExportSink for LoggingExportSink {
    async fn deliver(&self, export: CustomerDataExport) -> anyhow::Result<()> {
        info!(
            shop = %export.shop_domain,
            products = export.products.len(),
            orders = export.orders.len(),
            line_items = export.line_items.len(),
            inventory_levels = export.inventory_levels.len(),
            "customer data export assembled"
        );
        Ok(())
    }
}

/// Handles the three mandated compliance topics
#[derive(Clone)]
pub struct ComplianceHandler {
    credentials: Arc<dyn CredentialStore>,
    sync_store: Arc<dyn SyncStore>,
    receipts: Arc<dyn ReceiptLog>,
    export_sink: Arc<dyn ExportSink>,
}

impl ComplianceHandler {
    /// Wire the handler to its stores and export sink
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        sync_store: Arc<dyn SyncStore>,
        receipts: Arc<dyn ReceiptLog>,
        export_sink: Arc<dyn ExportSink>,
    ) -> Self {
        Self {
            credentials,
            sync_store,
            receipts,
            export_sink,
        }
    }

    /// `customers/data_request`: assemble an exportable snapshot and hand
    /// it to the sink.
    ///
    /// The HTTP layer acknowledges once the delivery is durably recorded in
    /// the receipt log; delivery to the sink happens on a detached task so
    /// a slow transport cannot blow the platform's response budget.
    pub async fn handle_data_request(&self, payload: DataRequestPayload) -> Result<()> {
        let shop = payload.shop_domain.clone();
        let customer_email = payload.customer.as_ref().and_then(|c| c.email.clone());

        let products = self.sync_store.products_for(&shop).await?;
        let all_orders = self.sync_store.orders_for(&shop).await?;

        // Scope orders to the request: named order ids first, else the
        // customer's orders, else everything held for the shop.
        let orders: Vec<SyncedOrder> = if !payload.orders_requested.is_empty() {
            all_orders
                .into_iter()
                .filter(|o| payload.orders_requested.contains(&o.order_id))
                .collect()
        } else if let Some(email) = &customer_email {
            all_orders
                .into_iter()
                .filter(|o| o.customer_email.as_deref() == Some(email.as_str()))
                .collect()
        } else {
            all_orders
        };

        let mut line_items = Vec::new();
        for order in &orders {
            line_items.extend(self.sync_store.line_items_for(&shop, order.order_id).await?);
        }
        let inventory_levels = self.sync_store.inventory_for(&shop).await?;

        let export = CustomerDataExport {
            shop_domain: shop.clone(),
            customer_email,
            generated_at: Utc::now(),
            products,
            orders,
            line_items,
            inventory_levels,
        };

        info!(shop = %shop, orders = export.orders.len(), "data access request recorded");

        let sink = Arc::clone(&self.export_sink);
        tokio::spawn(async move {
            if let Err(err) = sink.deliver(export).await {
                // The receipt stays recorded; operators re-trigger delivery.
                error!(shop = %shop, error = %err, "export delivery failed");
            }
        });

        Ok(())
    }

    /// `customers/redact`: delete the named orders and scrub the customer's
    /// contact details from whatever remains.
    ///
    /// Replay-safe: deleting already-deleted rows is a no-op success.
    pub async fn handle_customer_redact(&self, payload: CustomerRedactPayload) -> Result<()> {
        let shop = &payload.shop_domain;

        let removed = if payload.orders_to_redact.is_empty() {
            0
        } else {
            self.sync_store
                .delete_orders(shop, &payload.orders_to_redact)
                .await?
        };

        let scrubbed = match payload.customer.as_ref().and_then(|c| c.email.as_deref()) {
            Some(email) => self.sync_store.scrub_customer(shop, email).await?,
            None => 0,
        };

        info!(
            shop = %shop,
            rows_removed = removed,
            orders_scrubbed = scrubbed,
            "customer redaction applied"
        );
        Ok(())
    }

    /// `shop/redact`: erase everything held for the shop.
    ///
    /// Deletion order is dependents-first — synced entities, then receipt
    /// log, then the credential — so a crash mid-way never leaves rows
    /// referencing a missing tenant. Re-running on an erased tenant is a
    /// no-op success.
    pub async fn handle_shop_redact(&self, payload: ShopRedactPayload) -> Result<()> {
        let shop = &payload.shop_domain;

        let deletion = self.sync_store.delete_tenant(shop).await?;
        let receipts = self.receipts.delete_tenant(shop).await?;
        let had_credential = self.credentials.delete(shop).await?;

        if deletion.total() == 0 && receipts == 0 && !had_credential {
            warn!(shop = %shop, "shop redact for already-erased tenant");
        } else {
            info!(
                shop = %shop,
                entities = deletion.total(),
                receipts,
                credential_removed = had_credential,
                "tenant erased"
            );
        }
        Ok(())
    }
}
