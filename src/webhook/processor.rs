//! Async processing for ordinary catalog/order webhooks
//!
//! Compliance topics run inline so failures surface as non-2xx; everything
//! else is acknowledged immediately and applied here, off the request
//! thread. Events are applied with the same idempotent upserts the sync
//! engine uses, so a redelivered or replayed event converges to the same
//! state. Failures are retried with backoff and the receipt log records
//! the final outcome.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::platform::types::{RemoteOrder, RemoteProduct};
use crate::store::{ProcessingOutcome, ReceiptLog, SyncStore};
use crate::webhook::events::WebhookTopic;

/// A verified, deduplicated ordinary webhook delivery awaiting processing
#[derive(Debug, Clone)]
pub struct OrdinaryEvent {
    /// Shop the delivery was attributed to
    pub shop_domain: String,
    /// Receipt-log key for outcome updates
    pub delivery_id: String,
    /// Dispatch topic
    pub topic: WebhookTopic,
    /// Raw payload, parsed only here — after verification
    pub payload: Value,
}

/// Queues verified events for background application
#[derive(Clone)]
pub struct WebhookProcessor {
    task_sender: mpsc::Sender<OrdinaryEvent>,
}

impl WebhookProcessor {
    /// Create a processor and the handle that runs its worker loop
    pub fn new(
        sync_store: Arc<dyn SyncStore>,
        receipts: Arc<dyn ReceiptLog>,
        config: AppConfig,
    ) -> (Self, ProcessorHandle) {
        let (tx, rx) = mpsc::channel(1000);
        (
            Self { task_sender: tx },
            ProcessorHandle {
                sync_store,
                receipts,
                config,
                task_receiver: rx,
            },
        )
    }

    /// Queue an event; returns immediately once it is accepted
    pub async fn enqueue(&self, event: OrdinaryEvent) -> Result<()> {
        self.task_sender
            .send(event)
            .await
            .map_err(|e| Error::internal(format!("failed to queue webhook event: {e}")))
    }
}

/// Runs the background processing loop; spawn with `tokio::spawn`
pub struct ProcessorHandle {
    sync_store: Arc<dyn SyncStore>,
    receipts: Arc<dyn ReceiptLog>,
    config: AppConfig,
    task_receiver: mpsc::Receiver<OrdinaryEvent>,
}

impl ProcessorHandle {
    /// Drain the queue until every sender is dropped
    pub async fn run(mut self) {
        info!("webhook event processor started");

        while let Some(event) = self.task_receiver.recv().await {
            let sync_store = Arc::clone(&self.sync_store);
            let receipts = Arc::clone(&self.receipts);
            let config = self.config.clone();

            tokio::spawn(async move {
                process_with_retry(sync_store, receipts, config, event).await;
            });
        }

        info!("webhook event processor shutting down");
    }
}

async fn process_with_retry(
    sync_store: Arc<dyn SyncStore>,
    receipts: Arc<dyn ReceiptLog>,
    config: AppConfig,
    event: OrdinaryEvent,
) {
    let mut last_error = String::new();

    for attempt in 0..=config.sync_max_retries {
        if attempt > 0 {
            tokio::time::sleep(config.retry_delay(attempt - 1)).await;
        }

        match apply_event(&sync_store, &event).await {
            Ok(()) => {
                debug!(
                    shop = %event.shop_domain,
                    topic = %event.topic,
                    delivery_id = %event.delivery_id,
                    "webhook event applied"
                );
                let _ = receipts
                    .set_processing(
                        &event.shop_domain,
                        &event.delivery_id,
                        ProcessingOutcome::Succeeded,
                        None,
                    )
                    .await;
                return;
            }
            Err(Error::InvalidPayload(reason)) => {
                // Structural problems never get better on retry.
                warn!(
                    shop = %event.shop_domain,
                    topic = %event.topic,
                    reason = %reason,
                    "webhook payload rejected"
                );
                last_error = reason;
                break;
            }
            Err(err) => {
                warn!(
                    shop = %event.shop_domain,
                    topic = %event.topic,
                    attempt = attempt + 1,
                    error = %err,
                    "webhook event processing failed"
                );
                last_error = err.to_string();
            }
        }
    }

    let _ = receipts
        .set_processing(
            &event.shop_domain,
            &event.delivery_id,
            ProcessingOutcome::Failed,
            Some(last_error),
        )
        .await;
}

/// Apply one event to the sync store
async fn apply_event(sync_store: &Arc<dyn SyncStore>, event: &OrdinaryEvent) -> Result<()> {
    match event.topic {
        WebhookTopic::ProductsCreate | WebhookTopic::ProductsUpdate => {
            let product: RemoteProduct = serde_json::from_value(event.payload.clone())
                .map_err(|e| Error::InvalidPayload(e.to_string()))?;
            sync_store
                .upsert_product(product.into_synced(&event.shop_domain))
                .await?;
            Ok(())
        }
        WebhookTopic::OrdersCreate | WebhookTopic::OrdersUpdated => {
            let order: RemoteOrder = serde_json::from_value(event.payload.clone())
                .map_err(|e| Error::InvalidPayload(e.to_string()))?;
            let (order, line_items) = order.into_synced(&event.shop_domain);
            sync_store.upsert_order(order, line_items).await?;
            Ok(())
        }
        // Compliance topics never reach this queue; anything else was
        // already acknowledged as unknown.
        other => {
            debug!(topic = %other, "no processor for topic");
            Ok(())
        }
    }
}
