//! Webhook HTTP entry point
//!
//! One handler receives every topic. Hard ordering requirement: the
//! signature is verified over the raw body bytes before the body is parsed
//! as JSON and before any store is touched with payload data — a forged
//! delivery gets a 401 and an audit receipt, nothing else.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use bytes::Bytes;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{instrument, warn};

use crate::error::{Error, Result};
use crate::http::AppState;
use crate::store::{ProcessingOutcome, WebhookReceipt};
use crate::webhook::processor::OrdinaryEvent;
use crate::webhook::{
    events::{CustomerRedactPayload, DataRequestPayload, ShopRedactPayload, WebhookTopic},
    DELIVERY_ID_HEADER, SHOP_DOMAIN_HEADER, SIGNATURE_HEADER,
};

/// `POST /webhooks/:resource/:event` — verify, dedup, dispatch
#[instrument(skip_all, fields(resource = %resource, event = %event))]
pub async fn receive_webhook(
    State(state): State<Arc<AppState>>,
    Path((resource, event)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse> {
    let topic = WebhookTopic::from_path(&resource, &event);
    // Receipts carry the raw topic string so unknown topics stay auditable.
    let topic_str = format!("{resource}/{event}");
    let header_shop = header_value(&headers, SHOP_DOMAIN_HEADER);
    let signature = header_value(&headers, SIGNATURE_HEADER);
    let delivery_id = header_value(&headers, DELIVERY_ID_HEADER)
        .unwrap_or_else(|| derived_delivery_id(&topic_str, &body));

    // Verification gates everything: no parse, no payload persistence.
    if let Err(err) = state.verifier.verify(&body, signature.as_deref()) {
        state.metrics.record_webhook_rejected();
        let shop = header_shop.unwrap_or_else(|| "unknown".to_string());
        warn!(shop = %shop, topic = %topic, "webhook signature rejected");
        let _ = state
            .receipts
            .record(WebhookReceipt::rejected(shop, delivery_id, topic_str))
            .await;
        return Err(Error::SignatureError(err));
    }
    state.metrics.record_webhook_accepted();

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            // Authentic but unparseable: still leaves an audit receipt.
            let shop = header_shop
                .clone()
                .unwrap_or_else(|| "unknown".to_string());
            let mut receipt = WebhookReceipt::accepted(shop, delivery_id, topic_str);
            receipt.processing = ProcessingOutcome::Failed;
            receipt.error = Some(format!("body is not JSON: {e}"));
            let _ = state.receipts.record(receipt).await;
            return Err(Error::InvalidPayload(format!("body is not JSON: {e}")));
        }
    };

    // The platform names the shop in a header; compliance payloads also
    // carry it in the body for deliveries that predate the header.
    let shop_domain = header_shop
        .or_else(|| {
            payload
                .get("shop_domain")
                .and_then(Value::as_str)
                .map(String::from)
        })
        .ok_or_else(|| Error::InvalidPayload("missing shop domain".to_string()))?;

    let newly_recorded = state
        .receipts
        .record(WebhookReceipt::accepted(
            shop_domain.clone(),
            delivery_id.clone(),
            topic_str.clone(),
        ))
        .await?;
    if !newly_recorded {
        // At-least-once delivery: same id seen before, nothing to redo.
        state.metrics.record_webhook_duplicate();
        return Ok(Json(json!({"status": "duplicate"})));
    }

    match topic {
        WebhookTopic::CustomersDataRequest
        | WebhookTopic::CustomersRedact
        | WebhookTopic::ShopRedact => {
            handle_compliance(&state, topic, &shop_domain, &delivery_id, &body).await?;
            Ok(Json(json!({"status": "success"})))
        }
        WebhookTopic::Unknown => {
            warn!(topic = %topic_str, "unknown webhook topic acknowledged");
            state
                .receipts
                .set_processing(&shop_domain, &delivery_id, ProcessingOutcome::Ignored, None)
                .await?;
            Ok(Json(json!({"status": "ignored"})))
        }
        ordinary => {
            state
                .processor
                .enqueue(OrdinaryEvent {
                    shop_domain,
                    delivery_id,
                    topic: ordinary,
                    payload,
                })
                .await?;
            Ok(Json(json!({"status": "success"})))
        }
    }
}

/// Run a compliance handler inline and record the outcome.
///
/// Failures mark the receipt and propagate, so the platform sees a
/// non-2xx and redelivers.
async fn handle_compliance(
    state: &Arc<AppState>,
    topic: WebhookTopic,
    shop_domain: &str,
    delivery_id: &str,
    body: &[u8],
) -> Result<()> {
    let result = match topic {
        WebhookTopic::CustomersDataRequest => {
            let payload: DataRequestPayload = parse_compliance(body)?;
            state.compliance.handle_data_request(payload).await
        }
        WebhookTopic::CustomersRedact => {
            let payload: CustomerRedactPayload = parse_compliance(body)?;
            state.compliance.handle_customer_redact(payload).await
        }
        WebhookTopic::ShopRedact => {
            let payload: ShopRedactPayload = parse_compliance(body)?;
            state.compliance.handle_shop_redact(payload).await
        }
        _ => unreachable!("caller dispatches only compliance topics"),
    };

    match result {
        Ok(()) => {
            state
                .receipts
                .set_processing(shop_domain, delivery_id, ProcessingOutcome::Succeeded, None)
                .await?;
            Ok(())
        }
        Err(err) => {
            state
                .receipts
                .set_processing(
                    shop_domain,
                    delivery_id,
                    ProcessingOutcome::Failed,
                    Some(err.to_string()),
                )
                .await?;
            Err(err)
        }
    }
}

fn parse_compliance<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| Error::InvalidPayload(e.to_string()))
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Delivery id for platforms or test rigs that omit the id header:
/// a digest of (topic, body, arrival minute), which keeps rapid
/// redeliveries of the same payload deduplicated.
fn derived_delivery_id(topic: &str, body: &[u8]) -> String {
    let minute_bucket = chrono::Utc::now().timestamp() / 60;
    let mut hasher = Sha256::new();
    hasher.update(topic.as_bytes());
    hasher.update(b"\x00");
    hasher.update(body);
    hasher.update(minute_bucket.to_be_bytes());
    hex::encode(&hasher.finalize()[..16])
}
