//! Read and sync-trigger API handlers
//!
//! `GET /api/:resource?shop=` serves the local snapshots; it never calls
//! the platform. `POST /api/sync/:resource` enqueues background work and
//! answers 202, or 409 while a sync for the same (shop, resource) pair is
//! already in flight.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use crate::error::{Error, Result};
use crate::http::AppState;
use crate::sync::ResourceKind;

/// Query parameters naming the tenant
#[derive(Debug, Deserialize)]
pub struct ShopQuery {
    /// Shop domain to read; `tenant` is accepted as an alias
    #[serde(alias = "tenant")]
    pub shop: Option<String>,
}

/// Body of `POST /api/sync/:resource`
#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    /// Shop domain to sync; `tenant` is accepted as an alias
    #[serde(alias = "tenant")]
    pub shop: Option<String>,
}

/// `GET /api/:resource?shop=` — read synchronized snapshots
#[instrument(skip_all, fields(resource = %resource))]
pub async fn get_resource(
    State(state): State<Arc<AppState>>,
    Path(resource): Path<String>,
    Query(query): Query<ShopQuery>,
) -> Result<impl IntoResponse> {
    let kind = ResourceKind::parse(&resource)?;
    let shop = require_installed_shop(&state, query.shop).await?;

    let body = match kind {
        ResourceKind::Products => {
            let products = state.sync_store.products_for(&shop).await?;
            let count = products.len();
            json!({"products": products, "count": count})
        }
        ResourceKind::Orders => {
            let orders = state.sync_store.orders_for(&shop).await?;
            let mut rows = Vec::with_capacity(orders.len());
            for order in &orders {
                let line_items = state.sync_store.line_items_for(&shop, order.order_id).await?;
                let mut value = serde_json::to_value(order)?;
                value["line_items"] = serde_json::to_value(line_items)?;
                rows.push(value);
            }
            json!({"orders": rows, "count": rows.len()})
        }
        ResourceKind::Inventory => {
            let levels = state.sync_store.inventory_for(&shop).await?;
            let count = levels.len();
            json!({"inventory_levels": levels, "count": count})
        }
    };

    Ok(Json(body))
}

/// `POST /api/sync/:resource` — enqueue a background sync
#[instrument(skip_all, fields(resource = %resource))]
pub async fn start_sync(
    State(state): State<Arc<AppState>>,
    Path(resource): Path<String>,
    Json(request): Json<SyncRequest>,
) -> Result<impl IntoResponse> {
    let kind = ResourceKind::parse(&resource)?;
    let shop = require_installed_shop(&state, request.shop).await?;

    // Fast 409 instead of silently queueing work that would coalesce.
    if state.leases.is_held(&shop, kind) {
        return Err(Error::ConcurrentSyncRejected {
            shop,
            kind: kind.as_str().to_string(),
        });
    }

    let task_id = state.sync_queue.submit(&shop, kind).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "status": "accepted",
            "task_id": task_id,
            "resource": kind.as_str(),
            "shop": shop,
        })),
    ))
}

/// Validate the shop parameter and require a live credential
async fn require_installed_shop(state: &Arc<AppState>, shop: Option<String>) -> Result<String> {
    let shop = shop.ok_or_else(|| Error::InvalidPayload("shop parameter is required".to_string()))?;
    let shop = state.oauth.validate_shop_domain(&shop)?;
    match state.credentials.get(&shop).await? {
        Some(_) => Ok(shop),
        None => Err(Error::TenantNotFound(shop)),
    }
}
