//! Wire types for the platform Admin API
//!
//! Deserialization targets for the JSON the platform returns, plus the
//! conversions into the store's snapshot records. Money fields stay as the
//! string decimals the platform serializes; re-encoding through a float
//! would corrupt them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{InventoryLevel, OrderLineItem, SyncedOrder, SyncedProduct};

/// Successful authorization-code exchange response
#[derive(Debug, Clone, Deserialize)]
pub struct AccessTokenResponse {
    /// The opaque access credential
    pub access_token: String,
    /// Scopes actually granted, when reported
    #[serde(default)]
    pub scope: Option<String>,
}

/// One page of a cursor-paginated collection
#[derive(Debug, Clone)]
pub struct Page<T> {
    /// Items in pagination order
    pub items: Vec<T>,
    /// Cursor for the next page; `None` when exhausted
    pub next_page_info: Option<String>,
}

impl<T> Page<T> {
    /// A final page holding `items`
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_page_info: None,
        }
    }

    /// A page holding `items` with a following cursor
    pub fn with_next(items: Vec<T>, cursor: &str) -> Self {
        Self {
            items,
            next_page_info: Some(cursor.to_string()),
        }
    }
}

/// Product as returned by the Admin API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteProduct {
    /// Remote product id
    pub id: i64,
    /// Product title
    pub title: String,
    /// URL handle
    pub handle: String,
    /// Lifecycle status
    #[serde(default = "default_status")]
    pub status: String,
    /// Merchandising type
    #[serde(default)]
    pub product_type: Option<String>,
    /// Vendor name
    #[serde(default)]
    pub vendor: Option<String>,
    /// Comma-separated tags
    #[serde(default)]
    pub tags: Option<String>,
    /// Platform-side last-modified time
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_status() -> String {
    "active".to_string()
}

impl RemoteProduct {
    /// Convert into the stored snapshot for `shop_domain`
    pub fn into_synced(self, shop_domain: &str) -> SyncedProduct {
        SyncedProduct {
            shop_domain: shop_domain.to_string(),
            product_id: self.id,
            title: self.title,
            handle: self.handle,
            status: self.status,
            product_type: self.product_type,
            vendor: self.vendor,
            tags: self.tags,
            remote_updated_at: self.updated_at,
            last_synced: Utc::now(),
        }
    }
}

/// Order as returned by the Admin API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteOrder {
    /// Remote order id
    pub id: i64,
    /// Sequential order number
    #[serde(default)]
    pub order_number: Option<i64>,
    /// Payment state
    #[serde(default)]
    pub financial_status: Option<String>,
    /// Fulfillment state
    #[serde(default)]
    pub fulfillment_status: Option<String>,
    /// Order total, string decimal
    pub total_price: String,
    /// ISO currency code
    pub currency: String,
    /// Customer contact email
    #[serde(default)]
    pub email: Option<String>,
    /// Platform-side last-modified time
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Line items in the order
    #[serde(default)]
    pub line_items: Vec<RemoteLineItem>,
}

impl RemoteOrder {
    /// Convert into the stored snapshot plus child rows for `shop_domain`
    pub fn into_synced(self, shop_domain: &str) -> (SyncedOrder, Vec<OrderLineItem>) {
        let order_number = self
            .order_number
            .map(|n| n.to_string())
            .unwrap_or_else(|| self.id.to_string());

        let line_items = self
            .line_items
            .into_iter()
            .map(|item| OrderLineItem {
                shop_domain: shop_domain.to_string(),
                order_id: self.id,
                line_item_id: item.id,
                product_id: item.product_id,
                variant_id: item.variant_id,
                title: item.title,
                quantity: item.quantity,
                price: item.price,
                sku: item.sku,
            })
            .collect();

        let order = SyncedOrder {
            shop_domain: shop_domain.to_string(),
            order_id: self.id,
            order_number,
            financial_status: self.financial_status,
            fulfillment_status: self.fulfillment_status,
            total_price: self.total_price,
            currency: self.currency,
            customer_email: self.email,
            remote_updated_at: self.updated_at,
            last_synced: Utc::now(),
        };

        (order, line_items)
    }
}

/// Line item inside an order payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteLineItem {
    /// Remote line-item id
    pub id: i64,
    /// Product backing this line
    #[serde(default)]
    pub product_id: Option<i64>,
    /// Variant backing this line
    #[serde(default)]
    pub variant_id: Option<i64>,
    /// Line title
    pub title: String,
    /// Units ordered
    pub quantity: i64,
    /// Unit price, string decimal
    pub price: String,
    /// Stock-keeping unit
    #[serde(default)]
    pub sku: Option<String>,
}

/// Inventory level as returned by the Admin API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteInventoryLevel {
    /// Remote inventory item id
    pub inventory_item_id: i64,
    /// Remote location id
    pub location_id: i64,
    /// Units available; the platform sends null for untracked items
    #[serde(default)]
    pub available: Option<i64>,
}

impl RemoteInventoryLevel {
    /// Convert into the stored snapshot for `shop_domain`
    pub fn into_synced(self, shop_domain: &str) -> InventoryLevel {
        InventoryLevel {
            shop_domain: shop_domain.to_string(),
            inventory_item_id: self.inventory_item_id,
            location_id: self.location_id,
            available: self.available.unwrap_or(0),
            last_synced: Utc::now(),
        }
    }
}

// Envelope shapes the Admin API wraps collections in.

#[derive(Debug, Deserialize)]
pub(crate) struct ProductsEnvelope {
    pub products: Vec<RemoteProduct>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OrdersEnvelope {
    pub orders: Vec<RemoteOrder>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InventoryEnvelope {
    pub inventory_levels: Vec<RemoteInventoryLevel>,
}
