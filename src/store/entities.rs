//! Synchronized-entity store
//!
//! Snapshots of remote products, orders (with line-item children), and
//! inventory levels, keyed by (shop domain, remote id). Upserts are
//! idempotent: re-ingesting an unchanged payload refreshes `last_synced`
//! and changes nothing else. Order upserts reconcile line-item children as
//! a set — rows absent from the latest payload are deleted.
//!
//! Owned by the sync engine and the ordinary-webhook processor; the
//! compliance handler only reads (data access) or deletes (erasure).

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Outcome of an idempotent upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    /// No prior row for this key
    Created,
    /// Prior row existed with different content
    Updated,
    /// Prior row had identical content; only `last_synced` moved
    Unchanged,
}

/// Snapshot of a remote product
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncedProduct {
    /// Owning shop domain
    pub shop_domain: String,
    /// Remote product id
    pub product_id: i64,
    /// Product title
    pub title: String,
    /// URL handle
    pub handle: String,
    /// Lifecycle status reported by the platform
    pub status: String,
    /// Merchandising type, if set
    pub product_type: Option<String>,
    /// Vendor name, if set
    pub vendor: Option<String>,
    /// Comma-separated tags, if set
    pub tags: Option<String>,
    /// Platform-side last-modified marker, monotone per product
    pub remote_updated_at: Option<DateTime<Utc>>,
    /// When this row was last written by a sync
    pub last_synced: DateTime<Utc>,
}

impl SyncedProduct {
    fn content_eq(&self, other: &Self) -> bool {
        self.title == other.title
            && self.handle == other.handle
            && self.status == other.status
            && self.product_type == other.product_type
            && self.vendor == other.vendor
            && self.tags == other.tags
            && self.remote_updated_at == other.remote_updated_at
    }
}

/// Snapshot of a remote order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncedOrder {
    /// Owning shop domain
    pub shop_domain: String,
    /// Remote order id
    pub order_id: i64,
    /// Human-facing order number
    pub order_number: String,
    /// Payment state, if reported
    pub financial_status: Option<String>,
    /// Fulfillment state, if reported
    pub fulfillment_status: Option<String>,
    /// Order total as the platform serializes it (string decimal)
    pub total_price: String,
    /// ISO currency code
    pub currency: String,
    /// Customer contact, removed by customer-redact
    pub customer_email: Option<String>,
    /// Platform-side last-modified marker
    pub remote_updated_at: Option<DateTime<Utc>>,
    /// When this row was last written by a sync
    pub last_synced: DateTime<Utc>,
}

impl SyncedOrder {
    fn content_eq(&self, other: &Self) -> bool {
        self.order_number == other.order_number
            && self.financial_status == other.financial_status
            && self.fulfillment_status == other.fulfillment_status
            && self.total_price == other.total_price
            && self.currency == other.currency
            && self.customer_email == other.customer_email
            && self.remote_updated_at == other.remote_updated_at
    }
}

/// Line-item child row of a synced order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLineItem {
    /// Owning shop domain
    pub shop_domain: String,
    /// Parent order id
    pub order_id: i64,
    /// Remote line-item id
    pub line_item_id: i64,
    /// Product backing this line, if any
    pub product_id: Option<i64>,
    /// Variant backing this line, if any
    pub variant_id: Option<i64>,
    /// Line title at purchase time
    pub title: String,
    /// Units ordered
    pub quantity: i64,
    /// Unit price as string decimal
    pub price: String,
    /// Stock-keeping unit, if any
    pub sku: Option<String>,
}

/// Inventory availability at one location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryLevel {
    /// Owning shop domain
    pub shop_domain: String,
    /// Remote inventory item id
    pub inventory_item_id: i64,
    /// Remote location id
    pub location_id: i64,
    /// Units available
    pub available: i64,
    /// When this row was last written by a sync
    pub last_synced: DateTime<Utc>,
}

/// Row counts removed by a tenant erasure
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TenantDeletion {
    /// Product rows removed
    pub products: usize,
    /// Order rows removed
    pub orders: usize,
    /// Line-item rows removed
    pub line_items: usize,
    /// Inventory rows removed
    pub inventory_levels: usize,
}

impl TenantDeletion {
    /// Total rows removed across all tables
    pub fn total(&self) -> usize {
        self.products + self.orders + self.line_items + self.inventory_levels
    }
}

/// Storage for synchronized catalog/order/inventory snapshots
#[async_trait]
pub trait SyncStore: Send + Sync + 'static {
    /// Idempotently insert or update a product by (shop, product id)
    async fn upsert_product(&self, product: SyncedProduct) -> Result<Upserted>;

    /// Idempotently insert or update an order and reconcile its line-item
    /// children: items absent from `line_items` are deleted.
    async fn upsert_order(
        &self,
        order: SyncedOrder,
        line_items: Vec<OrderLineItem>,
    ) -> Result<Upserted>;

    /// Idempotently insert or update an inventory level by
    /// (shop, inventory item, location)
    async fn upsert_inventory_level(&self, level: InventoryLevel) -> Result<Upserted>;

    /// All products for a shop, ordered by remote id
    async fn products_for(&self, shop_domain: &str) -> Result<Vec<SyncedProduct>>;

    /// All orders for a shop, ordered by remote id
    async fn orders_for(&self, shop_domain: &str) -> Result<Vec<SyncedOrder>>;

    /// Line items for one order, ordered by remote id
    async fn line_items_for(&self, shop_domain: &str, order_id: i64) -> Result<Vec<OrderLineItem>>;

    /// All inventory levels for a shop
    async fn inventory_for(&self, shop_domain: &str) -> Result<Vec<InventoryLevel>>;

    /// Delete the named orders and their line items. Missing ids are
    /// skipped, so replays are no-op successes. Returns rows removed.
    async fn delete_orders(&self, shop_domain: &str, order_ids: &[i64]) -> Result<usize>;

    /// Remove a customer's contact details from every remaining order for
    /// the shop. Returns how many orders were scrubbed.
    async fn scrub_customer(&self, shop_domain: &str, email: &str) -> Result<usize>;

    /// Remove every synchronized row for a shop. Re-running on an erased
    /// tenant returns zero counts.
    async fn delete_tenant(&self, shop_domain: &str) -> Result<TenantDeletion>;
}

type ProductKey = (String, i64);
type OrderKey = (String, i64);
type LineItemKey = (String, i64, i64);
type InventoryKey = (String, i64, i64);

/// In-memory sync store for single-instance deployments and tests
#[derive(Debug, Default)]
pub struct InMemorySyncStore {
    products: RwLock<HashMap<ProductKey, SyncedProduct>>,
    orders: RwLock<HashMap<OrderKey, SyncedOrder>>,
    line_items: RwLock<HashMap<LineItemKey, OrderLineItem>>,
    inventory: RwLock<HashMap<InventoryKey, InventoryLevel>>,
}

impl InMemorySyncStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SyncStore for InMemorySyncStore {
    async fn upsert_product(&self, mut product: SyncedProduct) -> Result<Upserted> {
        let key = (product.shop_domain.clone(), product.product_id);
        let mut map = self.products.write();
        product.last_synced = Utc::now();
        let outcome = match map.get(&key) {
            None => Upserted::Created,
            Some(existing) if existing.content_eq(&product) => Upserted::Unchanged,
            Some(_) => Upserted::Updated,
        };
        map.insert(key, product);
        Ok(outcome)
    }

    async fn upsert_order(
        &self,
        mut order: SyncedOrder,
        line_items: Vec<OrderLineItem>,
    ) -> Result<Upserted> {
        let key = (order.shop_domain.clone(), order.order_id);
        order.last_synced = Utc::now();

        let outcome = {
            let mut map = self.orders.write();
            let outcome = match map.get(&key) {
                None => Upserted::Created,
                Some(existing) if existing.content_eq(&order) => Upserted::Unchanged,
                Some(_) => Upserted::Updated,
            };
            map.insert(key.clone(), order);
            outcome
        };

        // Set reconciliation: replace this order's children wholesale.
        let mut items = self.line_items.write();
        items.retain(|(shop, order_id, _), _| !(shop == &key.0 && *order_id == key.1));
        for item in line_items {
            items.insert(
                (item.shop_domain.clone(), item.order_id, item.line_item_id),
                item,
            );
        }

        Ok(outcome)
    }

    async fn upsert_inventory_level(&self, mut level: InventoryLevel) -> Result<Upserted> {
        let key = (
            level.shop_domain.clone(),
            level.inventory_item_id,
            level.location_id,
        );
        let mut map = self.inventory.write();
        level.last_synced = Utc::now();
        let outcome = match map.get(&key) {
            None => Upserted::Created,
            Some(existing) if existing.available == level.available => Upserted::Unchanged,
            Some(_) => Upserted::Updated,
        };
        map.insert(key, level);
        Ok(outcome)
    }

    async fn products_for(&self, shop_domain: &str) -> Result<Vec<SyncedProduct>> {
        let mut rows: Vec<SyncedProduct> = self
            .products
            .read()
            .values()
            .filter(|p| p.shop_domain == shop_domain)
            .cloned()
            .collect();
        rows.sort_by_key(|p| p.product_id);
        Ok(rows)
    }

    async fn orders_for(&self, shop_domain: &str) -> Result<Vec<SyncedOrder>> {
        let mut rows: Vec<SyncedOrder> = self
            .orders
            .read()
            .values()
            .filter(|o| o.shop_domain == shop_domain)
            .cloned()
            .collect();
        rows.sort_by_key(|o| o.order_id);
        Ok(rows)
    }

    async fn line_items_for(&self, shop_domain: &str, order_id: i64) -> Result<Vec<OrderLineItem>> {
        let mut rows: Vec<OrderLineItem> = self
            .line_items
            .read()
            .values()
            .filter(|i| i.shop_domain == shop_domain && i.order_id == order_id)
            .cloned()
            .collect();
        rows.sort_by_key(|i| i.line_item_id);
        Ok(rows)
    }

    async fn inventory_for(&self, shop_domain: &str) -> Result<Vec<InventoryLevel>> {
        let mut rows: Vec<InventoryLevel> = self
            .inventory
            .read()
            .values()
            .filter(|l| l.shop_domain == shop_domain)
            .cloned()
            .collect();
        rows.sort_by_key(|l| (l.inventory_item_id, l.location_id));
        Ok(rows)
    }

    async fn delete_orders(&self, shop_domain: &str, order_ids: &[i64]) -> Result<usize> {
        let mut removed = 0;
        {
            let mut orders = self.orders.write();
            for id in order_ids {
                if orders.remove(&(shop_domain.to_string(), *id)).is_some() {
                    removed += 1;
                }
            }
        }
        let mut items = self.line_items.write();
        let before = items.len();
        items.retain(|(shop, order_id, _), _| {
            !(shop == shop_domain && order_ids.contains(order_id))
        });
        removed += before - items.len();
        Ok(removed)
    }

    async fn scrub_customer(&self, shop_domain: &str, email: &str) -> Result<usize> {
        let mut scrubbed = 0;
        for order in self.orders.write().values_mut() {
            if order.shop_domain == shop_domain && order.customer_email.as_deref() == Some(email) {
                order.customer_email = None;
                scrubbed += 1;
            }
        }
        Ok(scrubbed)
    }

    async fn delete_tenant(&self, shop_domain: &str) -> Result<TenantDeletion> {
        let mut deletion = TenantDeletion::default();

        let mut products = self.products.write();
        let before = products.len();
        products.retain(|(shop, _), _| shop != shop_domain);
        deletion.products = before - products.len();
        drop(products);

        let mut orders = self.orders.write();
        let before = orders.len();
        orders.retain(|(shop, _), _| shop != shop_domain);
        deletion.orders = before - orders.len();
        drop(orders);

        let mut items = self.line_items.write();
        let before = items.len();
        items.retain(|(shop, _, _), _| shop != shop_domain);
        deletion.line_items = before - items.len();
        drop(items);

        let mut inventory = self.inventory.write();
        let before = inventory.len();
        inventory.retain(|(shop, _, _), _| shop != shop_domain);
        deletion.inventory_levels = before - inventory.len();

        Ok(deletion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn product(shop: &str, id: i64, title: &str) -> SyncedProduct {
        SyncedProduct {
            shop_domain: shop.to_string(),
            product_id: id,
            title: title.to_string(),
            handle: title.to_lowercase().replace(' ', "-"),
            status: "active".to_string(),
            product_type: None,
            vendor: None,
            tags: None,
            remote_updated_at: None,
            last_synced: Utc::now(),
        }
    }

    fn order(shop: &str, id: i64, email: Option<&str>) -> SyncedOrder {
        SyncedOrder {
            shop_domain: shop.to_string(),
            order_id: id,
            order_number: format!("#{}", 1000 + id),
            financial_status: Some("paid".to_string()),
            fulfillment_status: None,
            total_price: "29.99".to_string(),
            currency: "USD".to_string(),
            customer_email: email.map(String::from),
            remote_updated_at: None,
            last_synced: Utc::now(),
        }
    }

    fn line_item(shop: &str, order_id: i64, id: i64) -> OrderLineItem {
        OrderLineItem {
            shop_domain: shop.to_string(),
            order_id,
            line_item_id: id,
            product_id: Some(10 + id),
            variant_id: None,
            title: format!("item {id}"),
            quantity: 1,
            price: "9.99".to_string(),
            sku: None,
        }
    }

    #[tokio::test]
    async fn test_product_upsert_is_idempotent() {
        let store = InMemorySyncStore::new();
        assert_eq!(
            store
                .upsert_product(product("s.example", 1, "Widget"))
                .await
                .unwrap(),
            Upserted::Created
        );

        let first = store.products_for("s.example").await.unwrap().remove(0);

        // Same content again: only the timestamp may move.
        assert_eq!(
            store
                .upsert_product(product("s.example", 1, "Widget"))
                .await
                .unwrap(),
            Upserted::Unchanged
        );
        let second = store.products_for("s.example").await.unwrap().remove(0);
        assert_eq!(second.title, first.title);
        assert_eq!(second.handle, first.handle);
        assert!(second.last_synced >= first.last_synced);

        // Changed content is an update.
        assert_eq!(
            store
                .upsert_product(product("s.example", 1, "Gadget"))
                .await
                .unwrap(),
            Upserted::Updated
        );
    }

    #[tokio::test]
    async fn test_line_item_set_reconciliation() {
        let store = InMemorySyncStore::new();
        store
            .upsert_order(
                order("s.example", 5, None),
                vec![line_item("s.example", 5, 1), line_item("s.example", 5, 2)],
            )
            .await
            .unwrap();
        assert_eq!(store.line_items_for("s.example", 5).await.unwrap().len(), 2);

        // Latest payload only carries item 1; item 2 must disappear.
        store
            .upsert_order(order("s.example", 5, None), vec![line_item("s.example", 5, 1)])
            .await
            .unwrap();
        let items = store.line_items_for("s.example", 5).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].line_item_id, 1);
    }

    #[tokio::test]
    async fn test_reconciliation_scoped_to_one_order() {
        let store = InMemorySyncStore::new();
        store
            .upsert_order(order("s.example", 1, None), vec![line_item("s.example", 1, 1)])
            .await
            .unwrap();
        store
            .upsert_order(order("s.example", 2, None), vec![line_item("s.example", 2, 7)])
            .await
            .unwrap();

        // Re-syncing order 1 must not touch order 2's children.
        store
            .upsert_order(order("s.example", 1, None), vec![])
            .await
            .unwrap();
        assert!(store.line_items_for("s.example", 1).await.unwrap().is_empty());
        assert_eq!(store.line_items_for("s.example", 2).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_orders_replay_safe() {
        let store = InMemorySyncStore::new();
        store
            .upsert_order(
                order("s.example", 9, Some("c@example.com")),
                vec![line_item("s.example", 9, 1)],
            )
            .await
            .unwrap();

        assert_eq!(store.delete_orders("s.example", &[9, 404]).await.unwrap(), 2);
        // Already gone: deleting again succeeds with nothing to do.
        assert_eq!(store.delete_orders("s.example", &[9]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_scrub_customer() {
        let store = InMemorySyncStore::new();
        store
            .upsert_order(order("s.example", 1, Some("gone@example.com")), vec![])
            .await
            .unwrap();
        store
            .upsert_order(order("s.example", 2, Some("stays@example.com")), vec![])
            .await
            .unwrap();

        assert_eq!(
            store
                .scrub_customer("s.example", "gone@example.com")
                .await
                .unwrap(),
            1
        );
        let orders = store.orders_for("s.example").await.unwrap();
        assert_eq!(orders[0].customer_email, None);
        assert_eq!(orders[1].customer_email.as_deref(), Some("stays@example.com"));
    }

    #[tokio::test]
    async fn test_tenant_deletion_is_complete_and_scoped() {
        let store = InMemorySyncStore::new();
        for id in 1..=3 {
            store
                .upsert_product(product("doomed.example", id, "P"))
                .await
                .unwrap();
        }
        store
            .upsert_order(
                order("doomed.example", 1, None),
                vec![line_item("doomed.example", 1, 1)],
            )
            .await
            .unwrap();
        store
            .upsert_inventory_level(InventoryLevel {
                shop_domain: "doomed.example".to_string(),
                inventory_item_id: 1,
                location_id: 1,
                available: 5,
                last_synced: Utc::now(),
            })
            .await
            .unwrap();
        store
            .upsert_product(product("other.example", 1, "Keep"))
            .await
            .unwrap();

        let deletion = store.delete_tenant("doomed.example").await.unwrap();
        assert_eq!(deletion.products, 3);
        assert_eq!(deletion.orders, 1);
        assert_eq!(deletion.line_items, 1);
        assert_eq!(deletion.inventory_levels, 1);

        assert!(store.products_for("doomed.example").await.unwrap().is_empty());
        assert_eq!(store.products_for("other.example").await.unwrap().len(), 1);

        // Idempotent: a second erasure removes nothing and still succeeds.
        assert_eq!(
            store.delete_tenant("doomed.example").await.unwrap().total(),
            0
        );
    }
}
