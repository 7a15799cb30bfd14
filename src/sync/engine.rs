//! The sync engine: paginated pull with idempotent upserts
//!
//! One `sync_resource` call walks the remote collection page by page in
//! pagination order, upserting every item and, for orders, reconciling
//! line-item children per order. Transient page failures are retried with
//! exponential backoff — honoring the platform's `Retry-After` hint when
//! one is given — up to a bounded attempt count; exhaustion fails the run
//! with committed pages left in place, because a later run converges to
//! the same state anyway.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::error::{Error, PlatformError, Result};
use crate::platform::types::Page;
use crate::platform::PlatformApi;
use crate::store::{AccessToken, CredentialStore, SyncStore, Upserted};
use crate::sync::lease::SyncLeases;
use crate::sync::ResourceKind;

/// What a completed sync run did
#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    /// Shop that was synced
    pub shop_domain: String,
    /// Resource kind that was synced
    pub kind: ResourceKind,
    /// Pages fetched
    pub pages: u32,
    /// Rows created or updated
    pub upserted: usize,
    /// Rows whose content was already current
    pub unchanged: usize,
    /// Line-item rows written (orders only)
    pub line_items: usize,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
}

/// Items of whichever collection a page belongs to
enum SyncItem {
    Product(crate::platform::types::RemoteProduct),
    Order(crate::platform::types::RemoteOrder),
    Inventory(crate::platform::types::RemoteInventoryLevel),
}

/// Pulls remote collections into the sync store
pub struct SyncEngine {
    config: AppConfig,
    credentials: Arc<dyn CredentialStore>,
    store: Arc<dyn SyncStore>,
    platform: Arc<dyn PlatformApi>,
    leases: Arc<SyncLeases>,
}

impl SyncEngine {
    /// Wire the engine to its collaborators.
    ///
    /// The lease table is passed in rather than created here so the HTTP
    /// layer can consult it for fast 409s.
    pub fn new(
        config: AppConfig,
        credentials: Arc<dyn CredentialStore>,
        store: Arc<dyn SyncStore>,
        platform: Arc<dyn PlatformApi>,
        leases: Arc<SyncLeases>,
    ) -> Self {
        Self {
            config,
            credentials,
            store,
            platform,
            leases,
        }
    }

    /// The lease table backing this engine's exclusivity contract
    pub fn leases(&self) -> &Arc<SyncLeases> {
        &self.leases
    }

    /// Synchronize one resource collection for one shop.
    ///
    /// Preconditions: a live credential exists (`TenantNotFound` otherwise)
    /// and no other run holds the (shop, kind) lease
    /// (`ConcurrentSyncRejected` otherwise).
    pub async fn sync_resource(
        &self,
        shop_domain: &str,
        kind: ResourceKind,
    ) -> Result<SyncSummary> {
        let credential = self
            .credentials
            .get(shop_domain)
            .await?
            .ok_or_else(|| Error::TenantNotFound(shop_domain.to_string()))?;

        // Held until this function returns or the task is cancelled.
        let _lease = self.leases.acquire(shop_domain, kind)?;

        let started = Instant::now();
        let mut summary = SyncSummary {
            shop_domain: shop_domain.to_string(),
            kind,
            pages: 0,
            upserted: 0,
            unchanged: 0,
            line_items: 0,
            duration_ms: 0,
        };

        let mut cursor: Option<String> = None;
        loop {
            let page = self
                .fetch_page_with_retry(shop_domain, &credential.access_token, kind, cursor.as_deref())
                .await?;
            summary.pages += 1;

            for item in page.items {
                self.apply_item(shop_domain, item, &mut summary).await?;
            }

            match page.next_page_info {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            shop = %shop_domain,
            kind = %kind,
            pages = summary.pages,
            upserted = summary.upserted,
            unchanged = summary.unchanged,
            "sync completed"
        );
        Ok(summary)
    }

    async fn apply_item(
        &self,
        shop_domain: &str,
        item: SyncItem,
        summary: &mut SyncSummary,
    ) -> Result<()> {
        let outcome = match item {
            SyncItem::Product(product) => {
                self.store
                    .upsert_product(product.into_synced(shop_domain))
                    .await?
            }
            SyncItem::Order(order) => {
                let (order, line_items) = order.into_synced(shop_domain);
                summary.line_items += line_items.len();
                self.store.upsert_order(order, line_items).await?
            }
            SyncItem::Inventory(level) => {
                self.store
                    .upsert_inventory_level(level.into_synced(shop_domain))
                    .await?
            }
        };
        match outcome {
            Upserted::Created | Upserted::Updated => summary.upserted += 1,
            Upserted::Unchanged => summary.unchanged += 1,
        }
        Ok(())
    }

    /// Fetch one page, retrying transient failures with backoff.
    ///
    /// A `Retry-After` hint from the platform replaces the computed delay;
    /// amplifying throttling with our own schedule would make it worse.
    async fn fetch_page_with_retry(
        &self,
        shop_domain: &str,
        token: &AccessToken,
        kind: ResourceKind,
        cursor: Option<&str>,
    ) -> Result<Page<SyncItem>> {
        let mut attempt: u32 = 0;
        loop {
            match self.fetch_once(shop_domain, token, kind, cursor).await {
                Ok(page) => return Ok(page),
                Err(err) if err.is_transient() && attempt < self.config.sync_max_retries => {
                    let delay = err
                        .retry_after_secs()
                        .map(Duration::from_secs)
                        .unwrap_or_else(|| self.config.retry_delay(attempt));
                    warn!(
                        shop = %shop_domain,
                        kind = %kind,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient page failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) if err.is_transient() => {
                    return Err(Error::SyncFailed {
                        kind: kind.as_str().to_string(),
                        reason: format!("retries exhausted: {err}"),
                    });
                }
                Err(err) => return Err(Error::Platform(err)),
            }
        }
    }

    async fn fetch_once(
        &self,
        shop_domain: &str,
        token: &AccessToken,
        kind: ResourceKind,
        cursor: Option<&str>,
    ) -> std::result::Result<Page<SyncItem>, PlatformError> {
        debug!(shop = %shop_domain, kind = %kind, cursor = ?cursor, "fetching page");
        match kind {
            ResourceKind::Products => {
                let page = self.platform.fetch_products(shop_domain, token, cursor).await?;
                Ok(Page {
                    items: page.items.into_iter().map(SyncItem::Product).collect(),
                    next_page_info: page.next_page_info,
                })
            }
            ResourceKind::Orders => {
                let page = self.platform.fetch_orders(shop_domain, token, cursor).await?;
                Ok(Page {
                    items: page.items.into_iter().map(SyncItem::Order).collect(),
                    next_page_info: page.next_page_info,
                })
            }
            ResourceKind::Inventory => {
                let page = self
                    .platform
                    .fetch_inventory_levels(shop_domain, token, cursor)
                    .await?;
                Ok(Page {
                    items: page.items.into_iter().map(SyncItem::Inventory).collect(),
                    next_page_info: page.next_page_info,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::types::{
        AccessTokenResponse, RemoteInventoryLevel, RemoteLineItem, RemoteOrder, RemoteProduct,
    };
    use crate::store::{InMemoryCredentialStore, InMemorySyncStore, TenantCredential};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    type PageScript<T> = Mutex<VecDeque<std::result::Result<Page<T>, PlatformError>>>;

    /// Platform stub that replays scripted pages per collection
    #[derive(Default)]
    struct ScriptedPlatform {
        products: PageScript<RemoteProduct>,
        orders: PageScript<RemoteOrder>,
        inventory: PageScript<RemoteInventoryLevel>,
    }

    impl ScriptedPlatform {
        fn push_orders(&self, result: std::result::Result<Page<RemoteOrder>, PlatformError>) {
            self.orders.lock().push_back(result);
        }

        fn push_products(&self, result: std::result::Result<Page<RemoteProduct>, PlatformError>) {
            self.products.lock().push_back(result);
        }
    }

    fn pop<T>(script: &PageScript<T>) -> std::result::Result<Page<T>, PlatformError> {
        script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(Page::last(vec![])))
    }

    #[async_trait]
    impl PlatformApi for ScriptedPlatform {
        async fn exchange_code(
            &self,
            _shop: &str,
            _code: &str,
        ) -> std::result::Result<AccessTokenResponse, PlatformError> {
            unimplemented!("not used by engine tests")
        }

        async fn fetch_products(
            &self,
            _shop: &str,
            _token: &AccessToken,
            _page_info: Option<&str>,
        ) -> std::result::Result<Page<RemoteProduct>, PlatformError> {
            pop(&self.products)
        }

        async fn fetch_orders(
            &self,
            _shop: &str,
            _token: &AccessToken,
            _page_info: Option<&str>,
        ) -> std::result::Result<Page<RemoteOrder>, PlatformError> {
            pop(&self.orders)
        }

        async fn fetch_inventory_levels(
            &self,
            _shop: &str,
            _token: &AccessToken,
            _page_info: Option<&str>,
        ) -> std::result::Result<Page<RemoteInventoryLevel>, PlatformError> {
            pop(&self.inventory)
        }

        async fn register_webhook(
            &self,
            _shop: &str,
            _token: &AccessToken,
            _topic: &str,
            _address: &str,
        ) -> std::result::Result<(), PlatformError> {
            Ok(())
        }
    }

    fn product(id: i64) -> RemoteProduct {
        RemoteProduct {
            id,
            title: format!("P{id}"),
            handle: format!("p{id}"),
            status: "active".to_string(),
            product_type: None,
            vendor: None,
            tags: None,
            updated_at: None,
        }
    }

    fn order(id: i64, item_ids: &[i64]) -> RemoteOrder {
        RemoteOrder {
            id,
            order_number: Some(1000 + id),
            financial_status: Some("paid".to_string()),
            fulfillment_status: None,
            total_price: "10.00".to_string(),
            currency: "USD".to_string(),
            email: None,
            updated_at: None,
            line_items: item_ids
                .iter()
                .map(|item_id| RemoteLineItem {
                    id: *item_id,
                    product_id: None,
                    variant_id: None,
                    title: format!("item {item_id}"),
                    quantity: 1,
                    price: "5.00".to_string(),
                    sku: None,
                })
                .collect(),
        }
    }

    struct Fixture {
        platform: Arc<ScriptedPlatform>,
        store: Arc<InMemorySyncStore>,
        leases: Arc<SyncLeases>,
        engine: SyncEngine,
    }

    async fn fixture() -> Fixture {
        let config = AppConfig::test_config();
        let credentials = Arc::new(InMemoryCredentialStore::new());
        credentials
            .upsert(TenantCredential::new(
                "shop1.example",
                AccessToken::new("tok"),
            ))
            .await
            .unwrap();
        let store = Arc::new(InMemorySyncStore::new());
        let platform = Arc::new(ScriptedPlatform::default());
        let leases = Arc::new(SyncLeases::new(config.lease_ttl));
        let engine = SyncEngine::new(
            config,
            credentials,
            store.clone(),
            platform.clone(),
            leases.clone(),
        );
        Fixture {
            platform,
            store,
            leases,
            engine,
        }
    }

    #[tokio::test]
    async fn test_sync_walks_all_pages() {
        let f = fixture().await;
        f.platform
            .push_products(Ok(Page::with_next(vec![product(1), product(2)], "cursor2")));
        f.platform.push_products(Ok(Page::last(vec![product(3)])));

        let summary = f
            .engine
            .sync_resource("shop1.example", ResourceKind::Products)
            .await
            .unwrap();

        assert_eq!(summary.pages, 2);
        assert_eq!(summary.upserted, 3);
        assert_eq!(f.store.products_for("shop1.example").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_tenant_rejected() {
        let f = fixture().await;
        assert!(matches!(
            f.engine.sync_resource("ghost.example", ResourceKind::Products).await,
            Err(Error::TenantNotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_retried_then_succeeds() {
        let f = fixture().await;
        f.platform
            .push_orders(Err(PlatformError::Transient("503".to_string())));
        f.platform.push_orders(Err(PlatformError::RateLimited {
            retry_after_secs: 4,
        }));
        f.platform.push_orders(Ok(Page::last(vec![order(1, &[11])])));

        let summary = f
            .engine
            .sync_resource("shop1.example", ResourceKind::Orders)
            .await
            .unwrap();

        assert_eq!(summary.pages, 1);
        assert_eq!(summary.upserted, 1);
        assert_eq!(summary.line_items, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion_keeps_partial_progress() {
        let f = fixture().await;
        // First page commits, second page never recovers.
        f.platform
            .push_orders(Ok(Page::with_next(vec![order(1, &[11])], "cursor2")));
        for _ in 0..4 {
            f.platform
                .push_orders(Err(PlatformError::Transient("boom".to_string())));
        }

        let err = f
            .engine
            .sync_resource("shop1.example", ResourceKind::Orders)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SyncFailed { .. }));

        // Committed pages survive; a later run re-converges.
        assert_eq!(f.store.orders_for("shop1.example").await.unwrap().len(), 1);
        // The lease was released despite the failure.
        assert!(!f.leases.is_held("shop1.example", ResourceKind::Orders));
    }

    #[tokio::test]
    async fn test_non_transient_error_fails_immediately() {
        let f = fixture().await;
        f.platform.push_orders(Err(PlatformError::Unauthorized(401)));

        let err = f
            .engine
            .sync_resource("shop1.example", ResourceKind::Orders)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Platform(PlatformError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_concurrent_sync_rejected_while_lease_held() {
        let f = fixture().await;
        let _held = f.leases.acquire("shop1.example", ResourceKind::Orders).unwrap();

        assert!(matches!(
            f.engine.sync_resource("shop1.example", ResourceKind::Orders).await,
            Err(Error::ConcurrentSyncRejected { .. })
        ));

        // Other kinds are unaffected.
        f.platform.push_products(Ok(Page::last(vec![])));
        assert!(f
            .engine
            .sync_resource("shop1.example", ResourceKind::Products)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_resync_reconciles_line_items() {
        let f = fixture().await;
        f.platform.push_orders(Ok(Page::last(vec![order(1, &[11, 12])])));
        f.engine
            .sync_resource("shop1.example", ResourceKind::Orders)
            .await
            .unwrap();
        assert_eq!(f.store.line_items_for("shop1.example", 1).await.unwrap().len(), 2);

        f.platform.push_orders(Ok(Page::last(vec![order(1, &[11])])));
        f.engine
            .sync_resource("shop1.example", ResourceKind::Orders)
            .await
            .unwrap();

        let items = f.store.line_items_for("shop1.example", 1).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].line_item_id, 11);
    }

    #[tokio::test]
    async fn test_resync_unchanged_is_idempotent() {
        let f = fixture().await;
        f.platform.push_products(Ok(Page::last(vec![product(1)])));
        let first = f
            .engine
            .sync_resource("shop1.example", ResourceKind::Products)
            .await
            .unwrap();
        assert_eq!(first.upserted, 1);

        f.platform.push_products(Ok(Page::last(vec![product(1)])));
        let second = f
            .engine
            .sync_resource("shop1.example", ResourceKind::Products)
            .await
            .unwrap();
        assert_eq!(second.upserted, 0);
        assert_eq!(second.unchanged, 1);
    }
}
