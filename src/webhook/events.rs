//! Webhook topics and payload types
//!
//! Topics form a closed set: routing happens over this enum, and anything
//! the platform sends outside it lands on `Unknown` — acknowledged,
//! logged, never processed. The three compliance topics carry the typed
//! payloads defined here; ordinary catalog/order topics reuse the platform
//! wire types.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Webhook topics this service dispatches on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WebhookTopic {
    /// A product was created
    #[serde(rename = "products/create")]
    ProductsCreate,
    /// A product was updated
    #[serde(rename = "products/update")]
    ProductsUpdate,
    /// An order was created
    #[serde(rename = "orders/create")]
    OrdersCreate,
    /// An order was updated
    #[serde(rename = "orders/updated")]
    OrdersUpdated,
    /// Mandated: a customer requested their data
    #[serde(rename = "customers/data_request")]
    CustomersDataRequest,
    /// Mandated: erase a customer's data
    #[serde(rename = "customers/redact")]
    CustomersRedact,
    /// Mandated: erase everything for an uninstalled shop
    #[serde(rename = "shop/redact")]
    ShopRedact,
    /// Anything else — acknowledged but never dispatched
    #[serde(other)]
    Unknown,
}

impl FromStr for WebhookTopic {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "products/create" => Self::ProductsCreate,
            "products/update" => Self::ProductsUpdate,
            "orders/create" => Self::OrdersCreate,
            "orders/updated" => Self::OrdersUpdated,
            "customers/data_request" => Self::CustomersDataRequest,
            "customers/redact" => Self::CustomersRedact,
            "shop/redact" => Self::ShopRedact,
            _ => Self::Unknown,
        })
    }
}

impl WebhookTopic {
    /// The three topics every installation must subscribe to
    pub const COMPLIANCE: [WebhookTopic; 3] = [
        WebhookTopic::CustomersDataRequest,
        WebhookTopic::CustomersRedact,
        WebhookTopic::ShopRedact,
    ];

    /// Topic string as the platform spells it
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProductsCreate => "products/create",
            Self::ProductsUpdate => "products/update",
            Self::OrdersCreate => "orders/create",
            Self::OrdersUpdated => "orders/updated",
            Self::CustomersDataRequest => "customers/data_request",
            Self::CustomersRedact => "customers/redact",
            Self::ShopRedact => "shop/redact",
            Self::Unknown => "unknown",
        }
    }

    /// Build a topic from URL path segments `/webhooks/{resource}/{event}`
    pub fn from_path(resource: &str, event: &str) -> Self {
        // Infallible error type means this can never fail
        Self::from_str(&format!("{resource}/{event}")).unwrap()
    }

    /// Whether this is one of the mandated data-subject-rights topics
    pub fn is_compliance(&self) -> bool {
        Self::COMPLIANCE.contains(self)
    }

    /// Whether this topic is in the dispatch set
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl std::fmt::Display for WebhookTopic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Customer named in a compliance payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerRef {
    /// Remote customer id
    #[serde(default)]
    pub id: Option<i64>,
    /// Customer email
    #[serde(default)]
    pub email: Option<String>,
}

/// Payload of `customers/data_request`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataRequestPayload {
    /// Shop the request concerns
    pub shop_domain: String,
    /// Customer whose data was requested
    #[serde(default)]
    pub customer: Option<CustomerRef>,
    /// Specific orders named in the request
    #[serde(default)]
    pub orders_requested: Vec<i64>,
}

/// Payload of `customers/redact`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerRedactPayload {
    /// Shop the erasure concerns
    pub shop_domain: String,
    /// Customer to erase
    #[serde(default)]
    pub customer: Option<CustomerRef>,
    /// Orders whose records must be deleted
    #[serde(default)]
    pub orders_to_redact: Vec<i64>,
}

/// Payload of `shop/redact`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShopRedactPayload {
    /// Shop to erase entirely
    pub shop_domain: String,
}
