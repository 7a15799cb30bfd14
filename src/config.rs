//! Service configuration loaded from environment variables
//!
//! All secrets come from the environment; nothing is hardcoded and nothing
//! secret is ever logged. Two distinct credentials exist and must not be
//! conflated:
//!
//! - `SHOPBRIDGE_API_SECRET` — the OAuth client secret, used only for the
//!   server-to-server authorization-code exchange.
//! - `SHOPBRIDGE_WEBHOOK_SECRET` — the key the platform signs webhook
//!   deliveries with, used only by the signature verifier.

use std::env;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

/// Configuration errors raised at startup
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required environment variable is absent
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),

    /// A variable is present but unparseable
    #[error("invalid value for {var}: {reason}")]
    InvalidVar {
        /// The offending variable name
        var: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

/// Immutable service configuration shared across all components
#[derive(Clone)]
pub struct AppConfig {
    /// OAuth client identifier issued by the platform
    pub api_key: String,
    /// OAuth client secret (token exchange only)
    pub api_secret: String,
    /// Webhook signing secret (signature verification only)
    pub webhook_secret: String,
    /// Absolute callback URL registered with the platform
    pub redirect_uri: String,
    /// Comma-separated permission scopes requested at install time
    pub scopes: String,
    /// Required suffix for tenant shop domains, e.g. `.myshopify.com`
    pub domain_suffix: String,
    /// Platform Admin API version segment
    pub api_version: String,
    /// Items requested per page when pulling collections
    pub page_size: u32,
    /// Lifetime of an authorization attempt before its nonce expires
    pub state_ttl: Duration,
    /// Background sync worker count
    pub sync_workers: usize,
    /// Retry budget per page fetch during a sync run
    pub sync_max_retries: u32,
    /// Deadline for a single background sync task
    pub sync_task_timeout: Duration,
    /// Lease lifetime for per-(shop, resource) sync exclusivity
    pub lease_ttl: Duration,
    /// Timeout applied to each outbound platform request
    pub http_timeout: Duration,
}

/// Largest page size the platform accepts
const MAX_PAGE_SIZE: u32 = 250;

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &self.api_key)
            .field("api_secret", &"***")
            .field("webhook_secret", &"***")
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("domain_suffix", &self.domain_suffix)
            .field("api_version", &self.api_version)
            .field("page_size", &self.page_size)
            .field("state_ttl", &self.state_ttl)
            .field("sync_workers", &self.sync_workers)
            .field("sync_max_retries", &self.sync_max_retries)
            .field("sync_task_timeout", &self.sync_task_timeout)
            .field("lease_ttl", &self.lease_ttl)
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from `SHOPBRIDGE_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingVar` for any absent required variable
    /// and `ConfigError::InvalidVar` for unparseable optional ones.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = required("SHOPBRIDGE_API_KEY")?;
        let api_secret = required("SHOPBRIDGE_API_SECRET")?;
        let webhook_secret = required("SHOPBRIDGE_WEBHOOK_SECRET")?;
        let redirect_uri = required("SHOPBRIDGE_REDIRECT_URI")?;

        if webhook_secret == api_secret {
            // Some platforms sign webhooks with the client secret; that is a
            // legal deployment, but worth a breadcrumb when debugging 401s.
            warn!("webhook secret equals the OAuth client secret");
        }

        let scopes = env::var("SHOPBRIDGE_SCOPES").unwrap_or_else(|_| {
            "read_products,write_products,read_orders,write_orders,read_inventory,write_inventory"
                .to_string()
        });
        let domain_suffix =
            env::var("SHOPBRIDGE_DOMAIN_SUFFIX").unwrap_or_else(|_| ".myshopify.com".to_string());
        let api_version =
            env::var("SHOPBRIDGE_API_VERSION").unwrap_or_else(|_| "2023-10".to_string());

        let page_size = parsed("SHOPBRIDGE_PAGE_SIZE", MAX_PAGE_SIZE)?.clamp(1, MAX_PAGE_SIZE);
        let state_ttl = Duration::from_secs(parsed("SHOPBRIDGE_STATE_TTL_SECS", 600u64)?);
        let sync_workers = parsed("SHOPBRIDGE_SYNC_WORKERS", 2usize)?.max(1);
        let sync_max_retries = parsed("SHOPBRIDGE_SYNC_MAX_RETRIES", 3u32)?;
        let sync_task_timeout =
            Duration::from_secs(parsed("SHOPBRIDGE_SYNC_TASK_TIMEOUT_SECS", 300u64)?);
        let lease_ttl = Duration::from_secs(parsed("SHOPBRIDGE_LEASE_TTL_SECS", 600u64)?);
        let http_timeout = Duration::from_secs(parsed("SHOPBRIDGE_HTTP_TIMEOUT_SECS", 30u64)?);

        Ok(Self {
            api_key,
            api_secret,
            webhook_secret,
            redirect_uri,
            scopes,
            domain_suffix,
            api_version,
            page_size,
            state_ttl,
            sync_workers,
            sync_max_retries,
            sync_task_timeout,
            lease_ttl,
            http_timeout,
        })
    }

    /// Backoff delay before retry attempt `attempt` (0-based), exponential
    /// with a 30s cap. A platform-provided hint overrides this schedule.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let secs = 1u64 << attempt.min(5);
        Duration::from_secs(secs.min(30))
    }

    /// Fixed configuration for tests: deterministic secrets, tiny windows.
    pub fn test_config() -> Self {
        Self {
            api_key: "test-api-key".to_string(),
            api_secret: "test-api-secret".to_string(),
            webhook_secret: "test-webhook-secret".to_string(),
            redirect_uri: "https://app.example.com/auth/callback".to_string(),
            scopes: "read_products,read_orders,read_inventory".to_string(),
            domain_suffix: ".example".to_string(),
            api_version: "2023-10".to_string(),
            page_size: 50,
            state_ttl: Duration::from_secs(600),
            sync_workers: 1,
            sync_max_retries: 2,
            sync_task_timeout: Duration::from_secs(5),
            lease_ttl: Duration::from_secs(60),
            http_timeout: Duration::from_secs(2),
        }
    }
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    match env::var(var) {
        Ok(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigError::MissingVar(var)),
    }
}

fn parsed<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(raw) => raw.parse::<T>().map_err(|e| ConfigError::InvalidVar {
            var,
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}
