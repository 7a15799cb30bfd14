//! HTTP surface
//!
//! Thin axum handlers over the core subsystems. Routing:
//!
//! - `GET  /auth`, `GET /auth/callback`, `GET /installed` — OAuth flow
//! - `POST /webhooks/:resource/:event` — all webhook topics, compliance
//!   and ordinary alike, behind one signature-verified entry point
//! - `GET  /api/:resource`, `POST /api/sync/:resource` — read and sync APIs
//! - `GET  /health`, `/ready`, `/status` — probes and runtime metrics

pub mod api;
pub mod auth;
pub mod status;
pub mod webhooks;

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tokio::task::JoinHandle;

use crate::config::AppConfig;
use crate::metrics::ServiceMetrics;
use crate::oauth::OAuthController;
use crate::platform::PlatformApi;
use crate::store::{
    AuthAttemptStore, CredentialStore, InMemoryAuthAttemptStore, InMemoryCredentialStore,
    InMemoryReceiptLog, InMemorySyncStore, ReceiptLog, SyncStore,
};
use crate::sync::{SyncEngine, SyncLeases, SyncQueue, SyncQueueRunner};
use crate::webhook::processor::ProcessorHandle;
use crate::webhook::{
    ComplianceHandler, ExportSink, LoggingExportSink, SignatureVerifier, WebhookProcessor,
};

/// Everything the handlers need, shared behind one `Arc`
pub struct AppState {
    /// Service configuration
    pub config: AppConfig,
    /// Installed-tenant credentials
    pub credentials: Arc<dyn CredentialStore>,
    /// In-flight OAuth attempts
    pub attempts: Arc<dyn AuthAttemptStore>,
    /// Synchronized entity snapshots
    pub sync_store: Arc<dyn SyncStore>,
    /// Webhook delivery log
    pub receipts: Arc<dyn ReceiptLog>,
    /// OAuth flow coordinator
    pub oauth: OAuthController,
    /// Webhook signature verifier
    pub verifier: SignatureVerifier,
    /// Compliance-topic handlers
    pub compliance: ComplianceHandler,
    /// Ordinary-webhook background processor
    pub processor: WebhookProcessor,
    /// Background sync queue
    pub sync_queue: SyncQueue,
    /// Per-(shop, resource) sync leases
    pub leases: Arc<SyncLeases>,
    /// Runtime counters
    pub metrics: Arc<ServiceMetrics>,
}

/// Background loops that must be spawned alongside the server
pub struct BackgroundWorkers {
    /// Ordinary-webhook processing loop
    pub processor: ProcessorHandle,
    /// Sync worker pool
    pub sync_runner: SyncQueueRunner,
}

impl BackgroundWorkers {
    /// Spawn every worker onto the current runtime
    pub fn spawn(self) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(self.processor.run()),
            tokio::spawn(self.sync_runner.run()),
        ]
    }
}

impl AppState {
    /// Assemble the full service over in-memory stores and the default
    /// logging export sink
    pub fn new(
        config: AppConfig,
        platform: Arc<dyn PlatformApi>,
    ) -> (Arc<Self>, BackgroundWorkers) {
        Self::with_export_sink(config, platform, Arc::new(LoggingExportSink))
    }

    /// Assemble the service with a custom export sink
    pub fn with_export_sink(
        config: AppConfig,
        platform: Arc<dyn PlatformApi>,
        export_sink: Arc<dyn ExportSink>,
    ) -> (Arc<Self>, BackgroundWorkers) {
        let credentials: Arc<dyn CredentialStore> = Arc::new(InMemoryCredentialStore::new());
        let attempts: Arc<dyn AuthAttemptStore> = Arc::new(InMemoryAuthAttemptStore::new());
        let sync_store: Arc<dyn SyncStore> = Arc::new(InMemorySyncStore::new());
        let receipts: Arc<dyn ReceiptLog> = Arc::new(InMemoryReceiptLog::new());
        let metrics = Arc::new(ServiceMetrics::new());
        let leases = Arc::new(SyncLeases::new(config.lease_ttl));

        let oauth = OAuthController::new(
            config.clone(),
            Arc::clone(&attempts),
            Arc::clone(&credentials),
            Arc::clone(&platform),
        );
        let verifier = SignatureVerifier::new(&config.webhook_secret);
        let compliance = ComplianceHandler::new(
            Arc::clone(&credentials),
            Arc::clone(&sync_store),
            Arc::clone(&receipts),
            export_sink,
        );
        let (processor, processor_handle) = WebhookProcessor::new(
            Arc::clone(&sync_store),
            Arc::clone(&receipts),
            config.clone(),
        );
        let engine = Arc::new(SyncEngine::new(
            config.clone(),
            Arc::clone(&credentials),
            Arc::clone(&sync_store),
            platform,
            Arc::clone(&leases),
        ));
        let (sync_queue, sync_runner) =
            SyncQueue::new(engine, Arc::clone(&metrics), config.clone());

        let state = Arc::new(AppState {
            config,
            credentials,
            attempts,
            sync_store,
            receipts,
            oauth,
            verifier,
            compliance,
            processor,
            sync_queue,
            leases,
            metrics,
        });

        (
            state,
            BackgroundWorkers {
                processor: processor_handle,
                sync_runner,
            },
        )
    }
}

/// Build the service router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/auth", get(auth::begin_auth))
        .route("/auth/callback", get(auth::auth_callback))
        .route("/installed", get(auth::installed_page))
        .route("/webhooks/:resource/:event", post(webhooks::receive_webhook))
        .route("/api/:resource", get(api::get_resource))
        .route("/api/sync/:resource", post(api::start_sync))
        .route("/health", get(status::health_handler))
        .route("/ready", get(status::readiness_handler))
        .route("/status", get(status::status_handler))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            track_requests,
        ))
        .with_state(state)
}

/// Record request count and latency for every response
async fn track_requests(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let response = next.run(request).await;
    state.metrics.record_request(started.elapsed());
    response
}
