//! Status and health check handlers
//!
//! - `GET /health` — liveness probe for systemd/load balancers
//! - `GET /ready` — readiness probe
//! - `GET /status` — uptime, webhook/sync counters, latency percentiles,
//!   and process memory

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, instrument};

use crate::http::AppState;
use crate::metrics::LatencyMetrics;

/// Server version from Cargo.toml
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Server name from Cargo.toml
pub const SERVER_NAME: &str = env!("CARGO_PKG_NAME");

/// Health check response for simple liveness probes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Health status (always "healthy" if responding)
    pub status: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "healthy".to_string(),
        }
    }
}

/// Memory usage metrics collected from sysinfo
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryMetrics {
    /// Resident Set Size in bytes
    pub rss_bytes: u64,
    /// Virtual memory size in bytes
    pub virtual_bytes: u64,
}

/// Webhook ingestion counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookCounters {
    /// Deliveries that passed verification
    pub accepted: u64,
    /// Deliveries rejected by the verifier
    pub rejected: u64,
    /// Duplicate deliveries suppressed
    pub duplicate: u64,
}

/// Background sync counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncCounters {
    /// Completed runs
    pub completed: u64,
    /// Runs that exhausted their attempts
    pub failed: u64,
    /// Leases currently held
    pub in_flight: usize,
}

/// Detailed server status response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Server version
    pub version: String,
    /// Server name
    pub name: String,
    /// Uptime in seconds
    pub uptime_seconds: u64,
    /// Successful installs since start
    pub installs: u64,
    /// Webhook counters
    pub webhooks: WebhookCounters,
    /// Sync counters
    pub syncs: SyncCounters,
    /// Process memory
    pub memory: MemoryMetrics,
    /// Request latency percentiles
    pub latency: LatencyMetrics,
    /// Always "running" if responding
    pub status: String,
    /// ISO8601 timestamp of when status was generated
    pub timestamp: String,
}

/// Collect memory metrics for the current process
fn collect_memory_metrics() -> MemoryMetrics {
    let pid = Pid::from_u32(std::process::id());
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);

    match system.process(pid) {
        Some(process) => MemoryMetrics {
            rss_bytes: process.memory(),
            virtual_bytes: process.virtual_memory(),
        },
        None => {
            debug!("could not find current process in sysinfo");
            MemoryMetrics::default()
        }
    }
}

/// `GET /health`
#[instrument(skip_all)]
pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse::default()))
}

/// `GET /ready`
#[instrument(skip_all)]
pub async fn readiness_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse::default()))
}

/// `GET /status`
#[instrument(skip_all)]
pub async fn status_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let metrics = &state.metrics;
    let response = StatusResponse {
        version: SERVER_VERSION.to_string(),
        name: SERVER_NAME.to_string(),
        uptime_seconds: metrics.uptime_seconds(),
        installs: metrics.installs(),
        webhooks: WebhookCounters {
            accepted: metrics.webhooks_accepted(),
            rejected: metrics.webhooks_rejected(),
            duplicate: metrics.webhooks_duplicate(),
        },
        syncs: SyncCounters {
            completed: metrics.syncs_completed(),
            failed: metrics.syncs_failed(),
            in_flight: state.leases.active(),
        },
        memory: collect_memory_metrics(),
        latency: metrics.latency_metrics(),
        status: "running".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(response))
}
