//! Background sync queue and worker pool
//!
//! Decouples sync work from request threads. `submit` hands a task to the
//! pool and returns its id; workers run the engine under a per-task
//! deadline and redeliver on timeout or transient failure, so execution is
//! at-least-once — safe because every write the engine makes is an
//! idempotent upsert. Terminal outcomes (coalesced duplicate, unknown
//! tenant, credential rejection) are never redelivered.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::Error;
use crate::metrics::ServiceMetrics;
use crate::sync::engine::SyncEngine;
use crate::sync::ResourceKind;

/// Redelivery bound: a task is attempted at most this many times
const MAX_TASK_ATTEMPTS: u32 = 3;

/// One unit of background sync work
#[derive(Debug, Clone)]
pub struct SyncTask {
    /// Stable id returned to the caller at submit time
    pub id: Uuid,
    /// Shop to sync
    pub shop_domain: String,
    /// Collection to sync
    pub kind: ResourceKind,
    /// Delivery attempts so far
    pub attempts: u32,
}

/// Submission handle for the background queue
#[derive(Clone)]
pub struct SyncQueue {
    task_sender: mpsc::Sender<SyncTask>,
}

impl SyncQueue {
    /// Create a queue and the runner that drives its worker pool
    pub fn new(
        engine: Arc<SyncEngine>,
        metrics: Arc<ServiceMetrics>,
        config: AppConfig,
    ) -> (Self, SyncQueueRunner) {
        let (tx, rx) = mpsc::channel(256);
        (
            Self {
                task_sender: tx.clone(),
            },
            SyncQueueRunner {
                engine,
                metrics,
                config,
                task_sender: tx,
                task_receiver: rx,
            },
        )
    }

    /// Submit a sync task; returns its id once the queue accepted it
    pub async fn submit(&self, shop_domain: &str, kind: ResourceKind) -> Result<Uuid, Error> {
        let task = SyncTask {
            id: Uuid::new_v4(),
            shop_domain: shop_domain.to_string(),
            kind,
            attempts: 0,
        };
        let id = task.id;
        self.task_sender
            .send(task)
            .await
            .map_err(|e| Error::internal(format!("sync queue unavailable: {e}")))?;
        Ok(id)
    }
}

/// Drives the worker pool; spawn `run` once at startup
pub struct SyncQueueRunner {
    engine: Arc<SyncEngine>,
    metrics: Arc<ServiceMetrics>,
    config: AppConfig,
    task_sender: mpsc::Sender<SyncTask>,
    task_receiver: mpsc::Receiver<SyncTask>,
}

impl SyncQueueRunner {
    /// Run the configured number of workers over the shared queue
    pub async fn run(self) {
        let SyncQueueRunner {
            engine,
            metrics,
            config,
            task_sender,
            task_receiver,
        } = self;

        info!(workers = config.sync_workers, "sync worker pool started");
        let receiver = Arc::new(Mutex::new(task_receiver));

        let workers: Vec<_> = (0..config.sync_workers)
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    Arc::clone(&receiver),
                    Arc::clone(&engine),
                    Arc::clone(&metrics),
                    config.clone(),
                    task_sender.clone(),
                ))
            })
            .collect();

        futures::future::join_all(workers).await;
        info!("sync worker pool shut down");
    }
}

async fn worker_loop(
    worker_id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<SyncTask>>>,
    engine: Arc<SyncEngine>,
    metrics: Arc<ServiceMetrics>,
    config: AppConfig,
    task_sender: mpsc::Sender<SyncTask>,
) {
    loop {
        // Hold the receiver lock only for the dequeue itself.
        let task = { receiver.lock().await.recv().await };
        let Some(task) = task else {
            debug!(worker_id, "sync worker exiting");
            return;
        };
        run_task(&engine, &metrics, &config, &task_sender, task).await;
    }
}

async fn run_task(
    engine: &Arc<SyncEngine>,
    metrics: &Arc<ServiceMetrics>,
    config: &AppConfig,
    task_sender: &mpsc::Sender<SyncTask>,
    task: SyncTask,
) {
    let attempt = task.attempts + 1;
    debug!(
        task_id = %task.id,
        shop = %task.shop_domain,
        kind = %task.kind,
        attempt,
        "sync task starting"
    );

    let outcome = tokio::time::timeout(
        config.sync_task_timeout,
        engine.sync_resource(&task.shop_domain, task.kind),
    )
    .await;

    match outcome {
        Ok(Ok(summary)) => {
            metrics.record_sync_completed();
            info!(
                task_id = %task.id,
                shop = %summary.shop_domain,
                kind = %summary.kind,
                pages = summary.pages,
                upserted = summary.upserted,
                duration_ms = summary.duration_ms,
                "sync task completed"
            );
        }
        Ok(Err(Error::ConcurrentSyncRejected { shop, kind })) => {
            // Another run holds the lease; that run will converge the data.
            debug!(task_id = %task.id, shop = %shop, kind = %kind, "sync task coalesced");
        }
        Ok(Err(Error::TenantNotFound(shop))) => {
            warn!(task_id = %task.id, shop = %shop, "sync task dropped: shop not installed");
        }
        Ok(Err(err)) if is_redeliverable(&err) => {
            redeliver_or_fail(metrics, config, task_sender, task, err.to_string()).await;
        }
        Ok(Err(err)) => {
            metrics.record_sync_failed();
            error!(task_id = %task.id, error = %err, "sync task failed terminally");
        }
        Err(_elapsed) => {
            // The engine future was dropped at its deadline; its lease
            // guard released with it, so a redelivery can start cleanly.
            redeliver_or_fail(
                metrics,
                config,
                task_sender,
                task,
                format!("deadline of {:?} exceeded", config.sync_task_timeout),
            )
            .await;
        }
    }
}

fn is_redeliverable(err: &Error) -> bool {
    matches!(err, Error::SyncFailed { .. })
}

async fn redeliver_or_fail(
    metrics: &Arc<ServiceMetrics>,
    config: &AppConfig,
    task_sender: &mpsc::Sender<SyncTask>,
    mut task: SyncTask,
    reason: String,
) {
    task.attempts += 1;
    if task.attempts >= MAX_TASK_ATTEMPTS {
        metrics.record_sync_failed();
        error!(
            task_id = %task.id,
            shop = %task.shop_domain,
            kind = %task.kind,
            attempts = task.attempts,
            reason = %reason,
            "sync task exhausted its attempts"
        );
        return;
    }

    warn!(
        task_id = %task.id,
        shop = %task.shop_domain,
        kind = %task.kind,
        attempt = task.attempts,
        reason = %reason,
        "sync task will be redelivered"
    );

    let delay = config.retry_delay(task.attempts - 1);
    let sender = task_sender.clone();
    // Delayed off-worker so a backlogged queue keeps draining meanwhile.
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if sender.send(task).await.is_err() {
            debug!("sync queue closed before redelivery");
        }
    });
}
