//! In-process delivery queue.
//!
//! ```text
//! Dispatcher / ResendCoordinator
//!   └─ queue.enqueue(job)  // try_send, never blocks a request
//!          │
//!          ▼
//!     run_worker (spawned task):
//!          ├─ recv from channel
//!          ├─ acquire semaphore permit (caps concurrency)
//!          └─ spawn: client.deliver() with retries
//!                 ├─ Success → store.mark_delivered()  (persisted jobs only)
//!                 └─ Failure → log; record stays pending for a manual resend
//! ```
//!
//! Delivery is detached from the request that enqueued it and observes only the shutdown token.
//! On shutdown the worker stops accepting jobs and gives everything already queued or in flight
//! `drain_timeout` to finish before aborting it. Aborted notifications stay pending; nothing
//! survives a restart.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use super::client::DeliveryClient;
use crate::config::DeliveryConfig;
use crate::store::NotificationStore;
use crate::types::{IdempotencyKey, abbrev_uuid};

/// A serialized notification ready to send.
#[derive(Debug, Clone)]
pub struct DeliveryJob {
    pub url: String,
    pub token: String,
    pub body: String,
    /// Record to mark delivered on success. `None` for test messages, which are never persisted.
    pub idempotency_key: Option<IdempotencyKey>,
}

/// The job could not be queued.
#[derive(Debug, thiserror::Error)]
pub enum EnqueueError {
    #[error("delivery queue is full")]
    Full,
    #[error("delivery queue is shut down")]
    Closed,
}

impl From<mpsc::error::TrySendError<DeliveryJob>> for EnqueueError {
    fn from(err: mpsc::error::TrySendError<DeliveryJob>) -> Self {
        match err {
            mpsc::error::TrySendError::Full(_) => EnqueueError::Full,
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
        }
    }
}

/// Handle for submitting jobs to the delivery worker. Cheap to clone.
#[derive(Debug, Clone)]
pub struct DeliveryQueue {
    tx: mpsc::Sender<DeliveryJob>,
}

impl DeliveryQueue {
    /// Create the queue and spawn its worker. The returned handle completes once the worker has
    /// drained after `shutdown` is cancelled.
    pub fn spawn(
        client: DeliveryClient,
        store: Arc<dyn NotificationStore>,
        config: &DeliveryConfig,
        shutdown: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.channel_capacity);
        let handle = tokio::spawn(run_worker(
            rx,
            client,
            store,
            config.max_concurrent_deliveries,
            config.drain_timeout(),
            shutdown,
        ));
        (Self { tx }, handle)
    }

    pub fn enqueue(&self, job: DeliveryJob) -> Result<(), EnqueueError> {
        self.tx.try_send(job)?;
        Ok(())
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<DeliveryJob>,
    client: DeliveryClient,
    store: Arc<dyn NotificationStore>,
    max_concurrent_deliveries: usize,
    drain_timeout: Duration,
    shutdown: CancellationToken,
) {
    let semaphore = Arc::new(Semaphore::new(max_concurrent_deliveries));
    let mut in_flight = JoinSet::new();

    loop {
        let job = tokio::select! {
            job = rx.recv() => {
                match job {
                    Some(j) => j,
                    None => {
                        tracing::debug!("Delivery channel closed, shutting down");
                        break;
                    }
                }
            }
            _ = shutdown.cancelled() => {
                tracing::debug!("Delivery worker received shutdown signal");
                break;
            }
            // Reap finished deliveries so the set does not grow unbounded
            Some(_) = in_flight.join_next(), if !in_flight.is_empty() => continue,
        };

        let permit = tokio::select! {
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => {
                    tracing::warn!("Delivery semaphore closed");
                    break;
                }
            },
            _ = shutdown.cancelled() => {
                spawn_leftover(&mut in_flight, &semaphore, &client, &store, job);
                break;
            }
        };

        let client = client.clone();
        let store = store.clone();
        in_flight.spawn(async move {
            let _permit = permit;
            process_job(&client, store.as_ref(), job).await;
        });
    }

    // Stop accepting; jobs already queued share the drain window with in-flight ones
    rx.close();
    while let Ok(job) = rx.try_recv() {
        spawn_leftover(&mut in_flight, &semaphore, &client, &store, job);
    }

    if !in_flight.is_empty() {
        tracing::info!(pending = in_flight.len(), "Draining deliveries");
        let drained = tokio::time::timeout(drain_timeout, async {
            while in_flight.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            counter!("paynotify_deliveries_total", "outcome" => "aborted").increment(in_flight.len() as u64);
            tracing::warn!(
                aborted = in_flight.len(),
                timeout_secs = drain_timeout.as_secs(),
                "Drain timeout reached, aborting remaining deliveries"
            );
            in_flight.abort_all();
            while in_flight.join_next().await.is_some() {}
        }
    }

    tracing::debug!("Delivery worker exited");
}

/// Spawn a job received after shutdown began. It waits for a permit inside its own task so the
/// worker can move on to draining.
fn spawn_leftover(
    in_flight: &mut JoinSet<()>,
    semaphore: &Arc<Semaphore>,
    client: &DeliveryClient,
    store: &Arc<dyn NotificationStore>,
    job: DeliveryJob,
) {
    let semaphore = semaphore.clone();
    let client = client.clone();
    let store = store.clone();
    in_flight.spawn(async move {
        let Ok(_permit) = semaphore.acquire_owned().await else {
            return;
        };
        process_job(&client, store.as_ref(), job).await;
    });
}

async fn process_job(client: &DeliveryClient, store: &dyn NotificationStore, job: DeliveryJob) {
    let key = job.idempotency_key.as_ref().map(abbrev_uuid);

    match client.deliver(&job.url, &job.token, &job.body).await {
        Ok(receipt) => {
            counter!("paynotify_deliveries_total", "outcome" => "success").increment(1);
            tracing::info!(
                idempotency_key = ?key,
                url = %job.url,
                attempts = receipt.attempts,
                status = receipt.status,
                "Webhook delivered"
            );

            let Some(idempotency_key) = job.idempotency_key else {
                return;
            };
            if let Err(e) = store.mark_delivered(idempotency_key).await {
                tracing::warn!(error = %e, idempotency_key = ?key, "Failed to mark notification as delivered");
            }
        }
        Err(e) => {
            counter!("paynotify_deliveries_total", "outcome" => "failure").increment(1);
            tracing::warn!(
                idempotency_key = ?key,
                url = %job.url,
                status_code = ?e.status(),
                error = %e,
                "Webhook delivery failed"
            );
        }
    }
}
