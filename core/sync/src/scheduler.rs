//! Sync scheduling - on-demand and periodic triggers.
//!
//! The scheduler is the single worker that invokes sync cycles. Triggers
//! that arrive while a cycle runs are dropped, never queued: missed interval
//! ticks are skipped and requests already waiting when a cycle finishes are
//! answered with [`CycleOutcome::Busy`].

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use concur_common::{Error, Result};

use crate::controller::CycleOutcome;

/// Capacity of the request channel.
const REQUEST_QUEUE: usize = 100;

/// Sync mode configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMode {
    /// Manual sync only.
    Manual,
    /// Sync triggered immediately on changes.
    OnDemand,
    /// Sync at regular intervals.
    Periodic { interval: Duration },
    /// Both on-demand and periodic.
    Hybrid { interval: Duration },
}

impl SyncMode {
    fn interval(&self) -> Option<Duration> {
        match self {
            SyncMode::Periodic { interval } | SyncMode::Hybrid { interval } => Some(*interval),
            _ => None,
        }
    }

    fn reacts_to_changes(&self) -> bool {
        matches!(self, SyncMode::OnDemand | SyncMode::Hybrid { .. })
    }
}

/// Sync request types.
#[derive(Debug)]
pub enum SyncRequest {
    /// Explicit request for a cycle.
    Full,
    /// Local documents changed.
    Changed(Vec<String>),
    /// Shutdown the scheduler.
    Shutdown,
}

type Envelope = (SyncRequest, Option<oneshot::Sender<CycleOutcome>>);

/// Client side of the scheduler; cheap to clone.
#[derive(Clone)]
pub struct SyncScheduler {
    mode: Arc<RwLock<SyncMode>>,
    request_tx: mpsc::Sender<Envelope>,
}

impl SyncScheduler {
    /// Create a new scheduler with the given mode.
    pub fn new(mode: SyncMode) -> (Self, SyncSchedulerHandle) {
        let (request_tx, request_rx) = mpsc::channel(REQUEST_QUEUE);
        let mode = Arc::new(RwLock::new(mode));

        let scheduler = Self {
            mode: mode.clone(),
            request_tx,
        };
        let handle = SyncSchedulerHandle { mode, request_rx };

        (scheduler, handle)
    }

    /// Request a cycle and wait for its outcome.
    ///
    /// # Errors
    /// - `Error::Scheduler` if the scheduler is not running
    pub async fn request_sync(&self) -> Result<CycleOutcome> {
        let (response_tx, response_rx) = oneshot::channel();

        self.request_tx
            .send((SyncRequest::Full, Some(response_tx)))
            .await
            .map_err(|_| Error::Scheduler("Scheduler not running".to_string()))?;

        response_rx
            .await
            .map_err(|_| Error::Scheduler("Failed to receive sync outcome".to_string()))
    }

    /// Notify the scheduler that local documents changed.
    ///
    /// Ignored unless the mode reacts to changes. Never waits for a cycle.
    pub async fn notify_change(&self, paths: Vec<String>) {
        let mode = self.mode.read().await.clone();
        if !mode.reacts_to_changes() {
            debug!("Change notification ignored (mode: {:?})", mode);
            return;
        }

        if self
            .request_tx
            .try_send((SyncRequest::Changed(paths), None))
            .is_err()
        {
            debug!("Change notification dropped, scheduler busy or stopped");
        }
    }

    /// Change the sync mode.
    pub async fn set_mode(&self, mode: SyncMode) {
        *self.mode.write().await = mode;
    }

    /// Get current sync mode.
    pub async fn get_mode(&self) -> SyncMode {
        self.mode.read().await.clone()
    }

    /// Shutdown the scheduler.
    pub async fn shutdown(&self) {
        let _ = self.request_tx.send((SyncRequest::Shutdown, None)).await;
    }
}

/// Worker side of the scheduler.
pub struct SyncSchedulerHandle {
    mode: Arc<RwLock<SyncMode>>,
    request_rx: mpsc::Receiver<Envelope>,
}

impl SyncSchedulerHandle {
    /// Run the scheduler until shutdown.
    ///
    /// This should be spawned in a tokio task. `sync_fn` runs one cycle and
    /// is never called concurrently with itself.
    pub async fn run<F, Fut>(mut self, sync_fn: F)
    where
        F: Fn(SyncRequest) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = CycleOutcome> + Send,
    {
        let mut current = self.mode.read().await.interval();
        let mut ticker = current.map(periodic);

        info!("Sync scheduler started");

        loop {
            let request = tokio::select! {
                received = self.request_rx.recv() => match received {
                    Some(envelope) => Some(envelope),
                    None => {
                        debug!("All scheduler clients dropped");
                        break;
                    }
                },
                _ = wait_for_tick(&mut ticker) => None,
            };

            let (request, response_tx) = match request {
                Some((SyncRequest::Shutdown, _)) => {
                    info!("Sync scheduler shutting down");
                    break;
                }
                Some((request, response_tx)) => {
                    debug!("Processing sync request: {:?}", request);
                    (request, response_tx)
                }
                None => {
                    debug!("Triggering periodic sync");
                    (SyncRequest::Full, None)
                }
            };

            let outcome = sync_fn(request).await;
            if let CycleOutcome::Aborted { reason } = &outcome {
                warn!("Scheduled sync aborted: {}", reason);
            }

            let shutdown = self.drain_pending();
            if let Some(tx) = response_tx {
                let _ = tx.send(outcome);
            }
            if shutdown {
                info!("Sync scheduler shutting down");
                break;
            }

            let expected = self.mode.read().await.interval();
            if expected != current {
                current = expected;
                ticker = current.map(periodic);
            }
        }
    }

    /// Drop requests that arrived during the last cycle.
    ///
    /// Returns true if a shutdown request was among them.
    fn drain_pending(&mut self) -> bool {
        let mut dropped = 0;
        while let Ok((request, response_tx)) = self.request_rx.try_recv() {
            if matches!(request, SyncRequest::Shutdown) {
                return true;
            }
            if let Some(tx) = response_tx {
                let _ = tx.send(CycleOutcome::Busy);
            }
            dropped += 1;
        }
        if dropped > 0 {
            debug!(dropped, "Dropped triggers received during cycle");
        }
        false
    }
}

fn periodic(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

async fn wait_for_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
