//! Sync cycle controller.
//!
//! Owns the Idle/Running state machine and runs one reconciliation cycle
//! at a time: fetch, apply remote changes, scan for local changes, push,
//! then persist the state record. Failures never escape a cycle.

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use concur_common::{Error, Result, VaultPath};
use concur_remote::RemoteApi;
use concur_storage::LocalVault;

use crate::config::{ChangeDetection, SyncConfig};
use crate::fetch::RemoteChangeFetcher;
use crate::push::ChangePusher;
use crate::reconcile::Reconciler;
use crate::state::{StateStore, SyncState};

/// State of the cycle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Running,
}

/// Result of a call to [`SyncController::check_for_changes`].
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    /// Another cycle was in flight; nothing was done.
    Busy,
    /// The cycle ran to the end. Individual legs may still have failed.
    Completed(SyncReport),
    /// A local failure stopped the cycle before the state was written.
    Aborted { reason: String },
}

impl CycleOutcome {
    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            CycleOutcome::Completed(report) => Some(report),
            _ => None,
        }
    }
}

/// Summary of a completed cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Local documents written from remote records.
    pub remote_applied: usize,
    /// Documents accepted by the remote.
    pub pushed: usize,
    /// Documents whose marker was refreshed without a push.
    pub refreshed: usize,
    /// The fetch leg failed and was skipped.
    pub fetch_failed: bool,
    /// The push leg failed; markers and watermark were left as they were.
    pub push_failed: bool,
    pub duration: Duration,
}

/// Snapshot of the persisted state and pending local work.
#[derive(Debug, Clone)]
pub struct SyncStatus {
    pub state: CycleState,
    pub watermark_ms: i64,
    pub marker_count: usize,
    pub pending: Vec<VaultPath>,
}

/// Busy flag with an atomic check-and-set.
#[derive(Debug, Default)]
struct CycleGate {
    running: AtomicBool,
}

impl CycleGate {
    fn try_enter(&self) -> Option<CycleGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CycleGuard { gate: self })
    }

    fn state(&self) -> CycleState {
        if self.running.load(Ordering::Acquire) {
            CycleState::Running
        } else {
            CycleState::Idle
        }
    }
}

/// Returns the gate to Idle when dropped, including on cancellation.
struct CycleGuard<'a> {
    gate: &'a CycleGate,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.gate.running.store(false, Ordering::Release);
    }
}

/// Drives sync cycles between a local vault and a remote store.
pub struct SyncController<V: LocalVault + ?Sized, R: RemoteApi + ?Sized> {
    vault: Arc<V>,
    remote: Arc<R>,
    store: StateStore,
    config: SyncConfig,
    gate: CycleGate,
}

impl<V: LocalVault + ?Sized, R: RemoteApi + ?Sized> SyncController<V, R> {
    /// Create a controller.
    ///
    /// # Errors
    /// - `Error::Config` if the configuration is unusable
    pub fn new(vault: Arc<V>, remote: Arc<R>, store: StateStore, config: SyncConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            vault,
            remote,
            store,
            config,
            gate: CycleGate::default(),
        })
    }

    pub fn state(&self) -> CycleState {
        self.gate.state()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Load the state record, treating a corrupt record as empty.
    pub async fn load_or_reset(&self) -> Result<SyncState> {
        match self.store.load().await {
            Ok(state) => Ok(state),
            Err(Error::CorruptState(reason)) => {
                warn!(
                    path = %self.store.path().display(),
                    "Sync state is corrupt, starting over: {}", reason
                );
                Ok(SyncState::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Run one cycle unless one is already running.
    ///
    /// Never fails; the outcome describes what happened.
    pub async fn check_for_changes(&self) -> CycleOutcome {
        let Some(_guard) = self.gate.try_enter() else {
            debug!("Sync cycle already running, skipping");
            return CycleOutcome::Busy;
        };

        let start = Instant::now();
        match self.run_cycle().await {
            Ok(mut report) => {
                report.duration = start.elapsed();
                info!(
                    applied = report.remote_applied,
                    pushed = report.pushed,
                    fetch_failed = report.fetch_failed,
                    push_failed = report.push_failed,
                    "Sync cycle completed in {:?}",
                    report.duration
                );
                CycleOutcome::Completed(report)
            }
            Err(e) => {
                error!("Sync cycle aborted: {}", e);
                CycleOutcome::Aborted {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Persisted state plus the documents the next cycle would push.
    pub async fn status(&self) -> Result<SyncStatus> {
        let state = self.load_or_reset().await?;
        let reconciler = Reconciler::new(self.vault.as_ref(), self.config.change_detection);
        let scan = reconciler.scan_local(&state).await?;

        Ok(SyncStatus {
            state: self.state(),
            watermark_ms: state.watermark(),
            marker_count: state.marker_count(),
            pending: scan.push.into_iter().map(|doc| doc.path).collect(),
        })
    }

    async fn run_cycle(&self) -> Result<SyncReport> {
        let mut state = self.load_or_reset().await?;
        let mut report = SyncReport::default();
        let store_id = self.config.store_id;
        let reconciler = Reconciler::new(self.vault.as_ref(), self.config.change_detection);

        let fetcher = RemoteChangeFetcher::new(self.remote.as_ref(), store_id);
        match fetcher.fetch(state.watermark_seconds()).await {
            Ok(records) if records.is_empty() => {}
            Ok(records) => {
                let local = self.vault.list_documents().await?;
                let actions = reconciler.plan_remote(records, &local, store_id);
                report.remote_applied = reconciler.apply(&actions, &mut state).await?;
            }
            Err(e) => {
                warn!("Skipping remote changes this cycle: {}", e);
                report.fetch_failed = true;
            }
        }

        let scan = reconciler.scan_local(&state).await?;
        for doc in &scan.refreshed {
            state.set_marker(&doc.path, doc.stat.mtime);
        }
        report.refreshed = scan.refreshed.len();

        let pusher = ChangePusher::new(self.remote.as_ref(), store_id, self.config.push_mode);
        let pending = pusher.prepare(self.vault.as_ref(), &scan.push).await?;

        if !pending.is_empty() {
            let files: Vec<_> = pending.iter().map(|p| p.file.clone()).collect();
            match pusher.push(&files).await {
                Ok(()) => {
                    for item in &pending {
                        state.set_marker(&item.path, item.mtime);
                        if self.config.change_detection == ChangeDetection::MtimeAndHash {
                            if let Some(hash) = &item.file.content_hash {
                                state.set_hash(&item.path, hash.clone());
                            }
                        }
                    }
                    state.advance_watermark(Utc::now().timestamp_millis());
                    report.pushed = pending.len();
                }
                Err(e) => {
                    warn!(count = pending.len(), "Push failed, will retry next cycle: {}", e);
                    report.push_failed = true;
                }
            }
        }

        self.store.save(&state).await?;
        Ok(report)
    }
}
