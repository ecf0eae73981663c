//! Concur Sync Engine
//!
//! Two-way synchronization between a local vault and a remote store:
//! - Persisted sync state (per-path markers and a watermark)
//! - Watermark-based fetching of remote changes
//! - Reconciliation: remote wins, then local drift is pushed
//! - A single-flight cycle controller
//! - On-demand and periodic scheduling

pub mod config;
pub mod controller;
pub mod fetch;
pub mod fingerprint;
pub mod push;
pub mod reconcile;
pub mod scheduler;
pub mod state;

// Re-export main types
pub use config::{ChangeDetection, PushMode, SyncConfig};
pub use controller::{CycleOutcome, CycleState, SyncController, SyncReport, SyncStatus};
pub use fetch::RemoteChangeFetcher;
pub use fingerprint::content_hash;
pub use push::{ChangePusher, PendingPush};
pub use reconcile::{ApplyAction, LocalScan, Reconciler};
pub use scheduler::{SyncMode, SyncRequest, SyncScheduler, SyncSchedulerHandle};
pub use state::{StateStore, SyncState, STATE_DIR, STATE_FILE};
