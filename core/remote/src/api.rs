//! Remote store API trait definition.

use async_trait::async_trait;

use concur_common::{Result, StoreId};

use crate::models::{RemoteFileRecord, StoreInfo, SyncedFile};

/// Remote store the sync core reconciles against.
///
/// Every transport failure (connection error, timeout, non-2xx status,
/// undecodable body) is reported as `Error::RemoteUnavailable`.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Get the transport name (e.g., "http", "memory").
    fn name(&self) -> &str;

    /// Fetch every document of `store` changed at or after `last_sync_secs`.
    ///
    /// # Postconditions
    /// - Records are returned in the order the remote stored them
    async fn fetch_changes(
        &self,
        last_sync_secs: i64,
        store: StoreId,
    ) -> Result<Vec<RemoteFileRecord>>;

    /// Submit several documents in a single request.
    async fn push_batch(&self, files: &[SyncedFile]) -> Result<()>;

    /// Submit a single document.
    async fn push_one(&self, file: &SyncedFile) -> Result<()>;

    /// Provision a new store with the given name.
    async fn create_store(&self, name: &str) -> Result<StoreInfo>;
}
