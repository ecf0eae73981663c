//! Remote change fetching.

use tracing::debug;

use concur_common::{Error, Result, StoreId};
use concur_remote::{RemoteApi, RemoteFileRecord};

/// Retrieves the remote documents changed since a watermark.
pub struct RemoteChangeFetcher<'a, R: RemoteApi + ?Sized> {
    remote: &'a R,
    store: StoreId,
}

impl<'a, R: RemoteApi + ?Sized> RemoteChangeFetcher<'a, R> {
    pub fn new(remote: &'a R, store: StoreId) -> Self {
        Self { remote, store }
    }

    /// Fetch every remote document changed at or after `watermark_seconds`.
    ///
    /// # Errors
    /// - `Error::RemoteUnavailable` for any failure; callers treat it as
    ///   "no remote changes this cycle", never as an empty remote
    pub async fn fetch(&self, watermark_seconds: i64) -> Result<Vec<RemoteFileRecord>> {
        let records = self
            .remote
            .fetch_changes(watermark_seconds, self.store)
            .await
            .map_err(|e| match e {
                Error::RemoteUnavailable(_) => e,
                other => Error::RemoteUnavailable(other.to_string()),
            })?;

        debug!(
            count = records.len(),
            since = watermark_seconds,
            "Fetched remote changes"
        );
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concur_remote::{MemoryRemote, SyncedFile};

    fn store() -> StoreId {
        StoreId::new(1).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_returns_records() {
        let remote = MemoryRemote::new();
        remote.insert_record(SyncedFile::new(store(), "a.md", "a"), 10_000);

        let fetcher = RemoteChangeFetcher::new(&remote, store());
        let records = fetcher.fetch(10).await.unwrap();
        assert_eq!(records.len(), 1);

        assert!(fetcher.fetch(11).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_is_remote_unavailable() {
        let remote = MemoryRemote::new();
        remote.set_fail_fetch(true);

        let fetcher = RemoteChangeFetcher::new(&remote, store());
        assert!(fetcher.fetch(0).await.unwrap_err().is_remote_unavailable());
    }
}
