//! Submission of locally changed documents.

use tracing::{debug, warn};

use concur_common::{Error, Result, StoreId, VaultPath};
use concur_remote::{RemoteApi, SyncedFile};
use concur_storage::{LocalFileRef, LocalVault};

use crate::config::PushMode;
use crate::fingerprint::content_hash;

/// A document read for submission, with the mtime observed when listing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPush {
    pub file: SyncedFile,
    pub path: VaultPath,
    pub mtime: i64,
}

/// Sends push-local documents to the remote store.
pub struct ChangePusher<'a, R: RemoteApi + ?Sized> {
    remote: &'a R,
    store: StoreId,
    mode: PushMode,
}

impl<'a, R: RemoteApi + ?Sized> ChangePusher<'a, R> {
    pub fn new(remote: &'a R, store: StoreId, mode: PushMode) -> Self {
        Self {
            remote,
            store,
            mode,
        }
    }

    /// Read and fingerprint each changed document.
    ///
    /// Documents that are not valid UTF-8 are left out with a warning.
    ///
    /// # Errors
    /// - Any local vault failure while reading
    pub async fn prepare<V: LocalVault + ?Sized>(
        &self,
        vault: &V,
        changed: &[LocalFileRef],
    ) -> Result<Vec<PendingPush>> {
        let mut pending = Vec::with_capacity(changed.len());

        for doc in changed {
            let bytes = vault.read(&doc.path).await?;
            let content = match String::from_utf8(bytes) {
                Ok(content) => content,
                Err(_) => {
                    warn!(path = %doc.path, "Skipping document that is not valid UTF-8");
                    continue;
                }
            };

            let hash = content_hash(&content);
            pending.push(PendingPush {
                file: SyncedFile::new(self.store, doc.path.to_string_path(), content)
                    .with_hash(hash),
                path: doc.path.clone(),
                mtime: doc.stat.mtime,
            });
        }

        Ok(pending)
    }

    /// Submit documents to the remote.
    ///
    /// An empty list makes no request. In single mode the first failed
    /// request fails the whole submission.
    ///
    /// # Errors
    /// - `Error::RemoteUnavailable` for any transport failure or rejection
    pub async fn push(&self, files: &[SyncedFile]) -> Result<()> {
        if files.is_empty() {
            return Ok(());
        }

        let result = match self.mode {
            PushMode::Batch => self.remote.push_batch(files).await,
            PushMode::Single => {
                for file in files {
                    self.remote.push_one(file).await.map_err(unavailable)?;
                }
                Ok(())
            }
        };
        result.map_err(unavailable)?;

        debug!(count = files.len(), remote = self.remote.name(), "Pushed local changes");
        Ok(())
    }
}

fn unavailable(e: Error) -> Error {
    match e {
        Error::RemoteUnavailable(_) => e,
        other => Error::RemoteUnavailable(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concur_remote::MemoryRemote;
    use concur_storage::MemoryVault;

    fn path(s: &str) -> VaultPath {
        VaultPath::parse(s).unwrap()
    }

    fn store() -> StoreId {
        StoreId::new(7).unwrap()
    }

    #[tokio::test]
    async fn test_prepare_reads_and_fingerprints() {
        let vault = MemoryVault::new();
        vault.insert(&path("notes/a.md"), "alpha", 100);
        let remote = MemoryRemote::new();
        let pusher = ChangePusher::new(&remote, store(), PushMode::Batch);
        let changed = vault.list_documents().await.unwrap();

        let pending = pusher.prepare(&vault, &changed).await.unwrap();

        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].mtime, 100);
        assert_eq!(pending[0].file.path, "notes/a.md");
        assert_eq!(pending[0].file.store_id, store());
        assert_eq!(
            pending[0].file.content_hash.as_deref(),
            Some(content_hash("alpha").as_str())
        );
    }

    #[tokio::test]
    async fn test_prepare_skips_binary() {
        let vault = MemoryVault::new();
        vault.insert(&path("a.md"), "text", 1);
        vault.insert(&path("b.md"), "", 1);
        vault.write(&path("b.md"), &[0xff, 0xfe]).await.unwrap();
        let remote = MemoryRemote::new();
        let pusher = ChangePusher::new(&remote, store(), PushMode::Batch);
        let changed = vault.list_documents().await.unwrap();

        let pending = pusher.prepare(&vault, &changed).await.unwrap();

        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].path, path("a.md"));
    }

    #[tokio::test]
    async fn test_batch_sends_one_request() {
        let remote = MemoryRemote::new();
        let pusher = ChangePusher::new(&remote, store(), PushMode::Batch);
        let files = vec![
            SyncedFile::new(store(), "a.md", "a"),
            SyncedFile::new(store(), "b.md", "b"),
        ];

        pusher.push(&files).await.unwrap();

        assert_eq!(remote.pushes(), vec![files]);
    }

    #[tokio::test]
    async fn test_single_sends_one_request_per_file() {
        let remote = MemoryRemote::new();
        let pusher = ChangePusher::new(&remote, store(), PushMode::Single);
        let files = vec![
            SyncedFile::new(store(), "a.md", "a"),
            SyncedFile::new(store(), "b.md", "b"),
        ];

        pusher.push(&files).await.unwrap();

        let pushes = remote.pushes();
        assert_eq!(pushes.len(), 2);
        assert!(pushes.iter().all(|p| p.len() == 1));
    }

    #[tokio::test]
    async fn test_empty_push_makes_no_request() {
        let remote = MemoryRemote::new();
        remote.set_fail_push(true);
        let pusher = ChangePusher::new(&remote, store(), PushMode::Batch);

        pusher.push(&[]).await.unwrap();

        assert!(remote.pushes().is_empty());
    }

    #[tokio::test]
    async fn test_single_stops_at_first_failure() {
        let remote = MemoryRemote::new();
        remote.set_fail_push(true);
        let pusher = ChangePusher::new(&remote, store(), PushMode::Single);
        let files = vec![
            SyncedFile::new(store(), "a.md", "a"),
            SyncedFile::new(store(), "b.md", "b"),
        ];

        let result = pusher.push(&files).await;

        assert!(matches!(result, Err(Error::RemoteUnavailable(_))));
        assert_eq!(remote.pushes().len(), 1);
    }
}
