//! In-memory remote store for testing.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use concur_common::{Error, Result, StoreId};

use crate::api::RemoteApi;
use crate::models::{RemoteFileRecord, StoreInfo, SyncedFile};

/// A stored record with the server-side time it was written.
#[derive(Debug, Clone)]
struct StoredRecord {
    stored_at_ms: i64,
    file: SyncedFile,
}

/// In-memory remote store.
///
/// Behaves like the server: every push appends a new record stamped with
/// the current time, and a fetch returns all records of the store stamped
/// at or after the requested second, in insertion order. Fetches and pushes
/// can be made to fail, and every push is logged.
pub struct MemoryRemote {
    records: Mutex<Vec<StoredRecord>>,
    pushes: Mutex<Vec<Vec<SyncedFile>>>,
    fail_fetch: AtomicBool,
    fail_push: AtomicBool,
    fetch_calls: AtomicUsize,
    next_store_id: AtomicI64,
}

impl MemoryRemote {
    /// Create a new empty remote.
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            pushes: Mutex::new(Vec::new()),
            fail_fetch: AtomicBool::new(false),
            fail_push: AtomicBool::new(false),
            fetch_calls: AtomicUsize::new(0),
            next_store_id: AtomicI64::new(1),
        }
    }

    /// Store a record as if another device had pushed it at `stored_at_ms`.
    pub fn insert_record(&self, file: SyncedFile, stored_at_ms: i64) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(StoredRecord { stored_at_ms, file });
    }

    /// Make fetches fail with `RemoteUnavailable`.
    pub fn set_fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    /// Make pushes fail with `RemoteUnavailable`.
    pub fn set_fail_push(&self, fail: bool) {
        self.fail_push.store(fail, Ordering::SeqCst);
    }

    /// Every accepted or attempted push, one entry per request.
    pub fn pushes(&self) -> Vec<Vec<SyncedFile>> {
        self.pushes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of fetch requests received.
    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Number of records held.
    pub fn record_count(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn accept(&self, files: Vec<SyncedFile>) -> Result<()> {
        self.pushes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(files.clone());

        if self.fail_push.load(Ordering::SeqCst) {
            return Err(Error::RemoteUnavailable("push refused".to_string()));
        }

        let now = Utc::now().timestamp_millis();
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.extend(files.into_iter().map(|file| StoredRecord {
            stored_at_ms: now,
            file,
        }));
        Ok(())
    }
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteApi for MemoryRemote {
    fn name(&self) -> &str {
        "memory"
    }

    async fn fetch_changes(
        &self,
        last_sync_secs: i64,
        store: StoreId,
    ) -> Result<Vec<RemoteFileRecord>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(Error::RemoteUnavailable("fetch refused".to_string()));
        }

        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records
            .iter()
            .filter(|r| r.file.store_id == store)
            .filter(|r| r.stored_at_ms.div_euclid(1000) >= last_sync_secs)
            .map(|r| r.file.clone())
            .collect())
    }

    async fn push_batch(&self, files: &[SyncedFile]) -> Result<()> {
        self.accept(files.to_vec())
    }

    async fn push_one(&self, file: &SyncedFile) -> Result<()> {
        self.accept(vec![file.clone()])
    }

    async fn create_store(&self, name: &str) -> Result<StoreInfo> {
        let id = self.next_store_id.fetch_add(1, Ordering::SeqCst);
        Ok(StoreInfo {
            id: StoreId::new(id)?,
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(id: i64) -> StoreId {
        StoreId::new(id).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_filters_by_store_and_time() {
        let remote = MemoryRemote::new();
        remote.insert_record(SyncedFile::new(store(1), "old.md", "o"), 1_000);
        remote.insert_record(SyncedFile::new(store(1), "new.md", "n"), 5_500);
        remote.insert_record(SyncedFile::new(store(2), "other.md", "x"), 9_000);

        let files = remote.fetch_changes(5, store(1)).await.unwrap();

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "new.md");
        assert_eq!(remote.fetch_calls(), 1);
    }

    #[tokio::test]
    async fn test_push_appends_and_logs() {
        let remote = MemoryRemote::new();
        let files = vec![
            SyncedFile::new(store(1), "a.md", "a"),
            SyncedFile::new(store(1), "b.md", "b"),
        ];

        remote.push_batch(&files).await.unwrap();

        assert_eq!(remote.pushes(), vec![files]);
        assert_eq!(remote.record_count(), 2);
    }

    #[tokio::test]
    async fn test_failures() {
        let remote = MemoryRemote::new();
        remote.set_fail_fetch(true);
        remote.set_fail_push(true);

        assert!(remote.fetch_changes(0, store(1)).await.is_err());
        let pushed = remote.push_one(&SyncedFile::new(store(1), "a.md", "a")).await;
        assert!(matches!(pushed, Err(Error::RemoteUnavailable(_))));
        assert_eq!(remote.record_count(), 0);
        assert_eq!(remote.pushes().len(), 1);
    }

    #[tokio::test]
    async fn test_create_store_assigns_ids() {
        let remote = MemoryRemote::new();
        let first = remote.create_store("a").await.unwrap();
        let second = remote.create_store("b").await.unwrap();
        assert_ne!(first.id, second.id);
    }
}
