//! In-memory vault for testing.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use crate::vault::{LocalFileRef, LocalVault};
use concur_common::{Error, Result, VaultPath};

/// First modification time handed out by the internal clock.
const CLOCK_START: i64 = 1_000_000;

#[derive(Debug, Clone)]
struct MemFile {
    data: Vec<u8>,
    mtime: i64,
}

#[derive(Debug, Default)]
struct Inner {
    files: BTreeMap<VaultPath, MemFile>,
    dirs: BTreeSet<VaultPath>,
    clock: i64,
}

impl Inner {
    fn tick(&mut self) -> i64 {
        self.clock += 1;
        self.clock
    }

    fn has_dir(&self, path: &VaultPath) -> bool {
        path.is_root() || self.dirs.contains(path)
    }

    fn add_dir_chain(&mut self, path: &VaultPath) {
        let mut current = Some(path.clone());
        while let Some(dir) = current {
            if dir.is_root() {
                break;
            }
            current = dir.parent();
            self.dirs.insert(dir);
        }
    }
}

/// In-memory vault.
///
/// Modification times come from a logical clock that advances on every
/// write, so each write is observable as a new mtime. Writes can be made to
/// fail to exercise local I/O error paths.
pub struct MemoryVault {
    inner: RwLock<Inner>,
    fail_writes: AtomicBool,
}

impl MemoryVault {
    /// Create a new empty vault.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                clock: CLOCK_START,
                ..Inner::default()
            }),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Insert a document with an explicit mtime, creating parent directories.
    pub fn insert(&self, path: &VaultPath, content: &str, mtime: i64) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(parent) = path.parent() {
            inner.add_dir_chain(&parent);
        }
        inner.files.insert(
            path.clone(),
            MemFile {
                data: content.as_bytes().to_vec(),
                mtime,
            },
        );
    }

    /// Set the mtime of an existing document.
    pub fn set_mtime(&self, path: &VaultPath, mtime: i64) -> Result<()> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let file = inner
            .files
            .get_mut(path)
            .ok_or_else(|| Error::NotFound(format!("File not found: {}", path)))?;
        file.mtime = mtime;
        Ok(())
    }

    /// Remove a directory and everything below it.
    pub fn remove_dir(&self, path: &VaultPath) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let prefix = path.components().to_vec();
        let under = |p: &VaultPath| p.components().starts_with(&prefix);
        inner.files.retain(|p, _| !under(p));
        inner.dirs.retain(|p| !under(p));
    }

    /// Current content of a document as text.
    pub fn content(&self, path: &VaultPath) -> Option<String> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .files
            .get(path)
            .map(|f| String::from_utf8_lossy(&f.data).into_owned())
    }

    /// Current mtime of a document.
    pub fn mtime(&self, path: &VaultPath) -> Option<i64> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.files.get(path).map(|f| f.mtime)
    }

    /// Whether a directory exists.
    pub fn has_dir(&self, path: &VaultPath) -> bool {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.has_dir(path)
    }

    /// Make every mutating operation fail with a local I/O error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self, path: &VaultPath) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::LocalIo(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("write to {} refused", path),
            )));
        }
        Ok(())
    }

    fn store(&self, path: &VaultPath, data: Vec<u8>, must_be_new: bool) -> Result<LocalFileRef> {
        self.check_writable(path)?;
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(parent) = path.parent() {
            if !inner.has_dir(&parent) {
                return Err(Error::NotFound(format!(
                    "Parent directory not found for {}",
                    path
                )));
            }
        }
        if inner.dirs.contains(path) {
            return Err(Error::AlreadyExists(format!("Directory exists at {}", path)));
        }
        if must_be_new && inner.files.contains_key(path) {
            return Err(Error::AlreadyExists(format!("File exists: {}", path)));
        }

        let mtime = inner.tick();
        let size = data.len() as u64;
        inner.files.insert(path.clone(), MemFile { data, mtime });
        Ok(LocalFileRef::new(path.clone(), mtime, size))
    }
}

impl Default for MemoryVault {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocalVault for MemoryVault {
    fn name(&self) -> &str {
        "memory"
    }

    async fn exists(&self, path: &VaultPath) -> Result<bool> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(inner.files.contains_key(path) || inner.has_dir(path))
    }

    async fn mkdir(&self, path: &VaultPath) -> Result<()> {
        self.check_writable(path)?;
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        let mut current = Some(path.clone());
        while let Some(dir) = current {
            if inner.files.contains_key(&dir) {
                return Err(Error::AlreadyExists(format!("A file exists at {}", dir)));
            }
            current = dir.parent();
        }

        inner.add_dir_chain(path);
        Ok(())
    }

    async fn read(&self, path: &VaultPath) -> Result<Vec<u8>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .files
            .get(path)
            .map(|f| f.data.clone())
            .ok_or_else(|| Error::NotFound(format!("File not found: {}", path)))
    }

    async fn write(&self, path: &VaultPath, data: &[u8]) -> Result<()> {
        self.store(path, data.to_vec(), false).map(|_| ())
    }

    async fn create(&self, path: &VaultPath, content: &str) -> Result<LocalFileRef> {
        self.store(path, content.as_bytes().to_vec(), true)
    }

    async fn modify(&self, file: &LocalFileRef, content: &str) -> Result<()> {
        if !self.exists(&file.path).await? {
            return Err(Error::NotFound(format!("File not found: {}", file.path)));
        }
        self.store(&file.path, content.as_bytes().to_vec(), false)
            .map(|_| ())
    }

    async fn list_documents(&self) -> Result<Vec<LocalFileRef>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(inner
            .files
            .iter()
            .filter(|(path, _)| self.is_document(path))
            .map(|(path, f)| LocalFileRef::new(path.clone(), f.mtime, f.data.len() as u64))
            .collect())
    }
}
