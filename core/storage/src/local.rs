//! Filesystem-backed vault.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::vault::{LocalFileRef, LocalVault};
use concur_common::{Error, Result, VaultPath};

/// Extensions treated as documents when none are configured.
pub const DEFAULT_EXTENSIONS: &[&str] = &["md"];

/// Local filesystem vault.
///
/// Documents are regular files below `root` whose extension is in the
/// configured set. Hidden files and directories (names starting with `.`)
/// are never listed, which keeps the sync state directory out of the sync.
pub struct FsVault {
    root: PathBuf,
    extensions: Vec<String>,
}

impl FsVault {
    /// Create a new vault rooted at the given directory.
    ///
    /// # Postconditions
    /// - Root directory is created if it doesn't exist
    ///
    /// # Errors
    /// - Permission denied
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        if !root.exists() {
            std::fs::create_dir_all(&root)?;
        }

        Ok(Self {
            root,
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        })
    }

    /// Restrict listed documents to the given extensions.
    ///
    /// An empty list means every non-hidden file is a document.
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Root directory of the vault.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Convert a VaultPath to a filesystem path.
    fn to_fs_path(&self, path: &VaultPath) -> PathBuf {
        let mut fs_path = self.root.clone();
        for component in path.components() {
            fs_path.push(component);
        }
        fs_path
    }

    fn file_ref(path: VaultPath, fs_meta: &std::fs::Metadata) -> Result<LocalFileRef> {
        let mtime = mtime_millis(fs_meta.modified())?;
        Ok(LocalFileRef::new(path, mtime, fs_meta.len()))
    }

    fn parent_is_dir(&self, path: &VaultPath) -> bool {
        self.to_fs_path(path)
            .parent()
            .map(|parent| parent.is_dir())
            .unwrap_or(true)
    }

    fn check_parent(&self, path: &VaultPath) -> Result<()> {
        if !self.parent_is_dir(path) {
            return Err(Error::NotFound(format!(
                "Parent directory not found for {}",
                path
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl LocalVault for FsVault {
    fn name(&self) -> &str {
        "fs"
    }

    async fn exists(&self, path: &VaultPath) -> Result<bool> {
        match fs::try_exists(self.to_fs_path(path)).await {
            Ok(found) => Ok(found),
            // A file sits where an ancestor directory should be.
            Err(_) if !self.parent_is_dir(path) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn mkdir(&self, path: &VaultPath) -> Result<()> {
        let mut current = Some(path.clone());
        while let Some(dir) = current {
            if self.to_fs_path(&dir).is_file() {
                return Err(Error::AlreadyExists(format!("A file exists at {}", dir)));
            }
            current = dir.parent();
        }

        fs::create_dir_all(self.to_fs_path(path)).await?;
        debug!(path = %path, "Directory created");
        Ok(())
    }

    async fn read(&self, path: &VaultPath) -> Result<Vec<u8>> {
        let fs_path = self.to_fs_path(path);

        if !fs_path.is_file() {
            return Err(Error::NotFound(format!("File not found: {}", path)));
        }

        Ok(fs::read(&fs_path).await?)
    }

    async fn write(&self, path: &VaultPath, data: &[u8]) -> Result<()> {
        self.check_parent(path)?;
        fs::write(self.to_fs_path(path), data).await?;
        Ok(())
    }

    async fn create(&self, path: &VaultPath, content: &str) -> Result<LocalFileRef> {
        self.check_parent(path)?;
        let fs_path = self.to_fs_path(path);

        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&fs_path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(Error::AlreadyExists(format!("File exists: {}", path)));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        drop(file);

        let fs_meta = fs::metadata(&fs_path).await?;
        Self::file_ref(path.clone(), &fs_meta)
    }

    async fn modify(&self, file: &LocalFileRef, content: &str) -> Result<()> {
        let fs_path = self.to_fs_path(&file.path);

        if !fs_path.is_file() {
            return Err(Error::NotFound(format!("File not found: {}", file.path)));
        }

        fs::write(&fs_path, content.as_bytes()).await?;
        Ok(())
    }

    fn is_document(&self, path: &VaultPath) -> bool {
        if path.is_root() || path.is_hidden() {
            return false;
        }
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .map(|ext| self.extensions.iter().any(|e| e == ext))
            .unwrap_or(false)
    }

    async fn list_documents(&self) -> Result<Vec<LocalFileRef>> {
        let mut documents = Vec::new();
        let mut pending = vec![VaultPath::root()];

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(self.to_fs_path(&dir)).await?;

            while let Some(entry) = entries.next_entry().await? {
                let Some(name) = entry.file_name().to_str().map(String::from) else {
                    warn!(dir = %dir, "Skipping entry with non UTF-8 name");
                    continue;
                };
                if name.starts_with('.') {
                    continue;
                }

                let child = dir.join(&name)?;
                let file_type = entry.file_type().await?;

                if file_type.is_dir() {
                    pending.push(child);
                } else if file_type.is_file() && self.is_document(&child) {
                    let fs_meta = entry.metadata().await?;
                    match Self::file_ref(child, &fs_meta) {
                        Ok(doc) => documents.push(doc),
                        Err(e) => warn!(dir = %dir, name = %name, "Skipping document: {}", e),
                    }
                }
            }
        }

        documents.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(documents)
    }
}

/// Modification time in epoch millis; fails when the platform reports none.
fn mtime_millis(modified: std::io::Result<SystemTime>) -> Result<i64> {
    let modified: DateTime<Utc> = modified?.into();
    Ok(modified.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn path(s: &str) -> VaultPath {
        VaultPath::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_read() {
        let temp = TempDir::new().unwrap();
        let vault = FsVault::new(temp.path()).unwrap();

        let created = vault.create(&path("a.md"), "hello").await.unwrap();
        assert_eq!(created.path, path("a.md"));
        assert_eq!(created.stat.size, 5);
        assert!(created.stat.mtime > 0);

        assert_eq!(vault.read(&path("a.md")).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_create_requires_parent() {
        let temp = TempDir::new().unwrap();
        let vault = FsVault::new(temp.path()).unwrap();

        let result = vault.create(&path("notes/a.md"), "x").await;
        assert!(matches!(result, Err(Error::NotFound(_))));

        vault.mkdir(&path("notes")).await.unwrap();
        vault.create(&path("notes/a.md"), "x").await.unwrap();
    }

    #[tokio::test]
    async fn test_create_existing_fails() {
        let temp = TempDir::new().unwrap();
        let vault = FsVault::new(temp.path()).unwrap();

        vault.create(&path("a.md"), "one").await.unwrap();
        let result = vault.create(&path("a.md"), "two").await;
        assert!(matches!(result, Err(Error::AlreadyExists(_))));
        assert_eq!(vault.read(&path("a.md")).await.unwrap(), b"one");
    }

    #[tokio::test]
    async fn test_mkdir_creates_intermediate_dirs() {
        let temp = TempDir::new().unwrap();
        let vault = FsVault::new(temp.path()).unwrap();

        vault.mkdir(&path("a/b/c")).await.unwrap();
        assert!(vault.exists(&path("a/b")).await.unwrap());
        assert!(vault.exists(&path("a/b/c")).await.unwrap());
        // Idempotent
        vault.mkdir(&path("a/b/c")).await.unwrap();
    }

    #[tokio::test]
    async fn test_modify_replaces_content() {
        let temp = TempDir::new().unwrap();
        let vault = FsVault::new(temp.path()).unwrap();

        let file = vault.create(&path("a.md"), "old").await.unwrap();
        vault.modify(&file, "new content").await.unwrap();
        assert_eq!(vault.read(&path("a.md")).await.unwrap(), b"new content");
    }

    #[tokio::test]
    async fn test_list_documents_filters() {
        let temp = TempDir::new().unwrap();
        let vault = FsVault::new(temp.path()).unwrap();

        vault.mkdir(&path("notes/deep")).await.unwrap();
        vault.mkdir(&path(".concur")).await.unwrap();
        vault.create(&path("root.md"), "r").await.unwrap();
        vault.create(&path("notes/a.md"), "a").await.unwrap();
        vault.create(&path("notes/deep/b.md"), "b").await.unwrap();
        vault.create(&path("notes/image.png"), "png").await.unwrap();
        vault.create(&path(".concur/state.md"), "hidden").await.unwrap();
        vault.create(&path(".hidden.md"), "hidden").await.unwrap();

        let docs = vault.list_documents().await.unwrap();
        let paths: Vec<String> = docs.iter().map(|d| d.path.to_string()).collect();
        assert_eq!(paths, vec!["notes/a.md", "notes/deep/b.md", "root.md"]);
    }

    #[tokio::test]
    async fn test_list_documents_all_extensions() {
        let temp = TempDir::new().unwrap();
        let vault = FsVault::new(temp.path())
            .unwrap()
            .with_extensions(Vec::<String>::new());

        vault.create(&path("a.md"), "a").await.unwrap();
        vault.create(&path("b.txt"), "b").await.unwrap();

        assert_eq!(vault.list_documents().await.unwrap().len(), 2);
    }

    #[test]
    fn test_missing_mtime_is_an_error() {
        let unsupported = std::io::Error::new(std::io::ErrorKind::Unsupported, "no mtime");
        assert!(matches!(mtime_millis(Err(unsupported)), Err(Error::LocalIo(_))));

        let epoch_plus = SystemTime::UNIX_EPOCH + std::time::Duration::from_millis(1_500);
        assert_eq!(mtime_millis(Ok(epoch_plus)).unwrap(), 1_500);
    }

    #[test]
    fn test_is_document_matches_listing_rules() {
        let temp = TempDir::new().unwrap();
        let vault = FsVault::new(temp.path()).unwrap();

        assert!(vault.is_document(&path("notes/a.md")));
        assert!(!vault.is_document(&path("attachments/img.png")));
        assert!(!vault.is_document(&path(".concur/concur_timestamps.json")));
        assert!(!vault.is_document(&path(".trash/a.md")));
        assert!(!vault.is_document(&VaultPath::root()));
    }

    #[tokio::test]
    async fn test_exists_below_a_file_is_false() {
        let temp = TempDir::new().unwrap();
        let vault = FsVault::new(temp.path()).unwrap();
        vault.create(&path("a.md"), "a").await.unwrap();

        assert!(!vault.exists(&path("a.md/b.md")).await.unwrap());
        let result = vault.create(&path("a.md/b.md"), "b").await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        let result = vault.mkdir(&path("a.md/x")).await;
        assert!(matches!(result, Err(Error::AlreadyExists(_))));
    }
}
