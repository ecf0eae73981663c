//! Local vault trait definition.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use concur_common::{Result, VaultPath};

/// File metadata as reported by the vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStat {
    /// Modification time in milliseconds since epoch.
    pub mtime: i64,
    /// Size in bytes.
    pub size: u64,
}

/// A document in the local vault.
///
/// This is a snapshot taken when the vault was listed; the content is not
/// loaded until requested through [`LocalVault::read`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalFileRef {
    /// Path of the document within the vault.
    pub path: VaultPath,
    /// Metadata observed at listing time.
    pub stat: FileStat,
}

impl LocalFileRef {
    pub fn new(path: VaultPath, mtime: i64, size: u64) -> Self {
        Self {
            path,
            stat: FileStat { mtime, size },
        }
    }
}

/// Local document store the sync core reconciles against.
///
/// Implementations must be safe to share between tasks; the sync core
/// itself never issues two operations concurrently.
#[async_trait]
pub trait LocalVault: Send + Sync {
    /// Get the vault name (e.g., "fs", "memory").
    fn name(&self) -> &str;

    /// Check if a file or directory exists at `path`.
    async fn exists(&self, path: &VaultPath) -> Result<bool>;

    /// Create a directory.
    ///
    /// # Postconditions
    /// - Directory exists, including all intermediate directories
    ///
    /// # Errors
    /// - A file is in the way
    /// - I/O errors
    async fn mkdir(&self, path: &VaultPath) -> Result<()>;

    /// Read the raw bytes of a file.
    ///
    /// # Errors
    /// - File not found
    /// - I/O errors
    async fn read(&self, path: &VaultPath) -> Result<Vec<u8>>;

    /// Write raw bytes to a file, replacing any existing content.
    ///
    /// # Preconditions
    /// - Parent directory must exist
    async fn write(&self, path: &VaultPath, data: &[u8]) -> Result<()>;

    /// Create a new document.
    ///
    /// # Preconditions
    /// - Parent directory must exist
    /// - No document exists at `path`
    ///
    /// # Errors
    /// - Already exists
    /// - Parent directory not found
    async fn create(&self, path: &VaultPath, content: &str) -> Result<LocalFileRef>;

    /// Replace the content of an existing document.
    ///
    /// # Errors
    /// - Document no longer exists
    async fn modify(&self, file: &LocalFileRef, content: &str) -> Result<()>;

    /// List every document in the vault.
    async fn list_documents(&self) -> Result<Vec<LocalFileRef>>;

    /// Whether a file at `path` would be reported by [`list_documents`].
    ///
    /// [`list_documents`]: LocalVault::list_documents
    fn is_document(&self, path: &VaultPath) -> bool {
        !path.is_root() && !path.is_hidden()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_ref_serialization() {
        let file = LocalFileRef::new(VaultPath::parse("notes/a.md").unwrap(), 100, 12);

        let json = serde_json::to_string(&file).unwrap();
        assert!(json.contains("\"notes/a.md\""));
        let restored: LocalFileRef = serde_json::from_str(&json).unwrap();

        assert_eq!(restored, file);
        assert_eq!(restored.stat.mtime, 100);
    }
}
