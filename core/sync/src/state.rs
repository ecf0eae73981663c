//! Sync state tracking and persistence.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use concur_common::{Error, Result, VaultPath};

/// Hidden directory holding the state record, relative to the vault root.
pub const STATE_DIR: &str = ".concur";
/// File name of the state record.
pub const STATE_FILE: &str = "concur_timestamps.json";

/// Persisted sync state of one vault.
///
/// Markers are the local mtimes (epoch millis) observed when each path was
/// last pushed successfully. The watermark is the epoch millis of the last
/// successful push; fetches use it floored to whole seconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    #[serde(default)]
    per_path_marker: BTreeMap<String, i64>,
    #[serde(default)]
    last_sync_watermark: i64,
    /// Fingerprints of the last synced content, kept only for hash-based
    /// change detection.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    per_path_hash: BTreeMap<String, String>,
}

impl SyncState {
    /// Create a new empty sync state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last synced mtime recorded for a path.
    pub fn marker(&self, path: &VaultPath) -> Option<i64> {
        self.per_path_marker.get(&path.to_string_path()).copied()
    }

    /// Record the mtime a path was synced at.
    pub fn set_marker(&mut self, path: &VaultPath, mtime: i64) {
        self.per_path_marker.insert(path.to_string_path(), mtime);
    }

    /// Number of paths with a recorded marker.
    pub fn marker_count(&self) -> usize {
        self.per_path_marker.len()
    }

    /// Iterate over `(path, marker)` pairs.
    pub fn markers(&self) -> impl Iterator<Item = (&str, i64)> {
        self.per_path_marker.iter().map(|(p, m)| (p.as_str(), *m))
    }

    /// Fingerprint of the last synced content of a path.
    pub fn hash(&self, path: &VaultPath) -> Option<&str> {
        self.per_path_hash
            .get(&path.to_string_path())
            .map(|h| h.as_str())
    }

    /// Record the fingerprint of the last synced content of a path.
    pub fn set_hash(&mut self, path: &VaultPath, hash: impl Into<String>) {
        self.per_path_hash.insert(path.to_string_path(), hash.into());
    }

    /// Watermark in epoch millis.
    pub fn watermark(&self) -> i64 {
        self.last_sync_watermark
    }

    /// Watermark floored to whole seconds, as sent to the remote.
    pub fn watermark_seconds(&self) -> i64 {
        self.last_sync_watermark.div_euclid(1000)
    }

    /// Move the watermark forward to `now_ms`; never moves it backwards.
    pub fn advance_watermark(&mut self, now_ms: i64) {
        self.last_sync_watermark = self.last_sync_watermark.max(now_ms);
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from JSON.
    ///
    /// # Errors
    /// - `Error::CorruptState` if the bytes are not a valid state record
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::CorruptState(e.to_string()))
    }
}

/// Durable storage of the [`SyncState`] record.
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Store at an explicit file path.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Store at the well-known location inside a vault root.
    pub fn in_vault(vault_root: impl AsRef<Path>) -> Self {
        Self::new(vault_root.as_ref().join(STATE_DIR).join(STATE_FILE))
    }

    /// Path of the record file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted record.
    ///
    /// # Returns
    /// An empty state if no record exists.
    ///
    /// # Errors
    /// - `Error::CorruptState` if the record is not valid state JSON
    /// - `Error::LocalIo` if the record exists but cannot be read
    pub async fn load(&self) -> Result<SyncState> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No sync state yet");
                return Ok(SyncState::new());
            }
            Err(e) => return Err(e.into()),
        };

        let text = std::str::from_utf8(&bytes)
            .map_err(|e| Error::CorruptState(format!("record is not UTF-8: {}", e)))?;
        SyncState::from_json(text)
    }

    /// Durably replace the persisted record.
    ///
    /// Writes a sibling temporary file and renames it over the record, so a
    /// crash leaves either the old record or the new one.
    pub async fn save(&self, state: &SyncState) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).await?;
        }

        let json = state.to_json()?;
        let tmp = self.path.with_extension(format!("{}.tmp", Uuid::new_v4()));

        fs::write(&tmp, json.as_bytes()).await?;
        if let Err(e) = fs::rename(&tmp, &self.path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!(path = %self.path.display(), markers = state.marker_count(), "Sync state saved");
        Ok(())
    }
}
