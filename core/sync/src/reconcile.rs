//! Reconciliation of remote changes and local drift.
//!
//! A cycle first turns the fetched remote records into [`ApplyAction`]s and
//! executes them against the local vault, then scans the vault for
//! documents whose mtime no longer matches the recorded marker. Remote
//! records always win for their path: they are strictly newer than the
//! watermark, so last write wins by construction.

use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use concur_common::{Error, Result, StoreId, VaultPath};
use concur_remote::RemoteFileRecord;
use concur_storage::{LocalFileRef, LocalVault};

use crate::config::ChangeDetection;
use crate::fingerprint::content_hash;
use crate::state::SyncState;

/// A write of remote content into the local vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyAction {
    /// Overwrite an existing local document.
    Overwrite { file: LocalFileRef, content: String },
    /// Create a document, including any missing parent directories.
    Create { path: VaultPath, content: String },
}

impl ApplyAction {
    pub fn path(&self) -> &VaultPath {
        match self {
            ApplyAction::Overwrite { file, .. } => &file.path,
            ApplyAction::Create { path, .. } => path,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            ApplyAction::Overwrite { content, .. } | ApplyAction::Create { content, .. } => content,
        }
    }
}

/// Result of scanning the vault for local changes.
#[derive(Debug, Default)]
pub struct LocalScan {
    /// Documents to push, unique by path.
    pub push: Vec<LocalFileRef>,
    /// Documents whose mtime moved but whose content matches the last synced
    /// fingerprint; only their marker needs refreshing.
    pub refreshed: Vec<LocalFileRef>,
}

/// Decision engine for one sync cycle.
pub struct Reconciler<'a, V: LocalVault + ?Sized> {
    vault: &'a V,
    detection: ChangeDetection,
}

impl<'a, V: LocalVault + ?Sized> Reconciler<'a, V> {
    pub fn new(vault: &'a V, detection: ChangeDetection) -> Self {
        Self { vault, detection }
    }

    /// Turn fetched records into apply actions.
    ///
    /// Records for another store are skipped, as are records whose path is
    /// unusable, hidden, or not one the vault would list as a document.
    /// Several records for one path collapse into the last one, so each path
    /// is written at most once per cycle.
    pub fn plan_remote(
        &self,
        records: Vec<RemoteFileRecord>,
        local: &[LocalFileRef],
        store: StoreId,
    ) -> Vec<ApplyAction> {
        let mut valid = Vec::with_capacity(records.len());
        for record in records {
            if record.store_id != store {
                warn!(path = %record.path, store = %record.store_id, "Skipping record for another store");
                continue;
            }
            match VaultPath::parse(&record.path) {
                Ok(path) if path.is_root() || path.is_hidden() => {
                    warn!(path = %record.path, "Skipping remote record with reserved path");
                }
                Ok(path) if !self.vault.is_document(&path) => {
                    warn!(path = %record.path, "Skipping remote record that is not a syncable document");
                }
                Ok(path) => valid.push((path, record.content)),
                Err(e) => {
                    warn!(path = %record.path, "Skipping remote record: {}", e);
                }
            }
        }

        let mut last_index: HashMap<VaultPath, usize> = HashMap::new();
        for (i, (path, _)) in valid.iter().enumerate() {
            last_index.insert(path.clone(), i);
        }

        let existing: HashMap<&VaultPath, &LocalFileRef> =
            local.iter().map(|f| (&f.path, f)).collect();

        valid
            .into_iter()
            .enumerate()
            .filter(|(i, (path, _))| last_index.get(path) == Some(i))
            .map(|(_, (path, content))| match existing.get(&path) {
                Some(file) => ApplyAction::Overwrite {
                    file: (*file).clone(),
                    content,
                },
                None => ApplyAction::Create { path, content },
            })
            .collect()
    }

    /// Execute apply actions in order.
    ///
    /// A write whose content already matches the local document is skipped,
    /// leaving its mtime untouched. A record that collides with the local
    /// layout (a directory at its path, or a file where a parent directory
    /// belongs) is skipped with a warning. Under hash-based detection the
    /// fingerprint of every applied document is recorded in `state`.
    ///
    /// # Returns
    /// Number of documents written.
    ///
    /// # Errors
    /// - Any other local vault failure; remaining actions are not attempted
    pub async fn apply(&self, actions: &[ApplyAction], state: &mut SyncState) -> Result<usize> {
        let mut written = 0;

        for action in actions {
            match self.apply_one(action).await {
                Ok(changed) => {
                    if changed {
                        written += 1;
                    }
                    if self.detection == ChangeDetection::MtimeAndHash {
                        state.set_hash(action.path(), content_hash(action.content()));
                    }
                }
                Err(e @ (Error::AlreadyExists(_) | Error::NotFound(_))) => {
                    warn!(path = %action.path(), "Skipping remote record: {}", e);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(written)
    }

    /// Apply one action; `Ok(false)` when the content was already present.
    async fn apply_one(&self, action: &ApplyAction) -> Result<bool> {
        match action {
            ApplyAction::Overwrite { file, content } => {
                let current = self.vault.read(&file.path).await?;
                if current == content.as_bytes() {
                    debug!(path = %file.path, "Remote content already present");
                    return Ok(false);
                }
                self.vault.modify(file, content).await?;
                debug!(path = %file.path, "Applied remote update");
                Ok(true)
            }
            ApplyAction::Create { path, content } => {
                // Present but missing from the listing snapshot.
                if self.vault.exists(path).await? {
                    let current = match self.vault.read(path).await {
                        Ok(current) => current,
                        Err(Error::NotFound(_)) => {
                            return Err(Error::AlreadyExists(format!(
                                "Directory exists at {}",
                                path
                            )));
                        }
                        Err(e) => return Err(e),
                    };
                    if current == content.as_bytes() {
                        debug!(path = %path, "Remote content already present");
                        return Ok(false);
                    }
                    self.vault.write(path, content.as_bytes()).await?;
                    debug!(path = %path, "Applied remote update");
                    return Ok(true);
                }

                if let Some(parent) = path.parent() {
                    if !parent.is_root() && !self.vault.exists(&parent).await? {
                        self.vault.mkdir(&parent).await?;
                    }
                }
                self.vault.create(path, content).await?;
                debug!(path = %path, "Created document from remote");
                Ok(true)
            }
        }
    }

    /// Documents whose mtime differs from their recorded marker.
    ///
    /// A document without a marker counts as changed. Each path appears at
    /// most once.
    pub fn detect_local_changes(state: &SyncState, docs: &[LocalFileRef]) -> Vec<LocalFileRef> {
        let mut seen = HashSet::new();
        docs.iter()
            .filter(|doc| state.marker(&doc.path) != Some(doc.stat.mtime))
            .filter(|doc| seen.insert(doc.path.clone()))
            .cloned()
            .collect()
    }

    /// Scan the vault for documents that need pushing.
    pub async fn scan_local(&self, state: &SyncState) -> Result<LocalScan> {
        let docs = self.vault.list_documents().await?;
        let changed = Self::detect_local_changes(state, &docs);

        if self.detection == ChangeDetection::Mtime {
            return Ok(LocalScan {
                push: changed,
                refreshed: Vec::new(),
            });
        }

        let mut scan = LocalScan::default();
        for doc in changed {
            let Some(known) = state.hash(&doc.path) else {
                scan.push.push(doc);
                continue;
            };

            let bytes = self.vault.read(&doc.path).await?;
            let same = std::str::from_utf8(&bytes)
                .map(|text| content_hash(text) == known)
                .unwrap_or(false);

            if same {
                debug!(path = %doc.path, "Touched without content change");
                scan.refreshed.push(doc);
            } else {
                scan.push.push(doc);
            }
        }
        Ok(scan)
    }
}
