//! Debounced watcher for local document changes.
//!
//! Feeds the scheduler's on-demand trigger. Deletions are not reported since
//! they are never synced.

use anyhow::Result;
use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebouncedEvent};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error};

use concur_common::VaultPath;

const DEBOUNCE: Duration = Duration::from_millis(200);

/// Watches a vault directory and yields batches of changed document paths.
pub struct VaultWatcher {
    _debouncer: notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>,
    event_rx: mpsc::UnboundedReceiver<Vec<String>>,
}

impl VaultWatcher {
    pub fn new(root: &Path, extensions: Vec<String>) -> Result<Self> {
        // FSEvents on macOS reports canonical paths.
        let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let watched = root.clone();

        let mut debouncer = new_debouncer(
            DEBOUNCE,
            move |result: Result<Vec<DebouncedEvent>, notify::Error>| match result {
                Ok(events) => {
                    let mut paths: Vec<String> = events
                        .iter()
                        .filter(|event| event.path.is_file())
                        .filter_map(|event| document_path(&watched, &event.path, &extensions))
                        .collect();
                    paths.sort();
                    paths.dedup();

                    if !paths.is_empty() {
                        debug!(count = paths.len(), "Local documents changed");
                        let _ = event_tx.send(paths);
                    }
                }
                Err(e) => error!("File watcher error: {}", e),
            },
        )?;

        debouncer.watcher().watch(&root, RecursiveMode::Recursive)?;

        Ok(Self {
            _debouncer: debouncer,
            event_rx,
        })
    }

    /// Next batch of changed paths; `None` once the watcher stops.
    pub async fn next_batch(&mut self) -> Option<Vec<String>> {
        self.event_rx.recv().await
    }
}

/// Vault-relative path of a document, if `path` is one.
fn document_path(root: &Path, path: &Path, extensions: &[String]) -> Option<String> {
    let relative: PathBuf = path.strip_prefix(root).ok()?.to_path_buf();
    let components = relative
        .components()
        .map(|c| c.as_os_str().to_str().map(String::from))
        .collect::<Option<Vec<_>>>()?;
    let vault_path = VaultPath::from_components(components).ok()?;

    if vault_path.is_root() || vault_path.is_hidden() {
        return None;
    }
    if !extensions.is_empty() {
        let ext = vault_path.extension()?;
        if !extensions.iter().any(|e| e == ext) {
            return None;
        }
    }
    Some(vault_path.to_string_path())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn md() -> Vec<String> {
        vec!["md".to_string()]
    }

    #[test]
    fn test_document_path_filters() {
        let root = Path::new("/vault");

        assert_eq!(
            document_path(root, Path::new("/vault/notes/a.md"), &md()).as_deref(),
            Some("notes/a.md")
        );
        assert_eq!(document_path(root, Path::new("/vault/image.png"), &md()), None);
        assert_eq!(
            document_path(root, Path::new("/vault/.concur/concur_timestamps.json"), &[]),
            None
        );
        assert_eq!(document_path(root, Path::new("/vault/.hidden/a.md"), &md()), None);
        assert_eq!(document_path(root, Path::new("/elsewhere/a.md"), &md()), None);
    }

    #[test]
    fn test_document_path_any_extension() {
        let root = Path::new("/vault");
        assert_eq!(
            document_path(root, Path::new("/vault/data.txt"), &[]).as_deref(),
            Some("data.txt")
        );
    }
}
