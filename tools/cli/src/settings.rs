//! Persisted CLI settings.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use concur_sync::{ChangeDetection, PushMode, SyncConfig};

pub const DEFAULT_API_URL: &str = "http://localhost:8080";
pub const DEFAULT_INTERVAL_SECS: u64 = 5;

/// Settings file contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api_url: String,
    /// Remote store id, assigned by `concur provision`.
    pub vault_id: Option<i64>,
    pub vault_root: Option<PathBuf>,
    pub interval_secs: u64,
    pub push_mode: PushMode,
    pub change_detection: ChangeDetection,
    /// Extensions of synced documents; empty means every file.
    pub extensions: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            vault_id: None,
            vault_root: None,
            interval_secs: DEFAULT_INTERVAL_SECS,
            push_mode: PushMode::default(),
            change_detection: ChangeDetection::default(),
            extensions: vec!["md".to_string()],
        }
    }
}

impl Settings {
    /// Default settings location under the user config directory.
    pub fn default_path() -> Result<PathBuf> {
        let dir = dirs::config_dir().context("Could not determine config directory")?;
        Ok(dir.join("concur").join("settings.json"))
    }

    /// Load settings, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Invalid settings file {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write settings to {}", path.display()))
    }

    pub fn vault_root(&self) -> Result<&Path> {
        match &self.vault_root {
            Some(root) => Ok(root),
            None => bail!("No vault directory configured; pass --vault or set vault_root"),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    /// Sync configuration for the controller.
    pub fn sync_config(&self) -> Result<SyncConfig> {
        let Some(vault_id) = self.vault_id else {
            bail!("No vault id configured; run `concur provision --name <name>` first");
        };
        let config = SyncConfig::new(&self.api_url, vault_id)
            .context("Invalid sync settings")?
            .with_push_mode(self.push_mode)
            .with_change_detection(self.change_detection);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let settings = Settings::load(&temp.path().join("settings.json")).unwrap();

        assert_eq!(settings, Settings::default());
        assert_eq!(settings.api_url, "http://localhost:8080");
        assert_eq!(settings.interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("settings.json");
        let settings = Settings {
            vault_id: Some(12),
            vault_root: Some(temp.path().join("vault")),
            push_mode: PushMode::Single,
            ..Settings::default()
        };

        settings.save(&path).unwrap();

        assert_eq!(Settings::load(&path).unwrap(), settings);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.json");
        std::fs::write(&path, r#"{"vault_id": 3}"#).unwrap();

        let settings = Settings::load(&path).unwrap();

        assert_eq!(settings.vault_id, Some(3));
        assert_eq!(settings.interval_secs, 5);
        assert_eq!(settings.extensions, vec!["md".to_string()]);
    }

    #[test]
    fn test_sync_config_requires_vault_id() {
        assert!(Settings::default().sync_config().is_err());

        let settings = Settings {
            vault_id: Some(4),
            change_detection: ChangeDetection::MtimeAndHash,
            ..Settings::default()
        };
        let config = settings.sync_config().unwrap();
        assert_eq!(config.store_id.get(), 4);
        assert_eq!(config.change_detection, ChangeDetection::MtimeAndHash);
    }

    #[test]
    fn test_sync_config_rejects_bad_url() {
        let settings = Settings {
            api_url: "localhost".to_string(),
            vault_id: Some(1),
            ..Settings::default()
        };
        assert!(settings.sync_config().is_err());
    }
}
