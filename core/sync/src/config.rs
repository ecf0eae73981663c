//! Sync configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use concur_common::{Error, Result, StoreId};

/// How locally changed documents are submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushMode {
    /// All documents in one request.
    #[default]
    Batch,
    /// One request per document, for servers that only accept a single file.
    Single,
}

/// How a local document is judged changed since its last sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeDetection {
    /// Any mtime difference from the recorded marker.
    #[default]
    Mtime,
    /// An mtime difference whose content fingerprint also differs from the
    /// last synced one.
    MtimeAndHash,
}

/// Configuration for the sync controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Base URL of the remote API.
    pub api_url: Url,
    /// Store being synchronized.
    pub store_id: StoreId,
    /// Submission mode for the push leg.
    #[serde(default)]
    pub push_mode: PushMode,
    /// Local change detection strategy.
    #[serde(default)]
    pub change_detection: ChangeDetection,
    /// Timeout applied to every remote request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: Duration,
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

impl SyncConfig {
    /// Build a configuration from raw settings values.
    ///
    /// # Errors
    /// - `Error::Config` if the URL does not parse or the store id is not positive
    pub fn new(api_url: &str, store_id: i64) -> Result<Self> {
        let api_url = Url::parse(api_url)
            .map_err(|e| Error::Config(format!("Invalid API URL '{}': {}", api_url, e)))?;
        let store_id = StoreId::new(store_id)
            .map_err(|e| Error::Config(format!("Invalid store id: {}", e)))?;

        let config = Self {
            api_url,
            store_id,
            push_mode: PushMode::default(),
            change_detection: ChangeDetection::default(),
            request_timeout: default_request_timeout(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_push_mode(mut self, mode: PushMode) -> Self {
        self.push_mode = mode;
        self
    }

    pub fn with_change_detection(mut self, detection: ChangeDetection) -> Self {
        self.change_detection = detection;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Check the configuration is usable.
    ///
    /// Deserialized configurations bypass [`SyncConfig::new`], so this is
    /// also called by the controller constructor.
    pub fn validate(&self) -> Result<()> {
        match self.api_url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(Error::Config(format!(
                    "Unsupported API URL scheme '{}'",
                    other
                )))
            }
        }
        if self.api_url.host_str().is_none() {
            return Err(Error::Config("API URL has no host".to_string()));
        }
        if self.store_id.get() <= 0 {
            return Err(Error::Config(format!(
                "Store id must be positive, got {}",
                self.store_id
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::Config("Request timeout must be non-zero".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_with_defaults() {
        let config = SyncConfig::new("http://localhost:8080", 3).unwrap();
        assert_eq!(config.store_id.get(), 3);
        assert_eq!(config.push_mode, PushMode::Batch);
        assert_eq!(config.change_detection, ChangeDetection::Mtime);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        assert!(matches!(SyncConfig::new("not a url", 1), Err(Error::Config(_))));
        assert!(matches!(SyncConfig::new("ftp://host", 1), Err(Error::Config(_))));
        assert!(matches!(SyncConfig::new("http://host", 0), Err(Error::Config(_))));
    }

    #[test]
    fn test_deserialize_applies_defaults() {
        let json = r#"{"api_url":"https://sync.example.com/api","store_id":5}"#;
        let config: SyncConfig = serde_json::from_str(json).unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.push_mode, PushMode::Batch);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_deserialize_modes() {
        let json = r#"{"api_url":"http://h","store_id":5,"push_mode":"single","change_detection":"mtime_and_hash"}"#;
        let config: SyncConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.push_mode, PushMode::Single);
        assert_eq!(config.change_detection, ChangeDetection::MtimeAndHash);
    }

    #[test]
    fn test_deserialized_bad_store_id_fails_validation() {
        let json = r#"{"api_url":"http://h","store_id":-1}"#;
        let config: SyncConfig = serde_json::from_str(json).unwrap();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
