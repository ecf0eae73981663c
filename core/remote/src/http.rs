//! HTTP client for the Concur server.

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

use concur_common::{Error, Result, StoreId};

use crate::api::RemoteApi;
use crate::models::{FilesResponse, NewStore, RemoteFileRecord, StoreInfo, SyncedFile};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum number of body bytes quoted in error messages.
const ERROR_BODY_LIMIT: usize = 200;

/// Remote store reached over JSON/HTTP.
///
/// Endpoints, relative to the configured API URL:
/// - `GET  /file?last_sync=<secs>&vault_id=<id>` -> `{"files": [...]}`
/// - `POST /file` with one document or an array of documents
/// - `POST /vault` with `{"name"}` -> `{"id", "name"}`
pub struct HttpRemote {
    http: Client,
    base: Url,
}

impl HttpRemote {
    /// Create a new client for the given API URL.
    ///
    /// # Errors
    /// - URL cannot be used as a base (e.g. `mailto:`)
    /// - HTTP client could not be constructed
    pub fn new(api_url: &Url, timeout: Duration) -> Result<Self> {
        if api_url.cannot_be_a_base() {
            return Err(Error::Config(format!("Invalid API URL: {}", api_url)));
        }

        let http = Client::builder()
            .user_agent(concat!("concur/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base: api_url.clone(),
        })
    }

    /// API URL this client talks to.
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Build the URL of an endpoint below the API URL.
    fn endpoint(&self, segment: &str) -> Result<Url> {
        let raw = format!("{}/{}", self.base.as_str().trim_end_matches('/'), segment);
        Url::parse(&raw).map_err(|e| Error::Config(format!("Invalid endpoint {}: {}", raw, e)))
    }

    /// Fail on any non-2xx status, quoting the start of the body.
    async fn check_status(response: Response, action: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let snippet: String = body.chars().take(ERROR_BODY_LIMIT).collect();
        Err(Error::RemoteUnavailable(format!(
            "{} returned {}: {}",
            action, status, snippet
        )))
    }

    /// Decode a successful JSON response.
    async fn handle_response<T: DeserializeOwned>(response: Response, action: &str) -> Result<T> {
        let response = Self::check_status(response, action).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| Error::RemoteUnavailable(format!("{}: malformed body: {}", action, e)))
    }

    async fn post_json<B: serde::Serialize + ?Sized>(&self, body: &B, action: &str) -> Result<()> {
        let url = self.endpoint("file")?;

        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::RemoteUnavailable(format!("{}: {}", action, e)))?;

        Self::check_status(response, action).await?;
        Ok(())
    }
}

#[async_trait]
impl RemoteApi for HttpRemote {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch_changes(
        &self,
        last_sync_secs: i64,
        store: StoreId,
    ) -> Result<Vec<RemoteFileRecord>> {
        let url = self.endpoint("file")?;
        debug!(last_sync = last_sync_secs, store = %store, "Fetching remote changes");

        let response = self
            .http
            .get(url)
            .query(&[("last_sync", last_sync_secs), ("vault_id", store.get())])
            .send()
            .await
            .map_err(|e| Error::RemoteUnavailable(format!("Failed to fetch changes: {}", e)))?;

        let body: FilesResponse = Self::handle_response(response, "Fetch changes").await?;
        Ok(body.files)
    }

    async fn push_batch(&self, files: &[SyncedFile]) -> Result<()> {
        debug!(count = files.len(), "Pushing batch");
        self.post_json(files, "Push batch").await
    }

    async fn push_one(&self, file: &SyncedFile) -> Result<()> {
        debug!(path = %file.path, "Pushing file");
        self.post_json(file, "Push file").await
    }

    async fn create_store(&self, name: &str) -> Result<StoreInfo> {
        let url = self.endpoint("vault")?;
        let body = NewStore {
            name: name.to_string(),
        };

        let response = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::RemoteUnavailable(format!("Failed to create store: {}", e)))?;

        Self::handle_response(response, "Create store").await
    }
}
