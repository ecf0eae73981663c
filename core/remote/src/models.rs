//! Wire types exchanged with the remote store.

use serde::{Deserialize, Serialize};

use concur_common::StoreId;

/// One document as exchanged with the remote store.
///
/// The path is kept as the raw wire string; the sync core validates it
/// before touching the local vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncedFile {
    /// Owning store.
    #[serde(rename = "vaultId")]
    pub store_id: StoreId,
    /// Slash-separated path, unique within the store.
    pub path: String,
    /// Full text body.
    pub content: String,
    /// Content fingerprint, when computed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

impl SyncedFile {
    pub fn new(store_id: StoreId, path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            store_id,
            path: path.into(),
            content: content.into(),
            content_hash: None,
        }
    }

    /// Attach a content fingerprint.
    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.content_hash = Some(hash.into());
        self
    }
}

/// A document returned by a remote fetch.
pub type RemoteFileRecord = SyncedFile;

/// Body of `GET /file`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilesResponse {
    pub files: Vec<RemoteFileRecord>,
}

/// Body of `POST /vault`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStore {
    pub name: String,
}

/// A provisioned store as returned by `POST /vault`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreInfo {
    pub id: StoreId,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synced_file_wire_names() {
        let file = SyncedFile::new(StoreId::new(3).unwrap(), "notes/a.md", "hi").with_hash("abc=");

        let json = serde_json::to_value(&file).unwrap();
        assert_eq!(json["vaultId"], 3);
        assert_eq!(json["path"], "notes/a.md");
        assert_eq!(json["content"], "hi");
        assert_eq!(json["contentHash"], "abc=");
    }

    #[test]
    fn test_hash_omitted_when_absent() {
        let file = SyncedFile::new(StoreId::new(3).unwrap(), "a.md", "");
        let json = serde_json::to_string(&file).unwrap();
        assert!(!json.contains("contentHash"));
    }

    #[test]
    fn test_files_response_ignores_server_fields() {
        let body = r#"{"files":[{"id":12,"vaultId":1,"path":"a.md","content":"x","lastSync":"2024-01-01T00:00:00"}]}"#;
        let parsed: FilesResponse = serde_json::from_str(body).unwrap();

        assert_eq!(parsed.files.len(), 1);
        assert_eq!(parsed.files[0].path, "a.md");
        assert_eq!(parsed.files[0].content_hash, None);
    }
}
