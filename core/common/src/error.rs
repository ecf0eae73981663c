//! Common error types for Concur.

use thiserror::Error;

/// Top-level error type for Concur operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Persisted sync state could not be decoded.
    #[error("Corrupt sync state: {0}")]
    CorruptState(String),

    /// A fetch or push call to the remote store failed.
    #[error("Remote unavailable: {0}")]
    RemoteUnavailable(String),

    /// Local filesystem operation failed.
    #[error("Local I/O error: {0}")]
    LocalIo(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Sync scheduler is not accepting requests.
    #[error("Scheduler error: {0}")]
    Scheduler(String),
}

impl Error {
    /// Whether the failure came from the remote transport.
    pub fn is_remote_unavailable(&self) -> bool {
        matches!(self, Error::RemoteUnavailable(_))
    }

    /// Whether the failure came from the local vault.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Error::LocalIo(_) | Error::NotFound(_) | Error::AlreadyExists(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_is_local() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert!(err.is_local());
        assert!(!err.is_remote_unavailable());
    }

    #[test]
    fn test_remote_classification() {
        let err = Error::RemoteUnavailable("timeout".to_string());
        assert!(err.is_remote_unavailable());
        assert!(!err.is_local());
        assert_eq!(err.to_string(), "Remote unavailable: timeout");
    }
}
