//! KV store client errors

use thiserror::Error;

/// Errors that can occur when talking to the KV store
#[derive(Debug, Error)]
pub enum KvError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Store returned an error other than "key not found"
    #[error("KV store API error: {0}")]
    Api(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Key or directory does not exist
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Invalid request (e.g., empty key)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Conditional write or delete did not match the current value
    #[error("Compare failed on {0}")]
    CompareFailed(String),

    /// Store is temporarily unreachable
    #[error("KV store unavailable: {0}")]
    Unavailable(String),
}

impl KvError {
    /// Returns true when the error means the key simply does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, KvError::NotFound(_))
    }
}
