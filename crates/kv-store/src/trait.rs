//! KvStoreTrait for mocking
//!
//! The network manager is written against this trait only. `EtcdClient` implements
//! it for production and `MemoryKvStore` for unit tests.

use crate::error::KvError;
use crate::models::KvNode;
use std::time::Duration;

/// Hierarchical key-value store operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait KvStoreTrait: Send + Sync {
    /// Human readable endpoint, used in logs
    fn endpoint(&self) -> &str;

    /// Create or overwrite a leaf
    async fn save_leaf(&self, key: &str, value: &str) -> Result<(), KvError>;

    /// Read a leaf value; `KvError::NotFound` when absent
    async fn read_leaf(&self, key: &str) -> Result<String, KvError>;

    /// List the direct children of a directory; `KvError::NotFound` when absent
    async fn read_dir(&self, key: &str) -> Result<Vec<KvNode>, KvError>;

    /// Delete a single leaf
    async fn delete_leaf(&self, key: &str) -> Result<(), KvError>;

    /// Delete a directory and everything beneath it
    async fn delete_dir(&self, key: &str) -> Result<(), KvError>;

    /// Acquire an advisory lock, waiting until it is free
    ///
    /// The lock lapses after `ttl` unless refreshed. The returned token identifies
    /// this acquisition and must be presented to refresh or release it.
    async fn lock(&self, key: &str, ttl: Duration) -> Result<String, KvError>;

    /// Extend a held lock; `KvError::CompareFailed` once `token` no longer holds it
    async fn refresh_lock(&self, key: &str, token: &str, ttl: Duration) -> Result<(), KvError>;

    /// Release a lock if `token` still holds it
    ///
    /// An already lapsed lock counts as released. A lock taken over by another
    /// holder is left alone and reported as `KvError::CompareFailed`.
    async fn unlock(&self, key: &str, token: &str) -> Result<(), KvError>;
}
