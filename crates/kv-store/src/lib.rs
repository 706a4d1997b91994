//! Hierarchical Key-Value Store Client
//!
//! Persistence collaborator for the network manager. Resources are stored as JSON
//! leaves under deterministic directory paths, read back individually or by
//! listing a directory, and removed leaf-by-leaf or recursively.
//!
//! # Example
//!
//! ```no_run
//! use kv_store::{EtcdClient, KvStoreTrait};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = EtcdClient::new("http://127.0.0.1:2379".to_string())?;
//!
//! store.save_leaf("/paasnet/ports/p-1", r#"{"id":"p-1"}"#).await?;
//! let value = store.read_leaf("/paasnet/ports/p-1").await?;
//! let nodes = store.read_dir("/paasnet/ports").await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Typed not-found**: absent keys surface as [`KvError::NotFound`], never as a
//!   string to be matched
//! - **Advisory locks**: `lock`/`refresh_lock`/`unlock` built on create-if-absent
//!   with a TTL, owned by a per-acquisition token
//! - **Test double**: `MemoryKvStore` (feature `test-util`) with fault injection

pub mod client;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod kv_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::EtcdClient;
pub use error::KvError;
pub use kv_trait::KvStoreTrait;
pub use models::KvNode;
#[cfg(any(test, feature = "test-util"))]
pub use mock::{KvOp, MemoryKvStore};
