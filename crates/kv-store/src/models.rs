//! KV store models
//!
//! `KvNode` is what callers see. The `Etcd*` types mirror the etcd v2 keys API
//! response documents and stay internal to the HTTP client.

use serde::{Deserialize, Serialize};

/// A single entry returned by a directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvNode {
    /// Full key path, e.g. `/paasnet/ports/p-1`
    pub key: String,
    /// Leaf value; empty for directories
    pub value: String,
    pub is_dir: bool,
}

impl KvNode {
    /// Last path segment of the key
    pub fn name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct EtcdResponse {
    #[allow(dead_code)]
    pub action: String,
    pub node: Option<EtcdNode>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct EtcdNode {
    pub key: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub dir: bool,
    #[serde(default)]
    pub nodes: Vec<EtcdNode>,
}

impl From<EtcdNode> for KvNode {
    fn from(node: EtcdNode) -> Self {
        KvNode {
            key: node.key,
            value: node.value.unwrap_or_default(),
            is_dir: node.dir,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EtcdErrorBody {
    pub error_code: u32,
    pub message: String,
}

/// etcd v2 error code for "Key not found"
pub(crate) const ETCD_KEY_NOT_FOUND: u32 = 100;
/// etcd v2 error code for "Compare failed"
pub(crate) const ETCD_TEST_FAILED: u32 = 101;
/// etcd v2 error code for "Key already exists"
pub(crate) const ETCD_NODE_EXIST: u32 = 105;
