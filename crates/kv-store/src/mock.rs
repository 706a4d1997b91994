//! In-memory KV store for unit testing
//!
//! `MemoryKvStore` keeps leaves in a sorted map and synthesizes directories from key
//! prefixes, matching the shape of the etcd v2 responses. Tests can make selected
//! operations fail, either for the next N calls or for every key under a prefix,
//! and can count how often each operation was invoked. Locks do not lapse on their
//! own; `expire_lock` stands in for a TTL running out.

use crate::error::KvError;
use crate::kv_trait::KvStoreTrait;
use crate::models::KvNode;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Store operation, used to target injected faults and read call counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KvOp {
    SaveLeaf,
    ReadLeaf,
    ReadDir,
    DeleteLeaf,
    DeleteDir,
    Lock,
    RefreshLock,
    Unlock,
}

#[derive(Debug, Default)]
struct Faults {
    next: HashMap<KvOp, u32>,
    prefixes: Vec<(KvOp, String)>,
}

/// In-memory hierarchical store
#[derive(Debug, Clone, Default)]
pub struct MemoryKvStore {
    leaves: Arc<Mutex<BTreeMap<String, String>>>,
    /// lock key -> token of the current holder
    locks: Arc<Mutex<HashMap<String, String>>>,
    faults: Arc<Mutex<Faults>>,
    calls: Arc<Mutex<HashMap<KvOp, u32>>>,
}

fn normalize(key: &str) -> String {
    format!("/{}", key.trim_matches('/'))
}

impl MemoryKvStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` invocations of `op`
    pub fn fail_next(&self, op: KvOp, count: u32) {
        self.faults.lock().unwrap().next.insert(op, count);
    }

    /// Fail every invocation of `op` on keys under `prefix` until cleared
    pub fn fail_prefix(&self, op: KvOp, prefix: &str) {
        self.faults
            .lock()
            .unwrap()
            .prefixes
            .push((op, normalize(prefix)));
    }

    /// Remove all injected faults
    pub fn clear_faults(&self) {
        let mut faults = self.faults.lock().unwrap();
        faults.next.clear();
        faults.prefixes.clear();
    }

    /// Number of times `op` has been invoked
    pub fn calls(&self, op: KvOp) -> u32 {
        self.calls.lock().unwrap().get(&op).copied().unwrap_or(0)
    }

    /// Raw leaf value, bypassing faults (for assertions)
    pub fn get(&self, key: &str) -> Option<String> {
        self.leaves.lock().unwrap().get(&normalize(key)).cloned()
    }

    /// All leaf keys under `prefix` (for assertions)
    pub fn keys_under(&self, prefix: &str) -> Vec<String> {
        let prefix = normalize(prefix);
        self.leaves
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .cloned()
            .collect()
    }

    /// Drop a lock as if its TTL ran out
    pub fn expire_lock(&self, key: &str) {
        self.locks.lock().unwrap().remove(&normalize(key));
    }

    /// Token of the current holder of a lock (for assertions)
    pub fn lock_holder(&self, key: &str) -> Option<String> {
        self.locks.lock().unwrap().get(&normalize(key)).cloned()
    }

    fn enter(&self, op: KvOp, key: &str) -> Result<String, KvError> {
        *self.calls.lock().unwrap().entry(op).or_insert(0) += 1;
        let key = normalize(key);

        let mut faults = self.faults.lock().unwrap();
        if let Some(remaining) = faults.next.get_mut(&op) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(KvError::Unavailable(format!("injected {:?} failure on {}", op, key)));
            }
        }
        if faults
            .prefixes
            .iter()
            .any(|(fault_op, prefix)| *fault_op == op && key.starts_with(prefix.as_str()))
        {
            return Err(KvError::Unavailable(format!("injected {:?} failure on {}", op, key)));
        }
        Ok(key)
    }
}

#[async_trait::async_trait]
impl KvStoreTrait for MemoryKvStore {
    fn endpoint(&self) -> &str {
        "memory://"
    }

    async fn save_leaf(&self, key: &str, value: &str) -> Result<(), KvError> {
        let key = self.enter(KvOp::SaveLeaf, key)?;
        self.leaves.lock().unwrap().insert(key, value.to_string());
        Ok(())
    }

    async fn read_leaf(&self, key: &str) -> Result<String, KvError> {
        let key = self.enter(KvOp::ReadLeaf, key)?;
        self.leaves
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or(KvError::NotFound(key))
    }

    async fn read_dir(&self, key: &str) -> Result<Vec<KvNode>, KvError> {
        let key = self.enter(KvOp::ReadDir, key)?;
        let dir_prefix = format!("{}/", key);
        let leaves = self.leaves.lock().unwrap();

        let mut nodes = Vec::new();
        let mut seen_dirs = BTreeSet::new();
        for (leaf_key, value) in leaves.range(dir_prefix.clone()..) {
            let Some(rest) = leaf_key.strip_prefix(&dir_prefix) else {
                break;
            };
            match rest.split_once('/') {
                Some((child, _)) => {
                    if seen_dirs.insert(child.to_string()) {
                        nodes.push(KvNode {
                            key: format!("{}{}", dir_prefix, child),
                            value: String::new(),
                            is_dir: true,
                        });
                    }
                }
                None => nodes.push(KvNode {
                    key: leaf_key.clone(),
                    value: value.clone(),
                    is_dir: false,
                }),
            }
        }

        if nodes.is_empty() {
            return Err(KvError::NotFound(key));
        }
        Ok(nodes)
    }

    async fn delete_leaf(&self, key: &str) -> Result<(), KvError> {
        let key = self.enter(KvOp::DeleteLeaf, key)?;
        self.leaves
            .lock()
            .unwrap()
            .remove(&key)
            .map(|_| ())
            .ok_or(KvError::NotFound(key))
    }

    async fn delete_dir(&self, key: &str) -> Result<(), KvError> {
        let key = self.enter(KvOp::DeleteDir, key)?;
        let dir_prefix = format!("{}/", key);
        let mut leaves = self.leaves.lock().unwrap();
        let before = leaves.len();
        leaves.retain(|k, _| !k.starts_with(&dir_prefix));
        if leaves.len() == before {
            return Err(KvError::NotFound(key));
        }
        Ok(())
    }

    async fn lock(&self, key: &str, _ttl: Duration) -> Result<String, KvError> {
        let key = self.enter(KvOp::Lock, key)?;
        let token = Uuid::new_v4().to_string();
        loop {
            {
                let mut locks = self.locks.lock().unwrap();
                if !locks.contains_key(&key) {
                    locks.insert(key, token.clone());
                    return Ok(token);
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn refresh_lock(&self, key: &str, token: &str, _ttl: Duration) -> Result<(), KvError> {
        let key = self.enter(KvOp::RefreshLock, key)?;
        match self.locks.lock().unwrap().get(&key) {
            Some(holder) if holder == token => Ok(()),
            _ => Err(KvError::CompareFailed(key)),
        }
    }

    async fn unlock(&self, key: &str, token: &str) -> Result<(), KvError> {
        let key = self.enter(KvOp::Unlock, key)?;
        let mut locks = self.locks.lock().unwrap();
        let held = match locks.get(&key) {
            None => return Ok(()),
            Some(holder) => holder == token,
        };
        if !held {
            return Err(KvError::CompareFailed(key));
        }
        locks.remove(&key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_dir_lists_leaves_and_subdirectories() {
        let store = MemoryKvStore::new();
        store.save_leaf("/r/tenants/t1/self", "{}").await.unwrap();
        store.save_leaf("/r/tenants/t1/networks/n1", "a").await.unwrap();
        store.save_leaf("/r/tenants/t2/networks/n2", "b").await.unwrap();

        let tenants = store.read_dir("/r/tenants").await.unwrap();
        let names: Vec<&str> = tenants.iter().map(|n| n.name()).collect();
        assert_eq!(names, vec!["t1", "t2"]);
        assert!(tenants.iter().all(|n| n.is_dir));

        let t1 = store.read_dir("/r/tenants/t1").await.unwrap();
        assert_eq!(t1.len(), 2);
        assert!(t1.iter().any(|n| n.name() == "self" && !n.is_dir));
    }

    #[tokio::test]
    async fn test_missing_keys_are_not_found() {
        let store = MemoryKvStore::new();
        assert!(store.read_leaf("/nope").await.unwrap_err().is_not_found());
        assert!(store.read_dir("/nope").await.unwrap_err().is_not_found());
        assert!(store.delete_leaf("/nope").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_delete_dir_is_recursive() {
        let store = MemoryKvStore::new();
        store.save_leaf("/r/a/b/c", "1").await.unwrap();
        store.save_leaf("/r/a/d", "2").await.unwrap();
        store.save_leaf("/r/ab", "3").await.unwrap();

        store.delete_dir("/r/a").await.unwrap();
        assert_eq!(store.keys_under("/r"), vec!["/r/ab".to_string()]);
    }

    #[tokio::test]
    async fn test_injected_faults() {
        let store = MemoryKvStore::new();
        store.fail_next(KvOp::SaveLeaf, 1);
        assert!(store.save_leaf("/k", "v").await.is_err());
        assert!(store.save_leaf("/k", "v").await.is_ok());

        store.fail_prefix(KvOp::ReadLeaf, "/k");
        assert!(matches!(store.read_leaf("/k").await, Err(KvError::Unavailable(_))));
        store.clear_faults();
        assert_eq!(store.read_leaf("/k").await.unwrap(), "v");
        assert_eq!(store.calls(KvOp::SaveLeaf), 2);
    }

    const TTL: Duration = Duration::from_secs(30);

    #[tokio::test]
    async fn test_lock_is_exclusive_until_unlocked() {
        let store = MemoryKvStore::new();
        let token = store.lock("/locks/x", TTL).await.unwrap();

        let contender = store.clone();
        let handle = tokio::spawn(async move { contender.lock("/locks/x", TTL).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        store.unlock("/locks/x", &token).await.unwrap();
        let next = handle.await.unwrap().unwrap();
        assert_ne!(next, token);
    }

    #[tokio::test]
    async fn test_stale_holder_cannot_release_successor_lock() {
        let store = MemoryKvStore::new();
        let stale = store.lock("/locks/x", TTL).await.unwrap();
        store.expire_lock("/locks/x");
        let current = store.lock("/locks/x", TTL).await.unwrap();

        let err = store.unlock("/locks/x", &stale).await.unwrap_err();
        assert!(matches!(err, KvError::CompareFailed(_)));
        assert!(matches!(
            store.refresh_lock("/locks/x", &stale, TTL).await,
            Err(KvError::CompareFailed(_))
        ));
        assert_eq!(store.lock_holder("/locks/x"), Some(current.clone()));

        store.refresh_lock("/locks/x", &current, TTL).await.unwrap();
        store.unlock("/locks/x", &current).await.unwrap();
        assert_eq!(store.lock_holder("/locks/x"), None);
        // lapsed lock counts as released
        store.unlock("/locks/x", &current).await.unwrap();
    }
}
