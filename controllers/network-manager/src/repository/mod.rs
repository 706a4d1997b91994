//! Indexed object repository.
//!
//! One `Repository<T>` per resource kind holds the cached copy of every committed
//! record, keyed by id, with named secondary indexes (tenant, network, public flag,
//! ...). Index values are a pure function of the record, recomputed on every write,
//! so readers never observe an index that disagrees with the stored object.

mod indexes;
#[cfg(test)]
mod repository_test;

pub use indexes::*;

use crate::error::ManagerError;
use parking_lot::RwLock;
use resources::{IpGroup, LogicalPort, Network, PhysicalPort, Subnet};
use std::collections::{HashMap, HashSet};

/// A record that can live in a [`Repository`]
pub trait Indexed: Clone + Send + Sync + 'static {
    /// Kind name used in error messages
    const KIND: &'static str;

    /// Primary key
    fn key(&self) -> &str;

    /// `(index name, value)` pairs for every secondary index the record is in
    fn index_values(&self) -> Vec<(&'static str, String)>;
}

#[derive(Debug)]
struct Inner<T> {
    objects: HashMap<String, T>,
    /// index name -> index value -> keys
    indexes: HashMap<&'static str, HashMap<String, HashSet<String>>>,
}

impl<T: Indexed> Inner<T> {
    fn link(&mut self, obj: &T) {
        for (name, value) in obj.index_values() {
            self.indexes
                .entry(name)
                .or_default()
                .entry(value)
                .or_default()
                .insert(obj.key().to_string());
        }
    }

    fn unlink(&mut self, obj: &T) {
        for (name, value) in obj.index_values() {
            if let Some(by_value) = self.indexes.get_mut(name) {
                if let Some(keys) = by_value.get_mut(&value) {
                    keys.remove(obj.key());
                    if keys.is_empty() {
                        by_value.remove(&value);
                    }
                }
            }
        }
    }

    fn put(&mut self, obj: T) {
        if let Some(old) = self.objects.remove(obj.key()) {
            self.unlink(&old);
        }
        self.link(&obj);
        self.objects.insert(obj.key().to_string(), obj);
    }
}

/// Thread-safe typed cache for one resource kind
#[derive(Debug)]
pub struct Repository<T> {
    inner: RwLock<Inner<T>>,
}

impl<T: Indexed> Default for Repository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Indexed> Repository<T> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                objects: HashMap::new(),
                indexes: HashMap::new(),
            }),
        }
    }

    /// Insert a record. Re-adding an existing id replaces it.
    pub fn add(&self, obj: T) -> Result<(), ManagerError> {
        if obj.key().is_empty() {
            return Err(ManagerError::BadRequest(format!("{} without id", T::KIND)));
        }
        self.inner.write().put(obj);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<T, ManagerError> {
        self.inner
            .read()
            .objects
            .get(id)
            .cloned()
            .ok_or_else(|| ManagerError::NotFound(format!("{} {}", T::KIND, id)))
    }

    /// Replace an existing record; fails when the id is not cached
    pub fn update(&self, obj: T) -> Result<(), ManagerError> {
        let mut inner = self.inner.write();
        if !inner.objects.contains_key(obj.key()) {
            return Err(ManagerError::NotFound(format!("{} {}", T::KIND, obj.key())));
        }
        inner.put(obj);
        Ok(())
    }

    /// Remove a record, returning it if it was cached
    pub fn del(&self, id: &str) -> Option<T> {
        let mut inner = self.inner.write();
        let removed = inner.objects.remove(id);
        if let Some(old) = &removed {
            inner.unlink(old);
        }
        removed
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.read().objects.contains_key(id)
    }

    pub fn list(&self) -> Vec<T> {
        self.inner.read().objects.values().cloned().collect()
    }

    /// Records whose index `index` has value `value`
    pub fn list_by_index(&self, index: &str, value: &str) -> Vec<T> {
        let inner = self.inner.read();
        inner
            .indexes
            .get(index)
            .and_then(|by_value| by_value.get(value))
            .map(|keys| {
                keys.iter()
                    .filter_map(|key| inner.objects.get(key).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One repository per resource kind, shared by every component of the manager
#[derive(Debug, Default)]
pub struct Repositories {
    pub networks: Repository<Network>,
    pub subnets: Repository<Subnet>,
    pub ports: Repository<LogicalPort>,
    pub physical_ports: Repository<PhysicalPort>,
    pub ip_groups: Repository<IpGroup>,
}
