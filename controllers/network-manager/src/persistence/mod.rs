//! Persistence adapter.
//!
//! Maps every resource kind onto deterministic key paths in the hierarchical KV
//! store (see [`KeyScheme`]) and stores records as JSON. "Not found" from the store
//! stays a typed error so callers can tolerate it; listing a kind that was never
//! written yields an empty list.

mod commit;
mod keys;

pub use keys::KeyScheme;

use crate::error::ManagerError;
use kv_store::{KvError, KvStoreTrait};
use resources::{ExceptionalPort, IpGroup, LogicalPort, Network, PhysicalPort, Subnet, Tenant};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// A record with a deterministic home in the store
pub trait Persisted: Serialize + DeserializeOwned + Send + Sync {
    fn store_key(&self, keys: &KeyScheme) -> String;
}

impl Persisted for Network {
    fn store_key(&self, keys: &KeyScheme) -> String {
        keys.network(&self.tenant_id, &self.id)
    }
}

impl Persisted for Subnet {
    fn store_key(&self, keys: &KeyScheme) -> String {
        keys.subnet(&self.id)
    }
}

impl Persisted for LogicalPort {
    fn store_key(&self, keys: &KeyScheme) -> String {
        keys.port(&self.id)
    }
}

impl Persisted for PhysicalPort {
    fn store_key(&self, keys: &KeyScheme) -> String {
        keys.physical_port(&self.id)
    }
}

impl Persisted for IpGroup {
    fn store_key(&self, keys: &KeyScheme) -> String {
        keys.ip_group(&self.id)
    }
}

impl Persisted for ExceptionalPort {
    fn store_key(&self, keys: &KeyScheme) -> String {
        keys.exceptional_port(&self.port_id)
    }
}

impl Persisted for Tenant {
    fn store_key(&self, keys: &KeyScheme) -> String {
        keys.tenant(&self.tenant_uuid)
    }
}

/// Typed access to the durable store
#[derive(Clone)]
pub struct ResourceStore {
    kv: Arc<dyn KvStoreTrait>,
    keys: KeyScheme,
}

impl std::fmt::Debug for ResourceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceStore")
            .field("endpoint", &self.kv.endpoint())
            .field("root", &self.keys.root())
            .finish()
    }
}

impl ResourceStore {
    pub fn new(kv: Arc<dyn KvStoreTrait>, root: &str) -> Self {
        Self {
            kv,
            keys: KeyScheme::new(root),
        }
    }

    pub fn keys(&self) -> &KeyScheme {
        &self.keys
    }

    async fn save<T: Serialize>(&self, key: &str, record: &T) -> Result<(), ManagerError> {
        let value = serde_json::to_string(record)?;
        debug!("Saving {}", key);
        self.kv.save_leaf(key, &value).await?;
        Ok(())
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Result<T, ManagerError> {
        let value = self.kv.read_leaf(key).await?;
        Ok(serde_json::from_str(&value)?)
    }

    async fn remove(&self, key: &str) -> Result<(), ManagerError> {
        debug!("Deleting {}", key);
        self.kv.delete_leaf(key).await?;
        Ok(())
    }

    /// Decode every leaf under `dir`. Undecodable records are logged and skipped so
    /// one corrupt value cannot block a whole kind from loading.
    async fn list<T: DeserializeOwned>(&self, dir: &str) -> Result<Vec<T>, ManagerError> {
        let nodes = match self.kv.read_dir(dir).await {
            Ok(nodes) => nodes,
            Err(KvError::NotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::with_capacity(nodes.len());
        for node in nodes.into_iter().filter(|n| !n.is_dir) {
            match serde_json::from_str(&node.value) {
                Ok(record) => records.push(record),
                Err(e) => error!("Skipping undecodable record {}: {}", node.key, e),
            }
        }
        Ok(records)
    }

    /// Write one record at its key
    pub async fn save_record<T: Persisted>(&self, record: &T) -> Result<(), ManagerError> {
        self.save(&record.store_key(&self.keys), record).await
    }

    /// Delete one record at its key
    pub async fn delete_record<T: Persisted>(&self, record: &T) -> Result<(), ManagerError> {
        self.remove(&record.store_key(&self.keys)).await
    }

    /// Networks of every tenant
    pub async fn list_networks(&self) -> Result<Vec<Network>, ManagerError> {
        let mut networks = Vec::new();
        for tenant_id in self.list_tenant_ids().await? {
            networks.extend(self.list(&self.keys.networks_dir(&tenant_id)).await?);
        }
        Ok(networks)
    }

    pub async fn list_subnets(&self) -> Result<Vec<Subnet>, ManagerError> {
        self.list(&self.keys.subnets_dir()).await
    }

    pub async fn list_ports(&self) -> Result<Vec<LogicalPort>, ManagerError> {
        self.list(&self.keys.ports_dir()).await
    }

    pub async fn list_physical_ports(&self) -> Result<Vec<PhysicalPort>, ManagerError> {
        self.list(&self.keys.physical_ports_dir()).await
    }

    pub async fn list_ip_groups(&self) -> Result<Vec<IpGroup>, ManagerError> {
        self.list(&self.keys.ip_groups_dir()).await
    }

    pub async fn list_exceptional_ports(&self) -> Result<Vec<ExceptionalPort>, ManagerError> {
        self.list(&self.keys.exceptional_ports_dir()).await
    }

    // Tenants

    pub async fn read_tenant(&self, tenant_id: &str) -> Result<Tenant, ManagerError> {
        self.read(&self.keys.tenant(tenant_id)).await
    }

    /// Fail with `Conflict` while the tenant is being cancelled; a tenant without a
    /// record yet is active
    pub async fn check_tenant_active(&self, tenant_id: &str) -> Result<(), ManagerError> {
        match self.read_tenant(tenant_id).await {
            Ok(tenant) if tenant.is_cancelling => {
                Err(ManagerError::Conflict(format!("tenant {} is being cancelled", tenant_id)))
            }
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Remove the tenant record and everything left under its namespace
    pub async fn delete_tenant(&self, tenant_id: &str) -> Result<(), ManagerError> {
        match self.kv.delete_dir(&self.keys.tenant_dir(tenant_id)).await {
            Ok(()) | Err(KvError::NotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_tenant_ids(&self) -> Result<Vec<String>, ManagerError> {
        match self.kv.read_dir(&self.keys.tenants_dir()).await {
            Ok(nodes) => Ok(nodes
                .iter()
                .filter(|n| n.is_dir)
                .map(|n| n.name().to_string())
                .collect()),
            Err(KvError::NotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Tenant records; tenant directories without a record are skipped
    pub async fn list_tenants(&self) -> Result<Vec<Tenant>, ManagerError> {
        let mut tenants = Vec::new();
        for tenant_id in self.list_tenant_ids().await? {
            match self.read_tenant(&tenant_id).await {
                Ok(tenant) => tenants.push(tenant),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(tenants)
    }

    // Advisory locks

    /// Returns the token of this acquisition
    pub async fn lock_tenant(&self, tenant_id: &str, ttl: Duration) -> Result<String, ManagerError> {
        Ok(self.kv.lock(&self.keys.tenant_lock(tenant_id), ttl).await?)
    }

    pub async fn refresh_tenant_lock(&self, tenant_id: &str, token: &str, ttl: Duration) -> Result<(), ManagerError> {
        self.kv.refresh_lock(&self.keys.tenant_lock(tenant_id), token, ttl).await?;
        Ok(())
    }

    pub async fn unlock_tenant(&self, tenant_id: &str, token: &str) -> Result<(), ManagerError> {
        self.kv.unlock(&self.keys.tenant_lock(tenant_id), token).await?;
        Ok(())
    }
}
