//! Tenant records and the network quota.
//!
//! Every quota check-then-write runs under the tenant guard: an in-process async
//! lock per tenant plus the store's advisory lock, so concurrent creations in this
//! process and in other instances cannot both pass the check. The store lock is
//! refreshed in the background for as long as the guard is held.

use crate::error::ManagerError;
use crate::persistence::ResourceStore;
use crate::repository::{INDEX_TENANT, Repositories};
use kv_store::KvError;
use parking_lot::Mutex;
use resources::Tenant;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Proof that the caller holds a tenant's lock; hand back to [`TenantService::unlock`]
#[derive(Debug)]
pub struct TenantGuard {
    tenant_id: String,
    token: String,
    refresher: JoinHandle<()>,
    _local: OwnedMutexGuard<()>,
}

impl TenantGuard {
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }
}

impl Drop for TenantGuard {
    fn drop(&mut self) {
        self.refresher.abort();
    }
}

/// Keep the store lock alive until aborted or until it turns out to be lost
async fn refresh_store_lock(store: ResourceStore, tenant_id: String, token: String, ttl: Duration) {
    let mut ticker = tokio::time::interval(ttl / 3);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        match store.refresh_tenant_lock(&tenant_id, &token, ttl).await {
            Ok(()) => debug!("Refreshed store lock of tenant {}", tenant_id),
            Err(ManagerError::Store(KvError::CompareFailed(_))) => {
                error!("Store lock of tenant {} was lost while held", tenant_id);
                return;
            }
            Err(e) => warn!("Failed to refresh store lock of tenant {}: {}", tenant_id, e),
        }
    }
}

#[derive(Debug)]
pub struct TenantService {
    store: ResourceStore,
    repos: Arc<Repositories>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    admin_tenant_id: String,
    default_quota: u32,
    admin_quota: u32,
    lock_ttl: Duration,
}

impl TenantService {
    pub fn new(
        store: ResourceStore,
        repos: Arc<Repositories>,
        admin_tenant_id: String,
        default_quota: u32,
        admin_quota: u32,
        lock_ttl: Duration,
    ) -> Self {
        Self {
            store,
            repos,
            locks: Mutex::new(HashMap::new()),
            admin_tenant_id,
            default_quota,
            admin_quota,
            lock_ttl,
        }
    }

    pub fn admin_tenant_id(&self) -> &str {
        &self.admin_tenant_id
    }

    pub fn is_admin(&self, tenant_id: &str) -> bool {
        tenant_id == self.admin_tenant_id
    }

    fn initial_quota(&self, tenant_id: &str) -> u32 {
        if self.is_admin(tenant_id) {
            self.admin_quota
        } else {
            self.default_quota
        }
    }

    /// Take the tenant's local and store locks
    pub async fn lock(&self, tenant_id: &str) -> Result<TenantGuard, ManagerError> {
        let local = self
            .locks
            .lock()
            .entry(tenant_id.to_string())
            .or_default()
            .clone();
        let local = local.lock_owned().await;
        let token = self.store.lock_tenant(tenant_id, self.lock_ttl).await?;
        let refresher = tokio::spawn(refresh_store_lock(
            self.store.clone(),
            tenant_id.to_string(),
            token.clone(),
            self.lock_ttl,
        ));
        Ok(TenantGuard {
            tenant_id: tenant_id.to_string(),
            token,
            refresher,
            _local: local,
        })
    }

    /// Release a guard. A failed store unlock is logged; the lock expires on its own.
    pub async fn unlock(&self, guard: TenantGuard) {
        guard.refresher.abort();
        match self.store.unlock_tenant(&guard.tenant_id, &guard.token).await {
            Ok(()) => {}
            Err(ManagerError::Store(KvError::CompareFailed(_))) => {
                warn!("Store lock of tenant {} lapsed and is now held elsewhere", guard.tenant_id)
            }
            Err(e) => warn!("Failed to release store lock of tenant {}: {}", guard.tenant_id, e),
        }
    }

    /// Create a tenant record; `quota` defaults per tenant kind
    pub async fn create_tenant(&self, tenant_id: &str, quota: Option<u32>) -> Result<Tenant, ManagerError> {
        if tenant_id.trim().is_empty() {
            return Err(ManagerError::BadRequest("tenant id is required".to_string()));
        }
        let guard = self.lock(tenant_id).await?;
        let result = self.create_locked(tenant_id, quota).await;
        self.unlock(guard).await;
        result
    }

    async fn create_locked(&self, tenant_id: &str, quota: Option<u32>) -> Result<Tenant, ManagerError> {
        match self.store.read_tenant(tenant_id).await {
            Ok(_) => {
                return Err(ManagerError::Conflict(format!("tenant {} already exists", tenant_id)));
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let tenant = Tenant::new(tenant_id, quota.unwrap_or_else(|| self.initial_quota(tenant_id)));
        self.store.save_record(&tenant).await?;
        info!("Created tenant {} with network quota {}", tenant_id, tenant.quota);
        Ok(tenant)
    }

    pub async fn get_tenant(&self, tenant_id: &str) -> Result<Tenant, ManagerError> {
        self.store.read_tenant(tenant_id).await
    }

    /// Read the tenant record, creating it with the default quota on first use.
    /// Callers must hold the tenant guard.
    pub async fn ensure_tenant(&self, _guard: &TenantGuard, tenant_id: &str) -> Result<Tenant, ManagerError> {
        match self.store.read_tenant(tenant_id).await {
            Ok(tenant) => Ok(tenant),
            Err(e) if e.is_not_found() => {
                let tenant = Tenant::new(tenant_id, self.initial_quota(tenant_id));
                self.store.save_record(&tenant).await?;
                debug!("Created tenant record {} on first use", tenant_id);
                Ok(tenant)
            }
            Err(e) => Err(e),
        }
    }

    /// Fail unless the tenant may create one more network
    pub async fn check_network_quota(&self, guard: &TenantGuard, tenant_id: &str) -> Result<Tenant, ManagerError> {
        let tenant = self.ensure_tenant(guard, tenant_id).await?;
        if tenant.is_cancelling {
            return Err(ManagerError::Conflict(format!("tenant {} is being cancelled", tenant_id)));
        }
        if !tenant.has_network_headroom() {
            return Err(ManagerError::Conflict(format!(
                "tenant {} network quota exceeded ({}/{})",
                tenant_id, tenant.net_num, tenant.quota
            )));
        }
        Ok(tenant)
    }

    /// Networks the tenant owns in the cache; external networks are not counted
    pub fn count_networks(&self, tenant_id: &str) -> u32 {
        let count = self
            .repos
            .networks
            .list_by_index(INDEX_TENANT, tenant_id)
            .iter()
            .filter(|n| !n.is_external)
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    /// Recount the tenant's networks from the cache and persist the count.
    /// Callers must hold the tenant guard.
    pub async fn recompute_usage(&self, guard: &TenantGuard, tenant_id: &str) -> Result<Tenant, ManagerError> {
        let mut tenant = self.ensure_tenant(guard, tenant_id).await?;
        let net_num = self.count_networks(tenant_id);
        if tenant.net_num != net_num {
            debug!("Tenant {} network count {} -> {}", tenant_id, tenant.net_num, net_num);
            tenant.net_num = net_num;
            self.store.save_record(&tenant).await?;
        }
        Ok(tenant)
    }

    /// Recount usage under the tenant guard
    pub async fn refresh_usage(&self, tenant_id: &str) -> Result<Tenant, ManagerError> {
        let guard = self.lock(tenant_id).await?;
        let result = self.recompute_usage(&guard, tenant_id).await;
        self.unlock(guard).await;
        result
    }

    /// Change the quota; it may not drop below the networks already in use
    pub async fn update_quota(&self, tenant_id: &str, quota: u32) -> Result<Tenant, ManagerError> {
        let guard = self.lock(tenant_id).await?;
        let result = async {
            let mut tenant = self.recompute_usage(&guard, tenant_id).await?;
            if quota < tenant.net_num {
                return Err(ManagerError::Conflict(format!(
                    "quota {} is below the {} networks tenant {} already has",
                    quota, tenant.net_num, tenant_id
                )));
            }
            tenant.quota = quota;
            self.store.save_record(&tenant).await?;
            info!("Tenant {} network quota set to {}", tenant_id, quota);
            Ok(tenant)
        }
        .await;
        self.unlock(guard).await;
        result
    }

    /// Persist the cancelling flag
    pub async fn mark_cancelling(&self, tenant_id: &str) -> Result<Tenant, ManagerError> {
        let guard = self.lock(tenant_id).await?;
        let result = async {
            let mut tenant = self.store.read_tenant(tenant_id).await?;
            if !tenant.is_cancelling {
                tenant.is_cancelling = true;
                self.store.save_record(&tenant).await?;
            }
            Ok(tenant)
        }
        .await;
        self.unlock(guard).await;
        result
    }

    /// Tenants whose cancellation has not finished
    pub async fn list_cancelling(&self) -> Result<Vec<Tenant>, ManagerError> {
        Ok(self
            .store
            .list_tenants()
            .await?
            .into_iter()
            .filter(|t| t.is_cancelling)
            .collect())
    }

    /// Drop the tenant record and namespace
    pub async fn remove_tenant(&self, tenant_id: &str) -> Result<(), ManagerError> {
        let guard = self.lock(tenant_id).await?;
        let result = self.store.delete_tenant(tenant_id).await;
        self.unlock(guard).await;
        if result.is_ok() {
            info!("Removed tenant {}", tenant_id);
        }
        result
    }
}
