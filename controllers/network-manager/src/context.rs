//! Service context.
//!
//! Owns one instance of every component and wires them together: the caches, the
//! persistence adapter, the IPAM engine, the tenant service, the provisioning
//! workflow and the cancellation supervisor.

use crate::bootstrap::{BootstrapSummary, bootstrap};
use crate::config::ManagerConfig;
use crate::error::ManagerError;
use crate::ipam::IpamEngine;
use crate::persistence::ResourceStore;
use crate::provisioning::Provisioner;
use crate::repository::Repositories;
use crate::tenant::{CancellationSupervisor, TenantService};
use iaas_client::IaasClientTrait;
use kv_store::KvStoreTrait;
use std::sync::Arc;
use tracing::info;

#[derive(Debug)]
pub struct ServiceContext {
    pub config: ManagerConfig,
    pub store: ResourceStore,
    pub repos: Arc<Repositories>,
    pub ipam: Arc<IpamEngine>,
    pub tenants: Arc<TenantService>,
    pub provisioner: Arc<Provisioner>,
    pub cancellations: CancellationSupervisor,
}

impl ServiceContext {
    pub fn new(config: ManagerConfig, kv: Arc<dyn KvStoreTrait>, iaas: Arc<dyn IaasClientTrait>) -> Self {
        let store = ResourceStore::new(kv, &config.kv_root);
        let repos = Arc::new(Repositories::default());

        let ipam = Arc::new(IpamEngine::new(
            store.clone(),
            iaas.clone(),
            repos.clone(),
            config.admin_tenant_id.clone(),
            config.iaas_retry,
        ));
        let tenants = Arc::new(TenantService::new(
            store.clone(),
            repos.clone(),
            config.admin_tenant_id.clone(),
            config.default_network_quota,
            config.admin_network_quota,
            config.tenant_lock_ttl,
        ));
        let provisioner = Arc::new(Provisioner::new(
            store.clone(),
            iaas,
            repos.clone(),
            ipam.clone(),
            tenants.clone(),
            config.iaas_retry,
        ));
        let cancellations =
            CancellationSupervisor::new(tenants.clone(), provisioner.clone(), ipam.clone(), config.tenant_cancel);

        Self {
            config,
            store,
            repos,
            ipam,
            tenants,
            provisioner,
            cancellations,
        }
    }

    /// Load the cache, then resume unfinished tenant cancellations
    ///
    /// Fails with `InvalidConfig` when an ephemeral IaaS provider no longer has the
    /// networks the store records.
    pub async fn start(&self) -> Result<BootstrapSummary, ManagerError> {
        let summary = bootstrap(&self.store, &self.repos, self.config.bootstrap_retry_interval).await;
        self.provisioner.check_backend_holds_networks().await?;
        let resumed = self.cancellations.resume().await?;
        if resumed > 0 {
            info!("Resumed {} tenant cancellations", resumed);
        }
        Ok(summary)
    }

    /// Stop background work
    pub async fn shutdown(&self) {
        self.cancellations.shutdown().await;
        info!("Network manager stopped");
    }
}
