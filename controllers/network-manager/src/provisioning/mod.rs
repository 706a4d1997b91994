//! Network and port provisioning workflow.
//!
//! Each operation drives the IaaS backend first and commits the resulting records
//! store-then-cache afterwards. When a later step fails, the IaaS objects created
//! earlier in the same call are removed again before the error is returned.
//!
//! - `network.rs` - networks and subnets, external networks, queries
//! - `port.rs` - logical ports for pods and nodes, single and bulk
//! - `physical_port.rs` - VM-attached ports and the exceptional port sweep

mod network;
mod physical_port;
mod port;

#[cfg(test)]
mod network_test;

use crate::error::ManagerError;
use crate::ipam::IpamEngine;
use crate::persistence::ResourceStore;
use crate::repository::Repositories;
use crate::retry::{RetryPolicy, retry_iaas};
use crate::tenant::TenantService;
use iaas_client::IaasClientTrait;
use resources::{AllocationPool, OwnerType, ProviderAttrs};
use std::sync::Arc;
use tracing::error;

/// Create a tenant network and its subnet
#[derive(Debug, Clone, Default)]
pub struct CreateNetworkRequest {
    pub tenant_id: String,
    pub name: String,
    pub cidr: String,
    /// First host address when empty
    pub gateway_ip: String,
    /// Every host address except the gateway when empty
    pub allocation_pools: Vec<AllocationPool>,
    pub is_public: bool,
    /// Provider network type, physical network and segmentation id, if any
    pub provider: ProviderAttrs,
    pub description: String,
}

/// Adopt a network that already exists on the IaaS backend
#[derive(Debug, Clone, Default)]
pub struct RegisterExternalNetworkRequest {
    pub tenant_id: String,
    pub network_id: String,
    /// Backend name when empty
    pub name: String,
    pub is_public: bool,
    pub description: String,
}

/// One logical port for a pod, node or platform component
#[derive(Debug, Clone, Default)]
pub struct PortSpec {
    pub tenant_id: String,
    pub name: String,
    /// Network id or name
    pub network: String,
    /// Take the address from this IP group instead of the subnet pool
    pub ip_group_id: Option<String>,
    pub fixed_ip: Option<String>,
    pub node_id: String,
    pub cluster_id: String,
    pub owner_type: OwnerType,
    pub pod_name: String,
    pub pod_ns: String,
}

/// One port attached to a node's VM
#[derive(Debug, Clone, Default)]
pub struct PhysicalPortSpec {
    pub tenant_id: String,
    pub name: String,
    /// Network id or name
    pub network: String,
    pub fixed_ip: Option<String>,
    /// Also the VM the port is attached to
    pub node_id: String,
    pub cluster_id: String,
    pub owner_type: OwnerType,
    pub vnic_type: String,
}

/// Drives the IaaS backend and commits the resulting records
pub struct Provisioner {
    store: ResourceStore,
    iaas: Arc<dyn IaasClientTrait>,
    repos: Arc<Repositories>,
    ipam: Arc<IpamEngine>,
    tenants: Arc<TenantService>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for Provisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioner")
            .field("provider", &self.iaas.provider_name())
            .field("retry", &self.retry)
            .finish()
    }
}

impl Provisioner {
    pub fn new(
        store: ResourceStore,
        iaas: Arc<dyn IaasClientTrait>,
        repos: Arc<Repositories>,
        ipam: Arc<IpamEngine>,
        tenants: Arc<TenantService>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            iaas,
            repos,
            ipam,
            tenants,
            retry,
        }
    }

    /// Delete an IaaS port, treating an already missing port as deleted
    async fn delete_iaas_port(&self, port_id: &str) -> Result<(), ManagerError> {
        let iaas = &self.iaas;
        match retry_iaas(&self.retry, "delete port", move || iaas.delete_port(port_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Best-effort variant of [`Self::delete_iaas_port`] for compensation paths
    async fn discard_iaas_port(&self, port_id: &str) {
        if let Err(e) = self.delete_iaas_port(port_id).await {
            error!("Rollback of port {} failed, it is orphaned: {}", port_id, e);
        }
    }
}
