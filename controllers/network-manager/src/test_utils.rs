//! Test helpers: a fully wired context over in-memory collaborators.

use crate::config::{CancelPolicy, ManagerConfig};
use crate::context::ServiceContext;
use crate::ipam::CreateIpGroupRequest;
use crate::provisioning::{CreateNetworkRequest, PortSpec};
use crate::retry::RetryPolicy;
use iaas_client::EmbeddedIaasClient;
use kv_store::MemoryKvStore;
use resources::{IpGroup, LogicalPort, Network};
use std::sync::Arc;
use std::time::Duration;

pub const TENANT: &str = "tenant-a";
pub const OTHER_TENANT: &str = "tenant-b";
pub const ADMIN: &str = "admin";

/// Handles on the in-memory collaborators plus the context built over them
pub struct TestEnv {
    pub kv: MemoryKvStore,
    pub iaas: EmbeddedIaasClient,
    pub ctx: ServiceContext,
}

pub fn test_config() -> ManagerConfig {
    ManagerConfig {
        iaas_retry: RetryPolicy {
            attempts: 3,
            backoff: Duration::from_millis(1),
        },
        bootstrap_retry_interval: Duration::from_millis(5),
        tenant_cancel: CancelPolicy {
            max_attempts: 3,
            backoff_min_secs: 0,
            backoff_max_secs: 0,
        },
        ..ManagerConfig::default()
    }
}

pub fn test_env() -> TestEnv {
    let kv = MemoryKvStore::new();
    let iaas = EmbeddedIaasClient::new();
    let ctx = ServiceContext::new(test_config(), Arc::new(kv.clone()), Arc::new(iaas.clone()));
    TestEnv { kv, iaas, ctx }
}

impl TestEnv {
    /// A second context over the same collaborators, as after a restart
    pub fn restart(&self) -> ServiceContext {
        ServiceContext::new(test_config(), Arc::new(self.kv.clone()), Arc::new(self.iaas.clone()))
    }

    pub fn network_request(&self, tenant_id: &str, name: &str, cidr: &str) -> CreateNetworkRequest {
        CreateNetworkRequest {
            tenant_id: tenant_id.to_string(),
            name: name.to_string(),
            cidr: cidr.to_string(),
            ..Default::default()
        }
    }

    pub async fn network(&self, tenant_id: &str, name: &str, cidr: &str) -> Network {
        self.ctx
            .provisioner
            .create_network(self.network_request(tenant_id, name, cidr))
            .await
            .unwrap()
    }

    pub async fn ip_group(&self, network: &Network, name: &str, ips: Option<&str>, size: Option<usize>) -> IpGroup {
        self.ctx
            .ipam
            .create(CreateIpGroupRequest {
                tenant_id: network.tenant_id.clone(),
                name: name.to_string(),
                network_id: network.id.clone(),
                ips: ips.map(str::to_string),
                size,
            })
            .await
            .unwrap()
    }

    pub fn pod_port(&self, network: &Network, pod_name: &str) -> PortSpec {
        PortSpec {
            tenant_id: network.tenant_id.clone(),
            name: format!("{}-eth0", pod_name),
            network: network.id.clone(),
            node_id: "node-1".to_string(),
            pod_name: pod_name.to_string(),
            pod_ns: "default".to_string(),
            ..Default::default()
        }
    }

    pub async fn port(&self, network: &Network, pod_name: &str) -> LogicalPort {
        self.ctx
            .provisioner
            .create_port(self.pod_port(network, pod_name))
            .await
            .unwrap()
    }
}
