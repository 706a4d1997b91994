//! Embedded no-auth IaaS provider
//!
//! Keeps networks, subnets and ports in memory and hands out addresses from the
//! subnet allocation pools in ascending order. It backs single-node deployments
//! that have no cloud underneath and every unit test of the network manager.
//!
//! The provider is organized like the capability surface:
//! - `network.rs` - networks, provider networks, subnets
//! - `port.rs` - ports, bulk creation, VM attachment

mod network;
mod port;

use crate::error::IaasError;
use crate::iaas_trait::IaasClientTrait;
use crate::models::*;
use std::collections::HashMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// Provider operation, used to target injected faults and read call counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IaasOp {
    CreateNetwork,
    CreateProviderNetwork,
    DeleteNetwork,
    GetNetwork,
    GetNetworkExtendedAttrs,
    CreateSubnet,
    GetSubnet,
    GetSubnetId,
    CreatePort,
    CreateBulkPorts,
    DeletePort,
    AttachPortToVm,
    DetachPortFromVm,
    ListPorts,
}

#[derive(Debug, Clone)]
pub(crate) struct NetworkEntry {
    pub network: IaasNetwork,
    pub attrs: NetworkExtendedAttrs,
}

#[derive(Debug, Default)]
pub(crate) struct EmbeddedState {
    pub networks: HashMap<String, NetworkEntry>,
    pub subnets: HashMap<String, IaasSubnet>,
    pub ports: HashMap<String, IaasPort>,
    pub next_vni: u32,
    pub next_mac: u32,
}

#[derive(Debug, Default)]
pub(crate) struct Faults {
    pub next: HashMap<IaasOp, u32>,
    pub always: Vec<IaasOp>,
    pub bulk_stop_after: Option<usize>,
}

/// In-memory IaaS provider
#[derive(Debug, Clone, Default)]
pub struct EmbeddedIaasClient {
    pub(crate) state: Arc<Mutex<EmbeddedState>>,
    pub(crate) faults: Arc<Mutex<Faults>>,
    pub(crate) calls: Arc<Mutex<HashMap<IaasOp, u32>>>,
}

impl EmbeddedIaasClient {
    /// Create an empty provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times `op` has been invoked
    pub fn calls(&self, op: IaasOp) -> u32 {
        self.calls.lock().get(&op).copied().unwrap_or(0)
    }

    /// Ids of every port currently on the provider
    pub fn port_ids(&self) -> Vec<String> {
        self.state.lock().ports.keys().cloned().collect()
    }

    /// Ids of every network currently on the provider
    pub fn network_ids(&self) -> Vec<String> {
        self.state.lock().networks.keys().cloned().collect()
    }

    /// Record a call and apply any injected fault for it
    pub(crate) fn enter(&self, op: IaasOp) -> Result<(), IaasError> {
        *self.calls.lock().entry(op).or_insert(0) += 1;

        let mut faults = self.faults.lock();
        if faults.always.contains(&op) {
            return Err(IaasError::Unavailable(format!("injected {:?} failure", op)));
        }
        if let Some(remaining) = faults.next.get_mut(&op) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(IaasError::Unavailable(format!("injected {:?} failure", op)));
            }
        }
        Ok(())
    }

    pub(crate) fn take_bulk_stop(&self) -> Option<usize> {
        self.faults.lock().bulk_stop_after.take()
    }
}

#[cfg(any(test, feature = "test-util"))]
impl EmbeddedIaasClient {
    /// Fail the next `count` invocations of `op`
    pub fn fail_next(&self, op: IaasOp, count: u32) {
        self.faults.lock().next.insert(op, count);
    }

    /// Fail every invocation of `op` until cleared
    pub fn fail_always(&self, op: IaasOp) {
        self.faults.lock().always.push(op);
    }

    /// Make the next bulk creation stop after `created` ports
    pub fn fail_bulk_after(&self, created: usize) {
        self.faults.lock().bulk_stop_after = Some(created);
    }

    /// Remove all injected faults
    pub fn clear_faults(&self) {
        let mut faults = self.faults.lock();
        faults.next.clear();
        faults.always.clear();
        faults.bulk_stop_after = None;
    }

    /// Put a DHCP agent port on the network's subnet
    pub fn add_dhcp_port(&self, network_id: &str) -> Result<IaasPort, IaasError> {
        let request = PortRequest {
            name: "dhcp".to_string(),
            network_id: network_id.to_string(),
            ..Default::default()
        };
        port::insert_port(self, &request, DEVICE_OWNER_DHCP)
    }

    /// VM a port is attached to, if any
    pub fn attached_vm(&self, port_id: &str) -> Option<String> {
        self.state
            .lock()
            .ports
            .get(port_id)
            .map(|p| p.device_id.clone())
            .filter(|vm| !vm.is_empty())
    }
}

#[async_trait::async_trait]
impl IaasClientTrait for EmbeddedIaasClient {
    fn provider_name(&self) -> &str {
        "embedded"
    }

    fn is_ephemeral(&self) -> bool {
        true
    }

    async fn create_network(&self, name: &str) -> Result<String, IaasError> {
        self.enter(IaasOp::CreateNetwork)?;
        network::create_network(self, name, None)
    }

    async fn create_provider_network(&self, request: &ProviderNetworkRequest) -> Result<String, IaasError> {
        self.enter(IaasOp::CreateProviderNetwork)?;
        network::create_network(self, &request.name, Some(request))
    }

    async fn delete_network(&self, id: &str) -> Result<(), IaasError> {
        self.enter(IaasOp::DeleteNetwork)?;
        network::delete_network(self, id)
    }

    async fn get_network(&self, id: &str) -> Result<IaasNetwork, IaasError> {
        self.enter(IaasOp::GetNetwork)?;
        network::get_entry(self, id).map(|e| e.network)
    }

    async fn get_network_extended_attrs(&self, id: &str) -> Result<NetworkExtendedAttrs, IaasError> {
        self.enter(IaasOp::GetNetworkExtendedAttrs)?;
        network::get_entry(self, id).map(|e| e.attrs)
    }

    async fn create_subnet(&self, request: &SubnetRequest) -> Result<IaasSubnet, IaasError> {
        self.enter(IaasOp::CreateSubnet)?;
        network::create_subnet(self, request)
    }

    async fn get_subnet(&self, id: &str) -> Result<IaasSubnet, IaasError> {
        self.enter(IaasOp::GetSubnet)?;
        network::get_subnet(self, id)
    }

    async fn get_subnet_id(&self, network_id: &str) -> Result<String, IaasError> {
        self.enter(IaasOp::GetSubnetId)?;
        network::get_subnet_id(self, network_id)
    }

    async fn create_port(&self, request: &PortRequest) -> Result<IaasPort, IaasError> {
        self.enter(IaasOp::CreatePort)?;
        port::create_port(self, request)
    }

    async fn create_bulk_ports(&self, requests: &[PortRequest]) -> Result<Vec<IaasPort>, IaasError> {
        self.enter(IaasOp::CreateBulkPorts)?;
        port::create_bulk_ports(self, requests)
    }

    async fn delete_port(&self, id: &str) -> Result<(), IaasError> {
        self.enter(IaasOp::DeletePort)?;
        port::delete_port(self, id)
    }

    async fn attach_port_to_vm(&self, vm_id: &str, port_id: &str) -> Result<(), IaasError> {
        self.enter(IaasOp::AttachPortToVm)?;
        port::set_device(self, port_id, vm_id)
    }

    async fn detach_port_from_vm(&self, vm_id: &str, port_id: &str) -> Result<(), IaasError> {
        self.enter(IaasOp::DetachPortFromVm)?;
        port::clear_device(self, port_id, vm_id)
    }

    async fn list_ports(&self, network_id: &str) -> Result<Vec<IaasPort>, IaasError> {
        self.enter(IaasOp::ListPorts)?;
        port::list_ports(self, network_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn network_with_subnet(iaas: &EmbeddedIaasClient, cidr: &str) -> (String, IaasSubnet) {
        let network_id = iaas.create_network("net").await.unwrap();
        let subnet = iaas
            .create_subnet(&SubnetRequest {
                network_id: network_id.clone(),
                name: "sub".to_string(),
                cidr: cidr.to_string(),
                tenant_id: "t1".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        (network_id, subnet)
    }

    #[tokio::test]
    async fn test_subnet_defaults_gateway_and_pool() {
        let iaas = EmbeddedIaasClient::new();
        let (_, subnet) = network_with_subnet(&iaas, "10.0.0.0/24").await;
        assert_eq!(subnet.gateway_ip, "10.0.0.1");
        assert_eq!(subnet.allocation_pools[0].start, "10.0.0.2");
        assert_eq!(subnet.allocation_pools[0].end, "10.0.0.254");
    }

    #[tokio::test]
    async fn test_ports_get_sequential_addresses_and_fixed_ips_conflict() {
        let iaas = EmbeddedIaasClient::new();
        let (network_id, subnet) = network_with_subnet(&iaas, "10.0.0.0/24").await;

        let first = iaas
            .create_port(&PortRequest::new("a", &network_id, &subnet.id, "t1"))
            .await
            .unwrap();
        assert_eq!(first.ip, "10.0.0.2");

        let fixed = PortRequest::new("b", &network_id, "", "t1").with_fixed_ip("10.0.0.2");
        assert!(matches!(iaas.create_port(&fixed).await, Err(IaasError::Conflict(_))));

        let outside = PortRequest::new("c", &network_id, "", "t1").with_fixed_ip("10.9.0.2");
        assert!(matches!(iaas.create_port(&outside).await, Err(IaasError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_bulk_stop_reports_created_ports() {
        let iaas = EmbeddedIaasClient::new();
        let (network_id, _) = network_with_subnet(&iaas, "10.0.0.0/24").await;
        let requests: Vec<PortRequest> = (0..3)
            .map(|i| PortRequest::new(&format!("p{}", i), &network_id, "", "t1"))
            .collect();

        iaas.fail_bulk_after(2);
        match iaas.create_bulk_ports(&requests).await {
            Err(IaasError::PartialBulk { created, .. }) => assert_eq!(created.len(), 2),
            other => panic!("expected partial bulk failure, got {:?}", other),
        }
        assert_eq!(iaas.port_ids().len(), 2);
    }

    #[tokio::test]
    async fn test_bulk_failure_keeps_request_error() {
        let iaas = EmbeddedIaasClient::new();
        let (network_id, _) = network_with_subnet(&iaas, "10.0.0.0/24").await;
        let taken = PortRequest::new("a", &network_id, "", "t1").with_fixed_ip("10.0.0.9");
        iaas.create_port(&taken).await.unwrap();

        let clash = vec![taken.clone()];
        assert!(matches!(iaas.create_bulk_ports(&clash).await, Err(IaasError::Conflict(_))));

        let fresh = PortRequest::new("b", &network_id, "", "t1").with_fixed_ip("10.0.0.10");
        match iaas.create_bulk_ports(&[fresh, taken]).await {
            Err(IaasError::PartialBulk { created, source }) => {
                assert_eq!(created.len(), 1);
                assert!(matches!(*source, IaasError::Conflict(_)));
            }
            other => panic!("expected partial bulk failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_delete_network_refuses_busy_network_but_ignores_dhcp() {
        let iaas = EmbeddedIaasClient::new();
        let (network_id, _) = network_with_subnet(&iaas, "10.0.0.0/24").await;
        iaas.add_dhcp_port(&network_id).unwrap();
        let port = iaas
            .create_port(&PortRequest::new("a", &network_id, "", "t1"))
            .await
            .unwrap();

        assert!(matches!(iaas.delete_network(&network_id).await, Err(IaasError::Conflict(_))));
        iaas.delete_port(&port.id).await.unwrap();
        iaas.delete_network(&network_id).await.unwrap();
        assert!(iaas.port_ids().is_empty());
        assert!(iaas.delete_network(&network_id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_attach_and_detach() {
        let iaas = EmbeddedIaasClient::new();
        let (network_id, _) = network_with_subnet(&iaas, "10.0.0.0/24").await;
        let port = iaas
            .create_port(&PortRequest::new("a", &network_id, "", "t1"))
            .await
            .unwrap();

        iaas.attach_port_to_vm("vm-1", &port.id).await.unwrap();
        assert_eq!(iaas.attached_vm(&port.id).as_deref(), Some("vm-1"));
        assert!(iaas.attach_port_to_vm("vm-2", &port.id).await.is_err());
        iaas.detach_port_from_vm("vm-1", &port.id).await.unwrap();
        assert_eq!(iaas.attached_vm(&port.id), None);
    }

    #[tokio::test]
    async fn test_injected_faults_are_counted() {
        let iaas = EmbeddedIaasClient::new();
        iaas.fail_next(IaasOp::CreateNetwork, 1);
        assert!(iaas.create_network("n").await.unwrap_err().is_retryable());
        assert!(iaas.create_network("n").await.is_ok());
        assert_eq!(iaas.calls(IaasOp::CreateNetwork), 2);
    }
}
