//! IaaS provider models
//!
//! Wire-neutral shapes of the objects a provider creates. Drivers translate these
//! to and from their own API documents.

use serde::{Deserialize, Serialize};

/// `device_owner` of the DHCP agent port the provider puts on every subnet
pub const DEVICE_OWNER_DHCP: &str = "network:dhcp";

/// `device_owner` of a port attached to a VM
pub const DEVICE_OWNER_COMPUTE: &str = "compute:nova";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IaasNetwork {
    pub id: String,
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub shared: bool,
}

/// Request for a network bound to a physical network
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderNetworkRequest {
    pub name: String,
    pub network_type: String,
    pub physical_network: String,
    /// Empty lets the provider choose
    #[serde(default)]
    pub segmentation_id: String,
}

/// Provider attributes of an existing network
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkExtendedAttrs {
    pub id: String,
    pub name: String,
    pub network_type: String,
    #[serde(default)]
    pub physical_network: String,
    #[serde(default)]
    pub segmentation_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRange {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetRequest {
    pub network_id: String,
    pub name: String,
    pub cidr: String,
    /// Empty lets the provider pick the first host address
    #[serde(default)]
    pub gateway_ip: String,
    /// Empty lets the provider use every host address but the gateway
    #[serde(default)]
    pub allocation_pools: Vec<AddressRange>,
    pub tenant_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IaasSubnet {
    pub id: String,
    pub network_id: String,
    pub name: String,
    pub cidr: String,
    pub gateway_ip: String,
    pub allocation_pools: Vec<AddressRange>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRequest {
    pub name: String,
    pub network_id: String,
    pub subnet_id: String,
    /// Empty requests a provider-assigned address
    #[serde(default)]
    pub fixed_ip: String,
    pub tenant_id: String,
    #[serde(default)]
    pub vnic_type: String,
}

impl PortRequest {
    pub fn new(name: &str, network_id: &str, subnet_id: &str, tenant_id: &str) -> Self {
        Self {
            name: name.to_string(),
            network_id: network_id.to_string(),
            subnet_id: subnet_id.to_string(),
            tenant_id: tenant_id.to_string(),
            ..Default::default()
        }
    }

    pub fn with_fixed_ip(mut self, ip: impl Into<String>) -> Self {
        self.fixed_ip = ip.into();
        self
    }

    pub fn with_vnic_type(mut self, vnic_type: impl Into<String>) -> Self {
        self.vnic_type = vnic_type.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IaasPort {
    pub id: String,
    pub name: String,
    pub network_id: String,
    pub subnet_id: String,
    pub ip: String,
    pub mac: String,
    #[serde(default)]
    pub device_owner: String,
    /// VM the port is attached to, empty when detached
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub vnic_type: String,
    pub tenant_id: String,
}

impl IaasPort {
    pub fn is_dhcp(&self) -> bool {
        self.device_owner == DEVICE_OWNER_DHCP
    }
}
