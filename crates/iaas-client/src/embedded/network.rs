//! Network and subnet operations for EmbeddedIaasClient

use super::{EmbeddedIaasClient, NetworkEntry};
use crate::error::IaasError;
use crate::models::*;
use ipnetwork::Ipv4Network;
use std::net::Ipv4Addr;
use tracing::debug;
use uuid::Uuid;

/// Overlay segment ids start above this value
const VNI_BASE: u32 = 1000;
/// Provider VLAN ids picked by the provider start above this value
const VLAN_BASE: u32 = 100;

pub fn create_network(
    client: &EmbeddedIaasClient,
    name: &str,
    provider: Option<&ProviderNetworkRequest>,
) -> Result<String, IaasError> {
    if name.is_empty() {
        return Err(IaasError::InvalidRequest("network name is empty".to_string()));
    }

    let mut state = client.state.lock();
    let id = Uuid::new_v4().to_string();
    state.next_vni += 1;

    let attrs = match provider {
        Some(request) => {
            if request.network_type.is_empty() {
                return Err(IaasError::InvalidRequest(
                    "provider network without network type".to_string(),
                ));
            }
            let segmentation_id = if request.network_type == "vlan" && request.segmentation_id.is_empty() {
                (VLAN_BASE + state.next_vni).to_string()
            } else {
                request.segmentation_id.clone()
            };
            NetworkExtendedAttrs {
                id: id.clone(),
                name: name.to_string(),
                network_type: request.network_type.clone(),
                physical_network: request.physical_network.clone(),
                segmentation_id,
            }
        }
        None => NetworkExtendedAttrs {
            id: id.clone(),
            name: name.to_string(),
            network_type: "vxlan".to_string(),
            physical_network: String::new(),
            segmentation_id: (VNI_BASE + state.next_vni).to_string(),
        },
    };

    let network = IaasNetwork {
        id: id.clone(),
        name: name.to_string(),
        status: "ACTIVE".to_string(),
        shared: false,
    };
    state.networks.insert(id.clone(), NetworkEntry { network, attrs });
    debug!("Embedded provider created network {} ({})", name, id);
    Ok(id)
}

pub fn delete_network(client: &EmbeddedIaasClient, id: &str) -> Result<(), IaasError> {
    let mut state = client.state.lock();
    if !state.networks.contains_key(id) {
        return Err(IaasError::NotFound(format!("network {}", id)));
    }

    let busy = state
        .ports
        .values()
        .filter(|p| p.network_id == id && !p.is_dhcp())
        .count();
    if busy > 0 {
        return Err(IaasError::Conflict(format!(
            "network {} still has {} ports",
            id, busy
        )));
    }

    state.ports.retain(|_, p| p.network_id != id);
    state.subnets.retain(|_, s| s.network_id != id);
    state.networks.remove(id);
    debug!("Embedded provider deleted network {}", id);
    Ok(())
}

pub fn get_entry(client: &EmbeddedIaasClient, id: &str) -> Result<NetworkEntry, IaasError> {
    client
        .state
        .lock()
        .networks
        .get(id)
        .cloned()
        .ok_or_else(|| IaasError::NotFound(format!("network {}", id)))
}

fn parse_cidr(cidr: &str) -> Result<Ipv4Network, IaasError> {
    cidr.parse::<Ipv4Network>()
        .map_err(|e| IaasError::InvalidRequest(format!("bad cidr {}: {}", cidr, e)))
}

pub(crate) fn parse_addr(addr: &str) -> Result<Ipv4Addr, IaasError> {
    addr.parse::<Ipv4Addr>()
        .map_err(|e| IaasError::InvalidRequest(format!("bad address {}: {}", addr, e)))
}

pub fn create_subnet(client: &EmbeddedIaasClient, request: &SubnetRequest) -> Result<IaasSubnet, IaasError> {
    let net = parse_cidr(&request.cidr)?;
    let first_host = u32::from(net.network()).saturating_add(1);
    let last_host = u32::from(net.broadcast()).saturating_sub(1);
    if last_host < first_host {
        return Err(IaasError::InvalidRequest(format!(
            "cidr {} has no host addresses",
            request.cidr
        )));
    }

    let gateway = if request.gateway_ip.is_empty() {
        Ipv4Addr::from(first_host)
    } else {
        let gateway = parse_addr(&request.gateway_ip)?;
        if !net.contains(gateway) {
            return Err(IaasError::InvalidRequest(format!(
                "gateway {} outside {}",
                gateway, request.cidr
            )));
        }
        gateway
    };

    let allocation_pools = if request.allocation_pools.is_empty() {
        let start = if u32::from(gateway) == first_host { first_host + 1 } else { first_host };
        vec![AddressRange {
            start: Ipv4Addr::from(start).to_string(),
            end: Ipv4Addr::from(last_host).to_string(),
        }]
    } else {
        for pool in &request.allocation_pools {
            let start = parse_addr(&pool.start)?;
            let end = parse_addr(&pool.end)?;
            if !net.contains(start) || !net.contains(end) || start > end {
                return Err(IaasError::InvalidRequest(format!(
                    "allocation pool {}-{} invalid for {}",
                    pool.start, pool.end, request.cidr
                )));
            }
        }
        request.allocation_pools.clone()
    };

    let mut state = client.state.lock();
    if !state.networks.contains_key(&request.network_id) {
        return Err(IaasError::NotFound(format!("network {}", request.network_id)));
    }
    if state.subnets.values().any(|s| s.network_id == request.network_id) {
        return Err(IaasError::Conflict(format!(
            "network {} already has a subnet",
            request.network_id
        )));
    }

    let subnet = IaasSubnet {
        id: Uuid::new_v4().to_string(),
        network_id: request.network_id.clone(),
        name: request.name.clone(),
        cidr: net.to_string(),
        gateway_ip: gateway.to_string(),
        allocation_pools,
    };
    state.subnets.insert(subnet.id.clone(), subnet.clone());
    debug!("Embedded provider created subnet {} on network {}", subnet.id, subnet.network_id);
    Ok(subnet)
}

pub fn get_subnet(client: &EmbeddedIaasClient, id: &str) -> Result<IaasSubnet, IaasError> {
    client
        .state
        .lock()
        .subnets
        .get(id)
        .cloned()
        .ok_or_else(|| IaasError::NotFound(format!("subnet {}", id)))
}

pub fn get_subnet_id(client: &EmbeddedIaasClient, network_id: &str) -> Result<String, IaasError> {
    client
        .state
        .lock()
        .subnets
        .values()
        .find(|s| s.network_id == network_id)
        .map(|s| s.id.clone())
        .ok_or_else(|| IaasError::NotFound(format!("subnet of network {}", network_id)))
}
