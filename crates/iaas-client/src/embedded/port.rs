//! Port operations for EmbeddedIaasClient

use super::network::parse_addr;
use super::{EmbeddedIaasClient, EmbeddedState};
use crate::error::IaasError;
use crate::models::*;
use ipnetwork::Ipv4Network;
use std::collections::HashSet;
use tracing::debug;
use uuid::Uuid;

/// First free pool address on the subnet
fn allocate_address(state: &EmbeddedState, subnet: &IaasSubnet) -> Result<String, IaasError> {
    let taken: HashSet<&str> = state
        .ports
        .values()
        .filter(|p| p.subnet_id == subnet.id)
        .map(|p| p.ip.as_str())
        .collect();

    for pool in &subnet.allocation_pools {
        let start = u32::from(parse_addr(&pool.start)?);
        let end = u32::from(parse_addr(&pool.end)?);
        for raw in start..=end {
            let candidate = std::net::Ipv4Addr::from(raw).to_string();
            if candidate != subnet.gateway_ip && !taken.contains(candidate.as_str()) {
                return Ok(candidate);
            }
        }
    }
    Err(IaasError::Conflict(format!("subnet {} has no free addresses", subnet.id)))
}

fn next_mac(state: &mut EmbeddedState) -> String {
    state.next_mac += 1;
    let n = state.next_mac;
    format!("fa:16:3e:{:02x}:{:02x}:{:02x}", (n >> 16) & 0xff, (n >> 8) & 0xff, n & 0xff)
}

pub(crate) fn insert_port(
    client: &EmbeddedIaasClient,
    request: &PortRequest,
    device_owner: &str,
) -> Result<IaasPort, IaasError> {
    let mut state = client.state.lock();
    if !state.networks.contains_key(&request.network_id) {
        return Err(IaasError::NotFound(format!("network {}", request.network_id)));
    }

    let subnet = (if request.subnet_id.is_empty() {
        state.subnets.values().find(|s| s.network_id == request.network_id)
    } else {
        state.subnets.get(&request.subnet_id)
    })
    .cloned()
    .ok_or_else(|| IaasError::NotFound(format!("subnet of network {}", request.network_id)))?;
    if subnet.network_id != request.network_id {
        return Err(IaasError::InvalidRequest(format!(
            "subnet {} does not belong to network {}",
            subnet.id, request.network_id
        )));
    }

    let ip = if request.fixed_ip.is_empty() {
        allocate_address(&state, &subnet)?
    } else {
        let addr = parse_addr(&request.fixed_ip)?;
        let net: Ipv4Network = subnet
            .cidr
            .parse()
            .map_err(|e| IaasError::Api(format!("stored cidr {} unreadable: {}", subnet.cidr, e)))?;
        if !net.contains(addr) {
            return Err(IaasError::InvalidRequest(format!(
                "address {} outside subnet {}",
                addr, subnet.cidr
            )));
        }
        if state.ports.values().any(|p| p.subnet_id == subnet.id && p.ip == request.fixed_ip) {
            return Err(IaasError::Conflict(format!("address {} already in use", request.fixed_ip)));
        }
        request.fixed_ip.clone()
    };

    let port = IaasPort {
        id: Uuid::new_v4().to_string(),
        name: request.name.clone(),
        network_id: request.network_id.clone(),
        subnet_id: subnet.id.clone(),
        ip,
        mac: next_mac(&mut state),
        device_owner: device_owner.to_string(),
        device_id: String::new(),
        vnic_type: if request.vnic_type.is_empty() {
            "normal".to_string()
        } else {
            request.vnic_type.clone()
        },
        tenant_id: request.tenant_id.clone(),
    };
    state.ports.insert(port.id.clone(), port.clone());
    debug!("Embedded provider created port {} with address {}", port.id, port.ip);
    Ok(port)
}

pub fn create_port(client: &EmbeddedIaasClient, request: &PortRequest) -> Result<IaasPort, IaasError> {
    insert_port(client, request, "")
}

pub fn create_bulk_ports(client: &EmbeddedIaasClient, requests: &[PortRequest]) -> Result<Vec<IaasPort>, IaasError> {
    let stop_after = client.take_bulk_stop();
    let mut created = Vec::with_capacity(requests.len());

    for (index, request) in requests.iter().enumerate() {
        if stop_after == Some(index) {
            return Err(partial(
                created,
                IaasError::Unavailable("injected bulk failure".to_string()),
            ));
        }
        match create_port(client, request) {
            Ok(port) => created.push(port),
            Err(e) => return Err(partial(created, e)),
        }
    }
    Ok(created)
}

/// Nothing created means nothing to roll back, so the request's own error surfaces
fn partial(created: Vec<IaasPort>, source: IaasError) -> IaasError {
    if created.is_empty() {
        source
    } else {
        IaasError::PartialBulk {
            created,
            source: Box::new(source),
        }
    }
}

pub fn delete_port(client: &EmbeddedIaasClient, id: &str) -> Result<(), IaasError> {
    client
        .state
        .lock()
        .ports
        .remove(id)
        .map(|_| debug!("Embedded provider deleted port {}", id))
        .ok_or_else(|| IaasError::NotFound(format!("port {}", id)))
}

pub fn set_device(client: &EmbeddedIaasClient, port_id: &str, vm_id: &str) -> Result<(), IaasError> {
    let mut state = client.state.lock();
    let port = state
        .ports
        .get_mut(port_id)
        .ok_or_else(|| IaasError::NotFound(format!("port {}", port_id)))?;
    if !port.device_id.is_empty() && port.device_id != vm_id {
        return Err(IaasError::Conflict(format!(
            "port {} already attached to {}",
            port_id, port.device_id
        )));
    }
    port.device_id = vm_id.to_string();
    port.device_owner = DEVICE_OWNER_COMPUTE.to_string();
    Ok(())
}

pub fn clear_device(client: &EmbeddedIaasClient, port_id: &str, vm_id: &str) -> Result<(), IaasError> {
    let mut state = client.state.lock();
    let port = state
        .ports
        .get_mut(port_id)
        .ok_or_else(|| IaasError::NotFound(format!("port {}", port_id)))?;
    if !port.device_id.is_empty() && port.device_id != vm_id {
        return Err(IaasError::Conflict(format!(
            "port {} is attached to {}, not {}",
            port_id, port.device_id, vm_id
        )));
    }
    port.device_id.clear();
    port.device_owner.clear();
    Ok(())
}

pub fn list_ports(client: &EmbeddedIaasClient, network_id: &str) -> Result<Vec<IaasPort>, IaasError> {
    let state = client.state.lock();
    if !state.networks.contains_key(network_id) {
        return Err(IaasError::NotFound(format!("network {}", network_id)));
    }
    Ok(state
        .ports
        .values()
        .filter(|p| p.network_id == network_id)
        .cloned()
        .collect())
}
