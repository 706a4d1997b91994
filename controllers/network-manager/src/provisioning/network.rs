use super::{CreateNetworkRequest, Provisioner, RegisterExternalNetworkRequest};
use crate::error::ManagerError;
use crate::ipam::cidr::{
    allocation_pools_legal, cidr_is_legal, default_allocation_pool_for_cidr, default_gateway_for_cidr, exclude_gateway,
    ip_in_cidr, ip_in_range,
};
use crate::repository::{INDEX_NETWORK, INDEX_PUBLIC, INDEX_TENANT, flag};
use crate::retry::retry_iaas;
use crate::tenant::TenantGuard;
use chrono::Utc;
use iaas_client::{AddressRange, IaasSubnet, NetworkExtendedAttrs, ProviderNetworkRequest, SubnetRequest};
use resources::{
    AllocationPool, FLAT_DEFAULT_SEGMENTATION_ID, NETWORK_TYPE_FLAT, NETWORK_TYPE_VLAN, Network, ProviderAttrs, Subnet,
    VLAN_TRANSPARENT_SEGMENTATION_ID,
};
use tracing::{debug, error, info, warn};

/// Provider attributes as recorded on the network
fn provider_attrs(attrs: &NetworkExtendedAttrs) -> ProviderAttrs {
    let mut provider = ProviderAttrs {
        network_type: attrs.network_type.clone(),
        physical_network: attrs.physical_network.clone(),
        segmentation_id: attrs.segmentation_id.clone(),
        vlan_transparent: false,
    };
    if provider.network_type == NETWORK_TYPE_FLAT && provider.segmentation_id.is_empty() {
        provider.segmentation_id = FLAT_DEFAULT_SEGMENTATION_ID.to_string();
    }
    if provider.network_type == NETWORK_TYPE_VLAN && provider.segmentation_id == VLAN_TRANSPARENT_SEGMENTATION_ID {
        provider.vlan_transparent = true;
    }
    provider
}

fn subnet_record(subnet: &IaasSubnet, tenant_id: &str) -> Subnet {
    Subnet {
        id: subnet.id.clone(),
        network_id: subnet.network_id.clone(),
        name: subnet.name.clone(),
        cidr: subnet.cidr.clone(),
        gateway_ip: subnet.gateway_ip.clone(),
        tenant_id: tenant_id.to_string(),
        allocation_pools: subnet
            .allocation_pools
            .iter()
            .map(|r| AllocationPool::new(r.start.clone(), r.end.clone()))
            .collect(),
    }
}

/// Validated addressing of a new subnet
#[derive(Debug)]
struct Addressing {
    gateway_ip: String,
    pools: Vec<AllocationPool>,
}

fn validate_addressing(request: &CreateNetworkRequest) -> Result<Addressing, ManagerError> {
    if !cidr_is_legal(&request.cidr) {
        return Err(ManagerError::BadRequest(format!("illegal cidr {}", request.cidr)));
    }

    let gateway_ip = if request.gateway_ip.is_empty() {
        default_gateway_for_cidr(&request.cidr)?
    } else if ip_in_cidr(&request.gateway_ip, &request.cidr) {
        request.gateway_ip.clone()
    } else {
        return Err(ManagerError::BadRequest(format!(
            "gateway {} is outside {}",
            request.gateway_ip, request.cidr
        )));
    };

    let pools = if request.allocation_pools.is_empty() {
        exclude_gateway(&[default_allocation_pool_for_cidr(&request.cidr)?], &gateway_ip)
    } else {
        if !allocation_pools_legal(&request.allocation_pools, &request.cidr) {
            return Err(ManagerError::BadRequest(format!(
                "allocation pools {:?} are not legal for {}",
                request.allocation_pools, request.cidr
            )));
        }
        if request.allocation_pools.iter().any(|p| ip_in_range(&gateway_ip, p)) {
            return Err(ManagerError::BadRequest(format!(
                "gateway {} lies inside an allocation pool",
                gateway_ip
            )));
        }
        request.allocation_pools.clone()
    };

    Ok(Addressing { gateway_ip, pools })
}

impl Provisioner {
    /// Create a network and its subnet
    ///
    /// 1. Validate addressing, then check the tenant quota under the tenant guard
    /// 2. Create the IaaS network (provider-typed when provider attributes are set)
    /// 3. Create the subnet and read back the network's provider attributes
    /// 4. Commit subnet and network, then recount the tenant's networks
    ///
    /// If anything fails after step 2 the IaaS network is deleted again.
    pub async fn create_network(&self, request: CreateNetworkRequest) -> Result<Network, ManagerError> {
        if request.name.trim().is_empty() {
            return Err(ManagerError::BadRequest("network name is required".to_string()));
        }
        if request.is_public && !self.tenants.is_admin(&request.tenant_id) {
            return Err(ManagerError::Forbidden("only the admin tenant creates public networks".to_string()));
        }
        let addressing = validate_addressing(&request)?;

        let guard = self.tenants.lock(&request.tenant_id).await?;
        let result = self.create_network_locked(&guard, &request, addressing).await;
        self.tenants.unlock(guard).await;
        result
    }

    async fn create_network_locked(
        &self,
        guard: &TenantGuard,
        request: &CreateNetworkRequest,
        addressing: Addressing,
    ) -> Result<Network, ManagerError> {
        let tenant_id = request.tenant_id.as_str();
        self.tenants.check_network_quota(guard, tenant_id).await?;
        if self
            .repos
            .networks
            .list_by_index(INDEX_TENANT, tenant_id)
            .iter()
            .any(|n| n.name == request.name)
        {
            return Err(ManagerError::Conflict(format!(
                "tenant {} already has a network named {}",
                tenant_id, request.name
            )));
        }

        let iaas = &self.iaas;
        let network_id = if request.provider.is_set() {
            let provider_request = ProviderNetworkRequest {
                name: request.name.clone(),
                network_type: request.provider.network_type.clone(),
                physical_network: request.provider.physical_network.clone(),
                segmentation_id: request.provider.segmentation_id.clone(),
            };
            let provider_request = &provider_request;
            retry_iaas(&self.retry, "create provider network", move || {
                iaas.create_provider_network(provider_request)
            })
            .await?
        } else {
            let name = request.name.as_str();
            retry_iaas(&self.retry, "create network", move || iaas.create_network(name)).await?
        };
        debug!("IaaS network {} created for {}", network_id, request.name);

        match self.finish_network(request, &network_id, addressing).await {
            Ok(network) => {
                if let Err(e) = self.tenants.recompute_usage(guard, tenant_id).await {
                    warn!("Network usage of tenant {} not updated: {}", tenant_id, e);
                }
                info!("Created network {} ({}) for tenant {}", network.id, network.name, tenant_id);
                Ok(network)
            }
            Err(e) => {
                warn!("Creating network {} failed, deleting IaaS network {}: {}", request.name, network_id, e);
                let id = network_id.as_str();
                if let Err(compensation) =
                    retry_iaas(&self.retry, "delete network", move || iaas.delete_network(id)).await
                {
                    if !compensation.is_not_found() {
                        error!("Compensating delete of network {} failed: {}", network_id, compensation);
                    }
                }
                Err(e)
            }
        }
    }

    async fn finish_network(
        &self,
        request: &CreateNetworkRequest,
        network_id: &str,
        addressing: Addressing,
    ) -> Result<Network, ManagerError> {
        let iaas = &self.iaas;
        let subnet_request = SubnetRequest {
            network_id: network_id.to_string(),
            name: format!("{}-subnet", request.name),
            cidr: request.cidr.clone(),
            gateway_ip: addressing.gateway_ip,
            allocation_pools: addressing
                .pools
                .iter()
                .map(|p| AddressRange {
                    start: p.start.clone(),
                    end: p.end.clone(),
                })
                .collect(),
            tenant_id: request.tenant_id.clone(),
        };
        let subnet_request = &subnet_request;
        let iaas_subnet =
            retry_iaas(&self.retry, "create subnet", move || iaas.create_subnet(subnet_request)).await?;

        let attrs = retry_iaas(&self.retry, "get network attributes", move || {
            iaas.get_network_extended_attrs(network_id)
        })
        .await?;

        let subnet = subnet_record(&iaas_subnet, &request.tenant_id);
        let network = Network {
            id: network_id.to_string(),
            name: request.name.clone(),
            tenant_id: request.tenant_id.clone(),
            subnet_id: subnet.id.clone(),
            is_public: request.is_public,
            is_external: false,
            provider: provider_attrs(&attrs),
            create_time: Utc::now(),
            description: request.description.clone(),
        };
        self.commit_network(&network, &subnet).await?;
        Ok(network)
    }

    /// Commit subnet then network; the subnet is withdrawn if the network fails
    async fn commit_network(&self, network: &Network, subnet: &Subnet) -> Result<(), ManagerError> {
        self.store.commit_new(&self.repos.subnets, subnet).await?;
        if let Err(e) = self.store.commit_new(&self.repos.networks, network).await {
            if let Err(rollback) = self.store.commit_delete(&self.repos.subnets, subnet).await {
                error!("Rollback of subnet {} failed: {}", subnet.id, rollback);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Adopt a pre-existing IaaS network. Admin only; quota does not apply.
    pub async fn register_external_network(
        &self,
        request: RegisterExternalNetworkRequest,
    ) -> Result<Network, ManagerError> {
        if !self.tenants.is_admin(&request.tenant_id) {
            return Err(ManagerError::Forbidden("only the admin tenant registers external networks".to_string()));
        }
        if self.repos.networks.contains(&request.network_id) {
            return Err(ManagerError::Conflict(format!("network {} is already known", request.network_id)));
        }

        let iaas = &self.iaas;
        let id = request.network_id.as_str();
        let backend = retry_iaas(&self.retry, "get network", move || iaas.get_network(id)).await?;
        let attrs = retry_iaas(&self.retry, "get network attributes", move || {
            iaas.get_network_extended_attrs(id)
        })
        .await?;
        let subnet_id = retry_iaas(&self.retry, "get subnet id", move || iaas.get_subnet_id(id)).await?;
        let subnet_id = subnet_id.as_str();
        let iaas_subnet = retry_iaas(&self.retry, "get subnet", move || iaas.get_subnet(subnet_id)).await?;

        let subnet = subnet_record(&iaas_subnet, &request.tenant_id);
        let network = Network {
            id: backend.id,
            name: if request.name.is_empty() {
                backend.name
            } else {
                request.name
            },
            tenant_id: request.tenant_id,
            subnet_id: subnet.id.clone(),
            is_public: request.is_public,
            is_external: true,
            provider: provider_attrs(&attrs),
            create_time: Utc::now(),
            description: request.description,
        };
        self.commit_network(&network, &subnet).await?;
        info!("Registered external network {} ({})", network.id, network.name);
        Ok(network)
    }

    /// Delete a network and its subnet
    ///
    /// Refused while an IP group or an in-use port references the network.
    /// External networks are only forgotten; others lose their residual IaaS
    /// ports and the IaaS network itself.
    pub async fn delete_network(&self, tenant_id: &str, network_id: &str) -> Result<(), ManagerError> {
        let network = self.repos.networks.get(network_id)?;
        if network.tenant_id != tenant_id && !self.tenants.is_admin(tenant_id) {
            return Err(ManagerError::Forbidden(format!("network {} belongs to another tenant", network_id)));
        }

        let guard = self.tenants.lock(&network.tenant_id).await?;
        let result = self.delete_network_locked(&guard, &network).await;
        self.tenants.unlock(guard).await;
        result
    }

    async fn delete_network_locked(&self, guard: &TenantGuard, network: &Network) -> Result<(), ManagerError> {
        self.check_unreferenced(network)?;

        if !network.is_external {
            self.purge_iaas_ports(&network.id).await?;
            let iaas = &self.iaas;
            let id = network.id.as_str();
            match retry_iaas(&self.retry, "delete network", move || iaas.delete_network(id)).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => debug!("IaaS network {} already gone", network.id),
                Err(e) => return Err(e.into()),
            }
        }

        for port in self.repos.ports.list_by_index(INDEX_NETWORK, &network.id) {
            self.store.commit_delete(&self.repos.ports, &port).await?;
        }
        for port in self.repos.physical_ports.list_by_index(INDEX_NETWORK, &network.id) {
            self.store.commit_delete(&self.repos.physical_ports, &port).await?;
        }
        for subnet in self.repos.subnets.list_by_index(INDEX_NETWORK, &network.id) {
            self.store.commit_delete(&self.repos.subnets, &subnet).await?;
        }
        self.store.commit_delete(&self.repos.networks, network).await?;

        if let Err(e) = self.tenants.recompute_usage(guard, &network.tenant_id).await {
            warn!("Network usage of tenant {} not updated: {}", network.tenant_id, e);
        }
        info!("Deleted network {} ({})", network.id, network.name);
        Ok(())
    }

    fn check_unreferenced(&self, network: &Network) -> Result<(), ManagerError> {
        let groups = self.repos.ip_groups.list_by_index(INDEX_NETWORK, &network.id);
        if let Some(group) = groups.first() {
            return Err(ManagerError::Conflict(format!(
                "network {} is used by ip group {}",
                network.id, group.name
            )));
        }
        if let Some(port) = self
            .repos
            .ports
            .list_by_index(INDEX_NETWORK, &network.id)
            .iter()
            .find(|p| p.status.is_in_use())
        {
            return Err(ManagerError::Conflict(format!("network {} is used by port {}", network.id, port.id)));
        }
        if let Some(port) = self
            .repos
            .physical_ports
            .list_by_index(INDEX_NETWORK, &network.id)
            .iter()
            .find(|p| p.status.is_in_use())
        {
            return Err(ManagerError::Conflict(format!(
                "network {} is used by physical port {}",
                network.id, port.id
            )));
        }
        Ok(())
    }

    /// Detach and delete every non-DHCP port left on the IaaS network
    async fn purge_iaas_ports(&self, network_id: &str) -> Result<(), ManagerError> {
        let iaas = &self.iaas;
        let ports = match retry_iaas(&self.retry, "list ports", move || iaas.list_ports(network_id)).await {
            Ok(ports) => ports,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        for port in ports.iter().filter(|p| !p.is_dhcp()) {
            if !port.device_id.is_empty() {
                let (vm_id, port_id) = (port.device_id.as_str(), port.id.as_str());
                if let Err(e) =
                    retry_iaas(&self.retry, "detach port", move || iaas.detach_port_from_vm(vm_id, port_id)).await
                {
                    warn!("Detaching residual port {} from {} failed: {}", port.id, port.device_id, e);
                }
            }
            self.delete_iaas_port(&port.id).await?;
            debug!("Deleted residual port {} on network {}", port.id, network_id);
        }
        Ok(())
    }

    /// Network the tenant can see
    pub fn get_network(&self, tenant_id: &str, network_id: &str) -> Result<Network, ManagerError> {
        let network = self.repos.networks.get(network_id)?;
        if !network.visible_to(tenant_id) && !self.tenants.is_admin(tenant_id) {
            return Err(ManagerError::Forbidden(format!("network {} belongs to another tenant", network_id)));
        }
        Ok(network)
    }

    /// Look a network up by name: the tenant's own networks first, then public ones
    pub fn get_network_by_name(&self, tenant_id: &str, name: &str) -> Result<Network, ManagerError> {
        let own = self.repos.networks.list_by_index(INDEX_TENANT, tenant_id);
        if let Some(network) = own.into_iter().find(|n| n.name == name) {
            return Ok(network);
        }
        self.repos
            .networks
            .list_by_index(INDEX_PUBLIC, &flag(true))
            .into_iter()
            .find(|n| n.name == name)
            .ok_or_else(|| ManagerError::NotFound(format!("network {} of tenant {}", name, tenant_id)))
    }

    /// Networks owned by the tenant, external ones included
    pub fn owned_networks(&self, tenant_id: &str) -> Vec<Network> {
        self.repos.networks.list_by_index(INDEX_TENANT, tenant_id)
    }

    /// Networks the tenant owns plus every public network
    pub fn list_networks(&self, tenant_id: &str) -> Vec<Network> {
        let mut networks = self.repos.networks.list_by_index(INDEX_TENANT, tenant_id);
        for public in self.repos.networks.list_by_index(INDEX_PUBLIC, &flag(true)) {
            if public.tenant_id != tenant_id {
                networks.push(public);
            }
        }
        networks.sort_by(|a, b| a.create_time.cmp(&b.create_time).then_with(|| a.id.cmp(&b.id)));
        networks
    }

    /// Resolve a network reference (id or name) and its subnet for the tenant
    pub(crate) fn resolve_network(&self, tenant_id: &str, reference: &str) -> Result<(Network, Subnet), ManagerError> {
        let network = match self.get_network(tenant_id, reference) {
            Ok(network) => network,
            Err(e) if e.is_not_found() => self.get_network_by_name(tenant_id, reference)?,
            Err(e) => return Err(e),
        };
        let subnet = self.repos.subnets.get(&network.subnet_id)?;
        Ok((network, subnet))
    }

    /// Refuse to serve a cache the provider cannot back
    ///
    /// Only applies to providers that lose their state with the process: every
    /// network loaded from the store must still exist on the provider.
    pub async fn check_backend_holds_networks(&self) -> Result<(), ManagerError> {
        if !self.iaas.is_ephemeral() {
            return Ok(());
        }
        let mut missing = Vec::new();
        for network in self.repos.networks.list() {
            match self.iaas.get_network(&network.id).await {
                Ok(_) => {}
                Err(e) if e.is_not_found() => missing.push(network.id),
                Err(e) => return Err(e.into()),
            }
        }
        if missing.is_empty() {
            return Ok(());
        }
        missing.sort();
        Err(ManagerError::InvalidConfig(format!(
            "{} provider keeps no state across restarts but the store records networks it lacks: {}",
            self.iaas.provider_name(),
            missing.join(",")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(network_type: &str, segmentation_id: &str) -> NetworkExtendedAttrs {
        NetworkExtendedAttrs {
            network_type: network_type.to_string(),
            segmentation_id: segmentation_id.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_provider_sentinels() {
        let flat = provider_attrs(&attrs("flat", ""));
        assert_eq!(flat.segmentation_id, "0");
        assert!(!flat.vlan_transparent);

        let transparent = provider_attrs(&attrs("vlan", "4095"));
        assert!(transparent.vlan_transparent);

        let tagged = provider_attrs(&attrs("vlan", "200"));
        assert!(!tagged.vlan_transparent);
        assert_eq!(tagged.segmentation_id, "200");
    }

    #[test]
    fn test_default_addressing_keeps_gateway_out_of_pool() {
        let request = CreateNetworkRequest {
            cidr: "10.1.0.0/24".to_string(),
            ..Default::default()
        };
        let addressing = validate_addressing(&request).unwrap();
        assert_eq!(addressing.gateway_ip, "10.1.0.1");
        assert_eq!(addressing.pools, vec![AllocationPool::new("10.1.0.2", "10.1.0.254")]);
    }

    #[test]
    fn test_addressing_rejections() {
        let mut request = CreateNetworkRequest {
            cidr: "10.1.0.0/24".to_string(),
            gateway_ip: "10.2.0.1".to_string(),
            ..Default::default()
        };
        assert!(validate_addressing(&request).is_err());

        request.gateway_ip = "10.1.0.10".to_string();
        request.allocation_pools = vec![AllocationPool::new("10.1.0.2", "10.1.0.50")];
        assert!(validate_addressing(&request).is_err());

        request.allocation_pools = vec![AllocationPool::new("10.1.0.20", "10.1.0.50")];
        assert!(validate_addressing(&request).is_ok());

        request.cidr = "10.1.0.0/4".to_string();
        assert!(validate_addressing(&request).is_err());
    }
}
