use super::diff::{IpGroupDiff, compute_diff};
use super::validate::validate_ip_spec;
use super::{CreateIpGroupRequest, UpdateIpGroupRequest};
use crate::error::ManagerError;
use crate::persistence::ResourceStore;
use crate::repository::{INDEX_NETWORK, INDEX_TENANT, Repositories};
use crate::retry::{RetryPolicy, retry_iaas};
use iaas_client::{IaasClientTrait, IaasError, IaasPort, PortRequest};
use resources::{IpEntry, IpGroup, Network, Subnet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Owner of every IP group mutation
///
/// Create, update, delete, obtain and release all run under one lock, so two
/// requests can never compute diffs against the same group state or hand out the
/// same address twice.
pub struct IpamEngine {
    lock: Mutex<()>,
    store: ResourceStore,
    iaas: Arc<dyn IaasClientTrait>,
    repos: Arc<Repositories>,
    admin_tenant_id: String,
    retry: RetryPolicy,
}

impl std::fmt::Debug for IpamEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpamEngine")
            .field("provider", &self.iaas.provider_name())
            .field("groups", &self.repos.ip_groups.len())
            .finish()
    }
}

/// Result of releasing addresses: the ones gone and the ones that could not be removed
struct Released {
    done: Vec<String>,
    failed: Vec<String>,
}

fn entry_from_port(port: IaasPort) -> IpEntry {
    IpEntry {
        ip_addr: port.ip,
        used: false,
        port_id: port.id,
        mac_addr: port.mac,
    }
}

impl IpamEngine {
    pub fn new(
        store: ResourceStore,
        iaas: Arc<dyn IaasClientTrait>,
        repos: Arc<Repositories>,
        admin_tenant_id: String,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            lock: Mutex::new(()),
            store,
            iaas,
            repos,
            admin_tenant_id,
            retry,
        }
    }

    /// Create an IP group
    ///
    /// 1. Resolve the network and check the caller may use it
    /// 2. Validate the requested addresses or count against the subnet
    /// 3. Reject a (name, network) collision and addresses held by another group
    /// 4. Provision the addresses with one bulk call to the IaaS backend
    /// 5. Persist the group, store first then cache
    pub async fn create(&self, request: CreateIpGroupRequest) -> Result<IpGroup, ManagerError> {
        if request.name.trim().is_empty() {
            return Err(ManagerError::BadRequest("ip group name is required".to_string()));
        }

        self.store.check_tenant_active(&request.tenant_id).await?;
        let _guard = self.lock.lock().await;
        let (network, subnet) = self.resolve_network(&request.network_id, &request.tenant_id)?;
        let spec = validate_ip_spec(request.ips.as_deref(), request.size, &subnet.cidr)?;
        self.check_name_free(&request.tenant_id, &network.id, &request.name, None)?;

        let diff = compute_diff(None, &spec)?;
        self.check_addresses_free(&network.id, None, &diff.add_ips)?;

        let group_id = Uuid::new_v4().to_string();
        let ips = self
            .provision(&network, &subnet, &request.tenant_id, &request.name, &diff)
            .await?;
        let group = IpGroup {
            id: group_id,
            name: request.name,
            network_id: network.id.clone(),
            tenant_id: request.tenant_id,
            ips,
        };

        if let Err(e) = self.store.commit_new(&self.repos.ip_groups, &group).await {
            let port_ids: Vec<String> = group.ips.iter().map(|e| e.port_id.clone()).collect();
            self.rollback_ports(&port_ids).await;
            return Err(e);
        }

        info!(
            "Created ip group {} ({}) on network {} with {} addresses",
            group.id,
            group.name,
            group.network_id,
            group.ips.len()
        );
        Ok(group)
    }

    /// Update an IP group's name and/or addresses
    ///
    /// Removals are best effort: addresses whose IaaS port could not be deleted
    /// stay in the group, the rest of the change is committed, and the failed
    /// addresses are reported through `ManagerError::PartialFailure`.
    pub async fn update(&self, request: UpdateIpGroupRequest) -> Result<IpGroup, ManagerError> {
        self.store.check_tenant_active(&request.tenant_id).await?;
        let _guard = self.lock.lock().await;
        let existing = self.owned_group(&request.tenant_id, &request.id)?;
        let (network, subnet) = self.resolve_network(&existing.network_id, &request.tenant_id)?;
        let spec = validate_ip_spec(request.ips.as_deref(), request.size, &subnet.cidr)?;

        let name = match request.name {
            Some(name) if !name.trim().is_empty() => name,
            _ => existing.name.clone(),
        };
        self.check_name_free(&existing.tenant_id, &network.id, &name, Some(&existing.id))?;

        let diff = compute_diff(Some(&existing), &spec)?;
        self.check_addresses_free(&network.id, Some(&existing.id), &diff.add_ips)?;

        let added = self
            .provision(&network, &subnet, &existing.tenant_id, &name, &diff)
            .await?;
        let released = self.release(&existing, &diff.del_ips).await;

        let mut group = existing.clone();
        group.name = name;
        group.ips.retain(|e| !released.done.contains(&e.ip_addr));
        group.ips.extend(added);

        if let Err(e) = self
            .store
            .commit_update(&self.repos.ip_groups, &existing, &group)
            .await
        {
            let new_ports: Vec<String> = group
                .ips
                .iter()
                .filter(|e| !existing.contains(&e.ip_addr))
                .map(|e| e.port_id.clone())
                .collect();
            self.rollback_ports(&new_ports).await;
            return Err(e);
        }

        info!(
            "Updated ip group {}: +{} -{} addresses",
            group.id,
            diff.add_ips.len() + diff.add_size,
            released.done.len()
        );
        if !released.failed.is_empty() {
            return Err(ManagerError::PartialFailure {
                message: format!("ip group {} updated, some addresses were not released", group.id),
                failed: released.failed,
            });
        }
        Ok(group)
    }

    /// Delete an IP group and release all its addresses
    ///
    /// Fails with a conflict while any address is in use. If some addresses
    /// cannot be released the group is kept with only those addresses.
    pub async fn delete(&self, tenant_id: &str, id: &str) -> Result<(), ManagerError> {
        let _guard = self.lock.lock().await;
        let group = self.owned_group(tenant_id, id)?;

        let in_use: Vec<&str> = group
            .ips
            .iter()
            .filter(|e| e.used)
            .map(|e| e.ip_addr.as_str())
            .collect();
        if !in_use.is_empty() {
            return Err(ManagerError::Conflict(format!(
                "ip group {} has addresses in use: {}",
                id,
                in_use.join(",")
            )));
        }

        let all: Vec<String> = group.ips.iter().map(|e| e.ip_addr.clone()).collect();
        let released = self.release(&group, &all).await;
        if !released.failed.is_empty() {
            let mut remaining = group.clone();
            remaining.ips.retain(|e| !released.done.contains(&e.ip_addr));
            self.store
                .commit_update(&self.repos.ip_groups, &group, &remaining)
                .await?;
            return Err(ManagerError::PartialFailure {
                message: format!("ip group {} not deleted, some addresses were not released", id),
                failed: released.failed,
            });
        }

        self.store.commit_delete(&self.repos.ip_groups, &group).await?;
        info!("Deleted ip group {} ({})", group.id, group.name);
        Ok(())
    }

    pub fn get(&self, tenant_id: &str, id: &str) -> Result<IpGroup, ManagerError> {
        self.owned_group(tenant_id, id)
    }

    pub fn list_by_tenant(&self, tenant_id: &str) -> Vec<IpGroup> {
        self.repos.ip_groups.list_by_index(INDEX_TENANT, tenant_id)
    }

    pub fn list_by_network(&self, tenant_id: &str, network_id: &str) -> Vec<IpGroup> {
        self.repos
            .ip_groups
            .list_by_index(INDEX_NETWORK, network_id)
            .into_iter()
            .filter(|g| g.tenant_id == tenant_id)
            .collect()
    }

    /// Mark one address used and return it
    ///
    /// Without `ip` the first unused address wins.
    pub async fn obtain_ip(&self, tenant_id: &str, group_id: &str, ip: Option<&str>) -> Result<IpEntry, ManagerError> {
        let _guard = self.lock.lock().await;
        let existing = self.owned_group(tenant_id, group_id)?;

        let mut group = existing.clone();
        let entry = match ip {
            Some(ip) => {
                let entry = group
                    .ips
                    .iter_mut()
                    .find(|e| e.ip_addr == ip)
                    .ok_or_else(|| ManagerError::NotFound(format!("address {} in ip group {}", ip, group_id)))?;
                if entry.used {
                    return Err(ManagerError::Conflict(format!("address {} is already in use", ip)));
                }
                entry
            }
            None => group
                .ips
                .iter_mut()
                .find(|e| !e.used)
                .ok_or_else(|| ManagerError::Conflict(format!("ip group {} has no free address", group_id)))?,
        };
        entry.used = true;
        let obtained = entry.clone();

        self.store
            .commit_update(&self.repos.ip_groups, &existing, &group)
            .await?;
        info!("Obtained {} from ip group {}", obtained.ip_addr, group_id);
        Ok(obtained)
    }

    /// Mark an address unused again. Releasing a free address is a no-op.
    pub async fn release_ip(&self, tenant_id: &str, group_id: &str, ip: &str) -> Result<(), ManagerError> {
        let _guard = self.lock.lock().await;
        let existing = self.owned_group(tenant_id, group_id)?;

        let mut group = existing.clone();
        let entry = group
            .ips
            .iter_mut()
            .find(|e| e.ip_addr == ip)
            .ok_or_else(|| ManagerError::NotFound(format!("address {} in ip group {}", ip, group_id)))?;
        if !entry.used {
            return Ok(());
        }
        entry.used = false;

        self.store
            .commit_update(&self.repos.ip_groups, &existing, &group)
            .await?;
        info!("Released {} back to ip group {}", ip, group_id);
        Ok(())
    }

    /// Network and subnet of a request, after the access check
    ///
    /// Public networks are reserved to the admin tenant; private ones to their owner.
    fn resolve_network(&self, network_id: &str, tenant_id: &str) -> Result<(Network, Subnet), ManagerError> {
        let network = self.repos.networks.get(network_id)?;
        if network.is_public {
            if tenant_id != self.admin_tenant_id {
                return Err(ManagerError::Forbidden(format!(
                    "only the admin tenant manages ip groups on public network {}",
                    network_id
                )));
            }
        } else if network.tenant_id != tenant_id {
            return Err(ManagerError::Forbidden(format!(
                "network {} belongs to another tenant",
                network_id
            )));
        }

        let subnet = self.repos.subnets.get(&network.subnet_id)?;
        Ok((network, subnet))
    }

    fn owned_group(&self, tenant_id: &str, id: &str) -> Result<IpGroup, ManagerError> {
        let group = self.repos.ip_groups.get(id)?;
        if group.tenant_id != tenant_id {
            return Err(ManagerError::Forbidden(format!("ip group {} belongs to another tenant", id)));
        }
        Ok(group)
    }

    fn check_name_free(&self, tenant_id: &str, network_id: &str, name: &str, own_id: Option<&str>) -> Result<(), ManagerError> {
        let taken = self
            .repos
            .ip_groups
            .list_by_index(INDEX_NETWORK, network_id)
            .into_iter()
            .any(|g| g.tenant_id == tenant_id && g.name == name && Some(g.id.as_str()) != own_id);
        if taken {
            return Err(ManagerError::Conflict(format!(
                "ip group {} already exists on network {}",
                name, network_id
            )));
        }
        Ok(())
    }

    /// No address may belong to two groups on the same network
    fn check_addresses_free(&self, network_id: &str, own_id: Option<&str>, ips: &[String]) -> Result<(), ManagerError> {
        for other in self.repos.ip_groups.list_by_index(INDEX_NETWORK, network_id) {
            if Some(other.id.as_str()) == own_id {
                continue;
            }
            if let Some(ip) = ips.iter().find(|ip| other.contains(ip)) {
                return Err(ManagerError::Conflict(format!(
                    "address {} is held by ip group {}",
                    ip, other.name
                )));
            }
        }
        Ok(())
    }

    /// Create IaaS ports for the addresses the diff adds, all in one bulk call
    async fn provision(
        &self,
        network: &Network,
        subnet: &Subnet,
        tenant_id: &str,
        group_name: &str,
        diff: &IpGroupDiff,
    ) -> Result<Vec<IpEntry>, ManagerError> {
        let port_name = format!("ipgroup-{}", group_name);
        let base = PortRequest::new(&port_name, &network.id, &subnet.id, tenant_id);
        let mut requests: Vec<PortRequest> = diff
            .add_ips
            .iter()
            .map(|ip| base.clone().with_fixed_ip(ip.as_str()))
            .collect();
        requests.extend(std::iter::repeat_n(base, diff.add_size));
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        let iaas = &self.iaas;
        let batch = &requests;
        match retry_iaas(&self.retry, "create ip group ports", move || iaas.create_bulk_ports(batch)).await {
            Ok(ports) => Ok(ports.into_iter().map(entry_from_port).collect()),
            Err(IaasError::PartialBulk { created, source }) => {
                warn!(
                    "Bulk creation for ip group {} stopped after {} of {} ports: {}",
                    group_name,
                    created.len(),
                    requests.len(),
                    source
                );
                let ids: Vec<String> = created.into_iter().map(|p| p.id).collect();
                self.rollback_ports(&ids).await;
                Err((*source).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete the IaaS ports behind `ips`; a port already gone counts as released
    async fn release(&self, group: &IpGroup, ips: &[String]) -> Released {
        let mut released = Released {
            done: Vec::new(),
            failed: Vec::new(),
        };

        for ip in ips {
            let Some(entry) = group.find(ip) else {
                continue;
            };
            let iaas = &self.iaas;
            let port_id = entry.port_id.as_str();
            match retry_iaas(&self.retry, "delete ip group port", move || iaas.delete_port(port_id)).await {
                Ok(()) => released.done.push(ip.clone()),
                Err(e) if e.is_not_found() => released.done.push(ip.clone()),
                Err(e) => {
                    error!("Failed to release {} of ip group {}: {}", ip, group.id, e);
                    released.failed.push(ip.clone());
                }
            }
        }
        released
    }

    /// Best-effort removal of ports created by a failed operation
    async fn rollback_ports(&self, port_ids: &[String]) {
        for port_id in port_ids {
            let iaas = &self.iaas;
            let id = port_id.as_str();
            match retry_iaas(&self.retry, "roll back ip group port", move || iaas.delete_port(id)).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => error!("Rollback of port {} failed, it is orphaned: {}", port_id, e),
            }
        }
    }
}
