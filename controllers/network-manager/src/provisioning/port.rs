use super::{PortSpec, Provisioner};
use crate::error::ManagerError;
use crate::ipam::cidr::ip_in_cidr;
use crate::repository::{INDEX_NODE, INDEX_POD, INDEX_TENANT};
use crate::retry::retry_iaas;
use iaas_client::{IaasError, PortRequest};
use resources::{LogicalPort, OwnerType, PortStatus};
use std::collections::BTreeSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// IaaS-side effects of a bulk creation, for rollback
#[derive(Debug, Default)]
struct Provisioned {
    /// Ports created directly on the IaaS backend
    plain: Vec<String>,
    /// (tenant, group, address) obtained from IP groups
    grouped: Vec<(String, String, String)>,
}

impl Provisioner {
    /// Create one logical port
    pub async fn create_port(&self, spec: PortSpec) -> Result<LogicalPort, ManagerError> {
        let mut ports = self.create_ports(vec![spec]).await?;
        ports
            .pop()
            .ok_or_else(|| ManagerError::BadRequest("no port was requested".to_string()))
    }

    /// Create a batch of logical ports
    ///
    /// Ports drawing from an IP group obtain their address through the IPAM
    /// engine; all others are created with one bulk IaaS call. Records are only
    /// committed once every port exists. Any failure undoes the IaaS side of the
    /// whole batch first and then the records already committed.
    pub async fn create_ports(&self, specs: Vec<PortSpec>) -> Result<Vec<LogicalPort>, ManagerError> {
        let mut drafts = specs
            .iter()
            .map(|spec| self.draft_port(spec))
            .collect::<Result<Vec<_>, _>>()?;
        if drafts.is_empty() {
            return Ok(drafts);
        }
        let tenant_ids: BTreeSet<&str> = drafts.iter().map(|d| d.tenant_id.as_str()).collect();
        for tenant_id in tenant_ids {
            self.store.check_tenant_active(tenant_id).await?;
        }

        let mut provisioned = Provisioned::default();
        if let Err(e) = self.provision_ports(&mut drafts, &specs, &mut provisioned).await {
            for draft in &mut drafts {
                draft.status = PortStatus::CreatedFailed;
            }
            warn!("Creating {} ports failed, rolling back: {}", drafts.len(), e);
            self.rollback_provisioned(&provisioned).await;
            return Err(e);
        }

        let mut committed: Vec<&LogicalPort> = Vec::with_capacity(drafts.len());
        for draft in &drafts {
            if let Err(e) = self.store.commit_new(&self.repos.ports, draft).await {
                error!("Committing port {} failed, rolling back the batch: {}", draft.id, e);
                self.rollback_provisioned(&provisioned).await;
                for port in committed {
                    if let Err(rollback) = self.store.commit_delete(&self.repos.ports, port).await {
                        error!("Rollback of port record {} failed: {}", port.id, rollback);
                    }
                }
                return Err(e);
            }
            committed.push(draft);
        }

        info!("Created {} ports", drafts.len());
        Ok(drafts)
    }

    fn draft_port(&self, spec: &PortSpec) -> Result<LogicalPort, ManagerError> {
        let (network, subnet) = self.resolve_network(&spec.tenant_id, &spec.network)?;

        if let Some(group_id) = &spec.ip_group_id {
            let group = self.ipam.get(&spec.tenant_id, group_id)?;
            if group.network_id != network.id {
                return Err(ManagerError::BadRequest(format!(
                    "ip group {} is not on network {}",
                    group_id, network.id
                )));
            }
        }
        if let Some(ip) = &spec.fixed_ip {
            if !ip_in_cidr(ip, &subnet.cidr) {
                return Err(ManagerError::BadRequest(format!("address {} is outside {}", ip, subnet.cidr)));
            }
        }

        Ok(LogicalPort {
            id: String::new(),
            name: if spec.name.is_empty() {
                format!("port-{}", Uuid::new_v4().simple())
            } else {
                spec.name.clone()
            },
            status: PortStatus::WaitCreating,
            ip: spec.fixed_ip.clone().unwrap_or_default(),
            mac: String::new(),
            network_id: network.id,
            subnet_id: subnet.id,
            ip_group_id: spec.ip_group_id.clone(),
            node_id: spec.node_id.clone(),
            cluster_id: spec.cluster_id.clone(),
            owner_type: spec.owner_type,
            tenant_id: spec.tenant_id.clone(),
            pod_name: spec.pod_name.clone(),
            pod_ns: spec.pod_ns.clone(),
        })
    }

    async fn provision_ports(
        &self,
        drafts: &mut [LogicalPort],
        specs: &[PortSpec],
        provisioned: &mut Provisioned,
    ) -> Result<(), ManagerError> {
        let (grouped, plain): (Vec<usize>, Vec<usize>) =
            (0..drafts.len()).partition(|&i| drafts[i].ip_group_id.is_some());
        for draft in drafts.iter_mut() {
            draft.status = PortStatus::Creating;
        }

        if !plain.is_empty() {
            let requests: Vec<PortRequest> = plain
                .iter()
                .map(|&i| {
                    let draft = &drafts[i];
                    PortRequest::new(&draft.name, &draft.network_id, &draft.subnet_id, &draft.tenant_id)
                        .with_fixed_ip(draft.ip.as_str())
                })
                .collect();
            let iaas = &self.iaas;
            let batch = &requests;
            let ports = match retry_iaas(&self.retry, "create ports", move || iaas.create_bulk_ports(batch)).await {
                Ok(ports) => ports,
                Err(IaasError::PartialBulk { created, source }) => {
                    provisioned.plain.extend(created.into_iter().map(|p| p.id));
                    return Err((*source).into());
                }
                Err(e) => return Err(e.into()),
            };
            provisioned.plain.extend(ports.iter().map(|p| p.id.clone()));
            if ports.len() != plain.len() {
                return Err(IaasError::Api(format!(
                    "bulk port creation returned {} of {} ports",
                    ports.len(),
                    plain.len()
                ))
                .into());
            }
            for (&i, port) in plain.iter().zip(ports) {
                let draft = &mut drafts[i];
                draft.id = port.id;
                draft.ip = port.ip;
                draft.mac = port.mac;
                draft.status = PortStatus::CreatedOk;
            }
        }

        for &i in &grouped {
            let draft = &mut drafts[i];
            let Some(group_id) = draft.ip_group_id.clone() else {
                continue;
            };
            let entry = self
                .ipam
                .obtain_ip(&draft.tenant_id, &group_id, specs[i].fixed_ip.as_deref())
                .await?;
            provisioned
                .grouped
                .push((draft.tenant_id.clone(), group_id, entry.ip_addr.clone()));
            draft.id = entry.port_id;
            draft.ip = entry.ip_addr;
            draft.mac = entry.mac_addr;
            draft.status = PortStatus::CreatedOk;
        }
        Ok(())
    }

    async fn rollback_provisioned(&self, provisioned: &Provisioned) {
        for port_id in &provisioned.plain {
            self.discard_iaas_port(port_id).await;
        }
        for (tenant_id, group_id, ip) in &provisioned.grouped {
            if let Err(e) = self.ipam.release_ip(tenant_id, group_id, ip).await {
                error!("Rollback of {} in ip group {} failed: {}", ip, group_id, e);
            }
        }
    }

    pub fn get_port(&self, tenant_id: &str, port_id: &str) -> Result<LogicalPort, ManagerError> {
        let port = self.repos.ports.get(port_id)?;
        if port.tenant_id != tenant_id {
            return Err(ManagerError::Forbidden(format!("port {} belongs to another tenant", port_id)));
        }
        Ok(port)
    }

    pub fn list_ports(&self, tenant_id: &str) -> Vec<LogicalPort> {
        self.repos.ports.list_by_index(INDEX_TENANT, tenant_id)
    }

    /// Delete one logical port
    ///
    /// The record moves to `WaitDestroy` first and stays there if the IaaS side
    /// cannot be cleaned up. Addresses taken from an IP group are released back
    /// to the group instead of deleting the group's port.
    pub async fn delete_port(&self, tenant_id: &str, port_id: &str) -> Result<(), ManagerError> {
        let port = self.get_port(tenant_id, port_id)?;

        let mut destroying = port.clone();
        destroying.status = PortStatus::WaitDestroy;
        self.store
            .commit_update(&self.repos.ports, &port, &destroying)
            .await?;

        match &port.ip_group_id {
            Some(group_id) => match self.ipam.release_ip(&port.tenant_id, group_id, &port.ip).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => debug!("Ip group {} of port {} is gone", group_id, port.id),
                Err(e) => return Err(e),
            },
            None => self.delete_iaas_port(&port.id).await?,
        }

        destroying.status = PortStatus::Destroyed;
        self.store.commit_delete(&self.repos.ports, &destroying).await?;
        info!("Deleted port {} ({})", port.id, port.ip);
        Ok(())
    }

    /// Delete several ports, continuing past failures
    pub async fn delete_ports(&self, tenant_id: &str, port_ids: &[String]) -> Result<(), ManagerError> {
        let mut failed = Vec::new();
        for port_id in port_ids {
            if let Err(e) = self.delete_port(tenant_id, port_id).await {
                error!("Deleting port {} failed: {}", port_id, e);
                failed.push(port_id.clone());
            }
        }
        if !failed.is_empty() {
            return Err(ManagerError::PartialFailure {
                message: format!("{} of {} ports not deleted", failed.len(), port_ids.len()),
                failed,
            });
        }
        Ok(())
    }

    /// Delete every port of a pod
    pub async fn delete_pod_ports(&self, tenant_id: &str, pod_ns: &str, pod_name: &str) -> Result<(), ManagerError> {
        let ids: Vec<String> = self
            .repos
            .ports
            .list_by_index(INDEX_POD, &format!("{}/{}", pod_ns, pod_name))
            .into_iter()
            .filter(|p| p.tenant_id == tenant_id)
            .map(|p| p.id)
            .collect();
        self.delete_ports(tenant_id, &ids).await
    }

    /// Delete the node-owned ports of a node; pod ports on the node are left alone
    pub async fn delete_node_ports(&self, tenant_id: &str, node_id: &str) -> Result<(), ManagerError> {
        let ids: Vec<String> = self
            .repos
            .ports
            .list_by_index(INDEX_NODE, node_id)
            .into_iter()
            .filter(|p| p.tenant_id == tenant_id && p.owner_type == OwnerType::Node)
            .map(|p| p.id)
            .collect();
        self.delete_ports(tenant_id, &ids).await
    }
}
