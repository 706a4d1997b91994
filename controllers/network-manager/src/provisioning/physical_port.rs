use super::{PhysicalPortSpec, Provisioner};
use crate::error::ManagerError;
use crate::ipam::cidr::ip_in_cidr;
use crate::repository::INDEX_TENANT;
use crate::retry::retry_iaas;
use chrono::Utc;
use iaas_client::PortRequest;
use resources::{ExceptionalPort, PhysicalPort, PortOperation, PortStatus};
use tracing::{error, info, warn};

impl Provisioner {
    /// Create a port and attach it to the node's VM
    ///
    /// The record is committed as `Creating` before the attach. When the attach
    /// still fails after the retries, the record is left as `CreatedFailed` and an
    /// exceptional port marker is written for [`Self::reconcile_exceptional_ports`].
    pub async fn create_physical_port(&self, spec: PhysicalPortSpec) -> Result<PhysicalPort, ManagerError> {
        if spec.node_id.is_empty() {
            return Err(ManagerError::BadRequest("physical port needs a node".to_string()));
        }
        self.store.check_tenant_active(&spec.tenant_id).await?;
        let (network, subnet) = self.resolve_network(&spec.tenant_id, &spec.network)?;
        if let Some(ip) = &spec.fixed_ip {
            if !ip_in_cidr(ip, &subnet.cidr) {
                return Err(ManagerError::BadRequest(format!("address {} is outside {}", ip, subnet.cidr)));
            }
        }

        let name = if spec.name.is_empty() {
            format!("{}-{}", spec.node_id, network.name)
        } else {
            spec.name.clone()
        };
        let mut request =
            PortRequest::new(&name, &network.id, &subnet.id, &spec.tenant_id).with_vnic_type(spec.vnic_type.as_str());
        if let Some(ip) = &spec.fixed_ip {
            request = request.with_fixed_ip(ip.as_str());
        }

        let iaas = &self.iaas;
        let request = &request;
        let created = retry_iaas(&self.retry, "create port", move || iaas.create_port(request)).await?;

        let port = PhysicalPort {
            id: created.id,
            name,
            status: PortStatus::Creating,
            ip: created.ip,
            mac: created.mac,
            network_id: network.id,
            subnet_id: subnet.id,
            node_id: spec.node_id,
            cluster_id: spec.cluster_id,
            owner_type: spec.owner_type,
            tenant_id: spec.tenant_id,
            vnic_type: created.vnic_type,
        };
        if let Err(e) = self.store.commit_new(&self.repos.physical_ports, &port).await {
            self.discard_iaas_port(&port.id).await;
            return Err(e);
        }

        let (vm_id, port_id) = (port.node_id.as_str(), port.id.as_str());
        let attached = retry_iaas(&self.retry, "attach port", move || iaas.attach_port_to_vm(vm_id, port_id)).await;

        let mut done = port.clone();
        match attached {
            Ok(()) => {
                done.status = PortStatus::CreatedOk;
                self.store
                    .commit_update(&self.repos.physical_ports, &port, &done)
                    .await?;
                info!("Created physical port {} on node {}", done.id, done.node_id);
                Ok(done)
            }
            Err(e) => {
                done.status = PortStatus::CreatedFailed;
                if let Err(update) = self
                    .store
                    .commit_update(&self.repos.physical_ports, &port, &done)
                    .await
                {
                    error!("Marking physical port {} failed: {}", port.id, update);
                }
                self.mark_exceptional(&done, PortOperation::Attach, &e.to_string())
                    .await;
                Err(e.into())
            }
        }
    }

    pub fn list_physical_ports(&self, tenant_id: &str) -> Vec<PhysicalPort> {
        self.repos
            .physical_ports
            .list_by_index(INDEX_TENANT, tenant_id)
    }

    /// Detach a physical port from its VM and delete it
    ///
    /// A detach or delete that still fails after the retries leaves the record in
    /// `WaitDestroy` with an exceptional port marker.
    pub async fn delete_physical_port(&self, tenant_id: &str, port_id: &str) -> Result<(), ManagerError> {
        let port = self.repos.physical_ports.get(port_id)?;
        if port.tenant_id != tenant_id {
            return Err(ManagerError::Forbidden(format!("physical port {} belongs to another tenant", port_id)));
        }

        let mut destroying = port.clone();
        destroying.status = PortStatus::WaitDestroy;
        self.store
            .commit_update(&self.repos.physical_ports, &port, &destroying)
            .await?;

        if let Err((operation, e)) = self.teardown_physical_port(&destroying).await {
            self.mark_exceptional(&destroying, operation, &e.to_string())
                .await;
            return Err(e);
        }

        destroying.status = PortStatus::Destroyed;
        self.store
            .commit_delete(&self.repos.physical_ports, &destroying)
            .await?;
        info!("Deleted physical port {} from node {}", port.id, port.node_id);
        Ok(())
    }

    /// Detach then delete on the IaaS side; reports which step failed
    async fn teardown_physical_port(&self, port: &PhysicalPort) -> Result<(), (PortOperation, ManagerError)> {
        let iaas = &self.iaas;
        let (vm_id, port_id) = (port.node_id.as_str(), port.id.as_str());
        match retry_iaas(&self.retry, "detach port", move || iaas.detach_port_from_vm(vm_id, port_id)).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err((PortOperation::Detach, e.into())),
        }
        self.delete_iaas_port(port_id)
            .await
            .map_err(|e| (PortOperation::Delete, e))
    }

    async fn mark_exceptional(&self, port: &PhysicalPort, operation: PortOperation, reason: &str) {
        let marker = ExceptionalPort {
            port_id: port.id.clone(),
            vm_id: port.node_id.clone(),
            operation,
            tenant_id: port.tenant_id.clone(),
            network_id: port.network_id.clone(),
            reason: reason.to_string(),
            create_time: Utc::now(),
        };
        match self.store.save_record(&marker).await {
            Ok(()) => warn!("Port {} marked exceptional after failed {:?}", port.id, operation),
            Err(e) => error!("Could not record exceptional port {}: {}", port.id, e),
        }
    }

    /// Retry the cleanup of every exceptional port
    ///
    /// A port whose attach failed is torn down, since its creation never
    /// completed; a failed detach or delete is repeated. Markers are removed once
    /// the port and its record are gone. Returns how many markers were resolved.
    pub async fn reconcile_exceptional_ports(&self) -> Result<usize, ManagerError> {
        let markers = self.store.list_exceptional_ports().await?;
        let mut resolved = 0;

        for marker in markers {
            let port = match self.repos.physical_ports.get(&marker.port_id) {
                Ok(port) => port,
                Err(_) => PhysicalPort {
                    id: marker.port_id.clone(),
                    name: String::new(),
                    status: PortStatus::WaitDestroy,
                    ip: String::new(),
                    mac: String::new(),
                    network_id: marker.network_id.clone(),
                    subnet_id: String::new(),
                    node_id: marker.vm_id.clone(),
                    cluster_id: String::new(),
                    owner_type: Default::default(),
                    tenant_id: marker.tenant_id.clone(),
                    vnic_type: String::new(),
                },
            };

            if let Err((operation, e)) = self.teardown_physical_port(&port).await {
                warn!(
                    "Exceptional port {} still failing at {:?}: {}",
                    marker.port_id, operation, e
                );
                continue;
            }
            if let Err(e) = self
                .store
                .commit_delete(&self.repos.physical_ports, &port)
                .await
            {
                warn!("Record of exceptional port {} not removed: {}", marker.port_id, e);
                continue;
            }
            if let Err(e) = self.store.delete_record(&marker).await {
                warn!("Marker of exceptional port {} not removed: {}", marker.port_id, e);
                continue;
            }
            info!("Reconciled exceptional port {} ({:?})", marker.port_id, marker.operation);
            resolved += 1;
        }
        Ok(resolved)
    }
}
