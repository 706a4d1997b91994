//! Tenant cancellation.
//!
//! Cancelling a tenant persists a `cancelling` flag on its record and hands the
//! clear sequence to a supervised background task. The task retries with
//! Fibonacci backoff, gives up after a bounded number of attempts, and stops early
//! on shutdown. Because the flag is persisted, unfinished cancellations are picked
//! up again by [`CancellationSupervisor::resume`] when the process starts.

use super::TenantService;
use crate::backoff::FibonacciBackoff;
use crate::config::CancelPolicy;
use crate::error::ManagerError;
use crate::ipam::IpamEngine;
use crate::provisioning::Provisioner;
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Everything a cancellation task needs, shared by all of them
#[derive(Debug)]
struct Collaborators {
    tenants: Arc<TenantService>,
    provisioner: Arc<Provisioner>,
    ipam: Arc<IpamEngine>,
    policy: CancelPolicy,
}

#[derive(Debug)]
pub struct CancellationSupervisor {
    shared: Arc<Collaborators>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl CancellationSupervisor {
    pub fn new(
        tenants: Arc<TenantService>,
        provisioner: Arc<Provisioner>,
        ipam: Arc<IpamEngine>,
        policy: CancelPolicy,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shared: Arc::new(Collaborators {
                tenants,
                provisioner,
                ipam,
                policy,
            }),
            shutdown,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Flag the tenant as cancelling and start clearing it in the background
    pub async fn cancel_tenant(&self, tenant_id: &str) -> Result<(), ManagerError> {
        if *self.shutdown.borrow() {
            return Err(ManagerError::Conflict("manager is shutting down".to_string()));
        }
        self.shared.tenants.mark_cancelling(tenant_id).await?;
        info!("Cancellation of tenant {} requested", tenant_id);
        self.launch(tenant_id);
        Ok(())
    }

    /// Relaunch every cancellation left unfinished by a previous run
    pub async fn resume(&self) -> Result<usize, ManagerError> {
        let pending = self.shared.tenants.list_cancelling().await?;
        for tenant in &pending {
            info!("Resuming cancellation of tenant {}", tenant.tenant_uuid);
            self.launch(&tenant.tenant_uuid);
        }
        Ok(pending.len())
    }

    pub fn is_running(&self, tenant_id: &str) -> bool {
        self.tasks
            .lock()
            .get(tenant_id)
            .is_some_and(|handle| !handle.is_finished())
    }

    fn launch(&self, tenant_id: &str) {
        let mut tasks = self.tasks.lock();
        tasks.retain(|_, handle| !handle.is_finished());
        if tasks.contains_key(tenant_id) {
            return;
        }

        let shared = self.shared.clone();
        let shutdown = self.shutdown.subscribe();
        let id = tenant_id.to_string();
        tasks.insert(tenant_id.to_string(), tokio::spawn(run(shared, id, shutdown)));
    }

    /// Wait for the tenant's cancellation task, if one is running
    pub async fn wait_for(&self, tenant_id: &str) {
        let handle = self.tasks.lock().remove(tenant_id);
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Cancellation task of tenant {} panicked: {}", tenant_id, e);
            }
        }
    }

    /// Signal every task to stop and wait for them
    pub async fn shutdown(&self) {
        // send_replace never fails, even with no receiver left
        self.shutdown.send_replace(true);
        let (tenant_ids, handles): (Vec<String>, Vec<JoinHandle<()>>) = self.tasks.lock().drain().unzip();
        for (tenant_id, result) in tenant_ids.iter().zip(join_all(handles).await) {
            if let Err(e) = result {
                error!("Cancellation task of tenant {} panicked: {}", tenant_id, e);
            }
        }
    }
}

async fn run(shared: Arc<Collaborators>, tenant_id: String, mut shutdown: watch::Receiver<bool>) {
    let policy = shared.policy;
    let mut backoff = FibonacciBackoff::new(policy.backoff_min_secs, policy.backoff_max_secs);
    let attempts = policy.max_attempts.max(1);

    for attempt in 1..=attempts {
        if *shutdown.borrow() {
            info!("Cancellation of tenant {} interrupted by shutdown", tenant_id);
            return;
        }

        match clear_tenant(&shared, &tenant_id).await {
            Ok(()) => {
                info!("Tenant {} cancelled", tenant_id);
                return;
            }
            Err(e) if attempt == attempts => {
                error!(
                    "Giving up cancelling tenant {} after {} attempts, will resume at next start: {}",
                    tenant_id, attempts, e
                );
                return;
            }
            Err(e) => {
                let delay = backoff.next_backoff();
                warn!(
                    "Cancelling tenant {} failed (attempt {}/{}), retrying in {:?}: {}",
                    tenant_id, attempt, attempts, delay, e
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.changed() => {
                        info!("Cancellation of tenant {} interrupted by shutdown", tenant_id);
                        return;
                    }
                }
            }
        }
    }
}

/// Remove everything the tenant owns, dependents first
///
/// 1. Logical ports
/// 2. Physical ports
/// 3. IP groups
/// 4. Networks
/// 5. The tenant record
async fn clear_tenant(shared: &Collaborators, tenant_id: &str) -> Result<(), ManagerError> {
    let provisioner = &shared.provisioner;

    let ports: Vec<String> = provisioner
        .list_ports(tenant_id)
        .into_iter()
        .map(|p| p.id)
        .collect();
    provisioner.delete_ports(tenant_id, &ports).await?;

    let mut failed = Vec::new();
    for port in provisioner.list_physical_ports(tenant_id) {
        if let Err(e) = provisioner.delete_physical_port(tenant_id, &port.id).await {
            warn!("Physical port {} of tenant {} not deleted: {}", port.id, tenant_id, e);
            failed.push(port.id);
        }
    }
    for group in shared.ipam.list_by_tenant(tenant_id) {
        if let Err(e) = shared.ipam.delete(tenant_id, &group.id).await {
            warn!("Ip group {} of tenant {} not deleted: {}", group.id, tenant_id, e);
            failed.push(group.id);
        }
    }
    if !failed.is_empty() {
        return Err(ManagerError::PartialFailure {
            message: format!("tenant {} still owns ports or ip groups", tenant_id),
            failed,
        });
    }

    for network in provisioner.owned_networks(tenant_id) {
        provisioner.delete_network(tenant_id, &network.id).await?;
    }

    shared.tenants.remove_tenant(tenant_id).await
}
