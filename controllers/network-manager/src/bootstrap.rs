//! Cache bootstrap.
//!
//! At start the cache is rebuilt from the store, one resource kind at a time.
//! A kind that was never written loads as empty; any other store error is retried
//! at a fixed interval until it succeeds, so the manager never serves from a
//! partially loaded cache. Re-running the load overwrites records by id.

use crate::error::ManagerError;
use crate::persistence::ResourceStore;
use crate::repository::{Indexed, Repositories, Repository};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Number of records loaded per kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BootstrapSummary {
    pub networks: usize,
    pub subnets: usize,
    pub ip_groups: usize,
    pub ports: usize,
    pub physical_ports: usize,
}

async fn load_kind<T, F, Fut>(repo: &Repository<T>, retry_interval: Duration, mut load: F) -> usize
where
    T: Indexed,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Vec<T>, ManagerError>>,
{
    loop {
        match load().await {
            Ok(records) => {
                let mut loaded = 0;
                for record in records {
                    match repo.add(record) {
                        Ok(()) => loaded += 1,
                        Err(e) => warn!("Skipping {} record: {}", T::KIND, e),
                    }
                }
                return loaded;
            }
            Err(e) if e.is_not_found() => return 0,
            Err(e) => {
                warn!("Loading {} records failed, retrying in {:?}: {}", T::KIND, retry_interval, e);
                tokio::time::sleep(retry_interval).await;
            }
        }
    }
}

/// Load every resource kind from the store into the cache
pub async fn bootstrap(store: &ResourceStore, repos: &Repositories, retry_interval: Duration) -> BootstrapSummary {
    let summary = BootstrapSummary {
        networks: load_kind(&repos.networks, retry_interval, move || store.list_networks()).await,
        subnets: load_kind(&repos.subnets, retry_interval, move || store.list_subnets()).await,
        ip_groups: load_kind(&repos.ip_groups, retry_interval, move || store.list_ip_groups()).await,
        ports: load_kind(&repos.ports, retry_interval, move || store.list_ports()).await,
        physical_ports: load_kind(&repos.physical_ports, retry_interval, move || store.list_physical_ports()).await,
    };
    info!(
        "Cache loaded: {} networks, {} subnets, {} ip groups, {} ports, {} physical ports",
        summary.networks, summary.subnets, summary.ip_groups, summary.ports, summary.physical_ports
    );
    summary
}
