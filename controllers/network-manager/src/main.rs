//! Network Manager
//!
//! Loads the cache from etcd, resumes unfinished tenant cancellations and runs
//! until interrupted.
//!
//! The IaaS side is the embedded provider, whose state lives in this process only.
//! Against a fresh etcd root that is a self-contained manager. Against a root that
//! already records networks from an earlier run, startup fails instead of serving
//! records the provider no longer has; point `KV_ROOT` at an empty root or plug in
//! a durable `IaasClientTrait` provider.

use iaas_client::EmbeddedIaasClient;
use kv_store::EtcdClient;
use network_manager::{ManagerConfig, ServiceContext};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Network Manager");

    let config = ManagerConfig::from_env()?;
    info!("Configuration:");
    info!("  etcd URL: {}", config.etcd_url);
    info!("  KV root: {}", config.kv_root);
    info!("  Admin tenant: {}", config.admin_tenant_id);
    info!(
        "  Network quota: {} (admin {})",
        config.default_network_quota, config.admin_network_quota
    );

    let kv = Arc::new(EtcdClient::new(config.etcd_url.clone())?);
    let iaas = Arc::new(EmbeddedIaasClient::new());
    let ctx = ServiceContext::new(config, kv, iaas);

    let summary = ctx.start().await?;
    info!("Ready with {} networks and {} ports", summary.networks, summary.ports);

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    ctx.shutdown().await;

    Ok(())
}
