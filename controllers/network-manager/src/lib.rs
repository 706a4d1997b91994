//! Network Manager
//!
//! Control plane for multi-tenant container networking:
//! - Repository: typed in-memory cache per resource kind with secondary indexes
//! - Persistence: records in a hierarchical KV store, committed store-then-cache
//! - IPAM: CIDR arithmetic and IP group lifecycle under a global lock
//! - Provisioning: networks, subnets and ports driven through an IaaS backend
//! - Tenants: network quota and supervised tenant cancellation
//! - Bootstrap: cache rebuild from the store at start

pub mod backoff;
pub mod bootstrap;
pub mod config;
pub mod context;
pub mod error;
pub mod ipam;
pub mod persistence;
pub mod provisioning;
pub mod repository;
pub mod retry;
pub mod tenant;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::ManagerConfig;
pub use context::ServiceContext;
pub use error::{ErrorKind, ManagerError};
