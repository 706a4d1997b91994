//! Network manager resource definitions
//!
//! Canonical records persisted in the KV store and held in the in-memory cache:
//! networks, subnets, logical ports, physical ports, IP groups, tenants and
//! exceptional-port markers. Field names serialize as camelCase JSON.

pub mod exceptional_port;
pub mod ip_group;
pub mod network;
pub mod physical_port;
pub mod port;
pub mod subnet;
pub mod tenant;

pub use exceptional_port::*;
pub use ip_group::*;
pub use network::*;
pub use physical_port::*;
pub use port::*;
pub use subnet::*;
pub use tenant::*;

/// Default id of the administrative tenant
pub const ADMIN_TENANT_ID: &str = "admin";

/// Maximum number of addresses an IP group may hold
pub const MAX_IP_GROUP_SIZE: usize = 32;

/// Network quota for ordinary tenants
pub const DEFAULT_NETWORK_QUOTA: u32 = 10;

/// Network quota for the administrative tenant
pub const ADMIN_NETWORK_QUOTA: u32 = 100;
