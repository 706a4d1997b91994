//! IP address management.
//!
//! Pure CIDR and pool arithmetic lives in `cidr`; request validation and the
//! group diff are separate so that the engine itself only sequences the IaaS
//! calls and the store-then-cache commit.

pub mod cidr;
pub mod diff;
mod engine;
pub mod validate;


pub use engine::IpamEngine;

/// Create an IP group on a network
#[derive(Debug, Clone, Default)]
pub struct CreateIpGroupRequest {
    pub tenant_id: String,
    pub name: String,
    pub network_id: String,
    /// `[ip1,ip2,...]`
    pub ips: Option<String>,
    pub size: Option<usize>,
}

/// Change the name or the addresses of an IP group
#[derive(Debug, Clone, Default)]
pub struct UpdateIpGroupRequest {
    pub tenant_id: String,
    pub id: String,
    pub name: Option<String>,
    /// `[ip1,ip2,...]`
    pub ips: Option<String>,
    pub size: Option<usize>,
}
