//! Subnet resource

use serde::{Deserialize, Serialize};

/// Inclusive IPv4 address range inside a subnet
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AllocationPool {
    pub start: String,
    pub end: String,
}

impl AllocationPool {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subnet {
    pub id: String,
    pub network_id: String,
    pub name: String,
    pub cidr: String,
    #[serde(default)]
    pub gateway_ip: String,
    pub tenant_id: String,
    #[serde(default)]
    pub allocation_pools: Vec<AllocationPool>,
}
