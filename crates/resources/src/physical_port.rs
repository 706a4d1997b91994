//! Physical port resource

use crate::port::{OwnerType, PortStatus};
use serde::{Deserialize, Serialize};

/// Port bound to a node and attached to its VM by the IaaS backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhysicalPort {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: PortStatus,
    pub ip: String,
    #[serde(default)]
    pub mac: String,
    pub network_id: String,
    pub subnet_id: String,
    pub node_id: String,
    #[serde(default)]
    pub cluster_id: String,
    #[serde(default)]
    pub owner_type: OwnerType,
    pub tenant_id: String,
    /// e.g. "normal", "direct"
    #[serde(default)]
    pub vnic_type: String,
}
