//! Logical port resource

use serde::{Deserialize, Serialize};

/// Lifecycle of a port
///
/// Creation runs `WaitCreating -> Creating -> CreatedOK | CreatedFailed`;
/// teardown runs `WaitDestroy -> Destroyed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortStatus {
    #[default]
    WaitCreating,
    Creating,
    #[serde(rename = "CreatedOK")]
    CreatedOk,
    CreatedFailed,
    WaitDestroy,
    Destroyed,
}

impl PortStatus {
    /// Only successfully created ports count as in use
    pub fn is_in_use(&self) -> bool {
        matches!(self, PortStatus::CreatedOk)
    }
}

/// Kind of consumer a port belongs to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OwnerType {
    #[default]
    Pod,
    Node,
    #[serde(rename = "PaaSComponent")]
    PaasComponent,
}

/// Port attached to a pod or node, owned by exactly one consumer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogicalPort {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: PortStatus,
    pub ip: String,
    #[serde(default)]
    pub mac: String,
    pub network_id: String,
    pub subnet_id: String,
    /// Set when the address was taken from an IP group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_group_id: Option<String>,
    #[serde(default)]
    pub node_id: String,
    #[serde(default)]
    pub cluster_id: String,
    #[serde(default)]
    pub owner_type: OwnerType,
    pub tenant_id: String,
    #[serde(default)]
    pub pod_name: String,
    #[serde(default)]
    pub pod_ns: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_names() {
        assert_eq!(serde_json::to_string(&PortStatus::CreatedOk).unwrap(), "\"CreatedOK\"");
        assert_eq!(serde_json::to_string(&OwnerType::PaasComponent).unwrap(), "\"PaaSComponent\"");
        let status: PortStatus = serde_json::from_str("\"WaitDestroy\"").unwrap();
        assert_eq!(status, PortStatus::WaitDestroy);
    }

    #[test]
    fn test_only_created_ok_is_in_use() {
        assert!(PortStatus::CreatedOk.is_in_use());
        assert!(!PortStatus::Creating.is_in_use());
        assert!(!PortStatus::CreatedFailed.is_in_use());
        assert!(!PortStatus::WaitDestroy.is_in_use());
    }
}
