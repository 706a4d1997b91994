//! Network resource

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const NETWORK_TYPE_FLAT: &str = "flat";
pub const NETWORK_TYPE_VLAN: &str = "vlan";

/// Segmentation id recorded for flat networks, which have none of their own
pub const FLAT_DEFAULT_SEGMENTATION_ID: &str = "0";

/// VLAN segmentation id that marks a network as VLAN-transparent
pub const VLAN_TRANSPARENT_SEGMENTATION_ID: &str = "4095";

/// Virtual network owned by a tenant (or public, owned by admin)
///
/// Exactly one subnet belongs to each network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    pub id: String,
    pub name: String,
    pub tenant_id: String,
    #[serde(default)]
    pub subnet_id: String,
    /// Visible to all tenants; only admin may mutate it
    #[serde(default)]
    pub is_public: bool,
    /// Pre-existing in the IaaS backend; never deleted there
    #[serde(default)]
    pub is_external: bool,
    #[serde(default)]
    pub provider: ProviderAttrs,
    pub create_time: DateTime<Utc>,
    #[serde(default)]
    pub description: String,
}

/// Provider (physical) attributes of a network
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderAttrs {
    #[serde(default)]
    pub network_type: String,
    #[serde(default)]
    pub physical_network: String,
    #[serde(default)]
    pub segmentation_id: String,
    #[serde(default)]
    pub vlan_transparent: bool,
}

impl ProviderAttrs {
    /// True when the caller asked for a provider-typed network
    pub fn is_set(&self) -> bool {
        !self.network_type.is_empty()
    }
}

impl Network {
    /// Whether `tenant_id` may see this network
    pub fn visible_to(&self, tenant_id: &str) -> bool {
        self.is_public || self.tenant_id == tenant_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_json_is_camel_case_and_defaults() {
        let json = r#"{"id":"n1","name":"net","tenantId":"t1","createTime":"2024-01-01T00:00:00Z"}"#;
        let net: Network = serde_json::from_str(json).unwrap();
        assert_eq!(net.tenant_id, "t1");
        assert!(!net.is_public);
        assert!(!net.provider.is_set());

        let out = serde_json::to_value(&net).unwrap();
        assert!(out.get("subnetId").is_some());
        assert!(out.get("isExternal").is_some());
    }

    #[test]
    fn test_visibility() {
        let mut net: Network = serde_json::from_str(
            r#"{"id":"n1","name":"net","tenantId":"t1","createTime":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert!(net.visible_to("t1"));
        assert!(!net.visible_to("t2"));
        net.is_public = true;
        assert!(net.visible_to("t2"));
    }
}
