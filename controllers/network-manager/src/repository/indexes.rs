//! Index definitions per resource kind.

use super::Indexed;
use resources::{IpGroup, LogicalPort, Network, PhysicalPort, Subnet};

pub const INDEX_TENANT: &str = "tenant";
pub const INDEX_NETWORK: &str = "network";
pub const INDEX_PUBLIC: &str = "public";
pub const INDEX_EXTERNAL: &str = "external";
pub const INDEX_NODE: &str = "node";
pub const INDEX_IP_GROUP: &str = "ipgroup";
/// `{namespace}/{pod name}`
pub const INDEX_POD: &str = "pod";

/// Value stored in boolean indexes
pub fn flag(value: bool) -> String {
    value.to_string()
}

impl Indexed for Network {
    const KIND: &'static str = "network";

    fn key(&self) -> &str {
        &self.id
    }

    fn index_values(&self) -> Vec<(&'static str, String)> {
        vec![
            (INDEX_TENANT, self.tenant_id.clone()),
            (INDEX_PUBLIC, flag(self.is_public)),
            (INDEX_EXTERNAL, flag(self.is_external)),
        ]
    }
}

impl Indexed for Subnet {
    const KIND: &'static str = "subnet";

    fn key(&self) -> &str {
        &self.id
    }

    fn index_values(&self) -> Vec<(&'static str, String)> {
        vec![
            (INDEX_TENANT, self.tenant_id.clone()),
            (INDEX_NETWORK, self.network_id.clone()),
        ]
    }
}

impl Indexed for LogicalPort {
    const KIND: &'static str = "port";

    fn key(&self) -> &str {
        &self.id
    }

    fn index_values(&self) -> Vec<(&'static str, String)> {
        let mut values = vec![
            (INDEX_TENANT, self.tenant_id.clone()),
            (INDEX_NETWORK, self.network_id.clone()),
            (INDEX_NODE, self.node_id.clone()),
        ];
        if let Some(group_id) = &self.ip_group_id {
            values.push((INDEX_IP_GROUP, group_id.clone()));
        }
        if !self.pod_name.is_empty() {
            values.push((INDEX_POD, format!("{}/{}", self.pod_ns, self.pod_name)));
        }
        values
    }
}

impl Indexed for PhysicalPort {
    const KIND: &'static str = "physical port";

    fn key(&self) -> &str {
        &self.id
    }

    fn index_values(&self) -> Vec<(&'static str, String)> {
        vec![
            (INDEX_TENANT, self.tenant_id.clone()),
            (INDEX_NETWORK, self.network_id.clone()),
            (INDEX_NODE, self.node_id.clone()),
        ]
    }
}

impl Indexed for IpGroup {
    const KIND: &'static str = "ip group";

    fn key(&self) -> &str {
        &self.id
    }

    fn index_values(&self) -> Vec<(&'static str, String)> {
        vec![
            (INDEX_TENANT, self.tenant_id.clone()),
            (INDEX_NETWORK, self.network_id.clone()),
        ]
    }
}
