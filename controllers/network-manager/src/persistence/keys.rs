//! Store key layout.

/// Deterministic key paths under the configured root
#[derive(Debug, Clone)]
pub struct KeyScheme {
    root: String,
}

impl KeyScheme {
    pub fn new(root: &str) -> Self {
        Self {
            root: format!("/{}", root.trim_matches('/')),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn tenants_dir(&self) -> String {
        format!("{}/tenants", self.root)
    }

    pub fn tenant_dir(&self, tenant_id: &str) -> String {
        format!("{}/tenants/{}", self.root, tenant_id)
    }

    pub fn tenant(&self, tenant_id: &str) -> String {
        format!("{}/self", self.tenant_dir(tenant_id))
    }

    pub fn networks_dir(&self, tenant_id: &str) -> String {
        format!("{}/networks", self.tenant_dir(tenant_id))
    }

    pub fn network(&self, tenant_id: &str, network_id: &str) -> String {
        format!("{}/{}", self.networks_dir(tenant_id), network_id)
    }

    pub fn subnets_dir(&self) -> String {
        format!("{}/subnets", self.root)
    }

    pub fn subnet(&self, subnet_id: &str) -> String {
        format!("{}/{}", self.subnets_dir(), subnet_id)
    }

    pub fn ports_dir(&self) -> String {
        format!("{}/ports", self.root)
    }

    pub fn port(&self, port_id: &str) -> String {
        format!("{}/{}", self.ports_dir(), port_id)
    }

    pub fn physical_ports_dir(&self) -> String {
        format!("{}/physical_ports", self.root)
    }

    pub fn physical_port(&self, port_id: &str) -> String {
        format!("{}/{}", self.physical_ports_dir(), port_id)
    }

    pub fn ip_groups_dir(&self) -> String {
        format!("{}/ipgroups", self.root)
    }

    pub fn ip_group(&self, group_id: &str) -> String {
        format!("{}/{}", self.ip_groups_dir(), group_id)
    }

    pub fn exceptional_ports_dir(&self) -> String {
        format!("{}/exceptional_ports", self.root)
    }

    pub fn exceptional_port(&self, port_id: &str) -> String {
        format!("{}/{}", self.exceptional_ports_dir(), port_id)
    }

    pub fn lock(&self, name: &str) -> String {
        format!("{}/locks/{}", self.root, name)
    }

    pub fn tenant_lock(&self, tenant_id: &str) -> String {
        self.lock(&format!("tenant-{}", tenant_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let keys = KeyScheme::new("paasnet/");
        assert_eq!(keys.network("t1", "n1"), "/paasnet/tenants/t1/networks/n1");
        assert_eq!(keys.tenant("t1"), "/paasnet/tenants/t1/self");
        assert_eq!(keys.ip_group("g1"), "/paasnet/ipgroups/g1");
        assert_eq!(keys.physical_port("pp"), "/paasnet/physical_ports/pp");
        assert_eq!(keys.exceptional_port("p1"), "/paasnet/exceptional_ports/p1");
        assert_eq!(keys.tenant_lock("t1"), "/paasnet/locks/tenant-t1");
    }
}
