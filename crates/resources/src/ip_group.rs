//! IP group resource

use serde::{Deserialize, Serialize};

/// One address reserved by an IP group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpEntry {
    pub ip_addr: String,
    /// Handed out to a port through obtain/release
    #[serde(default)]
    pub used: bool,
    /// IaaS port that reserves the address
    pub port_id: String,
    #[serde(default)]
    pub mac_addr: String,
}

/// Named set of reserved addresses on one network
///
/// The name is unique per (tenant, network).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpGroup {
    pub id: String,
    pub name: String,
    pub network_id: String,
    pub tenant_id: String,
    #[serde(default)]
    pub ips: Vec<IpEntry>,
}

impl IpGroup {
    pub fn used_count(&self) -> usize {
        self.ips.iter().filter(|e| e.used).count()
    }

    pub fn find(&self, ip_addr: &str) -> Option<&IpEntry> {
        self.ips.iter().find(|e| e.ip_addr == ip_addr)
    }

    pub fn contains(&self, ip_addr: &str) -> bool {
        self.find(ip_addr).is_some()
    }
}
