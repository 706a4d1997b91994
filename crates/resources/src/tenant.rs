//! Tenant quota view

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub tenant_uuid: String,
    pub quota: u32,
    /// Networks currently owned by the tenant
    #[serde(default)]
    pub net_num: u32,
    /// Set while a cancellation is in progress; survives restarts
    #[serde(default)]
    pub is_cancelling: bool,
    pub create_time: DateTime<Utc>,
}

impl Tenant {
    pub fn new(tenant_uuid: impl Into<String>, quota: u32) -> Self {
        Self {
            tenant_uuid: tenant_uuid.into(),
            quota,
            net_num: 0,
            is_cancelling: false,
            create_time: Utc::now(),
        }
    }

    /// True when one more network still fits under the quota
    pub fn has_network_headroom(&self) -> bool {
        self.net_num < self.quota
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headroom_is_strict() {
        let mut tenant = Tenant::new("t1", 2);
        assert!(tenant.has_network_headroom());
        tenant.net_num = 1;
        assert!(tenant.has_network_headroom());
        tenant.net_num = 2;
        assert!(!tenant.has_network_headroom());
    }
}
