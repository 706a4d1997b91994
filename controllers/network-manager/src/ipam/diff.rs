//! Difference between an IP group and the addresses a request asks for.

use super::validate::IpSpec;
use crate::error::ManagerError;
use resources::IpGroup;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpGroupDiff {
    /// Specific addresses to provision
    pub add_ips: Vec<String>,
    /// Number of backend-assigned addresses to provision
    pub add_size: usize,
    /// Addresses to release
    pub del_ips: Vec<String>,
}

impl IpGroupDiff {
    pub fn is_empty(&self) -> bool {
        self.add_ips.is_empty() && self.add_size == 0 && self.del_ips.is_empty()
    }
}

/// Compute the diff against `existing` (`None` when creating)
///
/// Addresses marked used are never selected for removal. An address list that
/// drops a used address, or a count below the number of used addresses, is a
/// conflict.
pub fn compute_diff(existing: Option<&IpGroup>, spec: &IpSpec) -> Result<IpGroupDiff, ManagerError> {
    let entries = existing.map(|g| g.ips.as_slice()).unwrap_or_default();

    match spec {
        IpSpec::Unchanged => Ok(IpGroupDiff::default()),
        IpSpec::Addresses(requested) => {
            let add_ips = requested
                .iter()
                .filter(|ip| !entries.iter().any(|e| &e.ip_addr == *ip))
                .cloned()
                .collect();

            let removed: Vec<_> = entries
                .iter()
                .filter(|e| !requested.contains(&e.ip_addr))
                .collect();
            let in_use: Vec<&str> = removed
                .iter()
                .filter(|e| e.used)
                .map(|e| e.ip_addr.as_str())
                .collect();
            if !in_use.is_empty() {
                return Err(ManagerError::Conflict(format!(
                    "addresses in use cannot be removed: {}",
                    in_use.join(",")
                )));
            }

            Ok(IpGroupDiff {
                add_ips,
                add_size: 0,
                del_ips: removed.iter().map(|e| e.ip_addr.clone()).collect(),
            })
        }
        IpSpec::Count(requested) => {
            let current = entries.len();
            if *requested >= current {
                return Ok(IpGroupDiff {
                    add_size: requested - current,
                    ..Default::default()
                });
            }

            let shrink_by = current - requested;
            let del_ips: Vec<String> = entries
                .iter()
                .filter(|e| !e.used)
                .take(shrink_by)
                .map(|e| e.ip_addr.clone())
                .collect();
            if del_ips.len() < shrink_by {
                return Err(ManagerError::Conflict(format!(
                    "cannot shrink to {} addresses, {} are in use",
                    requested,
                    current - (entries.iter().filter(|e| !e.used).count())
                )));
            }
            Ok(IpGroupDiff {
                del_ips,
                ..Default::default()
            })
        }
    }
}
