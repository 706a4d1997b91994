//! IP group request validation.

use super::cidr::ip_in_cidr;
use crate::error::ManagerError;
use resources::MAX_IP_GROUP_SIZE;
use std::net::Ipv4Addr;

/// What a request asks the group to contain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpSpec {
    /// Exactly these addresses
    Addresses(Vec<String>),
    /// This many addresses, chosen by the IaaS backend
    Count(usize),
    /// Neither was given
    Unchanged,
}

/// Parse `[ip1,ip2,...]`, dropping duplicates while keeping the first occurrence
pub fn parse_ip_list(raw: &str) -> Result<Vec<String>, ManagerError> {
    let inner = raw
        .trim()
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| ManagerError::BadRequest(format!("ip list {} must look like [ip1,ip2]", raw)))?;

    let mut ips: Vec<String> = Vec::new();
    for item in inner.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let addr: Ipv4Addr = item
            .parse()
            .map_err(|_| ManagerError::BadRequest(format!("invalid ip address {}", item)))?;
        let addr = addr.to_string();
        if !ips.contains(&addr) {
            ips.push(addr);
        }
    }
    Ok(ips)
}

/// Check the address list / count pair against the subnet
///
/// At most one of the two may be given, the resulting size is bounded by
/// `MAX_IP_GROUP_SIZE`, and every address must lie in `cidr`.
pub fn validate_ip_spec(ips: Option<&str>, size: Option<usize>, cidr: &str) -> Result<IpSpec, ManagerError> {
    match (ips, size) {
        (Some(_), Some(_)) => Err(ManagerError::BadRequest(
            "ips and size are mutually exclusive".to_string(),
        )),
        (Some(raw), None) => {
            let ips = parse_ip_list(raw)?;
            if ips.len() > MAX_IP_GROUP_SIZE {
                return Err(ManagerError::BadRequest(format!(
                    "{} addresses requested, at most {} allowed",
                    ips.len(),
                    MAX_IP_GROUP_SIZE
                )));
            }
            if let Some(outside) = ips.iter().find(|ip| !ip_in_cidr(ip, cidr)) {
                return Err(ManagerError::BadRequest(format!(
                    "address {} is outside subnet {}",
                    outside, cidr
                )));
            }
            Ok(IpSpec::Addresses(ips))
        }
        (None, Some(size)) if size > MAX_IP_GROUP_SIZE => Err(ManagerError::BadRequest(format!(
            "size {} exceeds the maximum of {}",
            size, MAX_IP_GROUP_SIZE
        ))),
        (None, Some(size)) => Ok(IpSpec::Count(size)),
        (None, None) => Ok(IpSpec::Unchanged),
    }
}
