//! CIDR and allocation pool arithmetic. No side effects.

use crate::error::ManagerError;
use ipnetwork::Ipv4Network;
use resources::AllocationPool;
use std::net::Ipv4Addr;

/// Shortest mask accepted for a subnet
pub const MIN_PREFIX_LEN: u8 = 8;

fn parse_addr(ip: &str) -> Option<Ipv4Addr> {
    ip.trim().parse().ok()
}

/// Parse `a.b.c.d/len`; the mask is mandatory
pub fn parse_cidr(cidr: &str) -> Result<Ipv4Network, ManagerError> {
    let cidr = cidr.trim();
    if !cidr.contains('/') {
        return Err(ManagerError::BadRequest(format!("cidr {} has no mask", cidr)));
    }
    cidr.parse::<Ipv4Network>()
        .map_err(|e| ManagerError::BadRequest(format!("invalid cidr {}: {}", cidr, e)))
}

/// Dotted-quad with an explicit mask of at least `MIN_PREFIX_LEN` bits
pub fn cidr_is_legal(cidr: &str) -> bool {
    parse_cidr(cidr).is_ok_and(|net| net.prefix() >= MIN_PREFIX_LEN)
}

pub fn ip_in_cidr(ip: &str, cidr: &str) -> bool {
    match (parse_addr(ip), parse_cidr(cidr)) {
        (Some(addr), Ok(net)) => net.contains(addr),
        _ => false,
    }
}

/// Inclusive range test
pub fn ip_in_range(ip: &str, pool: &AllocationPool) -> bool {
    match (parse_addr(ip), parse_addr(&pool.start), parse_addr(&pool.end)) {
        (Some(addr), Some(start), Some(end)) => start <= addr && addr <= end,
        _ => false,
    }
}

/// Every pool is ordered and inside `cidr`, and no pool boundary falls inside
/// another pool. An empty list is not legal.
pub fn allocation_pools_legal(pools: &[AllocationPool], cidr: &str) -> bool {
    if pools.is_empty() {
        return false;
    }

    for pool in pools {
        let (Some(start), Some(end)) = (parse_addr(&pool.start), parse_addr(&pool.end)) else {
            return false;
        };
        if start > end || !ip_in_cidr(&pool.start, cidr) || !ip_in_cidr(&pool.end, cidr) {
            return false;
        }
    }

    for (i, a) in pools.iter().enumerate() {
        for b in &pools[i + 1..] {
            if ip_in_range(&a.start, b)
                || ip_in_range(&a.end, b)
                || ip_in_range(&b.start, a)
                || ip_in_range(&b.end, a)
            {
                return false;
            }
        }
    }
    true
}

/// Single pool spanning every host address of `cidr`, excluding the network and
/// broadcast addresses
pub fn default_allocation_pool_for_cidr(cidr: &str) -> Result<AllocationPool, ManagerError> {
    let net = parse_cidr(cidr)?;
    if net.prefix() < MIN_PREFIX_LEN || net.prefix() > 30 {
        return Err(ManagerError::BadRequest(format!(
            "cidr {} has no usable host range",
            cidr
        )));
    }

    let first = u32::from(net.network()) + 1;
    let last = u32::from(net.broadcast()) - 1;
    Ok(AllocationPool::new(
        Ipv4Addr::from(first).to_string(),
        Ipv4Addr::from(last).to_string(),
    ))
}

/// First host address, the conventional gateway
pub fn default_gateway_for_cidr(cidr: &str) -> Result<String, ManagerError> {
    Ok(default_allocation_pool_for_cidr(cidr)?.start)
}

/// Cut `gateway` out of the pools, splitting a pool when the gateway falls in its
/// middle
pub fn exclude_gateway(pools: &[AllocationPool], gateway: &str) -> Vec<AllocationPool> {
    let Some(gw) = parse_addr(gateway) else {
        return pools.to_vec();
    };

    let mut out = Vec::with_capacity(pools.len() + 1);
    for pool in pools {
        if !ip_in_range(gateway, pool) {
            out.push(pool.clone());
            continue;
        }
        let gw = u32::from(gw);
        if let Some(start) = parse_addr(&pool.start).map(u32::from) {
            if start < gw {
                out.push(AllocationPool::new(pool.start.clone(), Ipv4Addr::from(gw - 1).to_string()));
            }
        }
        if let Some(end) = parse_addr(&pool.end).map(u32::from) {
            if gw < end {
                out.push(AllocationPool::new(Ipv4Addr::from(gw + 1).to_string(), pool.end.clone()));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(start: &str, end: &str) -> AllocationPool {
        AllocationPool::new(start, end)
    }

    #[test]
    fn test_cidr_is_legal() {
        assert!(cidr_is_legal("10.0.0.0/8"));
        assert!(cidr_is_legal("192.168.1.0/24"));
        assert!(!cidr_is_legal("10.0.0.0/7"));
        assert!(!cidr_is_legal("10.0.0.0"));
        assert!(!cidr_is_legal("10.0.0/24"));
        assert!(!cidr_is_legal("10.0.0.0/33"));
        assert!(!cidr_is_legal("garbage"));
    }

    #[test]
    fn test_membership() {
        assert!(ip_in_cidr("10.0.0.255", "10.0.0.0/24"));
        assert!(!ip_in_cidr("10.0.1.0", "10.0.0.0/24"));
        assert!(!ip_in_cidr("not-an-ip", "10.0.0.0/24"));

        let p = pool("10.0.0.10", "10.0.0.20");
        assert!(ip_in_range("10.0.0.10", &p));
        assert!(ip_in_range("10.0.0.20", &p));
        assert!(!ip_in_range("10.0.0.21", &p));
        assert!(!ip_in_range("10.0.0.9", &p));
    }

    #[test]
    fn test_default_pool_excludes_network_and_broadcast() {
        assert_eq!(
            default_allocation_pool_for_cidr("129.128.127.0/24").unwrap(),
            pool("129.128.127.1", "129.128.127.254")
        );
        assert_eq!(
            default_allocation_pool_for_cidr("129.128.127.0/26").unwrap(),
            pool("129.128.127.1", "129.128.127.62")
        );
        assert_eq!(
            default_allocation_pool_for_cidr("172.16.0.0/16").unwrap(),
            pool("172.16.0.1", "172.16.255.254")
        );
        assert_eq!(
            default_allocation_pool_for_cidr("10.0.16.0/20").unwrap(),
            pool("10.0.16.1", "10.0.31.254")
        );
        assert!(default_allocation_pool_for_cidr("10.0.0.0/31").is_err());
    }

    #[test]
    fn test_default_pool_stays_inside_cidr() {
        for prefix in 8..=30 {
            let cidr = format!("10.64.0.0/{}", prefix);
            let p = default_allocation_pool_for_cidr(&cidr).unwrap();
            assert!(ip_in_cidr(&p.start, &cidr), "{}", cidr);
            assert!(ip_in_cidr(&p.end, &cidr), "{}", cidr);
            assert!(allocation_pools_legal(&[p], &cidr), "{}", cidr);
        }
    }

    #[test]
    fn test_allocation_pools_legal() {
        let cidr = "10.0.0.0/24";
        assert!(allocation_pools_legal(&[pool("10.0.0.2", "10.0.0.50"), pool("10.0.0.60", "10.0.0.90")], cidr));
        assert!(!allocation_pools_legal(&[], cidr));
        assert!(!allocation_pools_legal(&[pool("10.0.0.50", "10.0.0.2")], cidr));
        assert!(!allocation_pools_legal(&[pool("10.0.0.2", "10.0.1.5")], cidr));
        // boundary inside the other pool, checked in both directions
        assert!(!allocation_pools_legal(&[pool("10.0.0.2", "10.0.0.50"), pool("10.0.0.50", "10.0.0.90")], cidr));
        assert!(!allocation_pools_legal(&[pool("10.0.0.10", "10.0.0.20"), pool("10.0.0.2", "10.0.0.90")], cidr));
    }

    #[test]
    fn test_exclude_gateway() {
        let full = [pool("10.0.0.1", "10.0.0.254")];
        assert_eq!(exclude_gateway(&full, "10.0.0.1"), vec![pool("10.0.0.2", "10.0.0.254")]);
        assert_eq!(
            exclude_gateway(&full, "10.0.0.100"),
            vec![pool("10.0.0.1", "10.0.0.99"), pool("10.0.0.101", "10.0.0.254")]
        );
        assert_eq!(exclude_gateway(&full, "10.0.1.1"), full.to_vec());
    }
}
