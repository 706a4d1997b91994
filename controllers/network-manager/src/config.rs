//! Process configuration.
//!
//! Everything comes from environment variables, each with a default suitable for a
//! single-node deployment against a local etcd.

use crate::error::ManagerError;
use crate::retry::RetryPolicy;
use std::str::FromStr;
use std::time::Duration;

/// Retry policy of the tenant cancellation supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelPolicy {
    /// Attempts of the full clear sequence before giving up until next restart
    pub max_attempts: u32,
    pub backoff_min_secs: u64,
    pub backoff_max_secs: u64,
}

impl Default for CancelPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            backoff_min_secs: 1,
            backoff_max_secs: 60,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub etcd_url: String,
    /// Root directory of every key written by the manager
    pub kv_root: String,
    pub admin_tenant_id: String,
    pub default_network_quota: u32,
    pub admin_network_quota: u32,
    pub iaas_retry: RetryPolicy,
    /// Pause between bootstrap attempts after a store error
    pub bootstrap_retry_interval: Duration,
    pub tenant_cancel: CancelPolicy,
    /// Lifetime of the store's tenant lock between refreshes
    pub tenant_lock_ttl: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            etcd_url: "http://127.0.0.1:2379".to_string(),
            kv_root: "/paasnet".to_string(),
            admin_tenant_id: resources::ADMIN_TENANT_ID.to_string(),
            default_network_quota: resources::DEFAULT_NETWORK_QUOTA,
            admin_network_quota: resources::ADMIN_NETWORK_QUOTA,
            iaas_retry: RetryPolicy::default(),
            bootstrap_retry_interval: Duration::from_secs(3),
            tenant_cancel: CancelPolicy::default(),
            tenant_lock_ttl: Duration::from_secs(30),
        }
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, ManagerError>
where
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ManagerError::InvalidConfig(format!("{}={:?}: {}", name, raw, e))),
        None => Ok(default),
    }
}

impl ManagerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ManagerError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ManagerError> {
        let defaults = Self::default();

        let kv_root: String = parse_var(&lookup, "KV_ROOT", defaults.kv_root)?;
        let kv_root = format!("/{}", kv_root.trim_matches('/'));
        if kv_root == "/" {
            return Err(ManagerError::InvalidConfig("KV_ROOT must not be empty".to_string()));
        }

        let admin_tenant_id: String = parse_var(&lookup, "ADMIN_TENANT_ID", defaults.admin_tenant_id)?;
        if admin_tenant_id.is_empty() {
            return Err(ManagerError::InvalidConfig("ADMIN_TENANT_ID must not be empty".to_string()));
        }

        let iaas_retry = RetryPolicy {
            attempts: parse_var(&lookup, "IAAS_RETRY_ATTEMPTS", defaults.iaas_retry.attempts)?,
            backoff: Duration::from_millis(parse_var(
                &lookup,
                "IAAS_RETRY_BACKOFF_MS",
                defaults.iaas_retry.backoff.as_millis() as u64,
            )?),
        };
        if iaas_retry.attempts == 0 {
            return Err(ManagerError::InvalidConfig("IAAS_RETRY_ATTEMPTS must be at least 1".to_string()));
        }

        let tenant_cancel = CancelPolicy {
            max_attempts: parse_var(&lookup, "TENANT_CANCEL_MAX_ATTEMPTS", defaults.tenant_cancel.max_attempts)?,
            backoff_min_secs: parse_var(
                &lookup,
                "TENANT_CANCEL_BACKOFF_MIN_SECS",
                defaults.tenant_cancel.backoff_min_secs,
            )?,
            backoff_max_secs: parse_var(
                &lookup,
                "TENANT_CANCEL_BACKOFF_MAX_SECS",
                defaults.tenant_cancel.backoff_max_secs,
            )?,
        };
        if tenant_cancel.backoff_min_secs > tenant_cancel.backoff_max_secs {
            return Err(ManagerError::InvalidConfig(
                "TENANT_CANCEL_BACKOFF_MIN_SECS exceeds TENANT_CANCEL_BACKOFF_MAX_SECS".to_string(),
            ));
        }

        let tenant_lock_ttl = Duration::from_secs(parse_var(
            &lookup,
            "TENANT_LOCK_TTL_SECS",
            defaults.tenant_lock_ttl.as_secs(),
        )?);
        if tenant_lock_ttl < Duration::from_secs(3) {
            return Err(ManagerError::InvalidConfig("TENANT_LOCK_TTL_SECS must be at least 3".to_string()));
        }

        Ok(Self {
            etcd_url: parse_var(&lookup, "ETCD_URL", defaults.etcd_url)?,
            kv_root,
            admin_tenant_id,
            default_network_quota: parse_var(&lookup, "DEFAULT_NETWORK_QUOTA", defaults.default_network_quota)?,
            admin_network_quota: parse_var(&lookup, "ADMIN_NETWORK_QUOTA", defaults.admin_network_quota)?,
            iaas_retry,
            bootstrap_retry_interval: Duration::from_millis(parse_var(
                &lookup,
                "BOOTSTRAP_RETRY_INTERVAL_MS",
                defaults.bootstrap_retry_interval.as_millis() as u64,
            )?),
            tenant_cancel,
            tenant_lock_ttl,
        })
    }
}
