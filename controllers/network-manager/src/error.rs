//! Network manager error types.
//!
//! Collaborator errors (`KvError`, `IaasError`) convert in through `#[from]`; callers
//! classify failures with [`ManagerError::kind`] instead of inspecting messages.

use iaas_client::IaasError;
use kv_store::KvError;
use thiserror::Error;

/// Errors that can occur in the network manager.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// KV store failure
    #[error("KV store error: {0}")]
    Store(#[from] KvError),

    /// IaaS backend failure
    #[error("IaaS error: {0}")]
    Iaas(#[from] IaasError),

    /// Record serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Record absent from the cache or the store
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Duplicate name, address in use, quota exceeded, resource still referenced
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Malformed CIDR, address, allocation pool or request shape
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Cross-tenant access
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Operation succeeded for some items only
    #[error("{message}; failed: {}", failed.join(","))]
    PartialFailure { message: String, failed: Vec<String> },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Coarse classification used by callers to map errors onto responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    BadRequest,
    Forbidden,
    Upstream,
    PartialFailure,
    Invalid,
}

impl ManagerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ManagerError::NotFound(_) => ErrorKind::NotFound,
            ManagerError::Store(e) if e.is_not_found() => ErrorKind::NotFound,
            ManagerError::Iaas(e) if e.is_not_found() => ErrorKind::NotFound,
            ManagerError::Iaas(IaasError::Conflict(_)) => ErrorKind::Conflict,
            ManagerError::Iaas(IaasError::InvalidRequest(_)) => ErrorKind::BadRequest,
            ManagerError::Store(_) | ManagerError::Iaas(_) | ManagerError::Serialization(_) => {
                ErrorKind::Upstream
            }
            ManagerError::Conflict(_) => ErrorKind::Conflict,
            ManagerError::BadRequest(_) => ErrorKind::BadRequest,
            ManagerError::Forbidden(_) => ErrorKind::Forbidden,
            ManagerError::PartialFailure { .. } => ErrorKind::PartialFailure,
            ManagerError::InvalidConfig(_) => ErrorKind::Invalid,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}
