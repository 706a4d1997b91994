//! IaaS provider errors

use crate::models::IaasPort;
use thiserror::Error;

/// Errors returned by an IaaS provider
#[derive(Debug, Error)]
pub enum IaasError {
    /// Provider rejected or failed the call
    #[error("IaaS API error: {0}")]
    Api(String),

    /// Network, subnet or port does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource is in use or the requested address is taken
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Malformed request (bad CIDR, address outside subnet, ...)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Provider temporarily unreachable
    #[error("IaaS provider unavailable: {0}")]
    Unavailable(String),

    /// Bulk creation stopped part way; `created` ports exist on the provider
    #[error("Bulk port creation failed after {} ports: {source}", created.len())]
    PartialBulk {
        created: Vec<IaasPort>,
        source: Box<IaasError>,
    },
}

impl IaasError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, IaasError::NotFound(_))
    }

    /// Whether repeating the same call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, IaasError::Api(_) | IaasError::Unavailable(_))
    }
}
