//! Exceptional port marker
//!
//! Written when an attach, detach or delete against the IaaS backend could not be
//! confirmed after retries, so the port can be reconciled later.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortOperation {
    Attach,
    Detach,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionalPort {
    pub port_id: String,
    /// VM the port was being attached to or detached from
    #[serde(default)]
    pub vm_id: String,
    pub operation: PortOperation,
    pub tenant_id: String,
    #[serde(default)]
    pub network_id: String,
    #[serde(default)]
    pub reason: String,
    pub create_time: DateTime<Utc>,
}
