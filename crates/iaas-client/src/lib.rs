//! IaaS Network Provider Interface
//!
//! The capability surface the network manager consumes from its IaaS backend:
//! networks (plain and provider-typed), subnets, ports, bulk port creation, and
//! attaching ports to VMs. The manager is written against [`IaasClientTrait`] only.
//!
//! # Example
//!
//! ```no_run
//! use iaas_client::{EmbeddedIaasClient, IaasClientTrait, PortRequest, SubnetRequest};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let iaas = EmbeddedIaasClient::new();
//!
//! let network_id = iaas.create_network("tenant-a-net").await?;
//! let subnet = iaas.create_subnet(&SubnetRequest {
//!     network_id: network_id.clone(),
//!     name: "tenant-a-subnet".to_string(),
//!     cidr: "10.0.0.0/24".to_string(),
//!     gateway_ip: "10.0.0.1".to_string(),
//!     allocation_pools: vec![],
//!     tenant_id: "tenant-a".to_string(),
//! }).await?;
//!
//! let port = iaas.create_port(&PortRequest::new("eth0", &network_id, &subnet.id, "tenant-a")).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Providers
//!
//! - **Embedded**: [`EmbeddedIaasClient`], an in-process no-auth provider that keeps
//!   its state in memory. With the `test-util` feature it can inject failures and
//!   count calls per operation.

pub mod embedded;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod iaas_trait;

pub use embedded::{EmbeddedIaasClient, IaasOp};
pub use error::IaasError;
pub use iaas_trait::IaasClientTrait;
pub use models::*;
