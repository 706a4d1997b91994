//! IaasClientTrait for mocking
//!
//! This trait abstracts the IaaS backend so that OpenStack-style drivers, the
//! embedded provider and test doubles are interchangeable.

use crate::error::IaasError;
use crate::models::*;

/// Trait for IaaS network provider operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait IaasClientTrait: Send + Sync {
    /// Provider name, used in logs
    fn provider_name(&self) -> &str;

    /// Whether the provider loses its state when the process exits
    fn is_ephemeral(&self) -> bool {
        false
    }

    // Networks
    async fn create_network(&self, name: &str) -> Result<String, IaasError>;
    async fn create_provider_network(&self, request: &ProviderNetworkRequest) -> Result<String, IaasError>;
    async fn delete_network(&self, id: &str) -> Result<(), IaasError>;
    async fn get_network(&self, id: &str) -> Result<IaasNetwork, IaasError>;
    async fn get_network_extended_attrs(&self, id: &str) -> Result<NetworkExtendedAttrs, IaasError>;

    // Subnets
    async fn create_subnet(&self, request: &SubnetRequest) -> Result<IaasSubnet, IaasError>;
    async fn get_subnet(&self, id: &str) -> Result<IaasSubnet, IaasError>;
    async fn get_subnet_id(&self, network_id: &str) -> Result<String, IaasError>;

    // Ports
    async fn create_port(&self, request: &PortRequest) -> Result<IaasPort, IaasError>;
    /// Create several ports in one call. A failure part way through is reported as
    /// `IaasError::PartialBulk` carrying the ports that do exist and the error that
    /// stopped the batch; a batch that created nothing returns that error directly.
    async fn create_bulk_ports(&self, requests: &[PortRequest]) -> Result<Vec<IaasPort>, IaasError>;
    async fn delete_port(&self, id: &str) -> Result<(), IaasError>;
    async fn attach_port_to_vm(&self, vm_id: &str, port_id: &str) -> Result<(), IaasError>;
    async fn detach_port_from_vm(&self, vm_id: &str, port_id: &str) -> Result<(), IaasError>;
    async fn list_ports(&self, network_id: &str) -> Result<Vec<IaasPort>, IaasError>;
}
