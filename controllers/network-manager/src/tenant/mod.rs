//! Tenant records, network quota and tenant cancellation.

mod cancellation;
mod quota;


pub use cancellation::CancellationSupervisor;
pub use quota::{TenantGuard, TenantService};
