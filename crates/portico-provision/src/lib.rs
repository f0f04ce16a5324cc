//! Portico Provision: the per-workspace domain provisioning controller.
//!
//! A custom domain moves through DNS verification, proxy configuration and
//! certificate issuance. Each step is gated on the previous one, recorded
//! in the [`StatusStore`], and serialized per workspace by a non-blocking
//! lock: a second caller gets [`ProvisionError::InProgress`] rather than
//! waiting.

mod controller;
mod error;
pub mod http;
mod lock;
pub mod renewal;
mod state;
mod status;
mod steps;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
mod workspace;

use portico_common::capability::{Capability, CapabilityStatus};

pub use controller::{ControllerParts, ProvisioningController};
pub use error::ProvisionError;
pub use lock::{LockTable, WorkspaceLock};
pub use renewal::{RenewalRuntime, RenewalSummary};
pub use state::ProvisioningState;
pub use status::{DomainStatus, StatusStore};
pub use steps::{DomainStatusView, ProvisionReport, ProvisionStep, SetupReport, StepResult};
pub use workspace::{slugify, DomainConfig, RegistryError, Workspace, WorkspaceRegistry};

impl Capability for ProvisioningController {
    fn name(&self) -> &str {
        "domains"
    }

    fn status(&self) -> CapabilityStatus {
        let workspaces = self.workspace_registry().try_count();
        let statuses = self.status_store().try_list();
        let summary = match (workspaces, statuses) {
            (Some(workspaces), Some(statuses)) => {
                let tls = statuses.iter().filter(|s| s.ssl_active).count();
                let errors = statuses.iter().filter(|s| s.error_message.is_some()).count();
                format!(
                    "{workspaces} workspaces, {} custom domains ({tls} with TLS, {errors} with errors)",
                    statuses.len()
                )
            }
            _ => "busy".to_string(),
        };
        // Per-domain failures are reported per workspace, not as ill health.
        CapabilityStatus::new(self.name(), summary, true)
    }
}
