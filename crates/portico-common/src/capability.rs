//! Component health lines for `GET /v1/status`.

use serde::Serialize;

/// One entry in the daemon status: the component, what it is doing right
/// now, and whether an operator should look at it.
#[derive(Debug, Clone, Serialize)]
pub struct CapabilityStatus {
    pub name: String,
    pub summary: String,
    pub healthy: bool,
}

impl CapabilityStatus {
    pub fn new(name: impl Into<String>, summary: impl Into<String>, healthy: bool) -> Self {
        Self {
            name: name.into(),
            summary: summary.into(),
            healthy,
        }
    }
}

/// A long-lived component the status endpoint reports on.
///
/// `status` is called from a request handler and must not wait on locks;
/// report a placeholder summary when state is contended.
pub trait Capability: Send + Sync {
    fn name(&self) -> &str;
    fn status(&self) -> CapabilityStatus;
}
