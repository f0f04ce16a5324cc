//! Operation results as returned to callers.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::state::ProvisioningState;
use crate::status::DomainStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionStep {
    Workspace,
    Dns,
    Nginx,
    Ssl,
    Remove,
}

impl ProvisionStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Workspace => "workspace",
            Self::Dns => "dns",
            Self::Nginx => "nginx",
            Self::Ssl => "ssl",
            Self::Remove => "remove",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct StepResult {
    pub step: ProvisionStep,
    pub success: bool,
    pub message: String,
}

impl StepResult {
    pub fn ok(step: ProvisionStep, message: impl Into<String>) -> Self {
        Self {
            step,
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(step: ProvisionStep, message: impl Into<String>) -> Self {
        Self {
            step,
            success: false,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct ProvisionReport {
    pub overall_success: bool,
    pub message: String,
    pub steps: Vec<StepResult>,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct SetupReport {
    pub success: bool,
    pub message: String,
    /// Names of the steps that succeeded, in order.
    pub steps_completed: Vec<String>,
    pub workspace_id: String,
    /// A workspace was created by this call.
    pub created: bool,
}

/// A status record joined with its workspace's name.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct DomainStatusView {
    pub workspace_id: String,
    pub workspace_name: String,
    pub domain: String,
    pub dns_verified: bool,
    pub nginx_configured: bool,
    pub ssl_active: bool,
    pub ssl_expiry: Option<DateTime<Utc>>,
    pub last_checked: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<ProvisioningState>,
}

impl DomainStatusView {
    pub fn from_status(status: &DomainStatus, workspace_name: &str) -> Self {
        Self {
            workspace_id: status.workspace_id.clone(),
            workspace_name: workspace_name.to_string(),
            domain: status.domain.to_string(),
            dns_verified: status.dns_verified,
            nginx_configured: status.nginx_configured,
            ssl_active: status.ssl_active,
            ssl_expiry: status.ssl_expiry,
            last_checked: Some(status.last_checked),
            error_message: status.error_message.clone(),
            state: None,
        }
    }

    pub fn with_state(mut self, state: ProvisioningState) -> Self {
        self.state = Some(state);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portico_common::domain::DomainName;

    #[test]
    fn step_result_wire_shape() {
        let json = serde_json::to_value(StepResult::failed(ProvisionStep::Ssl, "rate limited")).unwrap();
        assert_eq!(json["step"], "ssl");
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "rate limited");
    }

    #[test]
    fn list_view_omits_state() {
        let status = DomainStatus::new("ws-1", DomainName::parse("shop.example.com").unwrap());
        let view = DomainStatusView::from_status(&status, "Shop");
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["workspace_name"], "Shop");
        assert!(json.get("state").is_none());

        let json = serde_json::to_value(view.with_state(ProvisioningState::Unconfigured)).unwrap();
        assert_eq!(json["state"], "unconfigured");
    }
}
