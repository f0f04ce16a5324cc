//! Provisioning error types.

use portico_common::domain::DomainError;
use portico_common::error::ErrorCode;

use crate::workspace::RegistryError;

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("invalid domain: {0}")]
    InvalidDomain(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("workspace not found: {0}")]
    WorkspaceNotFound(String),

    #[error("workspace {0} uses a platform subdomain, not a custom domain")]
    NoCustomDomain(String),

    #[error("{domain} is already attached to workspace {workspace_id}")]
    DomainTaken { domain: String, workspace_id: String },

    #[error("{0}")]
    PreconditionFailed(String),

    #[error("provisioning already in progress for workspace {0}")]
    InProgress(String),

    #[error("existing configuration could not be removed: {0}")]
    TeardownFailed(String),

    #[error("status store error: {0}")]
    Store(String),
}

impl From<DomainError> for ProvisionError {
    fn from(e: DomainError) -> Self {
        Self::InvalidDomain(e.to_string())
    }
}

impl From<std::io::Error> for ProvisionError {
    fn from(e: std::io::Error) -> Self {
        Self::Store(e.to_string())
    }
}

impl From<RegistryError> for ProvisionError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::HostnameTaken {
                hostname,
                workspace_id,
            } => Self::DomainTaken {
                domain: hostname,
                workspace_id,
            },
            RegistryError::Io(e) => e.into(),
        }
    }
}

impl From<&ProvisionError> for ErrorCode {
    fn from(e: &ProvisionError) -> Self {
        match e {
            ProvisionError::InvalidDomain(_) => ErrorCode::InvalidDomain,
            ProvisionError::InvalidRequest(_) => ErrorCode::InvalidPayload,
            ProvisionError::WorkspaceNotFound(_) => ErrorCode::NotFound,
            ProvisionError::NoCustomDomain(_) => ErrorCode::NotCustomDomain,
            ProvisionError::DomainTaken { .. } => ErrorCode::Conflict,
            ProvisionError::PreconditionFailed(_) => ErrorCode::PreconditionFailed,
            ProvisionError::InProgress(_) => ErrorCode::InProgress,
            ProvisionError::TeardownFailed(_) => ErrorCode::Internal,
            ProvisionError::Store(_) => ErrorCode::IoError,
        }
    }
}
