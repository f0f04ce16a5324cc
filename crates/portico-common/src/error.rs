use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Machine-readable error codes for the wire protocol.
/// Shared by every domain router.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidPayload,
    InvalidDomain,
    NotFound,
    Conflict,
    InProgress,
    PreconditionFailed,
    NotCustomDomain,
    IoError,
    Internal,
}

impl ErrorCode {
    /// Suggested HTTP status code for this error.
    /// Transport-agnostic (returns u16, not an axum type).
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidPayload | Self::InvalidDomain | Self::NotCustomDomain => 400,
            Self::NotFound => 404,
            Self::Conflict | Self::InProgress => 409,
            Self::PreconditionFailed => 412,
            Self::IoError | Self::Internal => 500,
        }
    }
}
