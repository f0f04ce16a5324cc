use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ErrorCode;

/// Standard error body for API responses.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorCode,
    pub message: String,
}

pub fn error_body(code: ErrorCode, message: impl Into<String>) -> ErrorBody {
    ErrorBody {
        error: code,
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_serializes_code_and_message() {
        let body = error_body(ErrorCode::InProgress, "operation already in progress");
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["error"], "in_progress");
        assert_eq!(json["message"], "operation already in progress");
    }
}
