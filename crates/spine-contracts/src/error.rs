//! The semantic error taxonomy from spec.md §7. This is not a type name
//! hierarchy — every layer's own error enum carries one of these as its
//! `category()`, and the REST layer maps categories to HTTP status.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    /// Malformed input, unknown enum, missing required field.
    Validation,
    /// Referenced execution/schedule/workflow/source absent.
    NotFound,
    /// Unique-constraint breach, idempotency mismatch.
    Conflict,
    /// Could not acquire a concurrency lock.
    LockContention,
    /// Step or workflow exceeded its deadline.
    Timeout,
    /// Quality-gate failure emitted from a step.
    DataQuality,
    /// Underlying storage or external runtime unreachable.
    RuntimeUnavailable,
    /// Unclassified exception from user code or framework.
    Internal,
}

impl ErrorCategory {
    /// HTTP status per spec.md §7's propagation policy.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorCategory::Validation => 400,
            ErrorCategory::NotFound => 404,
            ErrorCategory::Conflict => 409,
            ErrorCategory::LockContention => 409,
            ErrorCategory::Timeout => 504,
            ErrorCategory::DataQuality => 422,
            ErrorCategory::RuntimeUnavailable => 503,
            ErrorCategory::Internal => 500,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            ErrorCategory::Validation => "VALIDATION",
            ErrorCategory::NotFound => "NOT_FOUND",
            ErrorCategory::Conflict => "CONFLICT",
            ErrorCategory::LockContention => "LOCK_CONTENTION",
            ErrorCategory::Timeout => "TIMEOUT",
            ErrorCategory::DataQuality => "DATA_QUALITY",
            ErrorCategory::RuntimeUnavailable => "RUNTIME_UNAVAILABLE",
            ErrorCategory::Internal => "INTERNAL",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_matches_spec() {
        assert_eq!(ErrorCategory::Validation.http_status(), 400);
        assert_eq!(ErrorCategory::NotFound.http_status(), 404);
        assert_eq!(ErrorCategory::Conflict.http_status(), 409);
        assert_eq!(ErrorCategory::LockContention.http_status(), 409);
        assert_eq!(ErrorCategory::Timeout.http_status(), 504);
        assert_eq!(ErrorCategory::Internal.http_status(), 500);
    }
}
