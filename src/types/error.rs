//! Error types for Covenant
//!
//! Every variant maps to an HTTP status and a stable machine-readable code.
//! Dependent world services branch on `code()`, never on the display text.

use hyper::StatusCode;
use serde::Serialize;

use crate::db::StoreError;

/// What the caller should do after a binding violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NextAction {
    /// The reported mutation does not match the authorized intent.
    MarkIllegal,
    /// The permit lapsed; request a new one and redo the mutation under it.
    ReissuePermit,
}

/// Main error type for Covenant operations
#[derive(Debug, thiserror::Error)]
pub enum CovenantError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("World is required")]
    MissingWorld,

    #[error("World is not allowed: {0}")]
    InvalidWorld(String),

    #[error("World is closed: {0}")]
    WorldClosed(String),

    #[error("Request tenant does not match subject tenant")]
    TenantMismatch,

    #[error("Subject world does not match request world")]
    SubjectWorldMismatch,

    #[error("Command key reused for a different request")]
    IdempotencyConflict,

    #[error("Permit not found: {0}")]
    PermitNotFound(String),

    #[error("Permit was issued for a different world")]
    PermitWorldMismatch,

    #[error("Snapshot hash does not match the permit")]
    BindingMismatch,

    #[error("Permit expired before confirmation")]
    StaleVersion,

    #[error("Permit already confirmed by a different world mutation")]
    ConfirmConflict,

    #[error("tenant_id and world_id are required")]
    MissingQuery,

    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("Invalid token")]
    InvalidToken,

    #[error("Refresh token is required")]
    MissingRefresh,

    #[error("Invalid refresh token")]
    InvalidRefresh,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Tenant not found")]
    TenantNotFound,

    #[error("User already registered")]
    UserConflict,

    #[error("Registration is closed for this tenant")]
    RegistrationClosed,

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unsupported response type")]
    UnsupportedResponseType,

    #[error("Unsupported grant type")]
    UnsupportedGrantType,

    #[error("Invalid client")]
    InvalidClient,

    #[error("Invalid grant")]
    InvalidGrant,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CovenantError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_)
            | Self::MissingWorld
            | Self::InvalidWorld(_)
            | Self::MissingQuery
            | Self::InvalidCursor(_)
            | Self::UnsupportedResponseType
            | Self::UnsupportedGrantType
            | Self::InvalidClient
            | Self::InvalidGrant
            | Self::Http(_) => StatusCode::BAD_REQUEST,
            Self::WorldClosed(_) => StatusCode::GONE,
            Self::TenantMismatch | Self::SubjectWorldMismatch => StatusCode::UNPROCESSABLE_ENTITY,
            Self::IdempotencyConflict
            | Self::PermitWorldMismatch
            | Self::BindingMismatch
            | Self::StaleVersion
            | Self::ConfirmConflict
            | Self::UserConflict => StatusCode::CONFLICT,
            Self::PermitNotFound(_) | Self::TenantNotFound | Self::NotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::InvalidToken
            | Self::MissingRefresh
            | Self::InvalidRefresh
            | Self::InvalidCredentials
            | Self::AccessDenied(_) => StatusCode::UNAUTHORIZED,
            Self::RegistrationClosed => StatusCode::FORBIDDEN,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) | Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) | Self::Http(_) => "invalid_request",
            Self::MissingWorld => "missing_world",
            Self::InvalidWorld(_) => "invalid_world",
            Self::WorldClosed(_) => "world_closed",
            Self::TenantMismatch => "tenant_mismatch",
            Self::SubjectWorldMismatch | Self::PermitWorldMismatch => "world_mismatch",
            Self::IdempotencyConflict => "idempotency_conflict",
            Self::PermitNotFound(_) => "permit_not_found",
            Self::BindingMismatch => "BINDING_MISMATCH",
            Self::StaleVersion => "STALE_VERSION",
            Self::ConfirmConflict => "confirm_conflict",
            Self::MissingQuery => "missing_query",
            Self::InvalidCursor(_) => "invalid_cursor",
            Self::InvalidToken => "invalid_token",
            Self::MissingRefresh => "missing_refresh",
            Self::InvalidRefresh => "invalid_refresh",
            Self::InvalidCredentials => "invalid_credentials",
            Self::TenantNotFound => "tenant_not_found",
            Self::UserConflict => "user_conflict",
            Self::RegistrationClosed => "registration_closed",
            Self::AccessDenied(_) => "access_denied",
            Self::UnsupportedResponseType => "unsupported_response_type",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::InvalidClient => "invalid_client",
            Self::InvalidGrant => "invalid_grant",
            Self::NotFound(_) => "not_found",
            Self::PayloadTooLarge(_) => "payload_too_large",
            Self::Database(_) => "database_unavailable",
            Self::Internal(_) | Self::Config(_) => "internal_error",
        }
    }

    /// Secondary code for protocol rejections
    pub fn subcode(&self) -> Option<&'static str> {
        match self {
            Self::WorldClosed(_) => Some("WORLD_CLOSED"),
            Self::BindingMismatch => Some("BINDING_MISMATCH"),
            Self::StaleVersion => Some("STALE_VERSION"),
            _ => None,
        }
    }

    /// Recovery hint for binding violations
    pub fn next_action(&self) -> Option<NextAction> {
        match self {
            Self::BindingMismatch => Some(NextAction::MarkIllegal),
            Self::StaleVersion => Some(NextAction::ReissuePermit),
            _ => None,
        }
    }

    /// Whether a caller may retry the exact same request.
    ///
    /// Only storage failures qualify; every write path is idempotent.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(_))
    }

    /// Human-readable detail safe to expose to callers
    fn description(&self) -> Option<String> {
        match self {
            Self::InvalidRequest(msg) | Self::Http(msg) | Self::AccessDenied(msg) => {
                Some(msg.clone())
            }
            Self::InvalidCursor(cursor) => Some(format!("unparseable cursor '{}'", cursor)),
            _ => None,
        }
    }

    /// Build the JSON error envelope
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error: self.code(),
            error_subcode: self.subcode(),
            next_action: self.next_action(),
            error_description: self.description(),
        }
    }

    /// Convert to status code and body tuple for HTTP response
    pub fn into_status_code_and_body(self) -> (StatusCode, ErrorBody) {
        (self.status_code(), self.to_body())
    }
}

/// Error envelope returned on every failed request
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_subcode: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_action: Option<NextAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

// Implement From conversions for common error types

impl From<StoreError> for CovenantError {
    fn from(err: StoreError) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<std::io::Error> for CovenantError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for CovenantError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidRequest(format!("JSON error: {}", err))
    }
}

impl From<hyper::Error> for CovenantError {
    fn from(err: hyper::Error) -> Self {
        Self::Internal(format!("HTTP error: {}", err))
    }
}

/// Result type alias for Covenant operations
pub type Result<T> = std::result::Result<T, CovenantError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_closed_envelope() {
        let err = CovenantError::WorldClosed("social".into());
        assert_eq!(err.status_code(), StatusCode::GONE);

        let body = serde_json::to_value(err.to_body()).unwrap();
        assert_eq!(body["error"], "world_closed");
        assert_eq!(body["error_subcode"], "WORLD_CLOSED");
        assert!(body.get("next_action").is_none());
    }

    #[test]
    fn test_binding_violations_carry_next_action() {
        let body = serde_json::to_value(CovenantError::BindingMismatch.to_body()).unwrap();
        assert_eq!(body["error"], "BINDING_MISMATCH");
        assert_eq!(body["next_action"], "MARK_ILLEGAL");

        let body = serde_json::to_value(CovenantError::StaleVersion.to_body()).unwrap();
        assert_eq!(body["error"], "STALE_VERSION");
        assert_eq!(body["next_action"], "REISSUE_PERMIT");
    }

    #[test]
    fn test_world_mismatch_status_depends_on_stage() {
        assert_eq!(
            CovenantError::SubjectWorldMismatch.status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            CovenantError::PermitWorldMismatch.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(CovenantError::SubjectWorldMismatch.code(), "world_mismatch");
    }

    #[test]
    fn test_only_storage_errors_are_retryable() {
        assert!(CovenantError::Database("timeout".into()).is_retryable());
        assert!(!CovenantError::IdempotencyConflict.is_retryable());
        assert!(!CovenantError::StaleVersion.is_retryable());
    }
}
