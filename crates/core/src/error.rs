//! Error types for the Clawsmith domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Clawsmith operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Permission errors ---
    #[error("Permission error: {0}")]
    Permission(#[from] PermissionError),

    // --- Session storage errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error(transparent)]
    Permission(#[from] PermissionError),
}

/// Policy denial and user rejection are reported distinctly: a `Denied`
/// result is a deterministic policy decision, a `Rejected` result is the
/// user declining an interactive prompt.
#[derive(Debug, Clone, Error)]
pub enum PermissionError {
    #[error("Permission '{permission}' denied for '{pattern}'")]
    Denied { permission: String, pattern: String },

    #[error("User rejected permission '{permission}' for '{pattern}'")]
    Rejected { permission: String, pattern: String },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Session not found: {0}")]
    NotFound(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn permission_denied_and_rejected_are_distinct() {
        let denied = PermissionError::Denied {
            permission: "bash".into(),
            pattern: "rm -rf /".into(),
        };
        let rejected = PermissionError::Rejected {
            permission: "bash".into(),
            pattern: "rm -rf /".into(),
        };
        assert!(denied.to_string().contains("denied"));
        assert!(rejected.to_string().contains("rejected"));
    }

    #[test]
    fn tool_error_wraps_permission() {
        let err: ToolError = PermissionError::Denied {
            permission: "edit".into(),
            pattern: "/etc/passwd".into(),
        }
        .into();
        assert!(matches!(err, ToolError::Permission(_)));
    }
}
