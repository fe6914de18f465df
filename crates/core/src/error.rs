//! Error types for the Foreman domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each collaborator has its own error type; the orchestration decides
//! which of them recover and which reach the caller.

use thiserror::Error;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

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

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool not configured: {0}")]
    NotConfigured(String),
}

/// Failures talking to the remote tool gateway.
///
/// These never reach the caller of an invocation; the acquirer turns them
/// into a degraded status and the reason ends up in the logs.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Connection to {endpoint} failed: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("Request signing failed: {0}")]
    Signing(String),

    #[error("Gateway {operation} timed out after {timeout_secs}s")]
    Timeout { operation: String, timeout_secs: u64 },

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Failures fetching the fallback context snapshot.
#[derive(Debug, Clone, Error)]
pub enum ContextError {
    #[error("Context request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Context service returned HTTP {status_code}")]
    Status { status_code: u16 },

    #[error("Context body is not valid JSON: {0}")]
    Body(String),

    #[error("Context service unreachable: {0}")]
    Network(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        };
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn gateway_error_displays_endpoint() {
        let err = GatewayError::Connect {
            endpoint: "https://gw.example/mcp".into(),
            reason: "connection refused".into(),
        };
        assert!(err.to_string().contains("gw.example"));
        assert!(err.to_string().contains("refused"));
    }

    #[test]
    fn context_timeout_mentions_duration() {
        let err = ContextError::Timeout { timeout_secs: 5 };
        assert_eq!(err.to_string(), "Context request timed out after 5s");
    }
}
