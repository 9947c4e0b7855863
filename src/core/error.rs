// ! Error types for the MCP stream client
// !
// ! Module defines every error the client surfaces, from token acquisition
// ! through request correlation and stream transport failures.

use thiserror::Error;

use crate::protocol::types::ErrorObject;

/// The main error type for the MCP stream client
#[derive(Error, Debug, Clone)]
pub enum McpError {
    /// The identity provider could not produce a usable token, or the server
    /// rejected a freshly renewed one
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// No matching response arrived before the request deadline
    #[error("Request timeout: {0}")]
    RequestTimeout(String),

    /// The response envelope carried an error object
    #[error("Server error: {message}")]
    Server {
        /// JSON-RPC error code, when the server supplied one
        code: Option<i32>,
        /// Error message reported by the server
        message: String,
    },

    /// Network or stream failures
    #[error("Transport error: {0}")]
    Transport(String),

    /// A client operation was attempted while the session is not connected
    #[error("Not connected: {0}")]
    NotConnected(String),

    /// Non-success HTTP status that is not an authentication failure
    #[error("HTTP error: {0}")]
    Http(String),

    /// Protocol-level errors (malformed envelopes, missing results, etc.)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Session lifecycle errors (illegal state transitions)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Configuration validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// A pending request was dropped because its session went away
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(String),

    /// Internal errors that shouldn't normally occur
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        McpError::Serialization(err.to_string())
    }
}

impl From<url::ParseError> for McpError {
    fn from(err: url::ParseError) -> Self {
        McpError::Url(err.to_string())
    }
}

impl From<reqwest::Error> for McpError {
    fn from(err: reqwest::Error) -> Self {
        McpError::Transport(err.to_string())
    }
}

impl From<ErrorObject> for McpError {
    fn from(error: ErrorObject) -> Self {
        McpError::Server {
            code: error.code,
            message: error.message,
        }
    }
}

/// Result type alias for MCP operations
pub type McpResult<T> = Result<T, McpError>;

impl McpError {
    /// Create a new authentication error
    pub fn authentication<S: Into<String>>(message: S) -> Self {
        Self::Authentication(message.into())
    }

    /// Create a new request timeout error
    pub fn request_timeout<S: Into<String>>(message: S) -> Self {
        Self::RequestTimeout(message.into())
    }

    /// Create a new server error
    pub fn server<S: Into<String>>(code: Option<i32>, message: S) -> Self {
        Self::Server {
            code,
            message: message.into(),
        }
    }

    /// Create a new transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport(message.into())
    }

    /// Create a new not-connected error
    pub fn not_connected<S: Into<String>>(message: S) -> Self {
        Self::NotConnected(message.into())
    }

    /// Create a new protocol error
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol(message.into())
    }

    /// Create a new connection error
    pub fn connection<S: Into<String>>(message: S) -> Self {
        Self::Connection(message.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    /// Create a new cancellation error
    pub fn cancelled<S: Into<String>>(message: S) -> Self {
        Self::Cancelled(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Re-tag a token acquisition failure as an authentication error.
    ///
    /// Whatever the identity provider reports, a failure to obtain a token is
    /// surfaced to callers as [`McpError::Authentication`].
    pub fn into_authentication(self) -> Self {
        match self {
            McpError::Authentication(_) => self,
            other => McpError::Authentication(other.to_string()),
        }
    }

    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            McpError::Transport(_) => true,
            McpError::RequestTimeout(_) => true,
            McpError::Http(_) => true,
            McpError::Authentication(_) => false,
            McpError::Server { .. } => false,
            McpError::NotConnected(_) => false,
            McpError::Protocol(_) => false,
            McpError::Serialization(_) => false,
            McpError::Connection(_) => false,
            McpError::Validation(_) => false,
            McpError::Cancelled(_) => false,
            McpError::Url(_) => false,
            McpError::Internal(_) => false,
        }
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            McpError::Authentication(_) => "auth",
            McpError::RequestTimeout(_) => "timeout",
            McpError::Server { .. } => "server",
            McpError::Transport(_) => "transport",
            McpError::NotConnected(_) => "connection",
            McpError::Http(_) => "http",
            McpError::Protocol(_) => "protocol",
            McpError::Serialization(_) => "serialization",
            McpError::Connection(_) => "connection",
            McpError::Validation(_) => "validation",
            McpError::Cancelled(_) => "cancelled",
            McpError::Url(_) => "validation",
            McpError::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = McpError::request_timeout("request 17-abc exceeded 30s");
        assert_eq!(
            error.to_string(),
            "Request timeout: request 17-abc exceeded 30s"
        );

        let error = McpError::server(Some(-32602), "Tool not found: nope");
        assert_eq!(error.to_string(), "Server error: Tool not found: nope");
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(McpError::authentication("x").category(), "auth");
        assert_eq!(McpError::transport("x").category(), "transport");
        assert_eq!(McpError::not_connected("x").category(), "connection");
        assert_eq!(McpError::server(None, "x").category(), "server");
    }

    #[test]
    fn test_recoverability() {
        assert!(McpError::transport("reset").is_recoverable());
        assert!(McpError::request_timeout("slow").is_recoverable());
        assert!(!McpError::authentication("denied").is_recoverable());
        assert!(!McpError::cancelled("session closed").is_recoverable());
    }

    #[test]
    fn test_from_error_object() {
        let error: McpError = ErrorObject {
            code: Some(-32601),
            message: "Method not found: foo".to_string(),
            data: None,
        }
        .into();

        match error {
            McpError::Server { code, message } => {
                assert_eq!(code, Some(-32601));
                assert_eq!(message, "Method not found: foo");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_into_authentication() {
        let error = McpError::transport("identity endpoint unreachable").into_authentication();
        assert!(matches!(error, McpError::Authentication(ref m) if m.contains("unreachable")));

        let error = McpError::authentication("consent required").into_authentication();
        assert_eq!(error.to_string(), "Authentication error: consent required");
    }

    #[test]
    fn test_serde_error_conversion() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let error: McpError = err.into();
        assert!(matches!(error, McpError::Serialization(_)));
    }
}
