// ! Structured logging for the MCP stream client
// !
// ! Module provides structured error logging with categorization and
// ! session context, plus reconnect bookkeeping for the event stream.

use serde_json::{Value, json};
use std::collections::HashMap;
use tracing::{error, info, warn};

use crate::core::error::McpError;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorLogLevel {
    /// Critical errors that require immediate attention
    Critical,
    /// Errors that affect functionality but system can continue
    Error,
    /// Warnings about potential issues
    Warning,
    /// Informational error context
    Info,
}

impl From<&McpError> for ErrorLogLevel {
    fn from(error: &McpError) -> Self {
        match error {
            McpError::Internal(_) => ErrorLogLevel::Critical,

            McpError::Authentication(_)
            | McpError::Protocol(_)
            | McpError::Serialization(_)
            | McpError::Server { .. } => ErrorLogLevel::Error,

            // Recoverable
            McpError::Transport(_)
            | McpError::Http(_)
            | McpError::RequestTimeout(_)
            | McpError::Connection(_) => ErrorLogLevel::Warning,

            McpError::NotConnected(_)
            | McpError::Validation(_)
            | McpError::Url(_)
            | McpError::Cancelled(_) => ErrorLogLevel::Info,
        }
    }
}

/// Extended error context for logging
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// Operation being performed when error occurred
    pub operation: String,
    /// Channel the error came from (command, stream)
    pub transport: Option<String>,
    /// Request method if applicable
    pub method: Option<String>,
    /// Request id if applicable
    pub request_id: Option<String>,
    /// Server-assigned session id
    pub session_id: Option<String>,
    /// Additional context data
    pub extra: HashMap<String, Value>,
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self {
            operation: "unknown".to_string(),
            transport: None,
            method: None,
            request_id: None,
            session_id: None,
            extra: HashMap::new(),
        }
    }
}

impl ErrorContext {
    /// Create a new error context
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            ..Default::default()
        }
    }

    /// Set the channel name
    pub fn with_transport(mut self, transport: impl Into<String>) -> Self {
        self.transport = Some(transport.into());
        self
    }

    /// Set method name
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Set request id
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Set session ID
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Add extra context data
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Structured error logger
pub struct ErrorLogger;

impl ErrorLogger {
    /// Log an error with full context
    pub fn log_error(error: &McpError, context: ErrorContext) {
        let category = error.category();
        let recoverable = error.is_recoverable();

        let log_data = json!({
            "error_category": category,
            "error_recoverable": recoverable,
            "error_message": error.to_string(),
            "operation": context.operation,
            "transport": context.transport,
            "method": context.method,
            "request_id": context.request_id,
            "session_id": context.session_id,
            "extra_context": context.extra,
        });
        let details = serde_json::to_string(&log_data).unwrap_or_default();

        match ErrorLogLevel::from(error) {
            ErrorLogLevel::Critical => {
                error!(
                    target: "mcp_errors",
                    error_category = category,
                    error_recoverable = recoverable,
                    operation = context.operation.as_str(),
                    "CRITICAL MCP Error: {} - {}",
                    error,
                    details
                );
            }
            ErrorLogLevel::Error => {
                error!(
                    target: "mcp_errors",
                    error_category = category,
                    error_recoverable = recoverable,
                    operation = context.operation.as_str(),
                    "MCP Error: {} - {}",
                    error,
                    details
                );
            }
            ErrorLogLevel::Warning => {
                warn!(
                    target: "mcp_errors",
                    error_category = category,
                    error_recoverable = recoverable,
                    operation = context.operation.as_str(),
                    "MCP Warning: {} - {}",
                    error,
                    details
                );
            }
            ErrorLogLevel::Info => {
                info!(
                    target: "mcp_errors",
                    error_category = category,
                    error_recoverable = recoverable,
                    operation = context.operation.as_str(),
                    "MCP Info: {} - {}",
                    error,
                    details
                );
            }
        }
    }

    /// Log a failed stream reconnect attempt.
    ///
    /// `max_attempts` is `None` when the stream reconnects indefinitely.
    pub fn log_reconnect_attempt(
        error: &McpError,
        attempt: u32,
        max_attempts: Option<u32>,
        context: ErrorContext,
    ) {
        let will_retry = max_attempts.is_none_or(|max| attempt < max);
        let log_data = json!({
            "error_category": error.category(),
            "error_message": error.to_string(),
            "reconnect_attempt": attempt,
            "max_attempts": max_attempts,
            "will_retry_again": will_retry,
            "operation": context.operation,
            "session_id": context.session_id,
            "extra_context": context.extra,
        });
        let details = serde_json::to_string(&log_data).unwrap_or_default();

        if will_retry {
            warn!(
                target: "mcp_reconnects",
                reconnect_attempt = attempt,
                operation = context.operation.as_str(),
                "Stream reconnect attempt {} failed: {} - {}",
                attempt,
                error,
                details
            );
        } else {
            error!(
                target: "mcp_reconnects",
                reconnect_attempt = attempt,
                operation = context.operation.as_str(),
                "Stream reconnect gave up after {} attempts: {} - {}",
                attempt,
                error,
                details
            );
        }
    }

    /// Log a stream that came back after one or more failed attempts
    pub fn log_reconnect_success(attempts: u32, context: ErrorContext) {
        info!(
            target: "mcp_reconnects",
            total_attempts = attempts,
            operation = context.operation.as_str(),
            session_id = context.session_id.as_deref(),
            "Event stream re-established after {} attempt(s)",
            attempts
        );
    }
}

impl McpError {
    /// Log this error with structured context
    pub fn log_with_context(&self, context: ErrorContext) {
        ErrorLogger::log_error(self, context);
    }
}

/// Install a `fmt` subscriber driven by `RUST_LOG`, defaulting to `info`.
///
/// Safe to call more than once; later calls are no-ops.
#[cfg(feature = "tracing-subscriber")]
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::McpError;

    #[test]
    fn test_error_log_levels() {
        assert_eq!(
            ErrorLogLevel::from(&McpError::internal("test")),
            ErrorLogLevel::Critical
        );
        assert_eq!(
            ErrorLogLevel::from(&McpError::authentication("test")),
            ErrorLogLevel::Error
        );
        assert_eq!(
            ErrorLogLevel::from(&McpError::request_timeout("test")),
            ErrorLogLevel::Warning
        );
        assert_eq!(
            ErrorLogLevel::from(&McpError::not_connected("test")),
            ErrorLogLevel::Info
        );
    }

    #[test]
    fn test_error_context_builder() {
        let context = ErrorContext::new("send_request")
            .with_transport("command")
            .with_method("tools/call")
            .with_request_id("1718000000000-abc123xyz")
            .with_session_id("s1")
            .with_extra("attempt", json!(2));

        assert_eq!(context.operation, "send_request");
        assert_eq!(context.transport, Some("command".to_string()));
        assert_eq!(context.method, Some("tools/call".to_string()));
        assert_eq!(
            context.request_id,
            Some("1718000000000-abc123xyz".to_string())
        );
        assert_eq!(context.session_id, Some("s1".to_string()));
        assert_eq!(context.extra.get("attempt"), Some(&json!(2)));
    }

    #[test]
    fn test_error_logging() {
        let error = McpError::transport("stream closed");
        let context = ErrorContext::new("stream").with_transport("sse");

        // Only checks that logging doesn't panic
        ErrorLogger::log_error(&error, context.clone());
        error.log_with_context(context);
    }

    #[test]
    fn test_reconnect_logging() {
        let error = McpError::transport("connection refused");
        let context = ErrorContext::new("reconnect").with_session_id("s1");

        ErrorLogger::log_reconnect_attempt(&error, 1, None, context.clone());
        ErrorLogger::log_reconnect_attempt(&error, 3, Some(3), context.clone());
        ErrorLogger::log_reconnect_success(2, context);
    }
}
