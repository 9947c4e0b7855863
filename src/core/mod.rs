//! Core building blocks shared by every layer of the client
//!
//! Error types and the structured logging helpers that report them.

pub mod error;
pub mod logging;

// Re-export commonly used items
pub use error::{McpError, McpResult};
pub use logging::{ErrorContext, ErrorLogLevel, ErrorLogger};
