//! MCP client implementation
//!
//! This module provides the streamed-session client: lifecycle state,
//! request correlation across both channels, and the builder.

pub mod builder;
pub mod correlator;
pub mod mcp_client;
pub mod session;

// Re-export the main client type and builder
pub use builder::{ConnectionConfig, McpClientBuilder};
pub use correlator::{
    DEFAULT_REQUEST_TIMEOUT, PendingResponse, RequestCorrelator, generate_request_id,
};
pub use mcp_client::{ClientConfig, McpClient};
pub use session::{
    CallbackNotificationHandler, ClientSession, LoggingNotificationHandler, NotificationHandler,
    Session, SessionState,
};
