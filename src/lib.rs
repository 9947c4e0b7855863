// Copyright (c) 2025 MCP Rust Contributors
// SPDX-License-Identifier: MIT

//! # MCP Stream Client
//!
//! A client for Model Context Protocol servers that split a session across
//! two HTTP channels: commands are POSTed to `/mcp/command`, and responses
//! and notifications are pushed back over a server-sent event stream at
//! `/mcp/stream`. A reply can arrive on either channel; the client
//! correlates both paths by request id.
//!
//! ## Features
//!
//! - **Bearer auth**: tokens come from a pluggable [`auth::AuthProvider`] and
//!   are renewed once on a 401 from either channel
//! - **Session lifecycle**: `Disconnected → Authenticating → Initializing →
//!   Connected`, observable through a watch channel
//! - **Reconnecting stream**: the event stream is reopened after a fixed
//!   delay until it succeeds or the attempt cap is reached
//! - **Typed operations**: tools, resources, and prompts
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mcp_stream_client::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> McpResult<()> {
//!     let connection = ConnectionConfig::new("https://mcp.example.com", "client-id", "tenant-id")?;
//!     let client = McpClientBuilder::new(connection)
//!         .with_auth_provider(StaticTokenProvider::new("token"))
//!         .build()
//!         .await?;
//!
//!     client.connect().await?;
//!     let result = client
//!         .call_tool("analyze_code", json!({"code": "fn main() {}", "language": "rust"}))
//!         .await?;
//!     println!("{result}");
//!     client.disconnect().await
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`auth`]: token acquisition and caching
//! - [`client`]: the client façade, session state, and request correlation
//! - [`core`]: errors and structured logging
//! - [`protocol`]: JSON-RPC message types and method names
//! - [`transport`]: the command channel and the event stream

pub mod auth;
pub mod client;
pub mod core;
pub mod protocol;
pub mod transport;

// Re-export commonly used types for convenience
pub use core::error::{McpError, McpResult};
pub use protocol::types::*;

/// Prelude module for convenient imports
///
/// Use `use mcp_stream_client::prelude::*;` to import everything you need.
pub mod prelude {
    // Core types
    pub use crate::core::error::{McpError, McpResult};
    #[cfg(feature = "tracing-subscriber")]
    pub use crate::core::logging::init_tracing;

    // Protocol types
    pub use crate::protocol::types::*;

    // Authentication
    pub use crate::auth::{
        AccessToken, AuthProvider, CachedTokenProvider, StaticTokenProvider, TokenRequest,
    };

    // Client
    pub use crate::client::{
        CallbackNotificationHandler, ClientConfig, ConnectionConfig, McpClient, McpClientBuilder,
        NotificationHandler, SessionState,
    };

    // Essential external types
    pub use async_trait::async_trait;
    pub use serde_json::{Value, json};
    pub use std::collections::HashMap;
}
