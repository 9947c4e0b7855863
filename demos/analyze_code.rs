// Copyright (c) 2025 MCP Rust Contributors
// SPDX-License-Identifier: MIT

// ! Analyze a snippet with a remote MCP server
// !
// ! Reads the server location from `MCP_API_BASE_URL`, `MCP_CLIENT_ID` and
// ! `MCP_TENANT_ID`, and a bearer token from `MCP_ACCESS_TOKEN`.
// !
// ! Run with: cargo run --example analyze_code

use mcp_stream_client::prelude::*;
use std::time::Duration;

#[tokio::main]
async fn main() -> McpResult<()> {
    init_tracing();

    let connection = ConnectionConfig::from_env()?;
    let token = std::env::var("MCP_ACCESS_TOKEN")
        .map_err(|_| McpError::validation("MCP_ACCESS_TOKEN is not set"))?;

    let client = McpClientBuilder::new(connection)
        .with_auth_provider(CachedTokenProvider::new(StaticTokenProvider::new(token)))
        .with_client_info("analyze-code-demo", env!("CARGO_PKG_VERSION"))
        .with_request_timeout(Duration::from_secs(60))
        .with_notification_handler(CallbackNotificationHandler::new(|notification| {
            println!("notification: {}", notification.method);
        }))
        .build()
        .await?;

    let init = client.connect().await?;
    if let Some(server) = &init.server_info {
        println!("Connected to {} {}", server.name, server.version);
    }

    for tool in client.list_tools().await? {
        println!(
            "  - {}: {}",
            tool.name,
            tool.description.as_deref().unwrap_or("")
        );
    }

    let result = client
        .call_tool(
            "analyze_code",
            json!({
                "code": "def add(a, b):\n    return a + b\n",
                "language": "python"
            }),
        )
        .await;

    match result {
        Ok(analysis) => println!("{}", serde_json::to_string_pretty(&analysis)?),
        Err(e) => eprintln!("analyze_code failed: {e}"),
    }

    client.disconnect().await
}
