// Copyright (c) 2025 MCP Rust Contributors
// SPDX-License-Identifier: MIT

// ! Shared fixtures for the integration tests
// !
// ! A wiremock server standing in for an MCP server: the command endpoint
// ! answers by method and echoes the request id, and the stream endpoint
// ! emits `connected` followed by any replies the command endpoint deferred.

#![allow(dead_code)]

use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use mcp_stream_client::client::{ConnectionConfig, McpClient, McpClientBuilder};
use mcp_stream_client::auth::StaticTokenProvider;

/// How `tools/call` and friends are answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyMode {
    /// Full envelope in the POST body
    Direct,
    /// 202, envelope delivered on the next stream connection
    Deferred,
    /// 202, envelope never delivered
    Dropped,
}

pub struct CommandResponder {
    mode: ReplyMode,
    deferred: Arc<Mutex<Vec<Value>>>,
}

impl CommandResponder {
    fn result_for(method: &str, params: &Value) -> Result<Value, Value> {
        match method {
            "initialize" => Ok(json!({
                "protocolVersion": "1.0",
                "capabilities": {"tools": {}, "resources": {}},
                "serverInfo": {"name": "mock-mcp", "version": "0.3.0"}
            })),
            "tools/list" => Ok(json!({
                "tools": [{
                    "name": "analyze_code",
                    "description": "Analyze code for issues",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "code": {"type": "string"},
                            "language": {"type": "string"}
                        }
                    }
                }]
            })),
            "tools/call" => match params["name"].as_str() {
                Some("analyze_code") => Ok(json!({
                    "toolResult": {
                        "language": params["arguments"]["language"],
                        "issues": []
                    }
                })),
                other => Err(json!({
                    "code": -32601,
                    "message": format!("Tool not found: {}", other.unwrap_or_default())
                })),
            },
            "resources/list" => Ok(json!({
                "resources": [{
                    "uri": "repo://readme",
                    "name": "README",
                    "mimeType": "text/markdown",
                    "type": "file"
                }]
            })),
            "resources/read" => Ok(json!({
                "contents": [{
                    "uri": params["uri"],
                    "mimeType": "text/markdown",
                    "text": "# Hello"
                }]
            })),
            "prompts/list" => Ok(json!({"prompts": [{"name": "review", "arguments": []}]})),
            "prompts/get" => Ok(json!({"messages": [{"role": "user", "text": "review"}]})),
            other => Err(json!({"code": -32601, "message": format!("Method not found: {other}")})),
        }
    }
}

impl Respond for CommandResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
        let id = body["id"].clone();
        let method = body["method"].as_str().unwrap_or_default();

        if method == "shutdown" {
            return ResponseTemplate::new(200).set_body_json(json!({"status": "accepted"}));
        }

        let (status, envelope) = match Self::result_for(method, &body["params"]) {
            Ok(result) => (200, json!({"jsonrpc": "2.0", "id": id, "result": result})),
            Err(error) => (400, json!({"jsonrpc": "2.0", "id": id, "error": error})),
        };

        if method == "initialize" || self.mode == ReplyMode::Direct {
            return ResponseTemplate::new(status).set_body_json(envelope);
        }
        if self.mode == ReplyMode::Deferred {
            self.deferred.lock().unwrap().push(envelope);
        }
        ResponseTemplate::new(202).set_body_json(json!({"status": "accepted"}))
    }
}

pub struct StreamResponder {
    session_id: String,
    deferred: Arc<Mutex<Vec<Value>>>,
    extra: Vec<(String, Value)>,
}

impl Respond for StreamResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let mut body = format!(
            "event: connected\ndata: {}\n\n",
            json!({"session_id": self.session_id})
        );
        for (event, data) in &self.extra {
            body.push_str(&format!("event: {event}\ndata: {data}\n\n"));
        }
        for envelope in self.deferred.lock().unwrap().drain(..) {
            body.push_str(&format!("event: message\ndata: {envelope}\n\n"));
        }
        ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")
    }
}

/// Mock MCP server
pub struct MockMcpServer {
    pub server: MockServer,
}

impl MockMcpServer {
    pub async fn start(mode: ReplyMode) -> Self {
        Self::start_with_events(mode, Vec::new()).await
    }

    /// Also emit `extra` frames after `connected` on every stream connection
    pub async fn start_with_events(mode: ReplyMode, extra: Vec<(String, Value)>) -> Self {
        let server = MockServer::start().await;
        let deferred = Arc::new(Mutex::new(Vec::new()));

        Mock::given(method("POST"))
            .and(path("/mcp/command"))
            .respond_with(CommandResponder {
                mode,
                deferred: Arc::clone(&deferred),
            })
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/mcp/stream"))
            .respond_with(StreamResponder {
                session_id: "s1".to_string(),
                deferred,
                extra,
            })
            .mount(&server)
            .await;

        Self { server }
    }

    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig::new(&self.server.uri(), "client-id", "tenant-id").unwrap()
    }

    /// Client with a static token and a fast reconnect loop
    pub fn builder(&self) -> McpClientBuilder {
        McpClientBuilder::new(self.connection())
            .with_auth_provider(StaticTokenProvider::new("test-token"))
            .with_reconnect_delay(Duration::from_millis(50))
            .with_request_timeout(Duration::from_secs(5))
    }

    pub async fn client(&self) -> McpClient {
        self.builder().build().await.unwrap()
    }

    /// Methods of every command POST received so far
    pub async fn command_methods(&self) -> Vec<String> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == "/mcp/command")
            .filter_map(|r| {
                let body: Value = serde_json::from_slice(&r.body).ok()?;
                body["method"].as_str().map(str::to_string)
            })
            .collect()
    }
}

/// Poll `condition` until it holds, failing after five seconds
pub async fn wait_for<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
