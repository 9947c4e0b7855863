//! Wire types for the streamed-session MCP protocol
//!
//! Outbound commands are JSON-RPC style requests posted to the command
//! endpoint. Inbound traffic (direct replies and stream `message` events)
//! arrives as a loosely shaped [`JsonRpcEnvelope`] that is classified into
//! an [`InboundMessage`] before dispatch.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

// ============================================================================
// Core Protocol Constants
// ============================================================================

/// Version tag carried in every envelope under the `jsonrpc` key
pub const JSONRPC_VERSION: &str = "2.0";

/// Protocol version this client expects the server to speak
pub const PROTOCOL_VERSION: &str = "1.0";

// ============================================================================
// Type Aliases
// ============================================================================

/// Request ID for correlation (`<millis>-<base36 suffix>`)
pub type RequestId = String;

// ============================================================================
// JSON-RPC Messages
// ============================================================================

/// Outbound request posted to the command endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcRequest {
    /// Envelope version (always "2.0")
    pub jsonrpc: String,
    /// Request ID for correlation
    pub id: RequestId,
    /// Method name being called
    pub method: String,
    /// Method parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Error object carried by a failed response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorObject {
    /// Error code, absent on some server failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
    /// Error message
    pub message: String,
    /// Additional error data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Server-initiated notification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcNotification {
    /// Envelope version (always "2.0")
    pub jsonrpc: String,
    /// Notification method
    pub method: String,
    /// Notification parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Any inbound message, before classification.
///
/// Every field is optional so that partially formed messages still
/// deserialize and can be reported rather than dropped at the decoder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct JsonRpcEnvelope {
    /// Envelope version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonrpc: Option<String>,
    /// Request id this envelope answers (string or number)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// Method name for notifications and server requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Notification or request parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Successful result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

/// Classified inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Answer to a request this client sent
    Response {
        /// Correlation id
        id: RequestId,
        /// Result value or server-reported error
        outcome: Result<Value, ErrorObject>,
    },
    /// Message without an id
    Notification(JsonRpcNotification),
    /// Request initiated by the server; not serviced by this client
    ServerRequest(JsonRpcRequest),
    /// Neither an id nor a method
    Invalid(JsonRpcEnvelope),
}

impl JsonRpcRequest {
    /// Create a new request
    pub fn new<T: Serialize>(
        id: impl Into<RequestId>,
        method: impl Into<String>,
        params: Option<T>,
    ) -> std::result::Result<Self, serde_json::Error> {
        let params = match params {
            Some(p) => Some(serde_json::to_value(p)?),
            None => None,
        };

        Ok(Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            method: method.into(),
            params,
        })
    }
}

impl JsonRpcNotification {
    /// Create a new notification
    pub fn new<T: Serialize>(
        method: impl Into<String>,
        params: Option<T>,
    ) -> std::result::Result<Self, serde_json::Error> {
        let params = match params {
            Some(p) => Some(serde_json::to_value(p)?),
            None => None,
        };

        Ok(Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        })
    }
}

impl JsonRpcEnvelope {
    /// Build a success response envelope
    pub fn success(id: impl Into<RequestId>, result: Value) -> Self {
        Self {
            jsonrpc: Some(JSONRPC_VERSION.to_string()),
            id: Some(Value::String(id.into())),
            result: Some(result),
            ..Default::default()
        }
    }

    /// Build an error response envelope
    pub fn failure(id: impl Into<RequestId>, error: ErrorObject) -> Self {
        Self {
            jsonrpc: Some(JSONRPC_VERSION.to_string()),
            id: Some(Value::String(id.into())),
            error: Some(error),
            ..Default::default()
        }
    }

    /// Correlation id as a string; numeric ids are rendered in decimal
    pub fn response_id(&self) -> Option<RequestId> {
        match self.id.as_ref()? {
            Value::String(id) => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }
}

impl From<JsonRpcEnvelope> for InboundMessage {
    fn from(envelope: JsonRpcEnvelope) -> Self {
        let jsonrpc = envelope
            .jsonrpc
            .clone()
            .unwrap_or_else(|| JSONRPC_VERSION.to_string());

        match (envelope.response_id(), envelope.method.clone()) {
            // An id with a method and no outcome is a request from the server
            (Some(id), Some(method)) if envelope.result.is_none() && envelope.error.is_none() => {
                InboundMessage::ServerRequest(JsonRpcRequest {
                    jsonrpc,
                    id,
                    method,
                    params: envelope.params,
                })
            }
            (Some(id), _) => {
                let outcome = match envelope.error {
                    Some(error) => Err(error),
                    None => Ok(envelope.result.unwrap_or(Value::Null)),
                };
                InboundMessage::Response { id, outcome }
            }
            (None, Some(method)) => InboundMessage::Notification(JsonRpcNotification {
                jsonrpc,
                method,
                params: envelope.params,
            }),
            (None, None) => InboundMessage::Invalid(envelope),
        }
    }
}

// ============================================================================
// Initialization
// ============================================================================

/// Name and version of an endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Implementation {
    /// Implementation name
    pub name: String,
    /// Implementation version
    pub version: String,
}

impl Implementation {
    /// Create a new implementation with name and version
    pub fn new<S: Into<String>>(name: S, version: S) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

pub type ClientInfo = Implementation;
pub type ServerInfo = Implementation;

/// Feature flags the client declares during initialization
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientCapabilities {
    pub tools: bool,
    pub resources: bool,
    pub prompts: bool,
    pub sampling: bool,
}

impl Default for ClientCapabilities {
    fn default() -> Self {
        Self {
            tools: true,
            resources: true,
            prompts: true,
            sampling: true,
        }
    }
}

/// Parameters for `initialize`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub client_info: ClientInfo,
    pub capabilities: ClientCapabilities,
}

/// Result of `initialize`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// Protocol version spoken by the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_version: Option<String>,
    /// Server capability map, kept opaque
    #[serde(default)]
    pub capabilities: Value,
    /// Server identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_info: Option<ServerInfo>,
}

// ============================================================================
// Tools
// ============================================================================

/// Tool advertised by `tools/list`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool arguments
    #[serde(default)]
    pub input_schema: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ListToolsResult {
    #[serde(default)]
    pub tools: Vec<ToolDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallToolParams {
    pub name: String,
    pub arguments: Value,
}

/// Result of `tools/call`; the payload sits under `toolResult`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    #[serde(default)]
    pub tool_result: Value,
}

// ============================================================================
// Resources
// ============================================================================

/// Resource advertised by `resources/list`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    pub uri: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Server-side resource kind (`type` on the wire)
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ListResourcesResult {
    #[serde(default)]
    pub resources: Vec<ResourceDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReadResourceParams {
    pub uri: String,
}

/// One content entry returned by `resources/read`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContents {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Base64 payload for binary resources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ReadResourceResult {
    #[serde(default)]
    pub contents: Vec<ResourceContents>,
}

// ============================================================================
// Prompts
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptArgument {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
}

/// Prompt advertised by `prompts/list`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub arguments: Vec<PromptArgument>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ListPromptsResult {
    #[serde(default)]
    pub prompts: Vec<PromptDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GetPromptParams {
    pub name: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub arguments: HashMap<String, String>,
}
