// ! MCP client implementation
// !
// ! Module provides the main MCP client: it authenticates, initializes a
// ! session over the command channel, keeps the event stream open, and
// ! exposes tool, resource and prompt operations whose replies may arrive on
// ! either channel.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, watch};
use tracing::{debug, info, trace};

use crate::auth::{AuthProvider, TokenRequest};
use crate::client::builder::ConnectionConfig;
use crate::client::correlator::{RequestCorrelator, generate_request_id};
use crate::client::session::{ClientSession, NotificationHandler, SessionState};
use crate::core::error::{McpError, McpResult};
use crate::core::logging::ErrorContext;
use crate::protocol::methods;
use crate::protocol::types::*;
use crate::transport::http::{CommandResponse, CommandTransport};
use crate::transport::stream::{EventDispatcher, ReconnectPolicy, StreamHandle, StreamManager};

/// Configuration for the MCP client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Delay before each stream reconnect attempt in milliseconds
    pub reconnect_delay_ms: u64,
    /// Consecutive failed reconnects before the session is dropped
    pub max_reconnect_attempts: Option<u32>,
    /// TCP connect timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Name reported in `initialize`
    pub client_name: String,
    /// Version reported in `initialize`
    pub client_version: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30000,
            reconnect_delay_ms: 5000,
            max_reconnect_attempts: None,
            connect_timeout_ms: 30000,
            client_name: env!("CARGO_PKG_NAME").to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ClientConfig {
    fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            delay: Duration::from_millis(self.reconnect_delay_ms),
            max_attempts: self.max_reconnect_attempts,
        }
    }
}

/// Main MCP client implementation
pub struct McpClient {
    /// Server location and token scope
    connection: ConnectionConfig,
    /// Client configuration
    config: ClientConfig,
    /// Client information
    info: ClientInfo,
    /// Client capabilities
    capabilities: ClientCapabilities,
    /// Token source
    auth: Arc<dyn AuthProvider>,
    /// Lifecycle state and credentials
    session: Arc<ClientSession>,
    /// Outstanding requests
    correlator: Arc<RequestCorrelator>,
    /// Command channel
    transport: Arc<CommandTransport>,
    /// Stream event routing
    dispatcher: EventDispatcher,
    /// Event stream
    streams: StreamManager,
    /// Running stream, present while connected
    stream: Mutex<Option<StreamHandle>>,
    /// Initialize result (available after connect)
    server: RwLock<Option<InitializeResult>>,
}

impl McpClient {
    /// Create a new MCP client with default configuration
    pub fn new(connection: ConnectionConfig, auth: Arc<dyn AuthProvider>) -> McpResult<Self> {
        Self::with_config(connection, auth, ClientConfig::default())
    }

    /// Create a new MCP client with custom configuration
    pub fn with_config(
        connection: ConnectionConfig,
        auth: Arc<dyn AuthProvider>,
        config: ClientConfig,
    ) -> McpResult<Self> {
        // No overall timeout: the stream request stays open indefinitely
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()?;

        let session = ClientSession::new();
        let correlator =
            RequestCorrelator::new(Duration::from_millis(config.request_timeout_ms));
        let dispatcher = EventDispatcher::new(Arc::clone(&session), Arc::clone(&correlator));

        let transport = CommandTransport::new(
            http.clone(),
            &connection.base_url,
            connection.scope.clone(),
            Arc::clone(&session),
            Arc::clone(&auth),
        )?;
        let streams = StreamManager::new(
            http,
            &connection.base_url,
            connection.scope.clone(),
            Arc::clone(&session),
            Arc::clone(&auth),
            dispatcher.clone(),
            config.reconnect_policy(),
        )?;

        Ok(Self {
            info: ClientInfo::new(config.client_name.clone(), config.client_version.clone()),
            capabilities: ClientCapabilities::default(),
            connection,
            config,
            auth,
            session,
            correlator,
            transport: Arc::new(transport),
            dispatcher,
            streams,
            stream: Mutex::new(None),
            server: RwLock::new(None),
        })
    }

    /// Set client capabilities declared in `initialize`
    pub fn set_capabilities(&mut self, capabilities: ClientCapabilities) {
        self.capabilities = capabilities;
    }

    /// Install the handler that receives server notifications
    pub async fn set_notification_handler<H>(&self, handler: H)
    where
        H: NotificationHandler + 'static,
    {
        self.set_shared_notification_handler(Arc::new(handler)).await;
    }

    /// Install an already shared notification handler
    pub async fn set_shared_notification_handler(&self, handler: Arc<dyn NotificationHandler>) {
        self.dispatcher.set_notification_handler(handler).await;
    }

    /// Get client information
    pub fn info(&self) -> &ClientInfo {
        &self.info
    }

    /// Get client capabilities
    pub fn capabilities(&self) -> &ClientCapabilities {
        &self.capabilities
    }

    /// Get client configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Get connection settings
    pub fn connection(&self) -> &ConnectionConfig {
        &self.connection
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Check if the client is connected
    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    /// Subscribe to lifecycle state changes
    pub fn subscribe_state_changes(&self) -> watch::Receiver<SessionState> {
        self.session.subscribe_state_changes()
    }

    /// Server-assigned session id, once the stream has delivered it
    pub async fn session_id(&self) -> Option<String> {
        self.session.session_id().await
    }

    /// Get server information (if connected)
    pub async fn server_info(&self) -> Option<ServerInfo> {
        self.server
            .read()
            .await
            .as_ref()
            .and_then(|result| result.server_info.clone())
    }

    /// Full initialize result (if connected)
    pub async fn initialize_result(&self) -> Option<InitializeResult> {
        self.server.read().await.clone()
    }

    /// Number of requests awaiting a response
    pub fn pending_requests(&self) -> usize {
        self.correlator.pending_count()
    }

    // ========================================================================
    // Connection Management
    // ========================================================================

    /// Authenticate, initialize, and open the event stream.
    ///
    /// Fails with [`McpError::Connection`] unless the client is
    /// disconnected. Any failure returns the client to `Disconnected`.
    pub async fn connect(&self) -> McpResult<InitializeResult> {
        self.session.transition(SessionState::Authenticating).await?;

        match self.establish().await {
            Ok(result) => Ok(result),
            Err(error) => {
                let handle = self.stream.lock().await.take();
                if let Some(handle) = handle {
                    handle.close().await;
                }
                self.session.clear().await;
                *self.server.write().await = None;

                error.log_with_context(
                    ErrorContext::new("connect")
                        .with_extra("base_url", self.connection.base_url.as_str()),
                );
                Err(error)
            }
        }
    }

    async fn establish(&self) -> McpResult<InitializeResult> {
        let token = self
            .auth
            .get_token(&self.connection.scope, TokenRequest::cached())
            .await
            .map_err(McpError::into_authentication)?;
        self.session.begin(token.access_token).await;
        self.session.transition(SessionState::Initializing).await?;

        let result = self.initialize().await?;

        let stale = self.stream.lock().await.take();
        if let Some(stale) = stale {
            stale.close().await;
        }
        let handle = self.streams.open().await?;
        *self.stream.lock().await = Some(handle);

        self.session.transition(SessionState::Connected).await?;
        *self.server.write().await = Some(result.clone());

        info!(
            server = ?result.server_info,
            protocol_version = ?result.protocol_version,
            "connected to MCP server"
        );
        Ok(result)
    }

    /// Initialize the connection with the server
    async fn initialize(&self) -> McpResult<InitializeResult> {
        let params = InitializeParams {
            client_info: self.info.clone(),
            capabilities: self.capabilities,
        };

        let result = self
            .request(methods::INITIALIZE, Some(serde_json::to_value(params)?))
            .await?;
        if result.is_null() {
            return Err(McpError::protocol("missing initialize result"));
        }
        self.handle_response(result)
    }

    /// Close the stream, send a best-effort `shutdown`, and drop the session.
    ///
    /// Requests still pending fail with [`McpError::Cancelled`]. Calling this
    /// while disconnected is a no-op.
    pub async fn disconnect(&self) -> McpResult<()> {
        let state = self.session.state();

        let handle = self.stream.lock().await.take();
        if let Some(handle) = handle {
            handle.close().await;
        }

        if state == SessionState::Disconnected {
            debug!("disconnect called without an active session");
            return Ok(());
        }

        if state == SessionState::Connected {
            self.send_shutdown().await;
        }

        self.session.clear().await;
        let rejected = self.correlator.reject_all(McpError::cancelled("session closed"));
        *self.server.write().await = None;

        info!(rejected, "disconnected from MCP server");
        Ok(())
    }

    async fn send_shutdown(&self) {
        let request = match JsonRpcRequest::new(
            generate_request_id(),
            methods::SHUTDOWN,
            None::<Value>,
        ) {
            Ok(request) => request,
            Err(e) => {
                debug!("could not build shutdown request: {e}");
                return;
            }
        };

        let sent = tokio::time::timeout(self.correlator.timeout(), self.transport.send(&request));
        match sent.await {
            Ok(Ok(reply)) => debug!(status = %reply.status, "shutdown acknowledged"),
            Ok(Err(error)) => debug!(%error, "shutdown request failed; ignoring"),
            Err(_) => debug!("shutdown request timed out; ignoring"),
        }
    }

    // ========================================================================
    // Tool Operations
    // ========================================================================

    /// List available tools from the server
    pub async fn list_tools(&self) -> McpResult<Vec<ToolDescriptor>> {
        let result = self.send_request(methods::TOOLS_LIST, None).await?;
        let result: ListToolsResult = self.handle_response(result)?;
        Ok(result.tools)
    }

    /// Call a tool on the server, returning its `toolResult`
    pub async fn call_tool(&self, name: &str, arguments: Value) -> McpResult<Value> {
        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };

        let result = self
            .send_request(methods::TOOLS_CALL, Some(serde_json::to_value(params)?))
            .await?;
        let result: CallToolResult = self.handle_response(result)?;
        Ok(result.tool_result)
    }

    // ========================================================================
    // Resource Operations
    // ========================================================================

    /// List available resources from the server
    pub async fn list_resources(&self) -> McpResult<Vec<ResourceDescriptor>> {
        let result = self.send_request(methods::RESOURCES_LIST, None).await?;
        let result: ListResourcesResult = self.handle_response(result)?;
        Ok(result.resources)
    }

    /// Read a resource from the server
    pub async fn read_resource(&self, uri: &str) -> McpResult<Vec<ResourceContents>> {
        let params = ReadResourceParams {
            uri: uri.to_string(),
        };

        let result = self
            .send_request(methods::RESOURCES_READ, Some(serde_json::to_value(params)?))
            .await?;
        let result: ReadResourceResult = self.handle_response(result)?;
        Ok(result.contents)
    }

    // ========================================================================
    // Prompt Operations
    // ========================================================================

    /// List available prompts from the server
    pub async fn list_prompts(&self) -> McpResult<Vec<PromptDescriptor>> {
        let result = self.send_request(methods::PROMPTS_LIST, None).await?;
        let result: ListPromptsResult = self.handle_response(result)?;
        Ok(result.prompts)
    }

    /// Render a prompt with arguments
    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: HashMap<String, String>,
    ) -> McpResult<Value> {
        let params = GetPromptParams {
            name: name.to_string(),
            arguments,
        };

        self.send_request(methods::PROMPTS_GET, Some(serde_json::to_value(params)?))
            .await
    }

    // ========================================================================
    // Requests
    // ========================================================================

    /// Send an arbitrary request and wait for its result
    pub async fn send_request(&self, method: &str, params: Option<Value>) -> McpResult<Value> {
        self.ensure_connected()?;
        self.request(method, params).await
    }

    /// Register, post, and wait. The reply may come back in the POST body or
    /// on the stream; the correlator takes whichever arrives first.
    async fn request(&self, method: &str, params: Option<Value>) -> McpResult<Value> {
        let pending = self.correlator.register();
        let id = pending.id().to_string();
        let request = JsonRpcRequest::new(id.clone(), method, params)?;

        let transport = Arc::clone(&self.transport);
        let post = tokio::spawn(async move { transport.send(&request).await });

        match tokio::time::timeout_at(pending.deadline(), post).await {
            // The POST keeps running; only the logical request expires
            Err(_) => debug!(request_id = %id, "command still in flight at deadline"),
            Ok(Err(join_error)) => {
                self.correlator.reject(
                    &id,
                    McpError::internal(format!("command task failed: {join_error}")),
                );
            }
            Ok(Ok(Err(error))) => {
                self.correlator.reject(&id, error);
            }
            Ok(Ok(Ok(reply))) => self.route_direct_reply(&id, reply),
        }

        let outcome = pending.wait().await;
        if let Err(error) = &outcome {
            error.log_with_context(
                ErrorContext::new("send_request")
                    .with_transport("command")
                    .with_method(method)
                    .with_request_id(id.as_str()),
            );
        }
        outcome
    }

    fn route_direct_reply(&self, id: &str, reply: CommandResponse) {
        if reply.is_accepted() {
            debug!(request_id = %id, "command accepted; awaiting stream delivery");
            return;
        }

        let Some(envelope) = reply.envelope() else {
            trace!(request_id = %id, status = %reply.status, "command reply has no envelope");
            return;
        };

        // An error without an id can only be about the request just posted
        if envelope.id.is_none() {
            if let Some(error) = envelope.error {
                self.correlator.reject(id, error.into());
            }
            return;
        }

        match InboundMessage::from(envelope) {
            InboundMessage::Response {
                id: reply_id,
                outcome,
            } if reply_id == id => {
                self.correlator.complete(id, outcome.map_err(McpError::from));
            }
            other => debug!(request_id = %id, ?other, "command reply is not for this request"),
        }
    }

    /// Decode a result payload; a null result is treated as an empty object
    fn handle_response<T>(&self, result: Value) -> McpResult<T>
    where
        T: DeserializeOwned,
    {
        let result = match result {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        serde_json::from_value(result)
            .map_err(|e| McpError::Protocol(format!("unexpected result shape: {e}")))
    }

    /// Check client is connected
    fn ensure_connected(&self) -> McpResult<()> {
        if !self.is_connected() {
            return Err(McpError::not_connected(format!(
                "client is {}",
                self.session.state()
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient")
            .field("base_url", &self.connection.base_url.as_str())
            .field("state", &self.session.state())
            .field("pending", &self.correlator.pending_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AccessToken, StaticTokenProvider};
    use async_trait::async_trait;
    use serde_json::json;

    struct RejectingProvider;

    #[async_trait]
    impl AuthProvider for RejectingProvider {
        async fn get_token(&self, _scope: &str, _request: TokenRequest) -> McpResult<AccessToken> {
            Err(McpError::internal("interactive login required"))
        }
    }

    fn client_for(base_url: &str, auth: Arc<dyn AuthProvider>) -> McpClient {
        let connection = ConnectionConfig::new(base_url, "client", "tenant").unwrap();
        McpClient::with_config(
            connection,
            auth,
            ClientConfig {
                request_timeout_ms: 500,
                connect_timeout_ms: 500,
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.request_timeout_ms, 30000);
        assert_eq!(config.reconnect_delay_ms, 5000);
        assert_eq!(config.max_reconnect_attempts, None);
        assert_eq!(config.client_name, "mcp-stream-client");
    }

    #[tokio::test]
    async fn test_client_creation() {
        let client = client_for(
            "http://localhost:7071",
            Arc::new(StaticTokenProvider::new("token")),
        );

        assert_eq!(client.state(), SessionState::Disconnected);
        assert!(!client.is_connected());
        assert_eq!(client.session_id().await, None);
        assert_eq!(client.server_info().await, None);
        assert_eq!(client.pending_requests(), 0);
        assert_eq!(client.connection().scope, "api://client/.default");
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let client = client_for(
            "http://localhost:7071",
            Arc::new(StaticTokenProvider::new("token")),
        );

        assert!(matches!(
            client.list_tools().await,
            Err(McpError::NotConnected(_))
        ));
        assert!(matches!(
            client.call_tool("analyze_code", json!({})).await,
            Err(McpError::NotConnected(_))
        ));
        assert!(matches!(
            client.list_resources().await,
            Err(McpError::NotConnected(_))
        ));
        assert!(matches!(
            client.read_resource("file:///x").await,
            Err(McpError::NotConnected(_))
        ));
        assert!(matches!(
            client.list_prompts().await,
            Err(McpError::NotConnected(_))
        ));
        assert!(matches!(
            client.send_request("custom/method", None).await,
            Err(McpError::NotConnected(_))
        ));
        assert_eq!(client.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_when_disconnected_is_noop() {
        let client = client_for(
            "http://localhost:7071",
            Arc::new(StaticTokenProvider::new("token")),
        );
        tokio_test::assert_ok!(client.disconnect().await);
        assert_eq!(client.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_auth_failure_returns_to_disconnected() {
        let client = client_for("http://localhost:7071", Arc::new(RejectingProvider));

        let result = client.connect().await;
        assert!(matches!(result, Err(McpError::Authentication(ref m)) if m.contains("interactive")));
        assert_eq!(client.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_unreachable_server() {
        let client = client_for(
            "http://127.0.0.1:1",
            Arc::new(StaticTokenProvider::new("token")),
        );

        let result = client.connect().await;
        assert!(matches!(result, Err(McpError::Transport(_))));
        assert_eq!(client.state(), SessionState::Disconnected);
        assert_eq!(client.pending_requests(), 0);
    }

    #[test]
    fn test_handle_response_null_is_empty() {
        let client = client_for(
            "http://localhost:7071",
            Arc::new(StaticTokenProvider::new("token")),
        );

        let tools: ListToolsResult = client.handle_response(Value::Null).unwrap();
        assert!(tools.tools.is_empty());

        let result: McpResult<ListToolsResult> =
            client.handle_response(json!({"tools": "not a list"}));
        assert!(matches!(result, Err(McpError::Protocol(_))));
    }
}
