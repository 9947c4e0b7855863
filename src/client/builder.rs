// ! Client builder for MCP clients
// !
// ! Provides the connection settings that identify a server and an app
// ! registration, and a builder pattern for creating configured clients.

use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::auth::AuthProvider;
use crate::client::mcp_client::{ClientConfig, McpClient};
use crate::client::session::NotificationHandler;
use crate::core::error::{McpError, McpResult};
use crate::protocol::types::ClientCapabilities;

/// Environment variable holding the server base URL
pub const ENV_BASE_URL: &str = "MCP_API_BASE_URL";
/// Environment variable holding the app registration's client id
pub const ENV_CLIENT_ID: &str = "MCP_CLIENT_ID";
/// Environment variable holding the directory tenant id
pub const ENV_TENANT_ID: &str = "MCP_TENANT_ID";
/// Environment variable overriding the token scope
pub const ENV_SCOPE: &str = "MCP_SCOPE";

/// Where the server lives and which identity to request tokens for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Server base URL; `/mcp/command` and `/mcp/stream` are appended
    pub base_url: Url,
    /// App registration client id
    pub client_id: String,
    /// Directory tenant id
    pub tenant_id: String,
    /// Token scope passed to the auth provider
    pub scope: String,
}

impl ConnectionConfig {
    /// Validate `base_url` and derive the default scope
    /// `api://<client_id>/.default`
    pub fn new(
        base_url: &str,
        client_id: impl Into<String>,
        tenant_id: impl Into<String>,
    ) -> McpResult<Self> {
        let base_url = Url::parse(base_url)?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(McpError::validation(format!(
                "base URL must be http or https, got {}",
                base_url.scheme()
            )));
        }
        if base_url.fragment().is_some() {
            return Err(McpError::validation("base URL must not carry a fragment"));
        }

        let client_id = client_id.into();
        if client_id.trim().is_empty() {
            return Err(McpError::validation("client id must not be empty"));
        }

        Ok(Self {
            scope: default_scope(&client_id),
            base_url,
            client_id,
            tenant_id: tenant_id.into(),
        })
    }

    /// Override the token scope
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Read `MCP_API_BASE_URL`, `MCP_CLIENT_ID`, `MCP_TENANT_ID` and the
    /// optional `MCP_SCOPE` from the process environment
    pub fn from_env() -> McpResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source using the environment variable names
    pub fn from_lookup<F>(lookup: F) -> McpResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| McpError::validation(format!("{key} is not set")))
        };

        let config = Self::new(
            &required(ENV_BASE_URL)?,
            required(ENV_CLIENT_ID)?,
            required(ENV_TENANT_ID)?,
        )?;

        Ok(match lookup(ENV_SCOPE).filter(|s| !s.trim().is_empty()) {
            Some(scope) => config.with_scope(scope),
            None => config,
        })
    }
}

fn default_scope(client_id: &str) -> String {
    format!("api://{client_id}/.default")
}

/// Builder for creating MCP clients with configuration
pub struct McpClientBuilder {
    connection: ConnectionConfig,
    auth: Option<Arc<dyn AuthProvider>>,
    config: ClientConfig,
    capabilities: ClientCapabilities,
    notification_handler: Option<Arc<dyn NotificationHandler>>,
}

impl McpClientBuilder {
    /// Create a new client builder
    pub fn new(connection: ConnectionConfig) -> Self {
        Self {
            connection,
            auth: None,
            config: ClientConfig::default(),
            capabilities: ClientCapabilities::default(),
            notification_handler: None,
        }
    }

    /// Set the token source (required)
    pub fn with_auth_provider<A>(mut self, auth: A) -> Self
    where
        A: AuthProvider + 'static,
    {
        self.auth = Some(Arc::new(auth));
        self
    }

    /// Set an already shared token source (required)
    pub fn with_shared_auth_provider(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Replace the whole client configuration
    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Set client name and version sent in `initialize`
    pub fn with_client_info<S: Into<String>>(mut self, name: S, version: S) -> Self {
        self.config.client_name = name.into();
        self.config.client_version = version.into();
        self
    }

    /// Set client capabilities
    pub fn with_capabilities(mut self, capabilities: ClientCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Set the per-request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the wait before each stream reconnect attempt
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Give up reconnecting after `attempts` consecutive failures
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.config.max_reconnect_attempts = Some(attempts);
        self
    }

    /// Set the TCP connect timeout for both channels
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Receive server notifications
    pub fn with_notification_handler<H>(mut self, handler: H) -> Self
    where
        H: NotificationHandler + 'static,
    {
        self.notification_handler = Some(Arc::new(handler));
        self
    }

    /// Build the client
    pub async fn build(self) -> McpResult<McpClient> {
        let auth = self
            .auth
            .ok_or_else(|| McpError::validation("an auth provider is required"))?;

        let mut client = McpClient::with_config(self.connection, auth, self.config)?;
        client.set_capabilities(self.capabilities);
        if let Some(handler) = self.notification_handler {
            client.set_shared_notification_handler(handler).await;
        }
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticTokenProvider;
    use crate::client::session::LoggingNotificationHandler;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_connection_config_default_scope() {
        let config = ConnectionConfig::new("https://mcp.example.com", "abc-123", "tenant").unwrap();

        assert_eq!(config.scope, "api://abc-123/.default");
        assert_eq!(config.base_url.as_str(), "https://mcp.example.com/");
        assert_eq!(config.with_scope("custom").scope, "custom");
    }

    #[test]
    fn test_connection_config_validation() {
        assert!(matches!(
            ConnectionConfig::new("not a url", "id", "tenant"),
            Err(McpError::Url(_))
        ));
        assert!(matches!(
            ConnectionConfig::new("ftp://example.com", "id", "tenant"),
            Err(McpError::Validation(_))
        ));
        assert!(matches!(
            ConnectionConfig::new("https://example.com", " ", "tenant"),
            Err(McpError::Validation(_))
        ));
        assert!(matches!(
            ConnectionConfig::new("https://example.com/api#frag", "id", "tenant"),
            Err(McpError::Validation(_))
        ));

        let config =
            ConnectionConfig::new("https://example.com/api?code=x", "id", "tenant").unwrap();
        assert_eq!(config.base_url.query(), Some("code=x"));
    }

    #[test]
    fn test_from_lookup() {
        let vars = env(&[
            (ENV_BASE_URL, "http://localhost:7071"),
            (ENV_CLIENT_ID, "client"),
            (ENV_TENANT_ID, "tenant"),
        ]);
        let config = ConnectionConfig::from_lookup(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(config.client_id, "client");
        assert_eq!(config.tenant_id, "tenant");
        assert_eq!(config.scope, "api://client/.default");

        let vars = env(&[
            (ENV_BASE_URL, "http://localhost:7071"),
            (ENV_CLIENT_ID, "client"),
            (ENV_TENANT_ID, "tenant"),
            (ENV_SCOPE, "api://other/.default"),
        ]);
        let config = ConnectionConfig::from_lookup(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(config.scope, "api://other/.default");
    }

    #[test]
    fn test_from_lookup_missing_variable() {
        let vars = env(&[(ENV_BASE_URL, "http://localhost:7071"), (ENV_CLIENT_ID, "client")]);
        let result = ConnectionConfig::from_lookup(|k| vars.get(k).cloned());
        assert!(matches!(result, Err(McpError::Validation(ref m)) if m.contains(ENV_TENANT_ID)));
    }

    #[tokio::test]
    async fn test_builder_requires_auth_provider() {
        let connection =
            ConnectionConfig::new("http://localhost:7071", "client", "tenant").unwrap();
        let result = McpClientBuilder::new(connection).build().await;
        assert!(matches!(result, Err(McpError::Validation(_))));
    }

    #[tokio::test]
    async fn test_builder_applies_settings() {
        let connection =
            ConnectionConfig::new("http://localhost:7071", "client", "tenant").unwrap();
        let client = McpClientBuilder::new(connection)
            .with_auth_provider(StaticTokenProvider::new("token"))
            .with_client_info("copilot-bridge", "2.1.0")
            .with_request_timeout(Duration::from_secs(5))
            .with_reconnect_delay(Duration::from_millis(250))
            .with_max_reconnect_attempts(4)
            .with_connect_timeout(Duration::from_secs(3))
            .with_notification_handler(LoggingNotificationHandler)
            .build()
            .await
            .unwrap();

        let config = client.config();
        assert_eq!(config.client_name, "copilot-bridge");
        assert_eq!(config.client_version, "2.1.0");
        assert_eq!(config.request_timeout_ms, 5000);
        assert_eq!(config.reconnect_delay_ms, 250);
        assert_eq!(config.max_reconnect_attempts, Some(4));
        assert_eq!(config.connect_timeout_ms, 3000);
        assert!(!client.is_connected());
    }
}
