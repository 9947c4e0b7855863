// ! HTTP command channel
// !
// ! Module posts request envelopes to the command endpoint with the session's
// ! bearer token and session id attached, renewing the token once when the
// ! server answers 401.

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use crate::auth::AuthProvider;
use crate::client::session::{ClientSession, Session};
use crate::core::error::{McpError, McpResult};
use crate::protocol::types::{JsonRpcEnvelope, JsonRpcRequest};
use crate::transport::endpoint_url;

/// Path of the command endpoint, relative to the base URL
pub const COMMAND_PATH: &str = "/mcp/command";

/// Header carrying the server-assigned session id
pub const SESSION_ID_HEADER: &str = "X-Session-Id";

/// Raw reply to a command POST
#[derive(Debug, Clone)]
pub struct CommandResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Response body as text
    pub body: String,
}

impl CommandResponse {
    /// Parse the body as an envelope, if it is one
    pub fn envelope(&self) -> Option<JsonRpcEnvelope> {
        if self.body.trim().is_empty() {
            return None;
        }
        serde_json::from_str(&self.body).ok()
    }

    /// True when the server only acknowledged the command (HTTP 202) and
    /// will deliver the reply on the event stream. The body is not
    /// consulted: a 200 reply is a response even if its result says
    /// `"status": "accepted"`.
    pub fn is_accepted(&self) -> bool {
        self.status == StatusCode::ACCEPTED
    }
}

/// Attach bearer token and session id. Both are omitted without a session.
pub(crate) fn apply_session_headers(
    request: RequestBuilder,
    session: Option<&Session>,
) -> RequestBuilder {
    match session {
        Some(session) => request
            .bearer_auth(&session.access_token)
            .header(SESSION_ID_HEADER, &session.session_id),
        None => request,
    }
}

/// Outbound half of the session: posts commands to `<base>/mcp/command`
pub struct CommandTransport {
    client: Client,
    endpoint: Url,
    scope: String,
    session: Arc<ClientSession>,
    auth: Arc<dyn AuthProvider>,
}

impl CommandTransport {
    /// Create a command transport rooted at `base_url`
    pub fn new(
        client: Client,
        base_url: &Url,
        scope: impl Into<String>,
        session: Arc<ClientSession>,
        auth: Arc<dyn AuthProvider>,
    ) -> McpResult<Self> {
        Ok(Self {
            client,
            endpoint: endpoint_url(base_url, COMMAND_PATH)?,
            scope: scope.into(),
            session,
            auth,
        })
    }

    /// Full command endpoint URL
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Post one request.
    ///
    /// A 401 triggers one forced token renewal and one retry with the new
    /// token; a second 401 is an authentication error. Other non-success
    /// statuses are returned as [`McpError::Http`] unless the body carries an
    /// error envelope, which the caller routes like any other reply.
    pub async fn send(&self, request: &JsonRpcRequest) -> McpResult<CommandResponse> {
        let response = self.post(request).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Self::finish(response).await;
        }

        warn!(
            request_id = %request.id,
            method = %request.method,
            "command rejected with 401; renewing access token"
        );
        self.session
            .refresh_token(self.auth.as_ref(), &self.scope)
            .await?;

        let retry = self.post(request).await?;
        if retry.status() == StatusCode::UNAUTHORIZED {
            return Err(McpError::authentication(format!(
                "command endpoint rejected renewed token for {}",
                request.method
            )));
        }
        Self::finish(retry).await
    }

    async fn post(&self, request: &JsonRpcRequest) -> McpResult<Response> {
        let credentials = self.session.credentials().await;
        let builder = self.client.post(self.endpoint.clone()).json(request);

        debug!(request_id = %request.id, method = %request.method, "posting command");
        apply_session_headers(builder, credentials.as_ref())
            .send()
            .await
            .map_err(|e| McpError::transport(format!("command request failed: {e}")))
    }

    async fn finish(response: Response) -> McpResult<CommandResponse> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| McpError::transport(format!("failed to read command response: {e}")))?;
        let reply = CommandResponse { status, body };

        if status.is_success() || reply.envelope().is_some_and(|e| e.error.is_some()) {
            return Ok(reply);
        }

        Err(McpError::Http(format!(
            "command endpoint returned {}: {}",
            status,
            reply.body.chars().take(200).collect::<String>()
        )))
    }
}

impl std::fmt::Debug for CommandTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandTransport")
            .field("endpoint", &self.endpoint.as_str())
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}
