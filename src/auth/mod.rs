// ! Token acquisition for the MCP stream client
// !
// ! The client never talks to an identity platform itself. It asks an
// ! [`AuthProvider`] for a bearer token scoped to the MCP API, and asks again
// ! with `force_renew` set whenever the server answers 401.

pub mod token;

pub use token::*;

use async_trait::async_trait;

use crate::core::error::McpResult;

/// Source of bearer tokens for the command channel and the event stream.
///
/// Implementations own their cache. A request with
/// [`TokenRequest::force_renew`] set must bypass any cached token. Failures
/// are surfaced to callers as [`McpError::Authentication`].
///
/// [`McpError::Authentication`]: crate::core::error::McpError::Authentication
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Obtain an access token for `scope`
    async fn get_token(&self, scope: &str, request: TokenRequest) -> McpResult<AccessToken>;
}
