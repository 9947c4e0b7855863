// ! Access tokens and token providers
// !
// ! Module holds the token value types plus two providers: a fixed token for
// ! tests and local servers, and a caching wrapper for providers that are
// ! expensive to call.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use crate::auth::AuthProvider;
use crate::core::error::{McpError, McpResult};

/// Options for a single token request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenRequest {
    /// Skip any cached token and obtain a new one
    pub force_renew: bool,
}

impl TokenRequest {
    /// A request that may be served from cache
    pub fn cached() -> Self {
        Self { force_renew: false }
    }

    /// A request that must bypass the cache
    pub fn force_renew() -> Self {
        Self { force_renew: true }
    }
}

/// Bearer token returned by an [`AuthProvider`]
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    /// Raw token value sent in the `Authorization` header
    pub access_token: String,
    /// Lifetime reported by the issuer, if known
    pub expires_in: Option<Duration>,
}

impl AccessToken {
    /// Token without a known lifetime
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_in: None,
        }
    }

    /// Token that expires after `expires_in`
    pub fn with_expiry(access_token: impl Into<String>, expires_in: Duration) -> Self {
        Self {
            access_token: access_token.into(),
            expires_in: Some(expires_in),
        }
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("access_token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Provider that always returns the same token
#[derive(Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl fmt::Debug for StaticTokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticTokenProvider").finish_non_exhaustive()
    }
}

#[async_trait]
impl AuthProvider for StaticTokenProvider {
    async fn get_token(&self, _scope: &str, _request: TokenRequest) -> McpResult<AccessToken> {
        if self.token.is_empty() {
            return Err(McpError::authentication("static token is empty"));
        }
        Ok(AccessToken::new(self.token.clone()))
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: AccessToken,
    expires_at: Option<Instant>,
}

impl CachedToken {
    fn is_fresh(&self, skew: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => Instant::now() + skew < expires_at,
            None => true,
        }
    }
}

/// Per-scope token cache in front of another provider.
///
/// Cached tokens are reused until they are within `skew` of expiry or a
/// caller sets `force_renew`.
#[derive(Clone)]
pub struct CachedTokenProvider<P> {
    inner: P,
    cache: Arc<RwLock<HashMap<String, CachedToken>>>,
    skew: Duration,
}

impl<P: AuthProvider> CachedTokenProvider<P> {
    /// Wrap `inner` with a 60 second expiry skew
    pub fn new(inner: P) -> Self {
        Self::with_skew(inner, Duration::from_secs(60))
    }

    pub fn with_skew(inner: P, skew: Duration) -> Self {
        Self {
            inner,
            cache: Arc::new(RwLock::new(HashMap::new())),
            skew,
        }
    }

    /// Drop every cached token
    pub async fn clear(&self) {
        self.cache.write().await.clear();
    }
}

#[async_trait]
impl<P: AuthProvider> AuthProvider for CachedTokenProvider<P> {
    async fn get_token(&self, scope: &str, request: TokenRequest) -> McpResult<AccessToken> {
        if !request.force_renew {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(scope).filter(|c| c.is_fresh(self.skew)) {
                return Ok(cached.token.clone());
            }
        }

        debug!(scope, force_renew = request.force_renew, "acquiring token");
        let token = self
            .inner
            .get_token(scope, request)
            .await
            .map_err(McpError::into_authentication)?;

        let expires_at = token.expires_in.map(|lifetime| Instant::now() + lifetime);
        self.cache.write().await.insert(
            scope.to_string(),
            CachedToken {
                token: token.clone(),
                expires_at,
            },
        );

        Ok(token)
    }
}
