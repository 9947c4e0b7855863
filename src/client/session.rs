// ! Client session management
// !
// ! Module tracks the session lifecycle (state machine plus the credentials
// ! the server knows us by) and the handlers that receive server
// ! notifications.

use std::fmt;
use std::sync::Arc;
use tokio::sync::{RwLock, watch};
use tracing::{debug, info};

use crate::auth::{AuthProvider, TokenRequest};
use crate::core::error::{McpError, McpResult};
use crate::protocol::types::JsonRpcNotification;

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session; only `connect` is allowed
    Disconnected,
    /// Acquiring the initial access token
    Authenticating,
    /// Token acquired, `initialize` in flight
    Initializing,
    /// Initialized with the event stream open
    Connected,
}

impl SessionState {
    /// Whether the lifecycle permits moving from `self` to `next`
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Disconnected, Authenticating)
                | (Authenticating, Initializing)
                | (Authenticating, Disconnected)
                | (Initializing, Connected)
                | (Initializing, Disconnected)
                | (Connected, Disconnected)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Authenticating => "authenticating",
            SessionState::Initializing => "initializing",
            SessionState::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Credentials attached to every outbound request
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Session {
    /// Server-assigned id; empty until the stream's `connected` event
    pub session_id: String,
    /// Current bearer token
    pub access_token: String,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// Notification handler trait
pub trait NotificationHandler: Send + Sync {
    /// Handle a notification from the server
    fn handle_notification(&self, notification: JsonRpcNotification);
}

/// Default notification handler that logs notifications
pub struct LoggingNotificationHandler;

impl NotificationHandler for LoggingNotificationHandler {
    fn handle_notification(&self, notification: JsonRpcNotification) {
        tracing::info!(
            "Received notification: {} {:?}",
            notification.method,
            notification.params
        );
    }
}

/// Notification handler backed by a closure
pub struct CallbackNotificationHandler {
    callback: Box<dyn Fn(JsonRpcNotification) + Send + Sync>,
}

impl CallbackNotificationHandler {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(JsonRpcNotification) + Send + Sync + 'static,
    {
        Self {
            callback: Box::new(callback),
        }
    }
}

impl NotificationHandler for CallbackNotificationHandler {
    fn handle_notification(&self, notification: JsonRpcNotification) {
        (self.callback)(notification)
    }
}

/// Shared session record: lifecycle state plus credentials.
///
/// The command transport reads credentials from here on every send, the
/// stream writes the server-assigned session id, and either channel may
/// swap in a refreshed token.
pub struct ClientSession {
    session: RwLock<Option<Session>>,
    state_tx: watch::Sender<SessionState>,
    /// Kept so the channel stays open with no external subscribers
    _state_rx: watch::Receiver<SessionState>,
}

impl ClientSession {
    pub fn new() -> Arc<Self> {
        let (state_tx, state_rx) = watch::channel(SessionState::Disconnected);
        Arc::new(Self {
            session: RwLock::new(None),
            state_tx,
            _state_rx: state_rx,
        })
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Subscribe to lifecycle state changes
    pub fn subscribe_state_changes(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Move to `next`, failing with [`McpError::Connection`] when the
    /// lifecycle does not allow it. Check and update are atomic.
    pub async fn transition(&self, next: SessionState) -> McpResult<()> {
        let mut from = next;
        let changed = self.state_tx.send_if_modified(|state| {
            from = *state;
            if state.can_transition_to(next) {
                *state = next;
                true
            } else {
                false
            }
        });

        if !changed {
            return Err(McpError::connection(format!(
                "cannot move session from {from} to {next}"
            )));
        }

        debug!(%from, to = %next, "session state changed");
        Ok(())
    }

    /// Start a session with a fresh token and no server-assigned id yet
    pub async fn begin(&self, access_token: impl Into<String>) {
        *self.session.write().await = Some(Session {
            session_id: String::new(),
            access_token: access_token.into(),
        });
    }

    /// Replace the access token; no-op without a session
    pub async fn set_access_token(&self, access_token: impl Into<String>) -> bool {
        match self.session.write().await.as_mut() {
            Some(session) => {
                session.access_token = access_token.into();
                true
            }
            None => false,
        }
    }

    /// Record the server-assigned session id, returning the previous one.
    ///
    /// No-op without a session.
    pub async fn set_session_id(&self, session_id: impl Into<String>) -> Option<String> {
        let mut guard = self.session.write().await;
        let session = guard.as_mut()?;
        Some(std::mem::replace(&mut session.session_id, session_id.into()))
    }

    /// Server-assigned session id, if one has been received
    pub async fn session_id(&self) -> Option<String> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.session_id.clone())
            .filter(|id| !id.is_empty())
    }

    /// Snapshot of the current credentials
    pub async fn credentials(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    /// Force-renew the access token and store it in the session
    pub async fn refresh_token(&self, auth: &dyn AuthProvider, scope: &str) -> McpResult<String> {
        let token = auth
            .get_token(scope, TokenRequest::force_renew())
            .await
            .map_err(McpError::into_authentication)?;

        self.set_access_token(token.access_token.clone()).await;
        info!("access token refreshed");
        Ok(token.access_token)
    }

    /// Drop credentials and return to `Disconnected` from any state
    pub async fn clear(&self) {
        *self.session.write().await = None;
        self.state_tx.send_if_modified(|state| {
            let changed = *state != SessionState::Disconnected;
            *state = SessionState::Disconnected;
            changed
        });
    }
}

impl fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSession")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
