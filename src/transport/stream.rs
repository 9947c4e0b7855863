// ! Session event stream
// !
// ! Module keeps the `GET /mcp/stream` connection open for the life of a
// ! session. A producer task reads and decodes the stream and reopens it
// ! after failures; a consumer task applies each event to the session,
// ! the correlator, or the notification handler, in arrival order.

use futures::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::{Client, Response, StatusCode};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::auth::AuthProvider;
use crate::client::correlator::RequestCorrelator;
use crate::client::session::{ClientSession, LoggingNotificationHandler, NotificationHandler};
use crate::core::error::{McpError, McpResult};
use crate::core::logging::{ErrorContext, ErrorLogger};
use crate::protocol::types::{InboundMessage, JsonRpcEnvelope};
use crate::transport::endpoint_url;
use crate::transport::http::apply_session_headers;
use crate::transport::sse::{ParsedFrame, SseDecoder, StreamEvent};

/// Path of the event stream endpoint, relative to the base URL
pub const STREAM_PATH: &str = "/mcp/stream";

/// Delay before each reconnect attempt
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// How the stream is reopened after it fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Fixed wait before every attempt
    pub delay: Duration,
    /// Consecutive failed attempts before giving up; `None` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: DEFAULT_RECONNECT_DELAY,
            max_attempts: None,
        }
    }
}

/// Counters for one stream handle
#[derive(Debug, Default)]
pub struct StreamStats {
    connections: AtomicU64,
    events_received: AtomicU64,
    reconnect_attempts: AtomicU64,
}

impl StreamStats {
    /// Successful opens, including the first one
    pub fn connections(&self) -> u64 {
        self.connections.load(Ordering::Relaxed)
    }

    /// Recognized events decoded from the stream
    pub fn events_received(&self) -> u64 {
        self.events_received.load(Ordering::Relaxed)
    }

    /// Reconnect attempts, successful or not
    pub fn reconnect_attempts(&self) -> u64 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }
}

/// Applies stream events to the session, correlator and notification handler
#[derive(Clone)]
pub struct EventDispatcher {
    session: Arc<ClientSession>,
    correlator: Arc<RequestCorrelator>,
    handler: Arc<RwLock<Arc<dyn NotificationHandler>>>,
}

impl EventDispatcher {
    /// Dispatcher that logs notifications until a handler is installed
    pub fn new(session: Arc<ClientSession>, correlator: Arc<RequestCorrelator>) -> Self {
        Self {
            session,
            correlator,
            handler: Arc::new(RwLock::new(Arc::new(LoggingNotificationHandler))),
        }
    }

    /// Replace the notification handler; takes effect for the next event
    pub async fn set_notification_handler(&self, handler: Arc<dyn NotificationHandler>) {
        *self.handler.write().await = handler;
    }

    /// Apply one stream event
    pub async fn dispatch(&self, event: StreamEvent) {
        match event {
            StreamEvent::Connected { session_id } => {
                match self.session.set_session_id(session_id.clone()).await {
                    Some(previous) if !previous.is_empty() && previous != session_id => {
                        info!(%previous, %session_id, "server assigned a new session id");
                    }
                    Some(_) => info!(%session_id, "session established"),
                    None => debug!(%session_id, "connected event without an active session"),
                }
            }
            StreamEvent::Message(envelope) => self.dispatch_envelope(envelope).await,
            StreamEvent::Heartbeat => trace!("stream heartbeat"),
        }
    }

    /// Route a response to its pending request, or a notification to the
    /// handler
    pub async fn dispatch_envelope(&self, envelope: JsonRpcEnvelope) {
        match InboundMessage::from(envelope) {
            InboundMessage::Response { id, outcome } => {
                let delivered = match outcome {
                    Ok(result) => self.correlator.resolve(&id, result),
                    Err(error) => self.correlator.reject(&id, error.into()),
                };
                if !delivered {
                    debug!(request_id = %id, "stream response has no pending request");
                }
            }
            InboundMessage::Notification(notification) => {
                let handler = self.handler.read().await.clone();
                handler.handle_notification(notification);
            }
            InboundMessage::ServerRequest(request) => {
                warn!(
                    method = %request.method,
                    request_id = %request.id,
                    "ignoring server-initiated request"
                );
            }
            InboundMessage::Invalid(envelope) => {
                warn!(?envelope, "discarding message with neither id nor method");
            }
        }
    }

    /// Tear the session down after an unrecoverable stream failure
    pub async fn fail_session(&self, error: McpError) {
        let session_id = self.session.session_id().await.unwrap_or_default();
        ErrorLogger::log_error(
            &error,
            ErrorContext::new("event_stream")
                .with_transport("sse")
                .with_session_id(session_id),
        );

        self.session.clear().await;
        let rejected = self.correlator.reject_all(error);
        error!(rejected, "event stream lost; session disconnected");
    }
}

struct StreamContext {
    client: Client,
    endpoint: Url,
    scope: String,
    session: Arc<ClientSession>,
    auth: Arc<dyn AuthProvider>,
    policy: ReconnectPolicy,
}

impl StreamContext {
    /// Open the stream with the current credentials, renewing the token once
    /// on 401
    async fn open_stream(&self) -> McpResult<Response> {
        let response = self.get().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Self::check(response);
        }

        warn!("event stream rejected with 401; renewing access token");
        self.session
            .refresh_token(self.auth.as_ref(), &self.scope)
            .await?;

        let retry = self.get().await?;
        if retry.status() == StatusCode::UNAUTHORIZED {
            return Err(McpError::authentication(
                "stream endpoint rejected renewed token",
            ));
        }
        Self::check(retry)
    }

    async fn get(&self) -> McpResult<Response> {
        let credentials = self.session.credentials().await;
        let builder = self
            .client
            .get(self.endpoint.clone())
            .header(ACCEPT, "text/event-stream");

        apply_session_headers(builder, credentials.as_ref())
            .send()
            .await
            .map_err(|e| McpError::transport(format!("stream request failed: {e}")))
    }

    fn check(response: Response) -> McpResult<Response> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(McpError::transport(format!("stream endpoint returned {status}")))
        }
    }
}

/// Opens the event stream and runs its reconnect loop
pub struct StreamManager {
    context: Arc<StreamContext>,
    dispatcher: EventDispatcher,
}

impl StreamManager {
    pub fn new(
        client: Client,
        base_url: &Url,
        scope: impl Into<String>,
        session: Arc<ClientSession>,
        auth: Arc<dyn AuthProvider>,
        dispatcher: EventDispatcher,
        policy: ReconnectPolicy,
    ) -> McpResult<Self> {
        Ok(Self {
            context: Arc::new(StreamContext {
                client,
                endpoint: endpoint_url(base_url, STREAM_PATH)?,
                scope: scope.into(),
                session,
                auth,
                policy,
            }),
            dispatcher,
        })
    }

    /// Full stream endpoint URL
    pub fn endpoint(&self) -> &Url {
        &self.context.endpoint
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.context.policy
    }

    /// Open the stream and start the background tasks.
    ///
    /// Failure to open the first connection is returned to the caller;
    /// later failures are handled by the reconnect loop.
    pub async fn open(&self) -> McpResult<StreamHandle> {
        let response = self.context.open_stream().await?;
        info!(endpoint = %self.context.endpoint, "event stream opened");

        let stats = Arc::new(StreamStats::default());
        stats.connections.fetch_add(1, Ordering::Relaxed);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let producer = tokio::spawn(run_producer(
            Arc::clone(&self.context),
            self.dispatcher.clone(),
            Arc::clone(&stats),
            response,
            event_tx,
            shutdown_rx,
        ));
        let consumer = tokio::spawn(run_consumer(self.dispatcher.clone(), event_rx));

        Ok(StreamHandle {
            shutdown: shutdown_tx,
            producer,
            consumer,
            stats,
        })
    }
}

impl std::fmt::Debug for StreamManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamManager")
            .field("endpoint", &self.context.endpoint.as_str())
            .field("policy", &self.context.policy)
            .finish_non_exhaustive()
    }
}

/// Running stream. Dropping the handle also stops the tasks.
pub struct StreamHandle {
    shutdown: watch::Sender<bool>,
    producer: JoinHandle<()>,
    consumer: JoinHandle<()>,
    stats: Arc<StreamStats>,
}

impl StreamHandle {
    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    /// Whether the producer is still reading or reconnecting
    pub fn is_running(&self) -> bool {
        !self.producer.is_finished()
    }

    /// Stop reconnecting, close the connection and wait for both tasks
    pub async fn close(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.producer.await {
            warn!("stream producer ended abnormally: {e}");
        }
        if let Err(e) = self.consumer.await {
            warn!("stream consumer ended abnormally: {e}");
        }
        debug!("event stream closed");
    }
}

enum StreamEnd {
    ConsumerClosed,
    Failed(McpError),
}

enum Reconnect {
    Opened(Response),
    Shutdown,
    GaveUp(McpError),
}

async fn run_producer(
    context: Arc<StreamContext>,
    dispatcher: EventDispatcher,
    stats: Arc<StreamStats>,
    mut response: Response,
    events: mpsc::UnboundedSender<StreamEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let ended = tokio::select! {
            _ = shutdown.changed() => return,
            ended = pump(response, &events, &stats) => ended,
        };

        let error = match ended {
            StreamEnd::ConsumerClosed => return,
            StreamEnd::Failed(error) => error,
        };
        warn!(
            %error,
            delay_ms = context.policy.delay.as_millis() as u64,
            "event stream interrupted; reconnecting"
        );

        response = match reconnect(&context, &stats, &mut shutdown).await {
            Reconnect::Opened(response) => response,
            Reconnect::Shutdown => return,
            Reconnect::GaveUp(error) => {
                dispatcher.fail_session(error).await;
                return;
            }
        };
    }
}

async fn reconnect(
    context: &StreamContext,
    stats: &StreamStats,
    shutdown: &mut watch::Receiver<bool>,
) -> Reconnect {
    let max_attempts = context.policy.max_attempts;
    let mut attempt = 0u32;

    loop {
        if max_attempts.is_some_and(|max| attempt >= max) {
            return Reconnect::GaveUp(McpError::transport(format!(
                "event stream could not be re-established after {attempt} attempts"
            )));
        }

        tokio::select! {
            _ = shutdown.changed() => return Reconnect::Shutdown,
            _ = tokio::time::sleep(context.policy.delay) => {}
        }

        attempt += 1;
        stats.reconnect_attempts.fetch_add(1, Ordering::Relaxed);

        let result = tokio::select! {
            _ = shutdown.changed() => return Reconnect::Shutdown,
            result = context.open_stream() => result,
        };

        let log_context = ErrorContext::new("stream_reconnect").with_transport("sse");
        match result {
            Ok(response) => {
                stats.connections.fetch_add(1, Ordering::Relaxed);
                ErrorLogger::log_reconnect_success(attempt, log_context);
                return Reconnect::Opened(response);
            }
            Err(error @ McpError::Authentication(_)) => return Reconnect::GaveUp(error),
            Err(error) => {
                ErrorLogger::log_reconnect_attempt(&error, attempt, max_attempts, log_context)
            }
        }
    }
}

async fn pump(
    response: Response,
    events: &mpsc::UnboundedSender<StreamEvent>,
    stats: &StreamStats,
) -> StreamEnd {
    let mut decoder = SseDecoder::new();
    let mut body = response.bytes_stream();

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                return StreamEnd::Failed(McpError::transport(format!(
                    "event stream read failed: {e}"
                )));
            }
        };

        for frame in decoder.push(&chunk) {
            match ParsedFrame::parse(&frame) {
                Ok(ParsedFrame::Event(event)) => {
                    stats.events_received.fetch_add(1, Ordering::Relaxed);
                    if events.send(event).is_err() {
                        return StreamEnd::ConsumerClosed;
                    }
                }
                Ok(ParsedFrame::ServerError(message)) => {
                    return StreamEnd::Failed(McpError::transport(format!(
                        "server reported stream error: {message}"
                    )));
                }
                Ok(ParsedFrame::Ignored(name)) => {
                    debug!(event = %name, "ignoring unknown stream event");
                }
                Err(error) => warn!(%error, "discarding malformed stream frame"),
            }
        }
    }

    StreamEnd::Failed(McpError::transport("event stream closed by server"))
}

async fn run_consumer(
    dispatcher: EventDispatcher,
    mut events: mpsc::UnboundedReceiver<StreamEvent>,
) {
    while let Some(event) = events.recv().await {
        dispatcher.dispatch(event).await;
    }
    trace!("stream consumer finished");
}
