//! Request correlation
//!
//! Responses to commands can arrive on either channel: directly in the body
//! of the command POST, or later on the event stream. The correlator owns
//! one pending entry per outstanding request id and completes it at most
//! once, whichever path (or the deadline) gets there first.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::core::error::{McpError, McpResult};
use crate::protocol::types::RequestId;

/// Default time a request may stay pending
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const ID_SUFFIX_LEN: usize = 9;

type Completion = McpResult<Value>;

/// Table of in-flight requests keyed by request id
pub struct RequestCorrelator {
    pending: Mutex<HashMap<RequestId, oneshot::Sender<Completion>>>,
    timeout: Duration,
}

impl RequestCorrelator {
    /// Create a correlator whose entries expire after `timeout`
    pub fn new(timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            pending: Mutex::new(HashMap::new()),
            timeout,
        })
    }

    /// Timeout applied to newly registered requests
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Register a new request under a fresh id.
    ///
    /// The id is unique among currently pending requests.
    pub fn register(self: &Arc<Self>) -> PendingResponse {
        let (sender, receiver) = oneshot::channel();
        let deadline = Instant::now() + self.timeout;

        let id = {
            let mut pending = self.entries();
            let mut id = generate_request_id();
            while pending.contains_key(&id) {
                id = generate_request_id();
            }
            pending.insert(id.clone(), sender);
            id
        };

        debug!(request_id = %id, "registered pending request");
        PendingResponse {
            id,
            deadline,
            receiver,
            correlator: Arc::clone(self),
        }
    }

    /// Complete a pending request successfully.
    ///
    /// Returns `false` when no entry exists for `id` (already completed,
    /// timed out, or never registered).
    pub fn resolve(&self, id: &str, result: Value) -> bool {
        self.complete(id, Ok(result))
    }

    /// Complete a pending request with an error
    pub fn reject(&self, id: &str, error: McpError) -> bool {
        self.complete(id, Err(error))
    }

    /// Complete a pending request with either outcome
    pub fn complete(&self, id: &str, outcome: Completion) -> bool {
        let mut pending = self.entries();
        match pending.remove(id) {
            Some(sender) => {
                // Send while holding the lock so a racing deadline can always
                // observe the outcome once the entry is gone.
                let _ = sender.send(outcome);
                debug!(request_id = %id, "completed pending request");
                true
            }
            None => {
                debug!(request_id = %id, "no pending request for response; ignoring");
                false
            }
        }
    }

    /// Reject every pending request, returning how many were rejected
    pub fn reject_all(&self, error: McpError) -> usize {
        let drained: Vec<_> = self.entries().drain().collect();
        let count = drained.len();
        for (_, sender) in drained {
            let _ = sender.send(Err(error.clone()));
        }
        if count > 0 {
            debug!(count, "rejected all pending requests");
        }
        count
    }

    /// Number of requests awaiting completion
    pub fn pending_count(&self) -> usize {
        self.entries().len()
    }

    /// Whether `id` is still awaiting completion
    pub fn is_pending(&self, id: &str) -> bool {
        self.entries().contains_key(id)
    }

    fn remove(&self, id: &str) -> bool {
        self.entries().remove(id).is_some()
    }

    fn timeout_error(&self, id: &str) -> McpError {
        McpError::request_timeout(format!(
            "request {id} received no response within {}ms",
            self.timeout.as_millis()
        ))
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<RequestId, oneshot::Sender<Completion>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for RequestCorrelator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestCorrelator")
            .field("pending", &self.pending_count())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Handle for one registered request.
///
/// Dropping the handle without awaiting it removes the pending entry.
pub struct PendingResponse {
    id: RequestId,
    deadline: Instant,
    receiver: oneshot::Receiver<Completion>,
    correlator: Arc<RequestCorrelator>,
}

impl PendingResponse {
    /// Id the request must be sent with
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Instant after which the request times out
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Wait for the request to be resolved, rejected, or to time out
    pub async fn wait(mut self) -> McpResult<Value> {
        match tokio::time::timeout_at(self.deadline, &mut self.receiver).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(McpError::cancelled(format!(
                "request {} was dropped before completion",
                self.id
            ))),
            Err(_) => {
                if self.correlator.remove(&self.id) {
                    warn!(request_id = %self.id, "request timed out");
                    return Err(self.correlator.timeout_error(&self.id));
                }
                // Lost the race against a completion that was already sent
                match self.receiver.try_recv() {
                    Ok(outcome) => outcome,
                    Err(_) => Err(self.correlator.timeout_error(&self.id)),
                }
            }
        }
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        self.correlator.remove(&self.id);
    }
}

impl std::fmt::Debug for PendingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingResponse")
            .field("id", &self.id)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

/// Generate a request id: epoch milliseconds, a dash, and nine random
/// base-36 characters
pub fn generate_request_id() -> RequestId {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();

    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| std::char::from_digit(fastrand::u32(0..36), 36).unwrap_or('0'))
        .collect();

    format!("{millis}-{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn test_request_id_format() {
        let id = generate_request_id();
        let (millis, suffix) = id.split_once('-').unwrap();

        assert!(millis.parse::<u128>().is_ok());
        assert_eq!(suffix.len(), 9);
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[tokio::test]
    async fn test_resolve_completes_exactly_once() {
        let correlator = RequestCorrelator::new(DEFAULT_REQUEST_TIMEOUT);
        let pending = correlator.register();
        let id = pending.id().to_string();

        assert!(correlator.is_pending(&id));
        assert!(correlator.resolve(&id, json!({"tools": []})));
        assert!(!correlator.resolve(&id, json!({"tools": ["late"]})));
        assert!(!correlator.reject(&id, McpError::internal("late")));

        assert_eq!(pending.wait().await.unwrap(), json!({"tools": []}));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_reject_surfaces_error() {
        let correlator = RequestCorrelator::new(DEFAULT_REQUEST_TIMEOUT);
        let pending = correlator.register();
        let id = pending.id().to_string();

        correlator.reject(&id, McpError::server(None, "Tool not found: nope"));

        match pending.wait().await {
            Err(McpError::Server { message, .. }) => assert_eq!(message, "Tool not found: nope"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_id_is_ignored() {
        let correlator = RequestCorrelator::new(DEFAULT_REQUEST_TIMEOUT);
        assert!(!correlator.resolve("never-registered", Value::Null));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_removes_entry() {
        let correlator = RequestCorrelator::new(Duration::from_millis(200));
        let pending = correlator.register();
        let id = pending.id().to_string();

        let result = pending.wait().await;
        assert!(matches!(result, Err(McpError::RequestTimeout(_))));
        assert!(!correlator.is_pending(&id));

        // A response after the deadline finds nothing
        assert!(!correlator.resolve(&id, json!("late")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_before_deadline_wins() {
        let correlator = RequestCorrelator::new(Duration::from_millis(500));
        let pending = correlator.register();
        let id = pending.id().to_string();

        let resolver = Arc::clone(&correlator);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            resolver.resolve(&id, json!("ok"));
        });

        assert_eq!(pending.wait().await.unwrap(), json!("ok"));
    }

    #[tokio::test]
    async fn test_ids_unique_among_pending() {
        let correlator = RequestCorrelator::new(DEFAULT_REQUEST_TIMEOUT);
        let handles: Vec<_> = (0..1000).map(|_| correlator.register()).collect();

        let ids: HashSet<_> = handles.iter().map(|h| h.id().to_string()).collect();
        assert_eq!(ids.len(), 1000);
        assert_eq!(correlator.pending_count(), 1000);
    }

    #[tokio::test]
    async fn test_reject_all_fails_every_waiter() {
        let correlator = RequestCorrelator::new(DEFAULT_REQUEST_TIMEOUT);
        let first = correlator.register();
        let second = correlator.register();

        assert_eq!(correlator.reject_all(McpError::cancelled("session closed")), 2);
        assert_eq!(correlator.pending_count(), 0);

        assert!(matches!(first.wait().await, Err(McpError::Cancelled(_))));
        assert!(matches!(second.wait().await, Err(McpError::Cancelled(_))));
    }

    #[tokio::test]
    async fn test_dropping_handle_removes_entry() {
        let correlator = RequestCorrelator::new(DEFAULT_REQUEST_TIMEOUT);
        let pending = correlator.register();
        let id = pending.id().to_string();

        drop(pending);
        assert!(!correlator.is_pending(&id));
    }
}
