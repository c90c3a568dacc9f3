//! Correlates network responses on the shared session with the thread being loaded.

use std::sync::Arc;
use std::time::Duration;

use cdp_adapter::{BrowserSession, NetworkResponse, SessionEvent};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CorrelationError;
use crate::listener::ListenerHandle;
use crate::waiter::CorrelationWaiter;

/// Which responses carry a thread payload, and how to pull the thread id out of them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchRule {
    pub method: String,
    pub path_marker: String,
    pub query_marker: String,
    /// Identifier of the listing endpoint, which shares the path but is never a thread.
    pub sentinel: String,
}

impl Default for MatchRule {
    fn default() -> Self {
        Self {
            method: "GET".to_string(),
            path_marker: "/rest/thread/".to_string(),
            query_marker: "limit=100".to_string(),
            sentinel: "list_recent".to_string(),
        }
    }
}

impl MatchRule {
    /// Thread id carried by a response, if the response matches at all.
    pub fn correlation_key<'a>(&self, method: &str, url: &'a str) -> Option<&'a str> {
        if method != self.method || !url.contains(&self.query_marker) {
            return None;
        }
        let (_, rest) = url.split_once(self.path_marker.as_str())?;
        let id = rest.split_once('?').map_or(rest, |(id, _)| id);
        if id.is_empty() || id == self.sentinel {
            return None;
        }
        Some(id)
    }
}

/// A thread payload captured from a matching response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CapturedThread {
    pub id: String,
    pub payload: Value,
}

pub struct ResponseCorrelator {
    session: Arc<dyn BrowserSession>,
    rule: MatchRule,
    waiter: CorrelationWaiter<CapturedThread, CorrelationError>,
    wait_timeout: Option<Duration>,
}

impl ResponseCorrelator {
    pub fn new(session: Arc<dyn BrowserSession>, rule: MatchRule) -> Self {
        Self {
            session,
            rule,
            waiter: CorrelationWaiter::new(),
            wait_timeout: None,
        }
    }

    /// Bound every wait. Without it a wait lasts until a matching response shows up.
    pub fn with_wait_timeout(mut self, wait_timeout: Option<Duration>) -> Self {
        self.wait_timeout = wait_timeout;
        self
    }

    pub fn is_waiting(&self) -> bool {
        self.waiter.is_armed()
    }

    /// Subscribe to the session and resolve waits from matching responses.
    ///
    /// The subscription is taken before this returns, so no response emitted
    /// after the call is missed.
    pub fn spawn_listener(self: &Arc<Self>) -> ListenerHandle {
        let correlator = Arc::clone(self);
        let mut events = self.session.subscribe();
        let cancel = CancellationToken::new();
        let loop_token = cancel.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = loop_token.cancelled() => break,
                    received = events.recv() => match received {
                        Ok(SessionEvent::Response(response)) => {
                            correlator.on_response(response).await;
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(target: "correlator", skipped, "response listener lagged");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
            if correlator.waiter.abandon() {
                debug!(target: "correlator", "listener stopped with a wait still armed");
            }
        });
        ListenerHandle::new(cancel, task)
    }

    /// Navigate to `url` and wait for the thread payload the page requests.
    ///
    /// Only one load may be outstanding at a time; starting another supersedes it.
    pub async fn load_by_trigger(&self, url: &str) -> Result<CapturedThread, CorrelationError> {
        let wait = self.waiter.arm();
        if let Err(err) = self.session.goto(url).await {
            warn!(target: "correlator", %url, %err, "navigation failed");
            self.waiter.fail(CorrelationError::Navigation(err));
        }
        match self.wait_timeout {
            Some(limit) => match tokio::time::timeout(limit, wait).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    self.waiter.abandon();
                    Err(CorrelationError::TimedOut(limit))
                }
            },
            None => wait.await,
        }
    }

    async fn on_response(&self, response: NetworkResponse) {
        let Some(id) = self.rule.correlation_key(&response.method, &response.url) else {
            return;
        };
        let id = id.to_string();
        let body = match self.session.response_body(&response).await {
            Ok(body) => body,
            Err(err) => {
                warn!(target: "correlator", thread = %id, %err, "could not read response body");
                return;
            }
        };
        let payload = match serde_json::from_str::<Value>(&body) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(target: "correlator", thread = %id, %err, "response body is not json; dropped");
                return;
            }
        };
        info!(target: "correlator", thread = %id, "captured thread payload");
        if !self.waiter.fulfill(CapturedThread { id, payload }) {
            debug!(target: "correlator", "matching response arrived with no wait armed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_thread_id() {
        let rule = MatchRule::default();
        assert_eq!(
            rule.correlation_key("GET", "https://x/rest/thread/abc-123?limit=100&offset=0"),
            Some("abc-123")
        );
    }

    #[test]
    fn rejects_non_matching_requests() {
        let rule = MatchRule::default();
        assert_eq!(
            rule.correlation_key("POST", "https://x/rest/thread/abc?limit=100"),
            None
        );
        assert_eq!(
            rule.correlation_key("GET", "https://x/rest/thread/abc?limit=20"),
            None
        );
        assert_eq!(
            rule.correlation_key("GET", "https://x/rest/user/abc?limit=100"),
            None
        );
        assert_eq!(
            rule.correlation_key("GET", "https://x/rest/thread/?limit=100"),
            None
        );
    }

    #[test]
    fn sentinel_never_matches() {
        let rule = MatchRule::default();
        assert_eq!(
            rule.correlation_key("GET", "https://x/rest/thread/list_recent?limit=100"),
            None
        );
    }

    #[test]
    fn rule_deserializes_with_defaults() {
        let rule: MatchRule = serde_json::from_str(r#"{"query_marker": "limit=50"}"#).unwrap();
        assert_eq!(rule.query_marker, "limit=50");
        assert_eq!(rule.path_marker, "/rest/thread/");
    }
}
