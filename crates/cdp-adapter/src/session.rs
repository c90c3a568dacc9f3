//! The shared browser session: one Chromium page driven over CDP.
//!
//! `CdpSession` owns the transport and a single page target. Raw CDP traffic is
//! translated into [`SessionEvent`]s and fanned out on a broadcast channel;
//! every subscriber sees every event in the order Chromium emitted it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::CdpConfig;
use crate::error::{AdapterError, AdapterErrorKind};
use crate::events::{DownloadBehavior, DownloadState, NetworkResponse, SessionEvent};
use crate::metrics;
use crate::transport::{CdpTransport, ChromiumTransport, CommandTarget, TransportEvent};

/// Capability surface the correlation layer needs from a browser session.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Subscribe to every event the session emits from now on.
    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;

    /// Start a navigation. Returning does not mean any response event has fired.
    async fn goto(&self, url: &str) -> Result<(), AdapterError>;

    async fn response_body(&self, response: &NetworkResponse) -> Result<String, AdapterError>;

    async fn set_download_behavior(&self, behavior: &DownloadBehavior)
        -> Result<(), AdapterError>;

    /// Evaluate a script in the page and return its value.
    async fn evaluate(&self, expression: &str) -> Result<Value, AdapterError>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct PageSlot {
    target_id: Option<String>,
    session_id: Option<String>,
}

#[derive(Clone, Debug, Default)]
struct InflightRequest {
    method: Option<String>,
    url: Option<String>,
    status: Option<i64>,
    mime_type: Option<String>,
}

pub struct CdpSession {
    cfg: CdpConfig,
    transport: Arc<dyn CdpTransport>,
    bus: broadcast::Sender<SessionEvent>,
    page: watch::Sender<PageSlot>,
    requests: DashMap<String, InflightRequest>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl CdpSession {
    pub fn new(cfg: CdpConfig) -> Self {
        let transport: Arc<dyn CdpTransport> = Arc::new(ChromiumTransport::new(cfg.clone()));
        Self::with_transport(cfg, transport)
    }

    pub fn with_transport(cfg: CdpConfig, transport: Arc<dyn CdpTransport>) -> Self {
        let (bus, _) = broadcast::channel(cfg.event_buffer.max(16));
        let (page, _) = watch::channel(PageSlot::default());
        Self {
            cfg,
            transport,
            bus,
            page,
            requests: DashMap::new(),
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Connect, open the working page and enable the domains the session relies on.
    pub async fn start(self: Arc<Self>) -> Result<(), AdapterError> {
        {
            let mut tasks = self.tasks.lock().await;
            if !tasks.is_empty() {
                return Ok(());
            }
            self.transport.start().await?;
            tasks.push(tokio::spawn(Arc::clone(&self).event_loop()));
        }

        let created = self
            .send_command(
                CommandTarget::Browser,
                "Target.createTarget",
                json!({ "url": "about:blank" }),
            )
            .await?;
        let target_id = created
            .get("targetId")
            .and_then(Value::as_str)
            .ok_or_else(|| AdapterError::internal("createTarget returned no targetId"))?
            .to_string();
        self.page.send_modify(|slot| {
            if slot.session_id.is_none() {
                slot.target_id = Some(target_id.clone());
            }
        });

        let session_id = self.wait_for_page_session().await?;
        info!(target: "cdp-session", %target_id, %session_id, "page attached");

        for domain in ["Page.enable", "Network.enable"] {
            self.page_command(domain, json!({})).await?;
        }
        Ok(())
    }

    /// Best-effort browser close followed by stopping the event loop.
    pub async fn close(&self) {
        if let Err(err) = self
            .send_command(CommandTarget::Browser, "Browser.close", json!({}))
            .await
        {
            debug!(target: "cdp-session", ?err, "Browser.close failed");
        }
        self.shutdown().await;
    }

    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let mut tasks = self.tasks.lock().await;
        while let Some(handle) = tasks.pop() {
            let _ = handle.await;
        }
    }

    pub fn page_session(&self) -> Option<String> {
        self.page.borrow().session_id.clone()
    }

    async fn wait_for_page_session(&self) -> Result<String, AdapterError> {
        let mut rx = self.page.subscribe();
        let wait = Duration::from_millis(self.cfg.attach_timeout_ms);
        let attached = tokio::time::timeout(wait, rx.wait_for(|slot| slot.session_id.is_some()))
            .await
            .map_err(|_| {
                AdapterError::new(AdapterErrorKind::NotAttached)
                    .with_hint(format!("page did not attach within {wait:?}"))
            })?
            .map_err(|_| AdapterError::internal("page watch closed"))?;
        attached
            .session_id
            .clone()
            .ok_or_else(|| AdapterError::new(AdapterErrorKind::NotAttached))
    }

    async fn event_loop(self: Arc<Self>) {
        const MIN_BACKOFF: Duration = Duration::from_millis(100);
        const MAX_BACKOFF: Duration = Duration::from_secs(5);
        let mut backoff = MIN_BACKOFF;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                event = self.transport.next_event() => match event {
                    Some(event) => {
                        backoff = MIN_BACKOFF;
                        if let Err(err) = self.process_event(event) {
                            warn!(target: "cdp-session", ?err, "failed to translate cdp event");
                        }
                    }
                    None => {
                        if self.shutdown.is_cancelled() {
                            break;
                        }
                        self.handle_disconnect();
                        if let Err(err) = self.transport.start().await {
                            warn!(target: "cdp-session", ?err, "transport restart failed");
                        }
                        sleep(backoff).await;
                        backoff = (backoff + MIN_BACKOFF).min(MAX_BACKOFF);
                    }
                }
            }
        }
        debug!(target: "cdp-session", "event loop exiting");
    }

    fn handle_disconnect(&self) {
        warn!(target: "cdp-session", "transport stream ended; page session reset");
        self.requests.clear();
        self.page.send_replace(PageSlot::default());
    }

    fn process_event(&self, event: TransportEvent) -> Result<(), AdapterError> {
        metrics::record_cdp_event();
        match event.method.as_str() {
            "Target.attachedToTarget" => self.on_attached(event.params),
            "Target.detachedFromTarget" => self.on_detached(event.params),
            "Network.requestWillBeSent" => self.on_request(event.params),
            "Network.responseReceived" => self.on_response(event.params),
            "Network.loadingFinished" => self.on_finished(event.params),
            "Network.loadingFailed" => self.on_failed(event.params),
            "Browser.downloadWillBegin" => self.on_download_begin(event.params),
            "Browser.downloadProgress" => self.on_download_progress(event.params),
            other => {
                debug!(target: "cdp-session", method = %other, "unhandled cdp event");
                Ok(())
            }
        }
    }

    fn on_attached(&self, params: Value) -> Result<(), AdapterError> {
        let payload: AttachedToTargetParams = serde_json::from_value(params)?;
        if payload.target_info.target_type != "page" {
            return Ok(());
        }
        let target_id = payload.target_info.target_id;
        let session_id = payload.session_id;
        self.page.send_if_modified(|slot| {
            let ours = slot
                .target_id
                .as_deref()
                .map_or(true, |expected| expected == target_id);
            if !ours || slot.session_id.is_some() {
                return false;
            }
            slot.target_id = Some(target_id.clone());
            slot.session_id = Some(session_id.clone());
            true
        });
        Ok(())
    }

    fn on_detached(&self, params: Value) -> Result<(), AdapterError> {
        let payload: DetachedFromTargetParams = serde_json::from_value(params)?;
        self.page.send_if_modified(|slot| {
            if slot.session_id.as_deref() == Some(payload.session_id.as_str()) {
                warn!(target: "cdp-session", session = %payload.session_id, "page detached");
                slot.session_id = None;
                true
            } else {
                false
            }
        });
        Ok(())
    }

    fn on_request(&self, params: Value) -> Result<(), AdapterError> {
        let payload: RequestWillBeSentParams = serde_json::from_value(params)?;
        let mut entry = self.requests.entry(payload.request_id).or_default();
        entry.method = Some(payload.request.method);
        entry.url = Some(payload.request.url);
        Ok(())
    }

    fn on_response(&self, params: Value) -> Result<(), AdapterError> {
        let payload: ResponseReceivedParams = serde_json::from_value(params)?;
        let mut entry = self.requests.entry(payload.request_id).or_default();
        entry.url = Some(payload.response.url);
        entry.status = Some(payload.response.status);
        entry.mime_type = payload.response.mime_type;
        Ok(())
    }

    fn on_finished(&self, params: Value) -> Result<(), AdapterError> {
        let payload: RequestIdParams = serde_json::from_value(params)?;
        let Some((request_id, request)) = self.requests.remove(&payload.request_id) else {
            return Ok(());
        };
        let (Some(url), Some(status)) = (request.url, request.status) else {
            return Ok(());
        };
        metrics::record_response();
        self.publish(SessionEvent::Response(NetworkResponse {
            request_id,
            url,
            method: request.method.unwrap_or_default(),
            status,
            mime_type: request.mime_type,
        }));
        Ok(())
    }

    fn on_failed(&self, params: Value) -> Result<(), AdapterError> {
        let payload: RequestIdParams = serde_json::from_value(params)?;
        self.requests.remove(&payload.request_id);
        Ok(())
    }

    fn on_download_begin(&self, params: Value) -> Result<(), AdapterError> {
        let payload: DownloadWillBeginParams = serde_json::from_value(params)?;
        metrics::record_download_event();
        self.publish(SessionEvent::DownloadWillBegin {
            guid: payload.guid,
            url: payload.url,
            suggested_filename: payload.suggested_filename,
        });
        Ok(())
    }

    fn on_download_progress(&self, params: Value) -> Result<(), AdapterError> {
        let payload: DownloadProgressParams = serde_json::from_value(params)?;
        metrics::record_download_event();
        self.publish(SessionEvent::DownloadProgress {
            guid: payload.guid,
            state: payload.state,
            error: payload.error,
            received_bytes: payload.received_bytes,
            total_bytes: payload.total_bytes,
        });
        Ok(())
    }

    fn publish(&self, event: SessionEvent) {
        // no subscribers yet is not an error
        let _ = self.bus.send(event);
    }

    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError> {
        let started = Instant::now();
        let result = self.transport.send_command(target, method, params).await;
        metrics::record_command(method, started.elapsed(), result.is_ok());
        result
    }

    async fn page_command(&self, method: &str, params: Value) -> Result<Value, AdapterError> {
        let session = self.page_session().ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::NotAttached).with_hint(method.to_string())
        })?;
        self.send_command(CommandTarget::Session(session), method, params)
            .await
    }
}

#[async_trait]
impl BrowserSession for CdpSession {
    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.bus.subscribe()
    }

    async fn goto(&self, url: &str) -> Result<(), AdapterError> {
        let result = self.page_command("Page.navigate", json!({ "url": url })).await?;
        if let Some(error_text) = result.get("errorText").and_then(Value::as_str) {
            return Err(AdapterError::new(AdapterErrorKind::CdpIo)
                .with_hint(format!("navigation to {url} failed: {error_text}")));
        }
        Ok(())
    }

    async fn response_body(&self, response: &NetworkResponse) -> Result<String, AdapterError> {
        let result = self
            .page_command(
                "Network.getResponseBody",
                json!({ "requestId": response.request_id }),
            )
            .await?;
        let body: ResponseBodyResult = serde_json::from_value(result)?;
        if !body.base64_encoded {
            return Ok(body.body);
        }
        let bytes = STANDARD
            .decode(body.body.as_bytes())
            .map_err(|err| AdapterError::internal(format!("invalid base64 body: {err}")))?;
        String::from_utf8(bytes)
            .map_err(|err| AdapterError::internal(format!("response body is not utf-8: {err}")))
    }

    async fn set_download_behavior(
        &self,
        behavior: &DownloadBehavior,
    ) -> Result<(), AdapterError> {
        self.send_command(
            CommandTarget::Browser,
            "Browser.setDownloadBehavior",
            serde_json::to_value(behavior)?,
        )
        .await
        .map(|_| ())
    }

    async fn evaluate(&self, expression: &str) -> Result<Value, AdapterError> {
        let result = self
            .page_command(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "awaitPromise": true,
                    "returnByValue": true,
                    "userGesture": true,
                }),
            )
            .await?;
        if let Some(details) = result.get("exceptionDetails") {
            let text = details
                .pointer("/exception/description")
                .or_else(|| details.get("text"))
                .and_then(Value::as_str)
                .unwrap_or("script threw");
            return Err(AdapterError::new(AdapterErrorKind::Evaluation)
                .with_hint(text.to_string())
                .with_data(details.clone()));
        }
        Ok(result
            .pointer("/result/value")
            .cloned()
            .unwrap_or(Value::Null))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttachedToTargetParams {
    session_id: String,
    target_info: TargetInfoPayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetachedFromTargetParams {
    session_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetInfoPayload {
    target_id: String,
    #[serde(rename = "type")]
    target_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestWillBeSentParams {
    request_id: String,
    request: RequestPayload,
}

#[derive(Debug, Deserialize)]
struct RequestPayload {
    url: String,
    method: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseReceivedParams {
    request_id: String,
    response: ResponsePayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePayload {
    url: String,
    status: i64,
    mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestIdParams {
    request_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DownloadWillBeginParams {
    guid: String,
    #[serde(default)]
    url: String,
    suggested_filename: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DownloadProgressParams {
    guid: String,
    state: DownloadState,
    error: Option<String>,
    received_bytes: Option<f64>,
    total_bytes: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseBodyResult {
    body: String,
    #[serde(default)]
    base64_encoded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    struct MockTransport {
        starts: AtomicUsize,
        rx: Mutex<mpsc::Receiver<TransportEvent>>,
        commands: Mutex<Vec<(CommandTarget, String, Value)>>,
        responses: Mutex<HashMap<String, VecDeque<Value>>>,
    }

    impl MockTransport {
        fn new_pair() -> (Arc<Self>, mpsc::Sender<TransportEvent>) {
            let (tx, rx) = mpsc::channel(32);
            (
                Arc::new(Self {
                    starts: AtomicUsize::new(0),
                    rx: Mutex::new(rx),
                    commands: Mutex::new(Vec::new()),
                    responses: Mutex::new(HashMap::new()),
                }),
                tx,
            )
        }

        async fn respond(&self, method: &str, value: Value) {
            self.responses
                .lock()
                .await
                .entry(method.to_string())
                .or_default()
                .push_back(value);
        }

        async fn commands(&self) -> Vec<(CommandTarget, String, Value)> {
            self.commands.lock().await.clone()
        }
    }

    #[async_trait]
    impl CdpTransport for MockTransport {
        async fn start(&self) -> Result<(), AdapterError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn next_event(&self) -> Option<TransportEvent> {
            let mut guard = self.rx.lock().await;
            guard.recv().await
        }

        async fn send_command(
            &self,
            target: CommandTarget,
            method: &str,
            params: Value,
        ) -> Result<Value, AdapterError> {
            self.commands
                .lock()
                .await
                .push((target, method.to_string(), params));
            Ok(self
                .responses
                .lock()
                .await
                .get_mut(method)
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(|| json!({})))
        }
    }

    fn event(method: &str, params: Value) -> TransportEvent {
        TransportEvent {
            method: method.to_string(),
            params,
            session_id: None,
        }
    }

    async fn started_session() -> (
        Arc<CdpSession>,
        Arc<MockTransport>,
        mpsc::Sender<TransportEvent>,
    ) {
        let (transport, tx) = MockTransport::new_pair();
        transport
            .respond("Target.createTarget", json!({ "targetId": "T1" }))
            .await;
        tx.send(event(
            "Target.attachedToTarget",
            json!({
                "sessionId": "S1",
                "targetInfo": { "targetId": "T1", "type": "page" }
            }),
        ))
        .await
        .unwrap();
        let session = Arc::new(CdpSession::with_transport(
            CdpConfig::default(),
            transport.clone(),
        ));
        Arc::clone(&session).start().await.expect("session starts");
        (session, transport, tx)
    }

    #[tokio::test]
    async fn start_attaches_page_and_enables_domains() {
        let (session, transport, _tx) = started_session().await;
        assert_eq!(session.page_session().as_deref(), Some("S1"));
        assert_eq!(transport.starts.load(Ordering::SeqCst), 1);

        let commands = transport.commands().await;
        let methods: Vec<_> = commands.iter().map(|(_, m, _)| m.as_str()).collect();
        assert_eq!(
            methods,
            vec!["Target.createTarget", "Page.enable", "Network.enable"]
        );
        assert_eq!(commands[1].0, CommandTarget::Session("S1".into()));
        session.shutdown().await;
    }

    #[tokio::test]
    async fn start_fails_when_page_never_attaches() {
        let (transport, _tx) = MockTransport::new_pair();
        transport
            .respond("Target.createTarget", json!({ "targetId": "T9" }))
            .await;
        let cfg = CdpConfig {
            attach_timeout_ms: 50,
            ..CdpConfig::default()
        };
        let session = Arc::new(CdpSession::with_transport(cfg, transport));
        let err = Arc::clone(&session).start().await.unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::NotAttached);
        session.shutdown().await;
    }

    #[tokio::test]
    async fn response_is_published_once_loading_finishes() {
        let (session, _transport, tx) = started_session().await;
        let mut events = session.subscribe();

        tx.send(event(
            "Network.requestWillBeSent",
            json!({
                "requestId": "R1",
                "request": { "url": "https://x/rest/thread/abc?limit=100", "method": "GET" }
            }),
        ))
        .await
        .unwrap();
        tx.send(event(
            "Network.responseReceived",
            json!({
                "requestId": "R1",
                "response": {
                    "url": "https://x/rest/thread/abc?limit=100",
                    "status": 200,
                    "mimeType": "application/json"
                }
            }),
        ))
        .await
        .unwrap();
        tx.send(event("Network.loadingFinished", json!({ "requestId": "R1" })))
            .await
            .unwrap();

        let received = timeout(Duration::from_secs(1), events.recv())
            .await
            .expect("event in time")
            .expect("bus open");
        assert_eq!(
            received,
            SessionEvent::Response(NetworkResponse {
                request_id: "R1".into(),
                url: "https://x/rest/thread/abc?limit=100".into(),
                method: "GET".into(),
                status: 200,
                mime_type: Some("application/json".into()),
            })
        );
        session.shutdown().await;
    }

    #[tokio::test]
    async fn failed_requests_are_dropped() {
        let (session, _transport, tx) = started_session().await;
        let mut events = session.subscribe();

        tx.send(event(
            "Network.responseReceived",
            json!({ "requestId": "R2", "response": { "url": "https://x/a", "status": 500 } }),
        ))
        .await
        .unwrap();
        tx.send(event("Network.loadingFailed", json!({ "requestId": "R2" })))
            .await
            .unwrap();
        tx.send(event("Network.loadingFinished", json!({ "requestId": "R2" })))
            .await
            .unwrap();

        assert!(timeout(Duration::from_millis(100), events.recv())
            .await
            .is_err());
        session.shutdown().await;
    }

    #[tokio::test]
    async fn download_events_are_translated() {
        let (session, _transport, tx) = started_session().await;
        let mut events = session.subscribe();

        tx.send(event(
            "Browser.downloadWillBegin",
            json!({
                "frameId": "F",
                "guid": "G1",
                "url": "blob:https://x/1",
                "suggestedFilename": "thread.md"
            }),
        ))
        .await
        .unwrap();
        tx.send(event(
            "Browser.downloadProgress",
            json!({
                "guid": "G1",
                "totalBytes": 10.0,
                "receivedBytes": 10.0,
                "state": "completed"
            }),
        ))
        .await
        .unwrap();

        let first = timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            first,
            SessionEvent::DownloadWillBegin {
                guid: "G1".into(),
                url: "blob:https://x/1".into(),
                suggested_filename: "thread.md".into(),
            }
        );
        let second = timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        match second {
            SessionEvent::DownloadProgress { guid, state, error, .. } => {
                assert_eq!(guid, "G1");
                assert_eq!(state, DownloadState::Completed);
                assert!(error.is_none());
            }
            other => panic!("unexpected event {other:?}"),
        }
        session.shutdown().await;
    }

    #[tokio::test]
    async fn response_body_decodes_base64() {
        let (session, transport, _tx) = started_session().await;
        transport
            .respond(
                "Network.getResponseBody",
                json!({ "body": STANDARD.encode("{\"a\":1}"), "base64Encoded": true }),
            )
            .await;
        let response = NetworkResponse {
            request_id: "R1".into(),
            url: "https://x".into(),
            method: "GET".into(),
            status: 200,
            mime_type: None,
        };
        let body = session.response_body(&response).await.unwrap();
        assert_eq!(body, "{\"a\":1}");

        let commands = transport.commands().await;
        let (target, method, params) = commands.last().unwrap();
        assert_eq!(method, "Network.getResponseBody");
        assert_eq!(target, &CommandTarget::Session("S1".into()));
        assert_eq!(params, &json!({ "requestId": "R1" }));
        session.shutdown().await;
    }

    #[tokio::test]
    async fn evaluate_surfaces_script_exceptions() {
        let (session, transport, _tx) = started_session().await;
        transport
            .respond(
                "Runtime.evaluate",
                json!({
                    "result": { "type": "object" },
                    "exceptionDetails": { "text": "Uncaught", "exception": { "description": "boom" } }
                }),
            )
            .await;
        let err = session.evaluate("explode()").await.unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::Evaluation);
        assert_eq!(err.hint.as_deref(), Some("boom"));

        transport
            .respond("Runtime.evaluate", json!({ "result": { "value": 3 } }))
            .await;
        assert_eq!(session.evaluate("1 + 2").await.unwrap(), json!(3));
        session.shutdown().await;
    }

    #[tokio::test]
    async fn navigation_error_text_is_an_error() {
        let (session, transport, _tx) = started_session().await;
        transport
            .respond(
                "Page.navigate",
                json!({ "frameId": "F", "errorText": "net::ERR_NAME_NOT_RESOLVED" }),
            )
            .await;
        let err = session.goto("https://nowhere.invalid").await.unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::CdpIo);
        session.goto("https://example.com").await.unwrap();
        session.shutdown().await;
    }

    #[tokio::test]
    async fn download_behavior_targets_the_browser() {
        let (session, transport, _tx) = started_session().await;
        session
            .set_download_behavior(&DownloadBehavior::allow_into("/tmp/dl"))
            .await
            .unwrap();
        let commands = transport.commands().await;
        let (target, method, params) = commands.last().unwrap();
        assert_eq!(target, &CommandTarget::Browser);
        assert_eq!(method, "Browser.setDownloadBehavior");
        assert_eq!(params["downloadPath"], json!("/tmp/dl"));
        session.shutdown().await;
    }
}
