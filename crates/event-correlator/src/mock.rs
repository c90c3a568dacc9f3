//! Scriptable in-memory [`BrowserSession`] for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use cdp_adapter::{
    AdapterError, AdapterErrorKind, BrowserSession, DownloadBehavior, DownloadState,
    NetworkResponse, SessionEvent,
};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;

/// What one scripted `goto` or `evaluate` call does.
#[derive(Clone, Debug)]
pub enum Scripted {
    Emit(Vec<SessionEvent>),
    Fail(AdapterError),
}

pub struct MockSession {
    bus: broadcast::Sender<SessionEvent>,
    bodies: Mutex<HashMap<String, String>>,
    navigation_scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    evaluation_scripts: Mutex<VecDeque<Scripted>>,
    navigations: Mutex<Vec<String>>,
    evaluations: Mutex<Vec<String>>,
    download_behaviors: Mutex<Vec<DownloadBehavior>>,
}

impl MockSession {
    pub fn new() -> Arc<Self> {
        let (bus, _) = broadcast::channel(256);
        Arc::new(Self {
            bus,
            bodies: Mutex::new(HashMap::new()),
            navigation_scripts: Mutex::new(HashMap::new()),
            evaluation_scripts: Mutex::new(VecDeque::new()),
            navigations: Mutex::new(Vec::new()),
            evaluations: Mutex::new(Vec::new()),
            download_behaviors: Mutex::new(Vec::new()),
        })
    }

    /// Publish an event right away.
    pub fn emit(&self, event: SessionEvent) {
        let _ = self.bus.send(event);
    }

    /// Build a finished `GET` response and register the body it serves.
    pub fn response(&self, request_id: &str, url: &str, body: &str) -> SessionEvent {
        self.bodies
            .lock()
            .insert(request_id.to_string(), body.to_string());
        SessionEvent::Response(NetworkResponse {
            request_id: request_id.to_string(),
            url: url.to_string(),
            method: "GET".to_string(),
            status: 200,
            mime_type: Some("application/json".to_string()),
        })
    }

    /// Queue what the next `goto(url)` does. Calls with nothing queued just succeed.
    pub fn on_goto(&self, url: &str, script: Scripted) {
        self.navigation_scripts
            .lock()
            .entry(url.to_string())
            .or_default()
            .push_back(script);
    }

    /// Queue what the next `evaluate` does.
    pub fn on_evaluate(&self, script: Scripted) {
        self.evaluation_scripts.lock().push_back(script);
    }

    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().clone()
    }

    pub fn evaluations(&self) -> Vec<String> {
        self.evaluations.lock().clone()
    }

    pub fn download_behaviors(&self) -> Vec<DownloadBehavior> {
        self.download_behaviors.lock().clone()
    }

    fn play(&self, script: Option<Scripted>) -> Result<(), AdapterError> {
        match script {
            None => Ok(()),
            Some(Scripted::Fail(err)) => Err(err),
            Some(Scripted::Emit(events)) => {
                // delivered after the call returns, as a browser would
                let bus = self.bus.clone();
                tokio::spawn(async move {
                    tokio::task::yield_now().await;
                    for event in events {
                        let _ = bus.send(event);
                    }
                });
                Ok(())
            }
        }
    }
}

#[async_trait]
impl BrowserSession for MockSession {
    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.bus.subscribe()
    }

    async fn goto(&self, url: &str) -> Result<(), AdapterError> {
        self.navigations.lock().push(url.to_string());
        let script = self
            .navigation_scripts
            .lock()
            .get_mut(url)
            .and_then(VecDeque::pop_front);
        self.play(script)
    }

    async fn response_body(&self, response: &NetworkResponse) -> Result<String, AdapterError> {
        self.bodies
            .lock()
            .get(&response.request_id)
            .cloned()
            .ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::CdpIo)
                    .with_hint(format!("no body for {}", response.request_id))
            })
    }

    async fn set_download_behavior(
        &self,
        behavior: &DownloadBehavior,
    ) -> Result<(), AdapterError> {
        self.download_behaviors.lock().push(behavior.clone());
        Ok(())
    }

    async fn evaluate(&self, expression: &str) -> Result<Value, AdapterError> {
        self.evaluations.lock().push(expression.to_string());
        let script = self.evaluation_scripts.lock().pop_front();
        self.play(script).map(|()| Value::Null)
    }
}

pub fn download_begin(guid: &str, filename: &str) -> SessionEvent {
    SessionEvent::DownloadWillBegin {
        guid: guid.to_string(),
        url: format!("blob:https://app.invalid/{guid}"),
        suggested_filename: filename.to_string(),
    }
}

pub fn download_progress(guid: &str, state: DownloadState, error: Option<&str>) -> SessionEvent {
    SessionEvent::DownloadProgress {
        guid: guid.to_string(),
        state,
        error: error.map(str::to_string),
        received_bytes: None,
        total_bytes: None,
    }
}
