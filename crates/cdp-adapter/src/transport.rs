use std::collections::HashMap;
use std::convert::TryInto;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::async_process::Child;
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::cdp::browser_protocol::target::SessionId as CdpSessionId;
use chromiumoxide::cdp::events::CdpEventMessage;
use chromiumoxide::conn::Connection;
use chromiumoxide_types::{CallId, CdpJsonEventMessage, Message, MethodId, Response};
use futures::{future::BoxFuture, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::CdpConfig;
use crate::error::{AdapterError, AdapterErrorKind};
use crate::util::extract_ws_url;

/// A raw CDP event as received from the websocket.
#[derive(Clone, Debug)]
pub struct TransportEvent {
    pub method: String,
    pub params: Value,
    pub session_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandTarget {
    Browser,
    Session(String),
}

#[async_trait]
pub trait CdpTransport: Send + Sync {
    async fn start(&self) -> Result<(), AdapterError>;
    async fn next_event(&self) -> Option<TransportEvent>;
    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError>;
}

type Dialer = Box<dyn Fn(CdpConfig) -> BoxFuture<'static, Result<Link, AdapterError>> + Send + Sync>;

/// Transport over a chromiumoxide websocket.
///
/// Dials on first use. A link whose driver has stopped (browser gone, socket
/// closed) is replaced by a fresh one on the next call.
pub struct ChromiumTransport {
    cfg: CdpConfig,
    link: Mutex<Option<Arc<Link>>>,
    dial: Dialer,
}

impl ChromiumTransport {
    pub fn new(cfg: CdpConfig) -> Self {
        Self {
            cfg,
            link: Mutex::new(None),
            dial: Box::new(|cfg| Box::pin(Link::open(cfg))),
        }
    }

    async fn link(&self) -> Result<Arc<Link>, AdapterError> {
        let mut current = self.link.lock().await;
        if let Some(link) = current.as_ref().filter(|link| link.is_open()) {
            return Ok(Arc::clone(link));
        }
        if current.is_some() {
            info!(target: "cdp-transport", "previous connection is gone; redialing");
        }
        let link = Arc::new((self.dial)(self.cfg.clone()).await?);
        *current = Some(Arc::clone(&link));
        Ok(link)
    }

    fn deadline(&self) -> Duration {
        Duration::from_millis(self.cfg.default_deadline_ms)
    }
}

#[async_trait]
impl CdpTransport for ChromiumTransport {
    async fn start(&self) -> Result<(), AdapterError> {
        let link = self.link().await?;
        let deadline = self.deadline();
        link.call(
            CommandTarget::Browser,
            "Target.setDiscoverTargets",
            json!({ "discover": true }),
            deadline,
        )
        .await?;
        link.call(
            CommandTarget::Browser,
            "Target.setAutoAttach",
            json!({ "autoAttach": true, "waitForDebuggerOnStart": false, "flatten": true }),
            deadline,
        )
        .await
        .map(|_| ())
    }

    async fn next_event(&self) -> Option<TransportEvent> {
        let link = match self.link().await {
            Ok(link) => link,
            Err(err) => {
                warn!(target: "cdp-transport", %err, "no connection to read events from");
                return None;
            }
        };
        let event = link.events.lock().await.recv().await;
        event
    }

    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError> {
        self.link()
            .await?
            .call(target, method, params, self.deadline())
            .await
    }
}

struct Request {
    target: CommandTarget,
    method: String,
    params: Value,
    reply: oneshot::Sender<Result<Value, AdapterError>>,
}

/// One live websocket. The driver task owns the connection and the browser
/// process it launched; dropping the link stops the driver.
struct Link {
    requests: mpsc::Sender<Request>,
    events: Mutex<mpsc::Receiver<TransportEvent>>,
    driver: JoinHandle<()>,
    stop: CancellationToken,
}

impl Link {
    async fn open(cfg: CdpConfig) -> Result<Self, AdapterError> {
        let (browser, ws_url) = match cfg.websocket_url.clone() {
            Some(url) => (None, url),
            None => {
                let (child, url) = launch_chromium(&cfg).await?;
                (Some(child), url)
            }
        };
        let conn = Connection::<CdpEventMessage>::connect(&ws_url)
            .await
            .map_err(|err| AdapterError::new(AdapterErrorKind::CdpIo).with_hint(err.to_string()))?;
        info!(target: "cdp-transport", url = %ws_url, "connected to chromium");

        let (requests, inbox) = mpsc::channel(64);
        let (outbox, events) = mpsc::channel(cfg.event_buffer.max(16));
        let stop = CancellationToken::new();
        let driver = tokio::spawn(drive(conn, inbox, outbox, stop.clone(), browser));
        Ok(Self {
            requests,
            events: Mutex::new(events),
            driver,
            stop,
        })
    }

    fn is_open(&self) -> bool {
        !self.driver.is_finished()
    }

    async fn call(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
        deadline: Duration,
    ) -> Result<Value, AdapterError> {
        let (reply, answer) = oneshot::channel();
        let request = Request {
            target,
            method: method.to_string(),
            params,
            reply,
        };
        if self.requests.send(request).await.is_err() {
            return Err(AdapterError::new(AdapterErrorKind::CdpIo)
                .with_hint(format!("{method}: connection is closed")));
        }
        match tokio::time::timeout(deadline, answer).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(AdapterError::new(AdapterErrorKind::CdpIo)
                .with_hint(format!("{method}: connection closed before the reply"))),
            Err(_) => Err(AdapterError::new(AdapterErrorKind::NavTimeout)
                .with_hint(format!("{method}: no reply within {deadline:?}"))),
        }
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

type Pending = HashMap<CallId, (String, oneshot::Sender<Result<Value, AdapterError>>)>;

async fn drive(
    mut conn: Connection<CdpEventMessage>,
    mut inbox: mpsc::Receiver<Request>,
    outbox: mpsc::Sender<TransportEvent>,
    stop: CancellationToken,
    browser: Option<Child>,
) {
    let mut pending = Pending::new();
    let reason = loop {
        tokio::select! {
            _ = stop.cancelled() => break "closed locally".to_string(),
            request = inbox.recv() => match request {
                Some(request) => submit(&mut conn, request, &mut pending),
                None => break "no callers left".to_string(),
            },
            message = conn.next() => match message {
                Some(Ok(Message::Response(response))) => settle(response, &mut pending),
                Some(Ok(Message::Event(event))) => {
                    if let Some(event) = decode(event) {
                        if outbox.send(event).await.is_err() {
                            break "event reader gone".to_string();
                        }
                    }
                }
                Some(Err(err)) => break err.to_string(),
                None => break "websocket closed".to_string(),
            },
        }
    };

    info!(target: "cdp-transport", %reason, pending = pending.len(), "connection stopped");
    for (_, (method, reply)) in pending.drain() {
        let _ = reply.send(Err(AdapterError::new(AdapterErrorKind::CdpIo)
            .with_hint(format!("{method}: {reason}"))));
    }
    if let Some(mut child) = browser {
        if let Err(err) = child.kill().await {
            warn!(target: "cdp-transport", ?err, "failed to stop chromium");
        }
    }
}

fn submit(conn: &mut Connection<CdpEventMessage>, request: Request, pending: &mut Pending) {
    let session = match request.target {
        CommandTarget::Browser => None,
        CommandTarget::Session(id) => Some(CdpSessionId::from(id)),
    };
    let method = request.method;
    match conn.submit_command(MethodId::from(method.clone()), session, request.params) {
        Ok(call) => {
            pending.insert(call, (method, request.reply));
        }
        Err(err) => {
            let _ = request.reply.send(Err(AdapterError::new(AdapterErrorKind::CdpIo)
                .with_hint(format!("{method}: {err}"))));
        }
    }
}

fn settle(response: Response, pending: &mut Pending) {
    let Some((method, reply)) = pending.remove(&response.id) else {
        debug!(target: "cdp-transport", id = ?response.id, "reply for an unknown call");
        return;
    };
    let result = match (response.result, response.error) {
        (Some(value), _) => Ok(value),
        (None, Some(error)) => Err(AdapterError::new(AdapterErrorKind::CdpIo)
            .with_hint(format!("{method}: {} ({})", error.message, error.code))),
        (None, None) => Ok(Value::Null),
    };
    let _ = reply.send(result);
}

fn decode(event: CdpEventMessage) -> Option<TransportEvent> {
    match TryInto::<CdpJsonEventMessage>::try_into(event) {
        Ok(raw) => Some(TransportEvent {
            method: raw.method.into_owned(),
            params: raw.params,
            session_id: raw.session_id,
        }),
        Err(err) => {
            warn!(target: "cdp-transport", %err, "dropping undecodable event");
            None
        }
    }
}

async fn launch_chromium(cfg: &CdpConfig) -> Result<(Child, String), AdapterError> {
    let executable = cfg.resolved_executable().ok_or_else(|| {
        AdapterError::new(AdapterErrorKind::CdpIo)
            .with_hint("chrome executable not found")
            .with_data(json!({
                "configured": cfg.executable,
                "hint": "Set THREADKEEPER_CHROME to the full path of chrome/chromium."
            }))
    })?;
    let profile = profile_dir(&cfg.user_data_dir)?;

    let mut args = vec![
        "--disable-background-timer-throttling",
        "--disable-breakpad",
        "--disable-sync",
        "--no-first-run",
        "--no-default-browser-check",
        "--password-store=basic",
        "--remote-allow-origins=*",
    ];
    if cfg.headless {
        args.push("--headless=new");
    }
    let mut builder = BrowserConfig::builder()
        .chrome_executable(executable)
        .user_data_dir(profile)
        .launch_timeout(Duration::from_millis(cfg.launch_timeout_ms))
        .args(args);
    if !cfg.headless {
        builder = builder.with_head();
    }
    if sandbox_disabled() {
        builder = builder.no_sandbox();
    }
    let browser = builder
        .build()
        .map_err(|err| AdapterError::internal(format!("browser config error: {err}")))?;

    let mut child = browser
        .launch()
        .map_err(|err| AdapterError::internal(format!("failed to launch chromium: {err}")))?;
    let ws_url = extract_ws_url(&mut child, Duration::from_millis(cfg.launch_timeout_ms))
        .await
        .map_err(|err| AdapterError::new(AdapterErrorKind::CdpIo).with_hint(err.to_string()))?;
    Ok((child, ws_url))
}

/// The persistent profile keeps the user's login between runs.
fn profile_dir(configured: &Path) -> Result<PathBuf, AdapterError> {
    let dir = if configured.is_absolute() {
        configured.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|err| AdapterError::internal(format!("cannot resolve cwd: {err}")))?
            .join(configured)
    };
    fs::create_dir_all(&dir).map_err(|err| {
        AdapterError::internal(format!("cannot create profile dir {}: {err}", dir.display()))
    })?;
    Ok(dir)
}

fn sandbox_disabled() -> bool {
    std::env::var("THREADKEEPER_DISABLE_SANDBOX")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn idle_link() -> (Link, mpsc::Receiver<Request>) {
        let (requests, inbox) = mpsc::channel(8);
        let (_outbox, events) = mpsc::channel(8);
        let stop = CancellationToken::new();
        let token = stop.clone();
        let driver = tokio::spawn(async move { token.cancelled().await });
        let link = Link {
            requests,
            events: Mutex::new(events),
            driver,
            stop,
        };
        (link, inbox)
    }

    #[tokio::test]
    async fn redials_after_the_link_stops() {
        let dials = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&dials);
        let transport = ChromiumTransport {
            cfg: CdpConfig::default(),
            link: Mutex::new(None),
            dial: Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Box::pin(async { Ok(idle_link().0) })
            }),
        };

        let first = transport.link().await.unwrap();
        let again = transport.link().await.unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(dials.load(Ordering::SeqCst), 1);

        first.stop.cancel();
        while first.is_open() {
            tokio::task::yield_now().await;
        }

        let second = transport.link().await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(dials.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn call_reports_a_closed_connection() {
        let (link, inbox) = idle_link();
        drop(inbox);
        let err = link
            .call(
                CommandTarget::Browser,
                "Browser.getVersion",
                json!({}),
                Duration::from_millis(20),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::CdpIo);
        assert!(err.hint.unwrap().contains("Browser.getVersion"));
    }

    #[tokio::test(start_paused = true)]
    async fn call_times_out_without_a_reply() {
        let (link, _inbox) = idle_link();
        let err = link
            .call(
                CommandTarget::Session("s1".into()),
                "Page.navigate",
                json!({ "url": "about:blank" }),
                Duration::from_secs(3),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::NavTimeout);
    }
}
