//! Tracks the single in-flight browser download and exposes its outcome.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cdp_adapter::{AdapterError, BrowserSession, DownloadBehavior, DownloadState, SessionEvent};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::DownloadError;
use crate::listener::ListenerHandle;
use crate::waiter::CorrelationWaiter;

/// Outcome of one download, shared by every caller that asked for it.
pub type DownloadWait = Shared<BoxFuture<'static, Result<PathBuf, DownloadError>>>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DownloadPhase {
    #[default]
    Idle,
    AwaitingBegin,
    InProgress,
    Completed,
    Canceled,
    Interrupted,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DownloadDescriptor {
    pub guid: Option<String>,
    pub pending_filename: Option<String>,
    pub last_completed_path: Option<PathBuf>,
    pub state: DownloadPhase,
}

impl DownloadDescriptor {
    fn reset(&mut self) {
        self.guid = None;
        self.pending_filename = None;
        self.state = DownloadPhase::Idle;
    }
}

pub struct DownloadCoordinator {
    session: Arc<dyn BrowserSession>,
    download_dir: PathBuf,
    descriptor: Mutex<DownloadDescriptor>,
    waiter: CorrelationWaiter<PathBuf, DownloadError>,
    inflight: Mutex<Option<DownloadWait>>,
}

impl DownloadCoordinator {
    pub fn new(session: Arc<dyn BrowserSession>, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            session,
            download_dir: download_dir.into(),
            descriptor: Mutex::new(DownloadDescriptor::default()),
            waiter: CorrelationWaiter::new(),
            inflight: Mutex::new(None),
        }
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Let the browser save downloads into the download directory and report progress.
    pub async fn configure(&self) -> Result<(), AdapterError> {
        let behavior = DownloadBehavior::allow_into(self.download_dir.to_string_lossy());
        self.session.set_download_behavior(&behavior).await?;
        info!(
            target: "downloads",
            dir = %self.download_dir.display(),
            "download behavior configured"
        );
        Ok(())
    }

    pub fn last_completed_path(&self) -> Option<PathBuf> {
        self.descriptor.lock().last_completed_path.clone()
    }

    pub fn state(&self) -> DownloadPhase {
        self.descriptor.lock().state
    }

    pub fn descriptor(&self) -> DownloadDescriptor {
        self.descriptor.lock().clone()
    }

    /// Subscribe to the session and drive the descriptor from download events.
    pub fn spawn_listener(self: &Arc<Self>) -> ListenerHandle {
        let coordinator = Arc::clone(self);
        let mut events = self.session.subscribe();
        let cancel = CancellationToken::new();
        let loop_token = cancel.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = loop_token.cancelled() => break,
                    received = events.recv() => match received {
                        Ok(event) => coordinator.on_event(event),
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(target: "downloads", skipped, "download listener lagged");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
            coordinator.inflight.lock().take();
            if coordinator.waiter.abandon() {
                debug!(target: "downloads", "listener stopped with a download pending");
            }
        });
        ListenerHandle::new(cancel, task)
    }

    /// Start a download with `trigger` and return the wait for its outcome.
    ///
    /// While a previous wait is unsettled the same wait is returned and
    /// `trigger` is not run. A failing trigger fails the wait.
    pub async fn wait_for_download<F, Fut, E>(&self, trigger: F) -> DownloadWait
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: std::fmt::Display,
    {
        let wait = {
            let mut inflight = self.inflight.lock();
            if let Some(existing) = inflight.as_ref() {
                debug!(target: "downloads", "joining the in-flight download wait");
                return existing.clone();
            }
            let wait = self.waiter.arm().boxed().shared();
            *inflight = Some(wait.clone());
            wait
        };

        if let Err(err) = trigger().await {
            warn!(target: "downloads", %err, "download trigger failed");
            self.settle(Err(DownloadError::trigger(err)));
        }
        wait
    }

    /// Resolve the pending wait and forget it, whether or not anyone still polls it.
    fn settle(&self, outcome: Result<PathBuf, DownloadError>) {
        self.inflight.lock().take();
        match outcome {
            Ok(path) => self.waiter.fulfill(path),
            Err(err) => self.waiter.fail(err),
        };
    }

    fn on_event(&self, event: SessionEvent) {
        match event {
            SessionEvent::DownloadWillBegin {
                guid,
                suggested_filename,
                ..
            } => {
                info!(target: "downloads", %guid, file = %suggested_filename, "download starting");
                let mut descriptor = self.descriptor.lock();
                descriptor.guid = Some(guid);
                descriptor.pending_filename = Some(suggested_filename);
                descriptor.state = DownloadPhase::AwaitingBegin;
            }
            SessionEvent::DownloadProgress {
                guid, state, error, ..
            } => self.on_progress(guid, state, error),
            SessionEvent::Response(_) => {}
        }
    }

    fn on_progress(&self, guid: String, state: DownloadState, error: Option<String>) {
        let mut descriptor = self.descriptor.lock();
        if descriptor
            .guid
            .as_deref()
            .map_or(false, |tracked| tracked != guid)
        {
            debug!(target: "downloads", %guid, "progress for an untracked download");
            return;
        }
        match state {
            DownloadState::InProgress => {
                if descriptor.state != DownloadPhase::InProgress {
                    debug!(target: "downloads", %guid, "download in progress");
                }
                descriptor.state = DownloadPhase::InProgress;
            }
            DownloadState::Completed => {
                let Some(filename) = descriptor.pending_filename.clone() else {
                    debug!(target: "downloads", %guid, "completion without a filename ignored");
                    return;
                };
                let path = self.download_dir.join(filename);
                descriptor.state = DownloadPhase::Completed;
                descriptor.last_completed_path = Some(path.clone());
                info!(target: "downloads", path = %path.display(), "download completed");
                self.settle(Ok(path));
                descriptor.reset();
            }
            DownloadState::Canceled | DownloadState::Interrupted => {
                descriptor.state = if state == DownloadState::Canceled {
                    DownloadPhase::Canceled
                } else {
                    DownloadPhase::Interrupted
                };
                let message = error.unwrap_or_else(|| "unknown error".to_string());
                let err = DownloadError::classify(message);
                warn!(
                    target: "downloads",
                    %guid,
                    ?state,
                    rate_limited = err.rate_limited,
                    message = %err.message,
                    "download failed"
                );
                self.settle(Err(err));
                descriptor.reset();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_keeps_the_last_completed_path() {
        let mut descriptor = DownloadDescriptor {
            guid: Some("g".into()),
            pending_filename: Some("a.md".into()),
            last_completed_path: Some(PathBuf::from("/tmp/a.md")),
            state: DownloadPhase::Completed,
        };
        descriptor.reset();
        assert_eq!(descriptor.state, DownloadPhase::Idle);
        assert!(descriptor.pending_filename.is_none());
        assert_eq!(
            descriptor.last_completed_path,
            Some(PathBuf::from("/tmp/a.md"))
        );
    }
}
