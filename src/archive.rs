//! The export loop: one thread at a time, checkpointed after each success.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use cdp_adapter::BrowserSession;
use event_correlator::{
    DownloadCoordinator, ListenerHandle, MatchRule, Pause, ResponseCorrelator, RetryPolicy,
    TokioPause,
};
use serde::Serialize;
use tokio::fs;
use tracing::{error, info, warn};

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::config::{Config, ExportMode};
use crate::errors::ArchiveError;
use crate::metrics;
use crate::render::render_payload;
use crate::threads::{self, ThreadRef};

#[derive(Clone, Debug)]
pub struct ArchiveOptions {
    pub mode: ExportMode,
    pub output_dir: PathBuf,
    pub download_dir: PathBuf,
    pub trigger_script: Option<String>,
    pub match_rule: MatchRule,
    pub wait_timeout: Option<Duration>,
    pub pace: Duration,
    pub limit: Option<usize>,
    pub account: Option<String>,
}

impl ArchiveOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            mode: config.mode,
            output_dir: config.output_dir.clone(),
            download_dir: config.download_dir(),
            trigger_script: config.download.trigger_script.clone(),
            match_rule: config.capture.rule.clone(),
            wait_timeout: config.capture.wait_timeout(),
            pace: config.pace(),
            limit: None,
            account: config.account.clone(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct SavedThread {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub files: Vec<PathBuf>,
    pub attempts: u32,
}

#[derive(Clone, Debug, Serialize)]
pub struct ArchiveReport {
    pub mode: ExportMode,
    pub total: usize,
    pub skipped: usize,
    pub saved: Vec<SavedThread>,
    pub remaining: usize,
}

enum Pipeline {
    Capture {
        correlator: Arc<ResponseCorrelator>,
        listener: ListenerHandle,
    },
    Download {
        coordinator: Arc<DownloadCoordinator>,
        listener: ListenerHandle,
        trigger: String,
    },
}

impl Pipeline {
    async fn shutdown(self) {
        let listener = match self {
            Pipeline::Capture { listener, .. } | Pipeline::Download { listener, .. } => listener,
        };
        if let Err(err) = listener.shutdown().await {
            warn!(target: "archiver", %err, "event listener did not stop cleanly");
        }
    }
}

pub struct Archiver {
    session: Arc<dyn BrowserSession>,
    options: ArchiveOptions,
    checkpoint: CheckpointStore,
    retry: RetryPolicy,
    pacer: Arc<dyn Pause>,
}

impl Archiver {
    pub fn new(
        session: Arc<dyn BrowserSession>,
        options: ArchiveOptions,
        checkpoint: CheckpointStore,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            session,
            options,
            checkpoint,
            retry,
            pacer: Arc::new(TokioPause),
        }
    }

    /// Replace the pause used between threads.
    pub fn with_pacer(mut self, pacer: Arc<dyn Pause>) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn options(&self) -> &ArchiveOptions {
        &self.options
    }

    /// Export every thread not yet in the checkpoint, in list order.
    ///
    /// The first failure that survives the retry policy stops the run. Threads
    /// saved before it stay recorded in the checkpoint.
    pub async fn run(&self, threads: &[ThreadRef]) -> Result<ArchiveReport, ArchiveError> {
        let mode = self.options.mode;
        fs::create_dir_all(&self.options.output_dir)
            .await
            .map_err(|err| ArchiveError::io(&self.options.output_dir, err))?;

        let mut checkpoint = self.checkpoint.load().await;
        let mut pending = threads::pending(threads, &checkpoint);
        let skipped = threads
            .iter()
            .filter(|thread| checkpoint.contains(&thread.url))
            .count();
        let unlimited = pending.len();
        if let Some(limit) = self.options.limit {
            pending.truncate(limit);
        }
        info!(
            target: "archiver",
            mode = mode.as_str(),
            account = self.options.account.as_deref().unwrap_or("-"),
            checkpoint = %self.checkpoint.path().display(),
            total = threads.len(),
            skipped,
            pending = pending.len(),
            "starting export"
        );

        let pipeline = self.start_pipeline().await?;
        let mut report = ArchiveReport {
            mode,
            total: threads.len(),
            skipped,
            saved: Vec::new(),
            remaining: unlimited,
        };
        let outcome = self
            .process_all(&pipeline, &pending, &mut checkpoint, &mut report)
            .await;
        pipeline.shutdown().await;
        outcome?;

        info!(
            target: "archiver",
            saved = report.saved.len(),
            remaining = report.remaining,
            "export finished"
        );
        Ok(report)
    }

    async fn start_pipeline(&self) -> Result<Pipeline, ArchiveError> {
        match self.options.mode {
            ExportMode::Capture => {
                let correlator = Arc::new(
                    ResponseCorrelator::new(
                        Arc::clone(&self.session),
                        self.options.match_rule.clone(),
                    )
                    .with_wait_timeout(self.options.wait_timeout),
                );
                let listener = correlator.spawn_listener();
                Ok(Pipeline::Capture {
                    correlator,
                    listener,
                })
            }
            ExportMode::Download => {
                let trigger = self
                    .options
                    .trigger_script
                    .clone()
                    .filter(|script| !script.trim().is_empty())
                    .ok_or(ArchiveError::MissingTrigger)?;
                let dir = &self.options.download_dir;
                fs::create_dir_all(dir)
                    .await
                    .map_err(|err| ArchiveError::io(dir, err))?;
                let coordinator = Arc::new(DownloadCoordinator::new(
                    Arc::clone(&self.session),
                    dir.clone(),
                ));
                let listener = coordinator.spawn_listener();
                if let Err(err) = coordinator.configure().await {
                    listener.shutdown().await.ok();
                    return Err(err.into());
                }
                Ok(Pipeline::Download {
                    coordinator,
                    listener,
                    trigger,
                })
            }
        }
    }

    async fn process_all(
        &self,
        pipeline: &Pipeline,
        pending: &[&ThreadRef],
        checkpoint: &mut Checkpoint,
        report: &mut ArchiveReport,
    ) -> Result<(), ArchiveError> {
        let mode = self.options.mode.as_str();
        for (position, thread) in pending.iter().enumerate() {
            info!(
                target: "archiver",
                url = %thread.url,
                item = position + 1,
                of = pending.len(),
                "processing {}",
                thread.label()
            );

            let mut attempts = 0;
            let outcome = self
                .retry
                .run(|attempt| {
                    attempts = attempt;
                    self.process_one(pipeline, thread)
                })
                .await;
            let files = match outcome {
                Ok(files) => files,
                Err(err) => {
                    metrics::record_thread(mode, "failed");
                    error!(target: "archiver", url = %thread.url, attempts, %err, "thread failed; stopping");
                    return Err(err);
                }
            };

            checkpoint.record(thread.url.clone());
            self.checkpoint.save(checkpoint).await?;
            metrics::record_thread(mode, "saved");
            report.remaining = report.remaining.saturating_sub(1);
            report.saved.push(SavedThread {
                url: thread.url.clone(),
                id: files.id,
                files: files.paths,
                attempts,
            });

            self.pacer.pause(self.options.pace).await;
        }
        Ok(())
    }

    async fn process_one(
        &self,
        pipeline: &Pipeline,
        thread: &ThreadRef,
    ) -> Result<WrittenFiles, ArchiveError> {
        match pipeline {
            Pipeline::Capture { correlator, .. } => {
                let captured = correlator.load_by_trigger(&thread.url).await?;
                let json_path = self.output_path(&captured.id, "json")?;
                let md_path = self.output_path(&captured.id, "md")?;
                let markdown =
                    render_payload(&captured.payload).map_err(|source| ArchiveError::Render {
                        id: captured.id.clone(),
                        source,
                    })?;
                let json = serde_json::to_string_pretty(&captured.payload).map_err(|source| {
                    ArchiveError::Encode {
                        what: format!("thread {}", captured.id),
                        source,
                    }
                })?;
                write_file(&json_path, json).await?;
                write_file(&md_path, markdown).await?;
                info!(target: "archiver", thread = %captured.id, "saved");
                Ok(WrittenFiles {
                    id: Some(captured.id),
                    paths: vec![json_path, md_path],
                })
            }
            Pipeline::Download {
                coordinator,
                trigger,
                ..
            } => {
                self.session.goto(&thread.url).await?;
                let wait = coordinator
                    .wait_for_download(|| async {
                        self.session.evaluate(trigger).await.map(|_| ())
                    })
                    .await;
                let path = wait.await?;
                info!(target: "archiver", path = %path.display(), "downloaded");
                Ok(WrittenFiles {
                    id: None,
                    paths: vec![path],
                })
            }
        }
    }

    fn output_path(&self, id: &str, extension: &str) -> Result<PathBuf, ArchiveError> {
        if !is_plain_file_stem(id) {
            return Err(ArchiveError::UnsafeThreadId(id.to_string()));
        }
        Ok(self.options.output_dir.join(format!("{id}.{extension}")))
    }
}

/// The id must stay a single path component inside the output directory.
fn is_plain_file_stem(id: &str) -> bool {
    !id.is_empty() && id != "." && id != ".." && !id.contains(['/', '\\', '\0'])
}

struct WrittenFiles {
    id: Option<String>,
    paths: Vec<PathBuf>,
}

async fn write_file(path: &Path, contents: String) -> Result<(), ArchiveError> {
    fs::write(path, contents)
        .await
        .map_err(|err| ArchiveError::io(path, err))
}
