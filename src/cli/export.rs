use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use cdp_adapter::{metrics as cdp_metrics, CdpSession};
use clap::Args;
use tokio::fs;
use tracing::info;

use super::context::CliContext;
use super::output::{print_json, OutputFormat};
use crate::archive::{ArchiveOptions, ArchiveReport, Archiver};
use crate::checkpoint::CheckpointStore;
use crate::config::ExportMode;
use crate::metrics;
use crate::threads::load_thread_list;

#[derive(Args, Clone, Debug)]
pub struct ExportArgs {
    /// File listing the thread URLs to export (one per line, or a JSON array)
    #[arg(long, value_name = "FILE")]
    pub threads: PathBuf,

    /// How each thread is saved
    #[arg(long, value_enum)]
    pub mode: Option<ExportMode>,

    /// Directory for the exported files
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Checkpoint file recording exported thread URLs
    #[arg(long, value_name = "FILE")]
    pub done_file: Option<PathBuf>,

    /// Export at most this many threads in this run
    #[arg(long)]
    pub limit: Option<usize>,

    /// Script evaluated in each thread page to start its export download
    #[arg(long, value_name = "JS")]
    pub trigger: Option<String>,

    /// Run the browser without a window
    #[arg(long)]
    pub headless: bool,

    /// Write Prometheus metrics here when the run ends
    #[arg(long, value_name = "FILE")]
    pub metrics_file: Option<PathBuf>,
}

pub async fn cmd_export(args: ExportArgs, ctx: &CliContext) -> Result<()> {
    let mut config = ctx.config().clone();
    if let Some(mode) = args.mode {
        config.mode = mode;
    }
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }
    if let Some(file) = args.done_file {
        config.done_file = file;
    }
    if let Some(script) = args.trigger {
        config.download.trigger_script = Some(script);
    }
    if args.headless {
        config.browser.headless = true;
    }

    let threads = load_thread_list(&args.threads).await?;
    let mut options = ArchiveOptions::from_config(&config);
    options.limit = args.limit;
    // Chromium needs an absolute download path
    options.download_dir = absolutize(&options.download_dir)?;

    metrics::register_metrics();
    let started = Instant::now();
    let session = Arc::new(CdpSession::new(config.browser.clone()));
    Arc::clone(&session)
        .start()
        .await
        .context("Failed to start the browser session")?;

    let archiver = Archiver::new(
        session.clone(),
        options,
        CheckpointStore::new(&config.done_file),
        config.download.retry.policy(),
    );
    let outcome = archiver.run(&threads).await;
    session.close().await;

    let snapshot = cdp_metrics::snapshot();
    info!(
        commands = snapshot.commands,
        command_failures = snapshot.command_failures,
        responses = snapshot.responses,
        download_events = snapshot.download_events,
        "session activity"
    );
    if let Some(path) = args.metrics_file.as_deref() {
        write_metrics(path).await?;
    }

    let report = outcome.context("Export stopped")?;
    match ctx.output() {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Human => {
            print_human(&report, started.elapsed());
            Ok(())
        }
    }
}

fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = env::current_dir().context("Failed to resolve the working directory")?;
    Ok(cwd.join(path))
}

async fn write_metrics(path: &Path) -> Result<()> {
    let text = metrics::render_text().context("Failed to encode metrics")?;
    fs::write(path, text)
        .await
        .with_context(|| format!("Failed to write metrics to {}", path.display()))
}

fn print_human(report: &ArchiveReport, elapsed: Duration) {
    let elapsed = Duration::from_secs(elapsed.as_secs());
    println!(
        "Exported {} thread(s) in {} ({} mode)",
        report.saved.len(),
        humantime::format_duration(elapsed),
        report.mode.as_str()
    );
    println!("Already exported: {}", report.skipped);
    println!("Still pending:    {}", report.remaining);
    for saved in &report.saved {
        for file in &saved.files {
            println!("  {} -> {}", saved.url, file.display());
        }
    }
}
