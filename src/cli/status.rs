use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use super::context::CliContext;
use super::output::{print_json, OutputFormat};
use crate::checkpoint::CheckpointStore;
use crate::threads::{load_thread_list, pending};

#[derive(Args, Clone, Debug)]
pub struct StatusArgs {
    /// File listing the thread URLs (one per line, or a JSON array)
    #[arg(long, value_name = "FILE")]
    pub threads: PathBuf,

    /// Checkpoint file recording exported thread URLs
    #[arg(long, value_name = "FILE")]
    pub done_file: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    done_file: PathBuf,
    total: usize,
    exported: usize,
    pending: Vec<String>,
}

pub async fn cmd_status(args: StatusArgs, ctx: &CliContext) -> Result<()> {
    let done_file = args
        .done_file
        .unwrap_or_else(|| ctx.config().done_file.clone());
    let threads = load_thread_list(&args.threads).await?;
    let checkpoint = CheckpointStore::new(&done_file).load().await;
    let pending: Vec<String> = pending(&threads, &checkpoint)
        .into_iter()
        .map(|thread| thread.url.clone())
        .collect();
    let report = StatusReport {
        done_file,
        total: threads.len(),
        exported: threads
            .iter()
            .filter(|thread| checkpoint.contains(&thread.url))
            .count(),
        pending,
    };

    match ctx.output() {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Human => {
            println!("Checkpoint: {}", report.done_file.display());
            println!("Threads:    {}", report.total);
            println!("Exported:   {}", report.exported);
            println!("Pending:    {}", report.pending.len());
            for url in &report.pending {
                println!("  {url}");
            }
        }
    }
    Ok(())
}
