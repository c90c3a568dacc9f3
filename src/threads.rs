//! The list of threads to export, read from a user-supplied file.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;
use url::Url;

use crate::checkpoint::Checkpoint;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadRef {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl ThreadRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
        }
    }

    pub fn label(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.url)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ListEntry {
    Url(String),
    Thread(ThreadRef),
}

pub async fn load_thread_list(path: &Path) -> Result<Vec<ThreadRef>> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("reading thread list {}", path.display()))?;
    parse_thread_list(&content).with_context(|| format!("parsing thread list {}", path.display()))
}

/// Parse a JSON array (of URLs or `{url, title}` objects) or one URL per line.
pub fn parse_thread_list(content: &str) -> Result<Vec<ThreadRef>> {
    let threads = if content.trim_start().starts_with('[') {
        let entries: Vec<ListEntry> =
            serde_json::from_str(content).context("thread list is not a valid JSON array")?;
        entries
            .into_iter()
            .map(|entry| match entry {
                ListEntry::Url(url) => ThreadRef::new(url),
                ListEntry::Thread(thread) => thread,
            })
            .collect::<Vec<_>>()
    } else {
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(ThreadRef::new)
            .collect()
    };

    for (idx, thread) in threads.iter().enumerate() {
        if let Err(err) = Url::parse(&thread.url) {
            bail!("entry {} ({}) is not a valid URL: {err}", idx + 1, thread.url);
        }
    }
    Ok(threads)
}

/// Threads not yet in the checkpoint, in list order, without repeats.
pub fn pending<'a>(threads: &'a [ThreadRef], checkpoint: &Checkpoint) -> Vec<&'a ThreadRef> {
    let mut seen = std::collections::HashSet::new();
    threads
        .iter()
        .filter(|thread| !checkpoint.contains(&thread.url))
        .filter(|thread| seen.insert(thread.url.as_str()))
        .collect()
}
