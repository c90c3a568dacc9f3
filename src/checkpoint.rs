//! The done file: which thread URLs have already been exported.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use crate::errors::ArchiveError;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(rename = "processedUrls", default)]
    processed_urls: Vec<String>,
    #[serde(skip)]
    seen: HashSet<String>,
}

impl Checkpoint {
    pub fn from_urls<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut checkpoint = Self::default();
        for url in urls {
            checkpoint.record(url);
        }
        checkpoint
    }

    pub fn contains(&self, url: &str) -> bool {
        self.seen.contains(url)
    }

    /// Append `url` unless it is already recorded. Returns whether it was added.
    pub fn record(&mut self, url: impl Into<String>) -> bool {
        let url = url.into();
        if !self.seen.insert(url.clone()) {
            return false;
        }
        self.processed_urls.push(url);
        true
    }

    pub fn urls(&self) -> &[String] {
        &self.processed_urls
    }

    pub fn len(&self) -> usize {
        self.processed_urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processed_urls.is_empty()
    }

    fn reindex(mut self) -> Self {
        let urls = std::mem::take(&mut self.processed_urls);
        Self::from_urls(urls)
    }
}

/// Reads and rewrites the done file.
#[derive(Clone, Debug)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing or unreadable file counts as an empty checkpoint.
    pub async fn load(&self) -> Checkpoint {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(target: "archiver", path = %self.path.display(), "no checkpoint yet");
                return Checkpoint::default();
            }
            Err(err) => {
                warn!(target: "archiver", path = %self.path.display(), %err, "checkpoint unreadable; starting fresh");
                return Checkpoint::default();
            }
        };
        match serde_json::from_str::<Checkpoint>(&content) {
            Ok(checkpoint) => checkpoint.reindex(),
            Err(err) => {
                warn!(target: "archiver", path = %self.path.display(), %err, "checkpoint is not valid json; starting fresh");
                Checkpoint::default()
            }
        }
    }

    pub async fn save(&self, checkpoint: &Checkpoint) -> Result<(), ArchiveError> {
        let json = serde_json::to_string_pretty(checkpoint).map_err(|source| {
            ArchiveError::Encode {
                what: "checkpoint".to_string(),
                source,
            }
        })?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| ArchiveError::io(parent, err))?;
        }
        fs::write(&self.path, json)
            .await
            .map_err(|err| ArchiveError::io(&self.path, err))
    }
}
