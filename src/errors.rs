//! Failures that stop an export run.

use std::path::PathBuf;

use cdp_adapter::AdapterError;
use event_correlator::{CorrelationError, DownloadError, RateLimited};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("browser session: {0}")]
    Session(#[from] AdapterError),
    #[error(transparent)]
    Correlation(#[from] CorrelationError),
    #[error(transparent)]
    Download(#[from] DownloadError),
    #[error("no download trigger script configured")]
    MissingTrigger,
    #[error("thread id {0:?} cannot be used as a file name")]
    UnsafeThreadId(String),
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("thread {id} payload could not be rendered: {source}")]
    Render {
        id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode {what}: {source}")]
    Encode {
        what: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ArchiveError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ArchiveError::Io {
            path: path.into(),
            source,
        }
    }
}

impl RateLimited for ArchiveError {
    fn is_rate_limited(&self) -> bool {
        matches!(self, ArchiveError::Download(err) if err.is_rate_limited())
    }
}
