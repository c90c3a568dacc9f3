use std::fmt;
use std::time::Duration;

use cdp_adapter::AdapterError;
use thiserror::Error;

use crate::waiter::Superseded;

/// Errors that decide whether an operation is worth retrying after a cooldown.
pub trait RateLimited {
    fn is_rate_limited(&self) -> bool;
}

/// Failure of a response-correlated wait.
#[derive(Debug, Error)]
pub enum CorrelationError {
    #[error("navigation failed: {0}")]
    Navigation(#[source] AdapterError),
    #[error("no matching response within {0:?}")]
    TimedOut(Duration),
    #[error("wait abandoned before a matching response arrived")]
    Abandoned,
}

impl From<Superseded> for CorrelationError {
    fn from(_: Superseded) -> Self {
        CorrelationError::Abandoned
    }
}

/// Terminal download failure, classified by its error text.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub struct DownloadError {
    pub message: String,
    pub rate_limited: bool,
}

impl DownloadError {
    /// Classify the error text carried by a canceled or interrupted download.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let rate_limited = is_rate_limit_text(&message);
        Self {
            message,
            rate_limited,
        }
    }

    pub fn trigger(err: impl fmt::Display) -> Self {
        Self {
            message: format!("download trigger failed: {err}"),
            rate_limited: false,
        }
    }

    pub fn abandoned() -> Self {
        Self {
            message: "download wait abandoned".to_string(),
            rate_limited: false,
        }
    }
}

impl fmt::Display for DownloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rate_limited {
            write!(f, "download failed (rate limited): {}", self.message)
        } else {
            write!(f, "download failed: {}", self.message)
        }
    }
}

impl From<Superseded> for DownloadError {
    fn from(_: Superseded) -> Self {
        DownloadError::abandoned()
    }
}

impl RateLimited for DownloadError {
    fn is_rate_limited(&self) -> bool {
        self.rate_limited
    }
}

fn is_rate_limit_text(text: &str) -> bool {
    text.contains("429") || text.contains("rate limit")
}
