use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::RateLimited;

/// Suspends the retry loop between attempts.
#[async_trait]
pub trait Pause: Send + Sync {
    async fn pause(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioPause;

#[async_trait]
impl Pause for TokioPause {
    async fn pause(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Fixed-interval retry for rate-limited failures.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    cooldown: Duration,
    pause: Arc<dyn Pause>,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("cooldown", &self.cooldown)
            .finish()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(60))
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, cooldown: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            cooldown,
            pause: Arc::new(TokioPause),
        }
    }

    pub fn with_pause(mut self, pause: Arc<dyn Pause>) -> Self {
        self.pause = pause;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Run `operation` until it succeeds, fails without a rate limit, or runs out of attempts.
    ///
    /// The operation receives the 1-based attempt number. The error of the last
    /// attempt is returned unchanged.
    pub async fn run<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RateLimited + fmt::Display,
    {
        let mut attempt: u32 = 1;
        loop {
            let err = match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(target: "retry", attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !err.is_rate_limited() {
                return Err(err);
            }
            if attempt >= self.max_attempts {
                warn!(target: "retry", attempt, %err, "rate limited; retries exhausted");
                return Err(err);
            }

            warn!(
                target: "retry",
                attempt,
                cooldown = ?self.cooldown,
                %err,
                "rate limited; cooling down before retry"
            );
            self.pause.pause(self.cooldown).await;
            attempt += 1;
        }
    }
}
