//! Turns the event stream of one shared browser session into awaitable units of work.
//!
//! - [`CorrelationWaiter`]: single-slot bridge from an event callback to a future.
//! - [`ResponseCorrelator`]: resolves thread loads from matching network responses.
//! - [`DownloadCoordinator`]: follows one download through its lifecycle.
//! - [`RetryPolicy`]: fixed-interval retry for rate-limited failures.
//!
//! Every coordinator assumes at most one outstanding request at a time.

pub mod download;
pub mod error;
pub mod listener;
#[cfg(feature = "mock")]
pub mod mock;
pub mod response;
pub mod retry;
pub mod waiter;

pub use download::{DownloadCoordinator, DownloadDescriptor, DownloadPhase, DownloadWait};
pub use error::{CorrelationError, DownloadError, RateLimited};
pub use listener::ListenerHandle;
pub use response::{CapturedThread, MatchRule, ResponseCorrelator};
pub use retry::{Pause, RetryPolicy, TokioPause};
pub use waiter::{CorrelationWaiter, Rendezvous, Superseded};
