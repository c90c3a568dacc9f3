//! Chromium DevTools Protocol session used by threadkeeper.
//!
//! The crate launches (or attaches to) Chromium, keeps one page target alive and
//! republishes the network and download events the correlation layer consumes.

pub mod config;
pub mod error;
pub mod events;
pub mod metrics;
pub mod session;
pub mod transport;
pub mod util;

pub use config::{detect_chrome_executable, CdpConfig};
pub use error::{AdapterError, AdapterErrorKind};
pub use events::{DownloadBehavior, DownloadState, NetworkResponse, SessionEvent};
pub use session::{BrowserSession, CdpSession};
pub use transport::{CdpTransport, ChromiumTransport, CommandTarget, TransportEvent};
