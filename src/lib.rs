//! threadkeeper library
//!
//! Exposes modules for integration testing

pub mod archive;
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod render;
pub mod threads;

pub use archive::{ArchiveOptions, ArchiveReport, Archiver, SavedThread};
pub use checkpoint::{Checkpoint, CheckpointStore};
pub use config::{Config, ExportMode};
pub use errors::ArchiveError;
pub use threads::ThreadRef;
