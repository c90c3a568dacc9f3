use clap::Subcommand;

use super::export::ExportArgs;
use super::status::StatusArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Export every thread not yet recorded in the done file
    Export(ExportArgs),

    /// Show which threads are exported and which are pending
    Status(StatusArgs),
}
