use anyhow::Result;

use super::commands::Commands;
use super::context::CliContext;
use super::env::CliArgs;
use super::export::cmd_export;
use super::status::cmd_status;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Export(args) => cmd_export(args, ctx).await,
        Commands::Status(args) => cmd_status(args, ctx).await,
    }
}
