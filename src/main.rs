use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    threadkeeper_cli::cli::run().await
}
