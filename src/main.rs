use anyhow::Result;
use gym_assistant::cli;

#[tokio::main]
async fn main() -> Result<()> {
    cli::run().await
}
