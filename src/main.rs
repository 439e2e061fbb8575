mod cli;
mod modules;
mod utils;

use anyhow::Result;
use cli::Cli;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::new()?;
    cli.run().await
}
