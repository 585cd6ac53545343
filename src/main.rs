mod auth;
mod cli;
mod config;
mod error;
mod metrics;
mod output;
mod providers;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    output::print_banner();

    let cli = Cli::parse();
    info!("Starting bbpulse - Bitbucket pull request metrics");
    cli.execute().await?;

    Ok(())
}
