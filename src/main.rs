mod cli;
mod commands;

use clap::Parser;
use cli::Cli;
use reindexer::config::Config;
use reindexer::observability;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    let config = match cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    observability::init_tracing(config.telemetry.log_format);

    commands::dispatch(config, cli.command).await
}
