use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "reindexer")]
#[command(about = "Sitemap-driven search engine resubmission", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to $REINDEXER_CONFIG or config/reindexer.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Discover, filter and submit in one pass
    Run(RunArgs),
    /// Discover and filter, then write the work file
    Prepare(RunArgs),
    /// Submit the batches in the work file
    Submit(RunArgs),
    /// Inspect the submission ledger
    Ledger(LedgerArgs),
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Only process these hosts (repeatable)
    #[arg(long = "site")]
    pub sites: Vec<String>,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args, Debug)]
pub struct LedgerArgs {
    /// Show the last submission time of this URL
    #[arg(long)]
    pub url: Option<String>,
}
