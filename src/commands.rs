use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use reindexer::config::{Config, SiteConfig};
use reindexer::ledger::{format_timestamp, Ledger, LedgerView, LedgerWriter};
use reindexer::observability::Metrics;
use reindexer::orchestrator::{Orchestrator, RunSummary};
use reindexer::submit;

use crate::cli::{Commands, LedgerArgs, RunArgs};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub async fn dispatch(config: Config, command: Commands) -> Result<(), BoxError> {
    match command {
        Commands::Run(args) => pipeline(config, args, Stage::Run).await,
        Commands::Prepare(args) => pipeline(config, args, Stage::Prepare).await,
        Commands::Submit(args) => pipeline(config, args, Stage::Submit).await,
        Commands::Ledger(args) => ledger(&config, args),
    }
}

#[derive(Debug, Clone, Copy)]
enum Stage {
    Run,
    Prepare,
    Submit,
}

async fn pipeline(mut config: Config, args: RunArgs, stage: Stage) -> Result<(), BoxError> {
    if !args.sites.is_empty() {
        config.sites = select_sites(&config.sites, &args.sites)?;
    }

    let metrics = Arc::new(Metrics::new());
    let cancel = CancellationToken::new();

    let ledger = Ledger::load(&config.ledger.path)?;
    let (handle, writer) = LedgerWriter::spawn(ledger, Arc::clone(&metrics));

    let (channel, tokens) = submit::from_config(&config)?;
    let orchestrator = Orchestrator::new(
        &config,
        channel,
        tokens,
        handle,
        Arc::clone(&metrics),
        cancel.clone(),
    )?;

    tokio::spawn(cancel_on_shutdown(cancel.clone()));
    if let Some(timeout) = config.run.timeout {
        tokio::spawn(cancel_after(cancel.clone(), timeout.as_duration()));
    }

    let summary = match stage {
        Stage::Run => orchestrator.run().await?,
        Stage::Prepare => orchestrator.prepare().await?.1,
        Stage::Submit => orchestrator.submit_prepared().await?,
    };

    // Drop the last handle so the writer drains and exits
    drop(orchestrator);
    writer.await?;

    print_summary(&summary, args.json)?;
    info!(metrics = ?metrics.snapshot(), "Counters");

    Ok(())
}

fn select_sites(sites: &[SiteConfig], wanted: &[String]) -> Result<Vec<SiteConfig>, BoxError> {
    let mut selected = Vec::with_capacity(wanted.len());
    for host in wanted {
        match sites.iter().find(|site| site.host.trim() == host.trim()) {
            Some(site) => selected.push(site.clone()),
            None => return Err(format!("site {} is not configured", host).into()),
        }
    }
    Ok(selected)
}

fn print_summary(summary: &RunSummary, json: bool) -> Result<(), BoxError> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else {
        println!("{}", summary);
    }
    Ok(())
}

fn ledger(config: &Config, args: LedgerArgs) -> Result<(), BoxError> {
    let ledger = Ledger::load(&config.ledger.path)?;

    match args.url {
        Some(url) => match ledger.last_submitted(&url) {
            Some(at) => println!("{} last submitted {}", url, format_timestamp(at)),
            None => println!("{} has never been submitted", url),
        },
        None => {
            let stats = ledger.stats();
            println!("ledger: {}", ledger.path().display());
            println!("entries: {}", stats.entries);
            if let (Some(oldest), Some(newest)) = (stats.oldest, stats.newest) {
                println!("oldest: {}", format_timestamp(oldest));
                println!("newest: {}", format_timestamp(newest));
            }
        }
    }
    Ok(())
}

async fn cancel_after(cancel: CancellationToken, timeout: std::time::Duration) {
    tokio::select! {
        _ = tokio::time::sleep(timeout) => {
            warn!(timeout = ?timeout, "Run timeout reached, stopping");
            cancel.cancel();
        }
        _ = cancel.cancelled() => {}
    }
}

async fn cancel_on_shutdown(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = cancel.cancelled() => return,
    }
    info!("Shutdown signal received, finishing in-flight submissions");
    cancel.cancel();
}
