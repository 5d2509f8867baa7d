use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;

use ritornello_etl::{config, run_sync, Config};

/// Incrementally sync a personal listening history: pull new scrobbles,
/// enrich them from the music catalog, and merge them into the local
/// history store.
///
/// One invocation is one run; behavior is controlled entirely by the
/// config file (~/.config/ritornello/config.toml) and RITO_* environment
/// variables, not by flags. A pre-existing history store is required:
/// the sync reads its most recent play as the checkpoint and refuses to
/// start from zero.
#[derive(Debug, Parser)]
#[command(name = "ritornello", version, about)]
struct Cli {}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let _cli = Cli::parse();

    if config::ensure_config_file()? {
        log::info!(
            "wrote example config to {}; fill in the provider credentials",
            config::config_file_path().display()
        );
    }
    let config = Config::load().context("Failed to load configuration")?;

    let started = Instant::now();
    let report = run_sync(&config).await?;

    log::info!(
        "{} fetched, {} new, {} catalog matches; store holds {} records through {}",
        report.fetched,
        report.new_records,
        report.matched,
        report.total,
        report.checkpoint
    );
    log::info!("finished in {:.1} seconds", started.elapsed().as_secs_f64());

    Ok(())
}
