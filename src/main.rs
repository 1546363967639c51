use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info, warn};

use command_sync::config::{SyncConfig, CONFIG_FILE_NAME};
use command_sync::utils::{init_logging, AppResult, DEFAULT_LOG_FILTER};
use command_sync::SyncEngine;

/// Keep command definitions on disk in sync with the registry and remote catalog
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = CONFIG_FILE_NAME)]
    config: PathBuf,

    /// Run one full scan and reconciliation, then exit
    #[arg(long)]
    once: bool,

    /// Do not touch the remote catalog
    #[arg(long)]
    no_remote: bool,

    /// Log filter directive, e.g. `debug` or `command_sync=trace` (RUST_LOG wins)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = SyncConfig::read(&cli.config).await;

    let log_level = cli
        .log_level
        .clone()
        .or_else(|| config.as_ref().ok().map(|config| config.log_level.clone()))
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
    if let Err(e) = init_logging(&log_level) {
        eprintln!("{:#}", e);
        std::process::exit(2);
    }

    let result = match config {
        Ok(config) => run(cli, config).await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        error!("command-sync failed: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli, mut config: SyncConfig) -> AppResult<()> {
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    if cli.no_remote {
        config.remote.enabled = false;
    }
    config.validate()?;

    let engine = SyncEngine::open(config).await?;

    let report = engine.full_scan().await;
    info!(
        "Startup scan: {} loaded, {} unchanged, {} failed, {} retired, {} registered names",
        report.loaded,
        report.unchanged,
        report.failed.len(),
        report.retired,
        engine.registry().size()
    );
    for (path, reason) in &report.failed {
        warn!("Not loaded: {} ({})", path.display(), reason);
    }
    if report.degraded {
        warn!("Persistent store unavailable; nothing was committed");
    }

    if cli.once {
        let success = report
            .reconcile
            .as_ref()
            .map(|r| r.is_success())
            .unwrap_or(false);
        if !success {
            anyhow::bail!("Reconciliation did not complete for every partition");
        }
        return Ok(());
    }

    let watcher = engine.start_watching()?;
    info!("Running; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    if let Some(watcher) = watcher {
        watcher.stop();
    }
    info!("Shutting down");
    Ok(())
}
