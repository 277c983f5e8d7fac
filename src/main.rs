// =============================================================================
// kline-sync: Main Entry Point
// =============================================================================
//
// Usage:
//   kline-sync                   run a pass every day at the configured time
//   kline-sync --once            run one pass now and exit
//   kline-sync --symbol sz000001 sync a single instrument now and exit
//   kline-sync --config path     use another config file (written with
//                                defaults when missing)
//
// Ctrl+C cancels the running pass at its next pacing sleep.
// =============================================================================

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::Local;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use kline_sync::calendar::next_run_after;
use kline_sync::runtime_config::{RuntimeConfig, DEFAULT_CONFIG_PATH};
use kline_sync::sina::SinaClient;
use kline_sync::store::{HistoryStore, MemoryStore, SqliteStore};
use kline_sync::sync::Orchestrator;
use kline_sync::SyncError;

#[derive(Debug, Parser)]
#[command(name = "kline-sync", version, about = "Daily K-line history sync with indicator enrichment")]
struct Cli {
    /// Run one pass now and exit
    #[arg(long, conflicts_with = "symbol")]
    once: bool,

    /// Sync a single instrument now and exit (e.g. sz000001)
    #[arg(long)]
    symbol: Option<String>,

    /// Path to the JSON runtime config
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = RuntimeConfig::load_or_init(&cli.config).unwrap_or_else(|e| {
        warn!(error = %format!("{e:#}"), "Failed to load config, using defaults");
        RuntimeConfig::default()
    });
    config.apply_env();
    config.validate()?;

    info!(
        database_url = %config.database_url,
        symbols = config.symbols.len(),
        schedule = %format!("{:02}:{:02}", config.schedule_hour, config.schedule_minute),
        "kline-sync starting"
    );

    // ── 2. Collaborators ─────────────────────────────────────────────────
    let store: Arc<dyn HistoryStore> = if config.database_url == "memory" {
        warn!("using in-memory store, nothing will be kept");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(SqliteStore::connect(&config.database_url).await?)
    };
    let client = Arc::new(SinaClient::new(config.http_timeout())?);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Ctrl+C received, cancelling");
                cancel.cancel();
            }
        });
    }

    let orchestrator = Orchestrator::new(client, store, config.sync_settings(), cancel.clone());

    // ── 3. One-shot modes ────────────────────────────────────────────────
    if let Some(symbol) = cli.symbol {
        let written = orchestrator.sync_one(&symbol.to_lowercase()).await?;
        info!(symbol = %symbol, written, "manual sync finished");
        return Ok(());
    }

    if cli.once {
        let symbols = orchestrator.resolve_universe(&config.symbols).await;
        orchestrator.run_pass(&symbols).await?;
        return Ok(());
    }

    // ── 4. Daily schedule ────────────────────────────────────────────────
    loop {
        let now = Local::now().naive_local();
        let next = next_run_after(now, config.schedule_hour, config.schedule_minute)
            .context("invalid schedule time")?;
        let wait = (next - now).to_std().unwrap_or_default();
        info!(next_run = %next, wait_secs = wait.as_secs(), "waiting for next sync pass");

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        let symbols = orchestrator.resolve_universe(&config.symbols).await;
        match orchestrator.run_pass(&symbols).await {
            Ok(_) => {}
            Err(SyncError::Cancelled) => break,
            Err(e) => {
                error!(error = %e, "sync pass aborted");
                return Err(e.into());
            }
        }
    }

    info!("kline-sync stopped");
    Ok(())
}
