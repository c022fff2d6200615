use analysis::{ChannelAnalyst, LlmClient, run_analysis};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use insights_store::{InsightsConfig, Store};
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(
    name = "analysis",
    about = "Batch-analyze unprocessed Slack messages per channel and store insights"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single analysis pass and exit.
    Run {
        /// Only consider messages received within this many hours.
        #[arg(long)]
        lookback_hours: Option<u64>,
    },

    /// Run an analysis pass now and then on a fixed interval until Ctrl-C.
    Watch {
        /// Seconds between passes (defaults to ANALYSIS_INTERVAL_SECS).
        #[arg(long)]
        interval_secs: Option<u64>,

        /// Only consider messages received within this many hours.
        #[arg(long)]
        lookback_hours: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = InsightsConfig::from_env()?;
    let store = Store::open(&config.db_path)?;
    let llm = LlmClient::from_config(&config)?
        .context("LLM not configured (set OPENAI_API_KEY)")?;
    info!(model = llm.model(), db = ?config.db_path, "analysis ready");

    match cli.command {
        None => run_once(&store, &llm, config.lookback).await,
        Some(Commands::Run { lookback_hours }) => {
            run_once(&store, &llm, lookback_or(lookback_hours, config.lookback)).await
        }
        Some(Commands::Watch {
            interval_secs,
            lookback_hours,
        }) => {
            let interval = interval_secs
                .map(Duration::from_secs)
                .unwrap_or(config.analysis_interval);
            watch(
                &store,
                &llm,
                interval,
                lookback_or(lookback_hours, config.lookback),
                shutdown_signal(),
            )
            .await
        }
    }
}

fn lookback_or(hours: Option<u64>, default: Duration) -> Duration {
    hours
        .map(|h| Duration::from_secs(h.saturating_mul(3600)))
        .unwrap_or(default)
}

async fn run_once(store: &Store, llm: &LlmClient, lookback: Duration) -> Result<()> {
    let summary = run_analysis(store, llm, lookback).await?;
    info!(
        messages = summary.messages,
        channels = summary.channels,
        analyzed = summary.analyzed,
        failed = summary.failed,
        "run finished"
    );
    Ok(())
}

/// Runs a pass on every tick until `shutdown` resolves. The shutdown future is
/// polled for the whole loop, including while a pass is in flight, and cancels
/// that pass; an insight and its processed marks are committed together, so a
/// cancelled pass leaves its channel pending.
async fn watch<F>(
    store: &Store,
    analyst: &dyn ChannelAnalyst,
    interval: Duration,
    lookback: Duration,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    if interval.is_zero() {
        anyhow::bail!("analysis interval must be greater than zero");
    }
    info!(every = ?interval, "watching for unprocessed messages");
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut shutdown => {
                info!("received shutdown signal, stopping");
                return Ok(());
            }
        }

        tokio::select! {
            result = run_analysis(store, analyst, lookback) => {
                if let Err(e) = result {
                    error!(err = ?e, "analysis pass failed");
                    warn!("retrying on next tick");
                }
            }
            _ = &mut shutdown => {
                info!("received shutdown signal during a pass, stopping");
                return Ok(());
            }
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(err = ?e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
