//! Loyalty engine: reconciles uploaded orders with the external accrual
//! service and keeps user balances consistent with its verdicts.
//!
//! Usage:
//!   loyalty-engine [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>       Config file path (default: config/engine.toml)
//!   --accrual-url <URL>       Accrual service base URL (overrides config)
//!   --log-level <LEVEL>       Log level (overrides config)
//!   --owner <ID>              Owner id used with --submit (default: 1)
//!   --submit <NUMBERS>        Comma-separated order numbers to seed at startup

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use loyalty_common::UserId;
use loyalty_engine::accrual::{AccrualClient, AccrualSource};
use loyalty_engine::config::EngineConfig;
use loyalty_engine::engine::Engine;
use loyalty_engine::ledger::Ledger;
use loyalty_engine::stats::EngineStats;
use loyalty_engine::store::Store;
use loyalty_engine::store::memory::MemoryStore;

/// CLI arguments for the loyalty engine.
#[derive(Parser, Debug)]
#[command(name = "loyalty-engine")]
#[command(about = "Order accrual reconciliation engine")]
#[command(version)]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config/engine.toml")]
    config: PathBuf,

    /// Accrual service base URL (overrides config file)
    #[arg(long)]
    accrual_url: Option<String>,

    /// Log level (overrides config file)
    #[arg(long)]
    log_level: Option<String>,

    /// Owner id for --submit
    #[arg(long, default_value_t = 1)]
    owner: u64,

    /// Comma-separated order numbers to submit at startup (e.g. "12345678903")
    #[arg(long, value_delimiter = ',')]
    submit: Option<Vec<String>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration
    let mut config = if args.config.exists() {
        EngineConfig::from_file(&args.config)?
    } else {
        warn!("Config file not found at {:?}, using defaults", args.config);
        EngineConfig::default()
    };

    // Apply CLI overrides
    config.apply_overrides(args.accrual_url, args.log_level);

    // Initialize logging
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting loyalty reconciliation engine");
    info!("Accrual service URL: {}", config.accrual_url);

    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let ledger = Ledger::new(Arc::clone(&store));
    let source: Arc<dyn AccrualSource> = Arc::new(AccrualClient::new(
        &config.accrual_url,
        config.request_timeout,
        config.rate_limit_fallback,
    ));

    // Seed demo orders before the engine starts scanning
    if let Some(numbers) = &args.submit {
        let owner = UserId(args.owner);
        for number in numbers {
            match ledger.submit_order(owner, number).await {
                Ok(outcome) => info!(order = %number, ?outcome, "seed order submitted"),
                Err(e) => error!(order = %number, "seed order rejected: {}", e),
            }
        }
    }

    // Create shutdown channel (capacity for all subscribers)
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let engine = Engine::new(Arc::clone(&store), source, config.clone());
    let stats = engine.stats();
    let handles = engine.spawn(&shutdown_tx).await?;
    info!("Scheduler and worker tasks started");

    // Spawn health logging task
    let health_handle = spawn_health_task(
        Arc::clone(&stats),
        config.health_log_interval,
        shutdown_tx.subscribe(),
    );
    info!("Health logging task started");

    info!("Engine running. Press Ctrl+C to stop.");

    // Handle shutdown signals
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(windows)]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    // Send shutdown signal to all tasks
    info!("Initiating graceful shutdown...");
    let _ = shutdown_tx.send(());

    // Wait for all tasks to complete with timeout
    let shutdown_timeout = Duration::from_secs(10);

    tokio::select! {
        _ = async {
            let _ = handles.scheduler.await;
            let _ = handles.worker.await;
            let _ = health_handle.await;
        } => {
            info!("All tasks completed");
        }
        _ = tokio::time::sleep(shutdown_timeout) => {
            warn!("Shutdown timeout exceeded, forcing exit");
        }
    }

    // Final stats
    stats.log_stats();
    info!("Shutdown complete");

    Ok(())
}

/// Spawn the health logging task.
fn spawn_health_task(
    stats: Arc<EngineStats>,
    log_interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = interval(log_interval);

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    stats.log_stats();
                }
                _ = shutdown.recv() => {
                    info!("Health logger received shutdown signal");
                    break;
                }
            }
        }
    })
}
