use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use listing_watcher::config::{is_valid_cron, LoggingConfig};
use listing_watcher::scheduler::{RunAttempt, WatchScheduler};
use listing_watcher::watcher::Watcher;
use listing_watcher::AppConfig;

#[derive(Debug, Parser)]
#[command(name = "listing-watcher", about = "Watches product listings for new items and price changes", version)]
struct Cli {
    /// Config file; defaults to config/default.toml plus config/local.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a single check and exit
    Run,
    /// Keep running on a cron schedule until interrupted
    Watch {
        /// Six-field cron expression overriding scheduler.cron
        #[arg(long)]
        cron: Option<String>,
    },
    /// Load and validate the configuration, then exit
    CheckConfig,
}

fn init_tracing(logging: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("listing_watcher=info,sqlx=warn"));

    let (file_layer, guard) = match logging.directory.as_deref() {
        Some(directory) => {
            let prefix = logging.file_prefix.as_deref().unwrap_or("listing-watcher.log");
            let appender = tracing_appender::rolling::daily(directory, prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .with(file_layer)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    let _guard = init_tracing(&config.logging);

    match cli.command.unwrap_or(Command::Run) {
        Command::CheckConfig => {
            let watcher = Watcher::from_config(&config).await?;
            info!(
                categories = config.fetcher.categories.len(),
                notifiers = ?watcher.notifiers().notifier_types(),
                "configuration is valid"
            );
        }
        Command::Run => {
            let watcher = Watcher::from_config(&config).await?;
            let report = watcher.run_once().await?;
            info!(
                run_id = %report.run_id,
                outcome = ?report.outcome,
                listings = report.listings,
                new_items = report.new_items,
                price_changes = report.price_changes,
                "done"
            );
        }
        Command::Watch { cron } => {
            if let Some(cron) = cron {
                anyhow::ensure!(is_valid_cron(&cron), "invalid cron expression '{}'", cron);
                config.scheduler.cron = cron;
            }

            let watcher = Arc::new(Watcher::from_config(&config).await?);
            let mut scheduler = WatchScheduler::new(watcher, &config.scheduler).await?;

            if let RunAttempt::Failed(e) = scheduler.run_now().await {
                error!(error = %e, "initial run failed");
            }

            scheduler.start().await?;
            tokio::signal::ctrl_c().await?;
            info!("Shutting down...");
            scheduler.shutdown().await?;
        }
    }

    Ok(())
}
