//! Gas price alert bot - server
//!
//! Streams Ethereum gas prices from gasz and alerts Telegram subscribers
//! whose thresholds are met.

mod config;
mod handler;
mod state;
mod webhook;

use clap::Parser;
use config::{AppConfig, Args};
use state::{AppState, SharedState};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use tokio::signal::unix::{signal, Signal, SignalKind};

use gasbot_alerts::{Notifier, SubscriberRegistry, TelegramBot, TelegramTransport};
use gasbot_core::LatestGasPrice;
use gasbot_feeds::{FeedError, GaszRestClient, WsClient};

/// Buffered feed messages between the push client and the notification loop.
const FEED_CHANNEL_CAPACITY: usize = 64;

/// `RUST_LOG` wins over `level` when set.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let result = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .try_init();

    if let Err(e) = result {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

async fn run_stats_reporter(state: SharedState, cancel: CancellationToken) {
    info!("Starting stats reporter");
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    interval.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let summary = state.stats_summary();
        info!(
            "📊 Stats | Uptime: {}s | Subscribers: {} | Snapshots: {} | Alerts: {} sent, {} failed",
            summary.uptime_secs,
            state.registry.len().await,
            summary.snapshots_received,
            summary.alerts_delivered,
            summary.alerts_failed
        );
    }

    info!("Stats reporter stopped");
}

/// Process shutdown triggers: Ctrl+C everywhere, SIGTERM on unix.
struct ShutdownSignal {
    #[cfg(unix)]
    terminate: Option<Signal>,
}

impl ShutdownSignal {
    /// Register the handlers up front so a signal that arrives before
    /// `recv` is polled is not lost.
    fn install() -> Self {
        #[cfg(unix)]
        let terminate = match signal(SignalKind::terminate()) {
            Ok(terminate) => Some(terminate),
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                None
            }
        };

        Self {
            #[cfg(unix)]
            terminate,
        }
    }

    /// Wait for the first shutdown signal and return its name.
    async fn recv(&mut self) -> &'static str {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match self.terminate.as_mut() {
                Some(terminate) => {
                    terminate.recv().await;
                }
                None => std::future::pending::<()>().await,
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => "SIGINT",
            _ = terminate => "SIGTERM",
        }
    }
}

/// Exit status for a push client that stopped on its own.
fn feed_exit_code(result: Result<Result<(), FeedError>, JoinError>) -> ExitCode {
    match result {
        Ok(Ok(())) => {
            info!("Gas price feed stopped");
            ExitCode::SUCCESS
        }
        Ok(Err(e)) => {
            error!(error = %e, "Gas price feed failed, shutting down");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, "Gas price feed task panicked");
            ExitCode::FAILURE
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    init_logging(&args.log_level);

    let config = match AppConfig::from_args(args) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("⛽ Gas price bot starting...");
    info!("  Query URL: {}", config.feed.query_url);
    info!("  Subscribe URL: {}", config.feed.subscribe_url);
    info!("  Updates: {}", config.update_mode());
    info!("  Trigger mode: {}", config.notifier.trigger_mode);
    info!("  Log level: {}", config.log_level);

    let registry = Arc::new(SubscriberRegistry::new());
    let latest = Arc::new(LatestGasPrice::new());
    let state: SharedState = Arc::new(AppState::new(registry.clone(), latest.clone()));
    let cancel = CancellationToken::new();

    // Seed the snapshot so /latest answers before the first pushed update
    match GaszRestClient::new(&config.feed) {
        Ok(client) => match client.seed(&latest).await {
            Ok(price) => info!(%price, "Initial gas price loaded"),
            Err(e) => warn!(error = %e, "Failed to fetch initial gas price"),
        },
        Err(e) => warn!(error = %e, "Failed to build gas price client"),
    }

    let bot = Arc::new(TelegramBot::new(&config.token, registry.clone(), latest.clone()));
    if let Err(e) = bot.register_commands().await {
        warn!(error = %e, "Failed to register bot commands");
    }

    let transport = Arc::new(TelegramTransport::new(bot.bot().clone()));
    let notifier = Arc::new(Notifier::new(registry, transport, config.notifier.clone()));

    let (feed_tx, feed_rx) = mpsc::channel(FEED_CHANNEL_CAPACITY);
    let ws = WsClient::new(config.feed.clone(), latest, feed_tx, cancel.clone());
    let mut feed_handle = tokio::spawn(ws.run());

    let handler_handle = tokio::spawn(handler::run_notification_handler(
        feed_rx,
        notifier,
        state.clone(),
        cancel.clone(),
    ));

    let stats_handle = tokio::spawn(run_stats_reporter(state.clone(), cancel.clone()));

    let mut bot_handle = match config.webhook.clone() {
        Some(settings) => {
            let bot = bot.clone();
            let state = state.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if let Err(e) = webhook::run_webhook(bot, state, settings, cancel).await {
                    error!(error = %e, "Webhook server failed");
                }
            })
        }
        None => tokio::spawn(bot.clone().run_polling(cancel.clone())),
    };

    // Handle shutdown
    let mut shutdown = ShutdownSignal::install();
    info!("Press Ctrl+C to stop...");

    let mut exit_code = ExitCode::SUCCESS;
    let mut feed_done = false;
    tokio::select! {
        name = shutdown.recv() => {
            warn!(signal = name, "Shutdown signal received");
        }
        result = &mut feed_handle => {
            feed_done = true;
            exit_code = feed_exit_code(result);
        }
        _ = &mut bot_handle => {
            error!("Telegram bot stopped unexpectedly");
            exit_code = ExitCode::FAILURE;
        }
    }

    cancel.cancel();

    // Wait for tasks with timeout, then abort
    if !feed_done && tokio::time::timeout(Duration::from_secs(2), &mut feed_handle).await.is_err() {
        feed_handle.abort();
    }
    let _ = tokio::time::timeout(Duration::from_secs(5), handler_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(1), stats_handle).await;
    if !bot_handle.is_finished()
        && tokio::time::timeout(Duration::from_secs(5), &mut bot_handle)
            .await
            .is_err()
    {
        bot_handle.abort();
    }

    // Final stats
    let summary = state.stats_summary();
    info!("📈 Final Stats:");
    info!("  Total uptime: {} seconds", summary.uptime_secs);
    info!("  Snapshots received: {}", summary.snapshots_received);
    info!("  Notification passes: {}", summary.passes_run);
    info!("  Alerts delivered: {}", summary.alerts_delivered);
    info!("  Alerts failed: {}", summary.alerts_failed);

    info!("👋 Gas price bot stopped");
    exit_code
}
