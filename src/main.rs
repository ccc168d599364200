//! Campus Live — real-time office-hours and notifications client
//!
//! Main entry point that wires the hub manager, the REST API and the live
//! views together and follows them until interrupted.

use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt};

use campus_core::config::{AppConfig, LogFormat};
use campus_core::error::AppError;
use campus_core::traits::StaticTokenSupplier;
use campus_core::types::SlotId;
use campus_officehours::{ProviderClient, QueueClient, RestOfficeHoursApi};
use campus_realtime::{HubConnectionManager, NotificationFeed};

/// Campus Live command-line client
#[derive(Debug, Parser)]
#[command(name = "campus-live", version, about)]
struct Cli {
    /// Configuration environment overlay (`config/{env}.toml`)
    #[arg(long, env = "CAMPUS_ENV", default_value = "development")]
    env: String,

    /// Bearer token presented to the hubs and the REST API
    #[arg(long, env = "CAMPUS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Follow your place in a slot's queue
    Student {
        /// Office-hours slot id
        #[arg(long)]
        slot: i64,
        /// Join the queue before following it
        #[arg(long)]
        join: bool,
        /// Check in with a token read off the provider's screen
        #[arg(long)]
        check_in: Option<String>,
    },
    /// Follow and drive a slot's queue as its provider
    Provider {
        /// Office-hours slot id
        #[arg(long)]
        slot: i64,
        /// Perform one action before following the queue
        #[arg(long, value_enum)]
        action: Option<ProviderCommand>,
    },
    /// Follow personal notifications and announcements
    Notifications,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProviderCommand {
    CallNext,
    Complete,
    NoShow,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match AppConfig::load(&cli.env) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(cli, config).await {
        tracing::error!("Client error: {}", e);
        std::process::exit(1);
    }
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        LogFormat::Pretty => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

async fn run(cli: Cli, config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting Campus Live v{}", env!("CARGO_PKG_VERSION"));

    let tokens = Arc::new(StaticTokenSupplier::new(cli.token));
    let manager = HubConnectionManager::from_config(&config, tokens.clone());
    let api = Arc::new(RestOfficeHoursApi::new(&config.api, tokens)?);

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received");
            shutdown.cancel();
        }
    });

    match cli.command {
        Command::Student {
            slot,
            join,
            check_in,
        } => {
            let mut client = QueueClient::attach(&manager, api, SlotId::new(slot)).await?;
            if join {
                client
                    .join(serde_json::json!({ "source": "campus-live-cli" }))
                    .await?;
            }
            if let Some(token) = check_in {
                client.check_in(&token).await?;
            }
            follow(client.watch(), &shutdown, |view| {
                match view.entry() {
                    Some(entry) => tracing::info!(
                        entry_id = %entry.entry_id,
                        status = %entry.status,
                        position = ?entry.position,
                        estimated_wait_minutes = ?entry.estimated_wait_minutes,
                        "Queue entry"
                    ),
                    None => tracing::info!("Not in queue"),
                }
                if let Some(session) = view.ready_session() {
                    tracing::info!(
                        expires_at = %session.token_expires_at,
                        "You have been called; check in now"
                    );
                }
            })
            .await;
            client.detach();
        }
        Command::Provider { slot, action } => {
            let mut client = ProviderClient::attach(&manager, api, SlotId::new(slot)).await?;
            match action {
                Some(ProviderCommand::CallNext) => client.call_next().await?,
                Some(ProviderCommand::Complete) => client.complete_current().await?,
                Some(ProviderCommand::NoShow) => client.mark_no_show().await?,
                None => {}
            }
            let margin = config.presence.expiry_margin();
            follow(client.watch(), &shutdown, |view| {
                tracing::info!(
                    waiting = view.waiting().count(),
                    current = ?view.current.as_ref().map(|c| (c.entry_id.get(), c.status.as_str())),
                    qr_token = ?view.visible_qr(chrono::Utc::now(), margin),
                    "Provider view"
                );
            })
            .await;
            client.detach();
        }
        Command::Notifications => {
            let mut feed = NotificationFeed::attach(&manager).await?;
            follow(feed.watch(), &shutdown, |snapshot| {
                if let Some(latest) = snapshot.items.first() {
                    tracing::info!(
                        id = %latest.id,
                        title = %latest.title,
                        priority = latest.priority.as_str(),
                        unread = snapshot.unread_count,
                        "Feed updated"
                    );
                }
            })
            .await;
            feed.detach();
        }
    };

    manager.shutdown();
    tracing::info!("Campus Live stopped");
    Ok(())
}

/// Log every published value until shutdown.
async fn follow<T, F>(mut rx: watch::Receiver<T>, shutdown: &CancellationToken, mut log: F)
where
    F: FnMut(&T),
{
    log(&*rx.borrow_and_update());
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            changed = rx.changed() => {
                if changed.is_err() {
                    return;
                }
                log(&*rx.borrow_and_update());
            }
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
