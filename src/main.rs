mod bot;
mod commands;
mod config;
mod dispatcher;
mod downloader;
mod message;
mod pairing;
mod platform;
mod responder;
mod scheduler;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::Services;
use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::downloader::DownloaderApi;
use crate::pairing::Pairing;
use crate::platform::evolution::{self, EvolutionClient};
use crate::platform::{ConnectOutcome, WaClient};
use crate::scheduler::Scheduler;

/// Bounded queue between the webhook listener and the event loop
const EVENT_QUEUE_SIZE: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,aemy=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let started_at = Instant::now();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Bot name: {}", config.bot.name);
    info!("  Prefixes: {:?}", config.bot.prefixes);
    info!("  Owners: {}", config.bot.owners.len());
    info!("  Self mode: {}", config.bot.self_mode);
    info!("  Bridge: {} ({})", config.whatsapp.api_url, config.whatsapp.instance_name);

    let registry = commands::builtin_registry().context("Failed to register commands")?;
    info!("{} command names registered", registry.len());

    let services = Arc::new(Services {
        registry: Arc::new(registry),
        api: DownloaderApi::new(&config.downloader).context("Failed to build downloader client")?,
        bot: config.bot.clone(),
        exec: config.exec.clone(),
        menu: config.menu.clone(),
        started_at,
    });

    let client: Arc<dyn WaClient> = Arc::new(EvolutionClient::new(config.whatsapp.clone())?);

    // Webhook first, so no event is missed while connecting
    let (tx, rx) = mpsc::channel(EVENT_QUEUE_SIZE);
    let listener = evolution::bind_webhook(&config.whatsapp.webhook_listen).await?;
    tokio::spawn(async move {
        if let Err(e) = evolution::serve_webhook(listener, tx).await {
            error!("{:#}", e);
        }
    });

    let mut pairing = Pairing::new(
        &config.whatsapp.qr_path,
        Duration::from_secs(config.whatsapp.pairing_timeout_secs),
    );
    match client
        .connect()
        .await
        .context("Failed to connect to WhatsApp")?
    {
        ConnectOutcome::Paired => {
            pairing.remove_qr().await?;
            info!("Connected to WhatsApp");
        }
        ConnectOutcome::PairingRequired { qr } => {
            pairing.show_qr(&qr).await?;
        }
        ConnectOutcome::AwaitingQr => {
            info!("Waiting for a pairing QR code from the bridge");
        }
    }

    let mut scheduler = Scheduler::new().await?;
    scheduler::tasks::register_builtin_tasks(&mut scheduler, &config.scheduler, client.clone())
        .await?;
    scheduler.start().await?;

    let dispatcher = Arc::new(Dispatcher::new(client, services));
    bot::run(dispatcher, rx, pairing, shutdown_signal()).await;

    info!("Shutting down the bot.");
    if let Err(e) = scheduler.shutdown().await {
        warn!("{:#}", e);
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
