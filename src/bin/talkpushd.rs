//! talkpushd - runs the push notification service in the foreground
//!
//! # Usage
//!
//! ```bash
//! # Run with the default config lookup
//! talkpushd
//!
//! # Run with an explicit config file
//! talkpushd --config ./talkpush.toml run
//!
//! # Print the effective configuration
//! talkpushd config
//! ```
//!
//! Notifications are written to the log. Set `RUST_LOG=talkpushd=debug` for
//! per-event tracing.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use talkpush_core::{MemoryStore, StaticUserProvider, TracingSink};
use talkpushd::transport::WebSocketTransport;
use talkpushd::{Config, NotificationService, ServiceDeps};

/// talkpush daemon - push-channel notification relay
#[derive(Parser, Debug)]
#[command(name = "talkpushd", version, about)]
struct Args {
    /// Config file (default: $TALKPUSH_CONFIG, then <config dir>/talkpush/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect and relay notifications until SIGINT / SIGTERM
    Run,
    /// Print the effective configuration as TOML
    Config,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(args.config.as_deref()).context("Failed to load config")?;

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(config),
        Command::Config => {
            let rendered = toml::to_string_pretty(&config).context("Failed to render config")?;
            print!("{rendered}");
            Ok(())
        }
    }
}

#[tokio::main]
async fn run(config: Config) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("talkpushd=info".parse()?)
                .add_directive("talkpush_core=info".parse()?)
                .add_directive("talkpush_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        endpoint = %config.server.endpoint,
        "talkpushd starting"
    );

    let Some(user) = config.user.to_user() else {
        bail!("No user configured: set [user] user_id in the config file");
    };

    let deps = ServiceDeps {
        transport: Arc::new(WebSocketTransport::new()),
        users: Arc::new(StaticUserProvider::new(Some(user))),
        store: Arc::new(MemoryStore::new()),
        sink: Arc::new(TracingSink),
    };

    let service = NotificationService::start(&config, deps)
        .await
        .context("Failed to start notification service")?;

    if let Err(e) = wait_for_shutdown_signal().await {
        error!(error = %e, "Error waiting for shutdown signal");
    }

    let status = service.connection_status();
    info!(state = ?status.state, attempt = status.attempt, "Shutting down");
    service.shutdown().await;

    info!("talkpushd stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

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

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
