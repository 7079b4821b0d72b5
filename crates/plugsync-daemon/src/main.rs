//! plugsync Daemon - Main entry point
//!
//! Runs the device registry over the cloud and LAN transports and serves the
//! REST/WebSocket API.

mod api;
mod camera;
mod cloud;
mod config;
mod lan;
mod remote;
mod server;
mod sink;
mod state;
mod ws;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "plugsync")]
#[command(about = "Cloud and LAN device registry for smart plugs and switches")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "plugsync.toml")]
    config: PathBuf,

    /// Bind address for web server
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Send a command to this device through a running daemon and exit
    #[arg(long, requires = "command")]
    send: Option<String>,

    /// JSON command for --send, e.g. '{"switch": "on"}'
    #[arg(long)]
    command: Option<String>,

    /// Write an example configuration file and exit
    #[arg(long)]
    init_config: bool,
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.init_config {
        config::save_default_config(&args.config)?;
        println!("Wrote example configuration to {}", args.config.display());
        return Ok(());
    }

    // Configuration is read before logging so `debug` can raise the level
    let mut config = config::load_config(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;

    if let Some(bind) = args.bind {
        config.daemon.bind = bind;
    }

    let mut level = parse_level(&args.log_level);
    if config.debug.is_enabled() && level < Level::DEBUG {
        level = Level::DEBUG;
    }

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("plugsync v{}", env!("CARGO_PKG_VERSION"));

    if let Some(id) = args.send {
        let command = remote::parse_command(args.command.as_deref().unwrap_or("{}"))?;
        let base = remote::base_url(&config.daemon.bind, config.daemon.tls.is_some());
        let response = remote::send(&base, &id, &command).await?;
        println!("{}", response);
        return Ok(());
    }

    info!(
        config = %args.config.display(),
        mode = %config.mode,
        devices = config.devices.len(),
        "Configuration loaded"
    );

    let state = state::AppState::new(config.clone()).await?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        info!("Shutdown requested");
    };

    let served = server::run(
        state.clone(),
        &config.daemon.bind,
        config.daemon.tls.as_ref(),
        shutdown,
    )
    .await;

    state.shutdown().await;
    served
}
