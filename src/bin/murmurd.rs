//! murmur daemon - real-time chat relay
//!
//! Serves the account endpoints and the `/ws` chat socket until it
//! receives SIGINT or SIGTERM.
//!
//! # Usage
//!
//! ```bash
//! # Serve with defaults (127.0.0.1:8000)
//! murmurd
//!
//! # Serve on another address with an explicit config file
//! murmurd --listen 0.0.0.0:9000 --config ./murmur.toml serve
//!
//! # Print the resolved configuration and exit
//! murmurd check-config
//!
//! # Enable debug logging
//! RUST_LOG=murmurd=debug murmurd
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: Graceful shutdown (open sockets receive 1001)

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use murmurd::config::Config;
use murmurd::server::ChatServer;

/// murmur daemon - minimal real-time chat relay
#[derive(Parser, Debug)]
#[command(name = "murmurd", version, about)]
struct Args {
    /// Config file (default: <config dir>/murmur/config.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Address to listen on, overriding config and MURMUR_LISTEN
    #[arg(short, long, global = true)]
    listen: Option<SocketAddr>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the server (default)
    Serve,
    /// Validate and print the resolved configuration
    CheckConfig,
}

/// Resolves configuration: file, then environment, then flags.
fn resolve_config(args: &Args) -> Result<Config> {
    let mut config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    config
        .apply_env()
        .context("Invalid environment override")?;
    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = resolve_config(&args)?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => run_server(config, args.verbose),
        Command::CheckConfig => {
            println!("{config:#?}");
            Ok(())
        }
    }
}

/// Runs the server (async entry point).
#[tokio::main]
async fn run_server(config: Config, verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("murmurd={level}").parse()?)
                .add_directive(format!("murmur={level}").parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "murmur daemon starting"
    );

    // Create cancellation token for graceful shutdown
    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let server = ChatServer::new(config, cancel_token).context("Failed to build server")?;

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("murmur daemon stopped");
    Ok(())
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
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
