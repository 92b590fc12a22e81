//! tcpserve - minimal TCP connection-acceptance server
//!
//! Runs the built-in line-echo handler under the acceptance runtime.
//! Shuts down gracefully on SIGHUP, SIGQUIT, SIGTERM or SIGINT, draining
//! in-flight connections before exiting.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tcpserve::{config::ConfigManager, EchoHandler, Server};

/// CLI arguments for tcpserve
#[derive(Parser, Debug)]
#[command(name = "tcpserve")]
#[command(about = "Minimal TCP connection-acceptance server")]
#[command(version)]
pub struct CliArgs {
    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = "config.toml",
        help = "Path to configuration file"
    )]
    pub config: PathBuf,

    /// Bind address (overrides config file)
    #[arg(short, long, help = "Bind address (e.g., 127.0.0.1:6399)")]
    pub bind: Option<String>,

    /// Maximum number of concurrent connections
    #[arg(long, help = "Maximum number of concurrent connections")]
    pub max_conns: Option<usize>,

    /// Idle timeout in seconds
    #[arg(long, help = "Idle timeout in seconds")]
    pub timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", help = "Log level")]
    pub log_level: String,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration and exit")]
    pub validate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    init_tracing(&args)?;

    info!("Starting tcpserve v{}", env!("CARGO_PKG_VERSION"));

    // Configuration priority: CLI args > config file > environment > defaults
    let mut config = if args.config.exists() {
        ConfigManager::load_from_file(&args.config)?
    } else {
        info!("Config file not found, checking environment variables");
        ConfigManager::load_from_env()?
    };

    config.merge_with_cli_args(args.bind.as_deref(), args.max_conns, args.timeout);

    config
        .validate()
        .context("Final configuration validation failed")?;

    if args.validate_config {
        info!("Configuration is valid");
        info!("  Address: {}", config.server.address);
        info!("  Max connections: {}", config.server.max_conns);
        info!("  Timeout: {:?}", config.server.timeout);
        return Ok(());
    }

    info!("Address: {}", config.server.address);
    info!("Max connections: {}", config.server.max_conns);
    info!("Timeout: {:?}", config.server.timeout);

    let handler = Arc::new(EchoHandler::new(config.server.timeout));
    let server = Server::new(config.server, handler);

    // Blocks until a termination signal arrives and the drain completes
    server.serve_with_signal().await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(args: &CliArgs) -> Result<()> {
    let log_level = if args.verbose {
        "debug"
    } else {
        &args.log_level
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true),
        )
        .with(env_filter)
        .init();

    Ok(())
}
