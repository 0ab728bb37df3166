//! A2A Router - Main Entry Point
//!
//! Serves the routing HTTP surface, or runs one-off queries and directory
//! listings from the command line.

use a2a_router::config::RouterConfig;
use a2a_router::observability::{init_default_logging, metrics};
use a2a_router::server::{self, AppState};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

/// Dynamic A2A agent router
#[derive(Parser)]
#[command(name = "a2a-router")]
#[command(about = "Discover A2A agents and bridge free-text queries to them")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "ROUTER_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging (overrides LOG_LEVEL)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve,
    /// Route one query and print the normalized result
    Query {
        /// Free text to route
        text: String,
        /// Abort the whole run after this many milliseconds
        #[arg(long)]
        deadline_ms: Option<u64>,
    },
    /// List the agent cards in the configured directory
    Cards,
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose > 0 {
        std::env::set_var("LOG_LEVEL", if cli.verbose > 1 { "TRACE" } else { "DEBUG" });
    }
    init_default_logging();

    info!("Starting A2A router v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Serve => run_server(config).await,
        Commands::Query { text, deadline_ms } => run_query(config, &text, deadline_ms).await,
        Commands::Cards => list_cards(config),
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

fn load_configuration(
    config_path: Option<&Path>,
) -> Result<RouterConfig, Box<dyn std::error::Error>> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(RouterConfig::load_from_file(path)?);
    }

    // Try default locations
    for path_str in ["router.toml", "config/router.toml"] {
        let path = PathBuf::from(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(RouterConfig::load_from_file(&path)?);
        }
    }

    warn!("No configuration file found, using defaults");
    let config = RouterConfig::default();
    config.validate()?;
    Ok(config)
}

async fn run_server(config: RouterConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(router_id = %config.router.id, "Router starting");

    let state = AppState::from_config(config)?;
    metrics().update_health_status(true);

    server::serve(state, shutdown_signal()).await?;

    metrics().update_health_status(false);
    info!("Application shutdown complete");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down gracefully..."),
        _ = terminate => info!("Received SIGTERM, shutting down gracefully..."),
    }
}

async fn run_query(
    config: RouterConfig,
    text: &str,
    deadline_ms: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = AppState::from_config(config)?;

    let result = match deadline_ms {
        Some(ms) => {
            state
                .orchestrator
                .run_with_deadline(text, Duration::from_millis(ms))
                .await
        }
        None => state.orchestrator.run(text).await,
    };

    println!("{}", serde_json::to_string_pretty(&result)?);
    if !result.is_success() {
        process::exit(2);
    }
    Ok(())
}

fn list_cards(config: RouterConfig) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = a2a_router::card::DirectorySnapshot::load(&config.directory.cards_dir);

    for (uri, card) in snapshot.list().iter().zip(snapshot.cards()) {
        println!("{uri}\t{}\t{}", card.name, card.url);
    }
    for problem in snapshot.load_errors() {
        eprintln!("skipped: {problem}");
    }

    info!(cards = snapshot.len(), "Directory listing complete");
    Ok(())
}

fn handle_config_command(
    config: &RouterConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}
