//! shellbridge Daemon
//!
//! Serves persistent browser-attachable shell sessions.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use shellbridge::config::Config;
use shellbridge::orchestrator::{DaemonOrchestrator, OrchestratorEvent};
use shellbridge::protocol::api::HealthResponse;
use tracing_subscriber::EnvFilter;

/// shellbridge - persistent shell sessions for the browser.
#[derive(Parser, Debug)]
#[command(name = "shellbridge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for the daemon.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the shellbridge server
    Start,

    /// Query the health endpoint of a running server
    Status {
        /// Base URL of the server (defaults to the configured port on localhost)
        #[arg(long)]
        url: Option<String>,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    // Initialize tracing before applying overrides so their warnings show up.
    // RUST_LOG wins over the configured level.
    let level = if cli.verbose {
        "debug".to_string()
    } else {
        std::env::var("SHELLBRIDGE_LOG_LEVEL")
            .ok()
            .filter(|level| !level.trim().is_empty())
            .unwrap_or_else(|| config.daemon.log_level.clone())
            .to_lowercase()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Some(path) = &cli.config {
        tracing::info!("Using config file: {:?}", path);
    }

    config.apply_env_overrides();
    config.validate().context("Invalid configuration")?;

    match cli.command {
        Commands::Start => {
            let mut orchestrator = DaemonOrchestrator::new(config)?;
            run_headless(&mut orchestrator).await?;
        }
        Commands::Status { url } => {
            let base = url.unwrap_or_else(|| format!("http://127.0.0.1:{}", config.server.port));
            match query_health(&base).await {
                Ok(health) => {
                    println!("Server Status: {}", if health.ok { "ok" } else { "degraded" });
                    println!("  URL:      {}", base);
                    println!("  Time:     {}", health.now);
                    println!("  Sessions: {}", health.active_terminal_sessions);
                }
                Err(e) => {
                    eprintln!("Server is not reachable at {}: {:#}", base, e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

/// Fetches `/api/health` from a running server.
async fn query_health(base: &str) -> anyhow::Result<HealthResponse> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .context("Failed to build HTTP client")?;

    let url = format!("{}/api/health", base.trim_end_matches('/'));
    let response = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("Request to {url} failed"))?
        .error_for_status()?;

    response
        .json::<HealthResponse>()
        .await
        .context("Invalid health response")
}

/// Run the server until SIGINT or SIGTERM.
async fn run_headless(orchestrator: &mut DaemonOrchestrator) -> anyhow::Result<()> {
    // Subscribe before starting so the listening event is not missed
    let mut events = orchestrator.subscribe();

    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                OrchestratorEvent::StateChanged(state) => {
                    tracing::info!("Orchestrator state: {:?}", state);
                }
                OrchestratorEvent::Listening { addr } => {
                    tracing::debug!("Listening on {}", addr);
                }
                OrchestratorEvent::SessionsTerminated { count } => {
                    tracing::info!("Terminated {} session(s)", count);
                }
                OrchestratorEvent::Error { message } => {
                    tracing::error!("Orchestrator error: {}", message);
                }
            }
        }
    });

    orchestrator.start().await?;

    wait_for_shutdown_signal().await?;
    tracing::info!("Received shutdown signal");

    orchestrator.stop().await?;

    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to register SIGINT handler")?;

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT");
        }
    }
    Ok(())
}

/// Wait for Ctrl-C.
#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")
}
