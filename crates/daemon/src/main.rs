//! Termplex Daemon
//!
//! Manages workspace-bound PTY shell sessions and streams them to viewers.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use daemon::config::Config;
use daemon::session::TerminalHub;
use tracing_subscriber::EnvFilter;

/// Termplex daemon - workspace terminal sessions for remote viewers.
#[derive(Parser, Debug)]
#[command(name = "termplex-daemon")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default()?,
    };
    config.validate().context("invalid configuration")?;

    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.daemon.log_level.clone()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let hub = TerminalHub::with_geometry(
        config.shell_override(),
        config.session.initial_rows,
        config.session.initial_cols,
    );

    tracing::info!("Termplex daemon started");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    tracing::info!("Shutdown signal received, stopping");
    drop(hub);

    Ok(())
}
