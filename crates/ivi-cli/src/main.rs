use anyhow::Result;
use clap::{Parser, Subcommand};
use ivi_core::config::DashboardConfig;
use std::path::PathBuf;

mod commands;
mod logging;

#[derive(Parser)]
#[command(name = "ivi-dash")]
#[command(about = "IVI dashboard - live vehicle signals and the vehicle assistant in a terminal", long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.config/ivi-dash/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "ivi_interaction=trace" (RUST_LOG wins if set)
    #[arg(long, global = true)]
    log: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream live signal values until Ctrl-C
    Watch {
        /// Signal paths (defaults to the configured subscriptions)
        paths: Vec<String>,
    },
    /// Read one signal from the signal server
    Get { path: String },
    /// Write an actuator target, then read it back
    Set { path: String, value: String },
    /// Talk to the vehicle assistant (`/cancel` aborts a reply, `/quit` exits)
    Chat,
    /// Check vehicle agent readiness
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = DashboardConfig::load(cli.config.as_deref())?;
    let level = cli.log.clone().unwrap_or_else(|| config.log_level.clone());
    let diagnostics = logging::init(&level)?;
    tracing::debug!(
        signal = %config.signal.url,
        agent = %config.agent.base_url,
        "configuration loaded"
    );

    match cli.command {
        Commands::Watch { paths } => commands::watch::run(config, paths, diagnostics).await?,
        Commands::Get { path } => commands::signal::get(config, &path).await?,
        Commands::Set { path, value } => commands::signal::set(config, &path, &value).await?,
        Commands::Chat => commands::chat::run(config).await?,
        Commands::Health => commands::health::run(config).await?,
    }

    Ok(())
}
