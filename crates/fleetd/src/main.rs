//! fleetd — the FleetGrid daemon.
//!
//! # Usage
//!
//! ```text
//! fleetd run --config fleet.toml
//! fleetd check-config --config fleet.toml
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

use fleet_core::FleetConfig;
use fleetd::ControlPlane;

#[derive(Parser)]
#[command(name = "fleetd", about = "FleetGrid control plane daemon", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the registry, load balancer and autoscaler until Ctrl-C.
    Run {
        /// Path to the fleet config.
        #[arg(short, long, default_value = "fleet.toml")]
        config: PathBuf,
    },
    /// Parse and validate a config, then print it as JSON.
    CheckConfig {
        #[arg(short, long, default_value = "fleet.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,fleetd=debug,fleetgrid=debug".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run { config } => run(config).await,
        Command::CheckConfig { config } => {
            let config = FleetConfig::from_file(&config)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn run(config_path: PathBuf) -> anyhow::Result<()> {
    info!(path = ?config_path, "loading config");
    let config = FleetConfig::from_file(&config_path)?;

    let mut plane = ControlPlane::from_config(&config)?;
    info!(services = config.services.len(), "services registered");

    plane.start();

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    plane.shutdown().await;
    info!("FleetGrid daemon stopped");
    Ok(())
}
