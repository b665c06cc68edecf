//! Layerloop CLI - Live Video Looping
//!
//! Command-line interface for rehearsing loop performances.

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use layerloop::cli::commands::{self, PerformOptions};
use layerloop::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    info!("Layerloop v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Some(cmd) => handle_command(cmd, cli.config.as_deref()).await,
        None => {
            println!("Layerloop v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

async fn handle_command(cmd: Commands, config: Option<&std::path::Path>) -> anyhow::Result<()> {
    match cmd {
        Commands::Perform {
            mode,
            capacity,
            watchdog_ms,
            seed,
            frame_ms,
            no_device,
        } => {
            let options = PerformOptions {
                mode,
                capacity,
                watchdog_ms,
                seed,
                frame_ms,
                no_device,
            };
            commands::perform(config, options).await?;
        }
        Commands::Resolve { phrases } => commands::resolve(&phrases)?,
        Commands::Grid { steps, seed } => commands::grid(config, steps, seed)?,
    }
    Ok(())
}
