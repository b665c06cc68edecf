//! CLI Module
//!
//! Command-line interface for rehearsing a performance against the
//! simulated camera.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::EngineMode;

/// Layerloop - layered live video looping
#[derive(Parser, Debug)]
#[command(name = "layerloop")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// JSON configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a performance, reading commands from stdin
    ///
    /// Each line is treated as a spoken phrase. `status` prints the engine
    /// state, `quit` (or end of input) ends the performance.
    #[command(name = "perform")]
    Perform {
        /// Layout mode (overrides the configuration file)
        #[arg(short, long, value_enum)]
        mode: Option<EngineMode>,

        /// Clip history capacity
        #[arg(long)]
        capacity: Option<usize>,

        /// Capture watchdog in milliseconds
        #[arg(long)]
        watchdog_ms: Option<u64>,

        /// Grid seed for reproducible boards
        #[arg(long)]
        seed: Option<u64>,

        /// Simulated camera frame interval in milliseconds
        #[arg(long, default_value_t = 33)]
        frame_ms: u64,

        /// Pretend no camera is attached
        #[arg(long)]
        no_device: bool,
    },

    /// Show which command a phrase resolves to
    #[command(name = "resolve")]
    Resolve {
        /// Phrases to resolve
        #[arg(required = true)]
        phrases: Vec<String>,
    },

    /// Print successive generations of a seeded grid
    #[command(name = "grid")]
    Grid {
        /// Number of generations to step
        #[arg(short, long, default_value_t = 5)]
        steps: u32,

        /// Grid seed
        #[arg(long)]
        seed: Option<u64>,
    },
}
