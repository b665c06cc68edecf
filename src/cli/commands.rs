//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::capture::SimulatedBackend;
use crate::clip::{Clip, ClipId};
use crate::command::CommandResolver;
use crate::config::{EngineMode, LoopConfig};
use crate::engine::{EngineHandle, EngineRuntime};
use crate::error::{LoopError, Result};
use crate::grid::GenerationGrid;
use crate::playback::SimulatedPlayer;

/// Overrides given on the command line for `perform`
#[derive(Debug, Clone, Default)]
pub struct PerformOptions {
    pub mode: Option<EngineMode>,
    pub capacity: Option<usize>,
    pub watchdog_ms: Option<u64>,
    pub seed: Option<u64>,
    pub frame_ms: u64,
    pub no_device: bool,
}

/// Load the configuration file, if any, and apply flag overrides on top.
pub fn build_config(path: Option<&Path>, options: &PerformOptions) -> Result<LoopConfig> {
    let mut config = match path {
        Some(path) => {
            info!("Loading configuration: {}", path.display());
            LoopConfig::load(path)?
        }
        None => LoopConfig::default(),
    };

    if let Some(mode) = options.mode {
        config.mode = mode;
    }
    if let Some(capacity) = options.capacity {
        config.capacity = Some(capacity);
    }
    if let Some(watchdog_ms) = options.watchdog_ms {
        config.watchdog_ms = watchdog_ms;
    }
    if options.seed.is_some() {
        config.grid.seed = options.seed;
    }

    config.validate()?;
    Ok(config)
}

/// Run a performance against the simulated camera.
///
/// Every stdin line is a spoken phrase, except for `status`, `quit`, and
/// `key <name>` which presses a keyboard shortcut.
pub async fn perform(config_path: Option<&Path>, options: PerformOptions) -> Result<()> {
    let config = build_config(config_path, &options)?;
    info!("Starting {} performance", config.mode);

    let mut backend = SimulatedBackend::new()
        .with_frame_interval(Duration::from_millis(options.frame_ms.max(1)));
    if options.no_device {
        backend = backend.unavailable();
    }

    let (runtime, handle) = match EngineRuntime::new(config, backend) {
        Ok(pair) => pair,
        Err(err @ LoopError::DeviceUnavailable { .. }) => {
            println!("Waiting for webcam...");
            return Err(err);
        }
        Err(err) => return Err(err),
    };

    let player = SimulatedPlayer::new(handle.clone());
    let engine = tokio::spawn(runtime.run(player));

    println!("Ready. Say begin, loop, blackout, flip or toggle; 'status' or 'quit'.");
    read_phrases(&handle).await?;

    handle.shutdown()?;
    match engine.await {
        Ok(snapshot) => {
            println!("Performance ended: {} clip(s) held", snapshot.history.len());
            Ok(())
        }
        Err(err) => Err(LoopError::CaptureBackend {
            reason: format!("engine task failed: {}", err),
        }),
    }
}

async fn read_phrases(handle: &EngineHandle) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let phrase = line.trim();
        match phrase {
            "" => continue,
            "quit" | "exit" => break,
            "status" => {
                let snapshot = handle.snapshot().await?;
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            }
            _ => {
                if let Some(key) = phrase.strip_prefix("key ") {
                    let key = if key.trim() == "space" { " " } else { key };
                    match handle.key(key)? {
                        Some(command) => println!("> {}", command),
                        None => println!("(no binding for '{}')", key.trim()),
                    }
                    continue;
                }
                match handle.utter(phrase)? {
                    Some(command) => println!("> {}", command),
                    None => println!("(ignored '{}')", phrase),
                }
            }
        }
    }

    Ok(())
}

/// Show which command each phrase resolves to.
pub fn resolve(phrases: &[String]) -> Result<()> {
    let resolver = CommandResolver::new();

    for phrase in phrases {
        match resolver.resolve(phrase) {
            Some(command) => println!("{:<20} -> {}", phrase, command),
            None => println!("{:<20} -> (ignored)", phrase),
        }
    }

    Ok(())
}

/// Step a seeded grid and print each generation.
///
/// Each step is fed a placeholder clip so the board fills with
/// generations exactly as it would during a performance.
pub fn grid(config_path: Option<&Path>, steps: u32, seed: Option<u64>) -> Result<()> {
    let mut config = match config_path {
        Some(path) => LoopConfig::load(path)?,
        None => LoopConfig::for_mode(EngineMode::Grid),
    };
    if seed.is_some() {
        config.grid.seed = seed;
    }
    config.validate()?;

    let mut grid = GenerationGrid::from_config(&config.grid);
    println!(
        "Generation 0 ({}x{}, {} alive)",
        grid.rows(),
        grid.cols(),
        grid.live_count()
    );
    println!("{}", grid.snapshot());

    for step in 0..steps {
        let clip = Clip::new(ClipId(u64::from(step)), vec![0], None)?;
        let generation = grid.advance(clip);
        println!("Generation {} ({} alive)", generation, grid.live_count());
        println!("{}", grid.snapshot());

        if grid.is_extinct() {
            warn!("Grid went extinct after {} generation(s)", generation);
            break;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_flags_override_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "mode": "layered", "capacity": 5 }}"#).unwrap();

        let options = PerformOptions {
            capacity: Some(2),
            seed: Some(9),
            ..PerformOptions::default()
        };
        let config = build_config(Some(file.path()), &options).unwrap();
        assert_eq!(config.mode, EngineMode::Layered);
        assert_eq!(config.capacity(), 2);
        assert_eq!(config.grid.seed, Some(9));
    }

    #[test]
    fn test_invalid_override_rejected() {
        let options = PerformOptions {
            watchdog_ms: Some(0),
            ..PerformOptions::default()
        };
        assert!(build_config(None, &options).is_err());
    }

    #[test]
    fn test_grid_command_runs() {
        assert!(grid(None, 3, Some(7)).is_ok());
    }
}
