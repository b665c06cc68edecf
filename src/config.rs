//! Performance configuration
//!
//! Every field has a default so a configuration file only needs to name
//! what it changes.

use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{LoopError, Result};

/// Default watchdog bounding every capture (60 s)
pub const DEFAULT_WATCHDOG_MS: u64 = 60_000;

/// Default grid density for generation 0
pub const DEFAULT_GRID_DENSITY: f64 = 0.1;

/// How finished captures are laid out and what happens after each one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum EngineMode {
    /// Four-cell composite: live preview plus the last few clips.
    /// The engine returns to idle after every capture.
    #[default]
    Composite,
    /// Reverb-style stack: every capture becomes a new layer and the engine
    /// keeps looping.
    Layered,
    /// Generation grid: each capture advances the automaton one step.
    Grid,
}

impl EngineMode {
    /// History capacity used when the configuration does not set one
    pub fn default_capacity(&self) -> usize {
        match self {
            EngineMode::Composite => 3,
            EngineMode::Layered => 8,
            EngineMode::Grid => 64,
        }
    }

    /// Whether a completed capture leaves the engine looping
    pub fn keeps_looping(&self) -> bool {
        !matches!(self, EngineMode::Composite)
    }
}

impl fmt::Display for EngineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineMode::Composite => write!(f, "Composite"),
            EngineMode::Layered => write!(f, "Layered"),
            EngineMode::Grid => write!(f, "Grid"),
        }
    }
}

/// Generation grid dimensions and seeding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub rows: usize,
    pub cols: usize,
    /// Probability that a cell starts alive
    pub density: f64,
    /// Fixed RNG seed; random when absent
    pub seed: Option<u64>,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            rows: 8,
            cols: 12,
            density: DEFAULT_GRID_DENSITY,
            seed: None,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    pub mode: EngineMode,
    /// Clip history capacity; mode default when absent
    pub capacity: Option<usize>,
    pub watchdog_ms: u64,
    pub grid: GridConfig,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            mode: EngineMode::Composite,
            capacity: None,
            watchdog_ms: DEFAULT_WATCHDOG_MS,
            grid: GridConfig::default(),
        }
    }
}

impl LoopConfig {
    /// Default configuration for a mode
    pub fn for_mode(mode: EngineMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn with_watchdog(mut self, watchdog: Duration) -> Self {
        self.watchdog_ms = watchdog.as_millis() as u64;
        self
    }

    pub fn with_grid(mut self, grid: GridConfig) -> Self {
        self.grid = grid;
        self
    }

    /// Load and validate a JSON configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: LoopConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Effective history capacity
    pub fn capacity(&self) -> usize {
        self.capacity.unwrap_or_else(|| self.mode.default_capacity())
    }

    pub fn watchdog(&self) -> Duration {
        Duration::from_millis(self.watchdog_ms)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.capacity() == 0 {
            return Err(LoopError::InvalidConfig {
                reason: "capacity must be at least 1".to_string(),
            });
        }
        if self.watchdog_ms == 0 {
            return Err(LoopError::InvalidConfig {
                reason: "watchdog_ms must be positive".to_string(),
            });
        }
        if self.grid.rows == 0 || self.grid.cols == 0 {
            return Err(LoopError::InvalidConfig {
                reason: format!(
                    "grid must have at least one cell, got {}x{}",
                    self.grid.rows, self.grid.cols
                ),
            });
        }
        if !(0.0..=1.0).contains(&self.grid.density) {
            return Err(LoopError::InvalidConfig {
                reason: format!("grid density {} is outside [0, 1]", self.grid.density),
            });
        }
        Ok(())
    }
}
