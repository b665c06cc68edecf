//! Generation Grid
//!
//! A Game of Life board whose steps are driven by finished captures instead
//! of a timer. Each live cell remembers the generation it was born in and
//! plays that generation's clip; generation 0 is the live camera preview.
//!
//! Neighbours wrap around all four edges (a torus).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::clip::Clip;
use crate::config::GridConfig;
use crate::error::{LoopError, Result};

/// Cell contents: `None` is dead, `Some(g)` is alive since generation `g`
pub type Cell = Option<u32>;

/// Generation whose cells show the live preview rather than a clip
pub const LIVE_GENERATION: u32 = 0;

/// Toroidal generation grid
#[derive(Debug, Clone)]
pub struct GenerationGrid {
    rows: usize,
    cols: usize,
    cells: Vec<Cell>,
    initial: Vec<Cell>,
    generation: u32,
    /// Clips of generations that still have live cells
    clips: BTreeMap<u32, Clip>,
}

impl GenerationGrid {
    /// Random grid where each cell starts alive with probability `density`
    ///
    /// The same seed always produces the same board.
    pub fn seeded(rows: usize, cols: usize, density: f64, seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let density = density.clamp(0.0, 1.0);
        let cells: Vec<Cell> = (0..rows * cols)
            .map(|_| rng.gen_bool(density).then_some(LIVE_GENERATION))
            .collect();
        Self::with_cells(rows, cols, cells)
    }

    /// Grid built from a configuration block
    pub fn from_config(config: &GridConfig) -> Self {
        Self::seeded(config.rows, config.cols, config.density, config.seed)
    }

    /// Grid from a text pattern: `#` or `O` is alive, anything else dead
    ///
    /// # Example
    /// ```
    /// use layerloop::grid::GenerationGrid;
    ///
    /// let grid = GenerationGrid::from_pattern(&[
    ///     ".....",
    ///     "..#..",
    ///     "..#..",
    ///     "..#..",
    ///     ".....",
    /// ]).unwrap();
    /// assert_eq!(grid.live_count(), 3);
    /// ```
    pub fn from_pattern(pattern: &[&str]) -> Result<Self> {
        let rows = pattern.len();
        let cols = pattern.first().map(|r| r.chars().count()).unwrap_or(0);
        if rows == 0 || cols == 0 {
            return Err(LoopError::InvalidConfig {
                reason: "grid pattern is empty".to_string(),
            });
        }

        let mut cells = Vec::with_capacity(rows * cols);
        for (i, row) in pattern.iter().enumerate() {
            if row.chars().count() != cols {
                return Err(LoopError::InvalidConfig {
                    reason: format!("grid pattern row {} has a different width", i),
                });
            }
            cells.extend(
                row.chars()
                    .map(|c| matches!(c, '#' | 'O').then_some(LIVE_GENERATION)),
            );
        }
        Ok(Self::with_cells(rows, cols, cells))
    }

    fn with_cells(rows: usize, cols: usize, cells: Vec<Cell>) -> Self {
        Self {
            rows,
            cols,
            initial: cells.clone(),
            cells,
            generation: 0,
            clips: BTreeMap::new(),
        }
    }

    // ========================================================================
    // Stepping
    // ========================================================================

    /// Count live neighbours of `(row, col)` with wrap-around on every edge
    pub fn live_neighbors(&self, row: usize, col: usize) -> usize {
        let mut count = 0;
        for dr in [self.rows - 1, 0, 1] {
            for dc in [self.cols - 1, 0, 1] {
                let r = (row + dr) % self.rows;
                let c = (col + dc) % self.cols;
                // On a one-wide board the wrapped neighbour is the cell itself
                if r == row && c == col {
                    continue;
                }
                if self.cells[r * self.cols + c].is_some() {
                    count += 1;
                }
            }
        }
        count
    }

    /// Compute the next board without changing this one
    ///
    /// Dead cells with exactly three live neighbours are born into the next
    /// generation; live cells with two or three survive and keep their
    /// generation; everything else dies.
    pub fn next_cells(&self) -> Vec<Cell> {
        let born = self.generation + 1;
        let mut next = Vec::with_capacity(self.cells.len());
        for row in 0..self.rows {
            for col in 0..self.cols {
                let cell = self.cells[row * self.cols + col];
                let neighbors = self.live_neighbors(row, col);
                next.push(match (cell, neighbors) {
                    (Some(g), 2) | (Some(g), 3) => Some(g),
                    (None, 3) => Some(born),
                    _ => None,
                });
            }
        }
        next
    }

    /// Step one generation, using `clip` as the new generation's clip
    ///
    /// Clips whose generation has died out are released, so the store
    /// never holds more clips than there are live cells. Returns the new
    /// generation number.
    pub fn advance(&mut self, clip: Clip) -> u32 {
        self.cells = self.next_cells();
        self.generation += 1;
        self.clips.insert(self.generation, clip);

        let alive: BTreeSet<u32> = self.cells.iter().flatten().copied().collect();
        self.clips.retain(|generation, _| alive.contains(generation));

        debug!(
            generation = self.generation,
            live = self.live_count(),
            born = self.cells_for(self.generation).len(),
            "grid advanced"
        );
        self.generation
    }

    /// Restore the board this grid started from and drop every clip
    pub fn reseed(&mut self) {
        self.cells = self.initial.clone();
        self.generation = 0;
        self.clips.clear();
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn cell(&self, row: usize, col: usize) -> Cell {
        self.cells[(row % self.rows) * self.cols + (col % self.cols)]
    }

    /// Cells in row-major order
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn live_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    pub fn is_extinct(&self) -> bool {
        self.live_count() == 0
    }

    /// Coordinates of every cell alive since `generation`
    pub fn cells_for(&self, generation: u32) -> Vec<(usize, usize)> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| **cell == Some(generation))
            .map(|(i, _)| (i / self.cols, i % self.cols))
            .collect()
    }

    /// Clip played by cells of `generation`
    ///
    /// `None` for the live preview and for generations that died out.
    pub fn clip_for(&self, generation: u32) -> Option<&Clip> {
        self.clips.get(&generation)
    }

    /// Number of clips still referenced by live cells
    pub fn clip_count(&self) -> usize {
        self.clips.len()
    }

    pub fn snapshot(&self) -> GridSnapshot {
        GridSnapshot {
            generation: self.generation,
            rows: self.rows,
            cols: self.cols,
            cells: self.cells.clone(),
            clips: self.clips.clone(),
        }
    }
}

/// Immutable copy of a grid handed to the playback layer
#[derive(Debug, Clone, PartialEq)]
pub struct GridSnapshot {
    pub generation: u32,
    pub rows: usize,
    pub cols: usize,
    pub cells: Vec<Cell>,
    pub clips: BTreeMap<u32, Clip>,
}

impl GridSnapshot {
    pub fn cell(&self, row: usize, col: usize) -> Cell {
        self.cells[row * self.cols + col]
    }

    pub fn clip_for(&self, generation: u32) -> Option<&Clip> {
        self.clips.get(&generation)
    }
}

impl fmt::Display for GridSnapshot {
    /// `.` dead, `@` live preview, otherwise the generation in base 36
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..self.rows {
            for col in 0..self.cols {
                let glyph = match self.cell(row, col) {
                    None => '.',
                    Some(LIVE_GENERATION) => '@',
                    Some(g) => std::char::from_digit(g % 36, 36).unwrap_or('?'),
                };
                write!(f, "{}", glyph)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
