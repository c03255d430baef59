//! Initial population: random density fill or an external pattern.

use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::board::{Board, DEAD};
use crate::error::{LifeError, Result};

/// Where the random spawner takes its seed from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeedSource {
    /// Time-derived, sampled once per process. Successive random spawns
    /// continue one stream, so each reset draws a fresh board.
    ProcessClock,
    /// Every random spawn restarts from this seed and yields the same board.
    Fixed(u64),
}

impl SeedSource {
    pub fn resolve(self) -> u64 {
        match self {
            Self::ProcessClock => process_seed(),
            Self::Fixed(seed) => seed,
        }
    }
}

impl From<Option<u64>> for SeedSource {
    fn from(seed: Option<u64>) -> Self {
        seed.map_or(Self::ProcessClock, Self::Fixed)
    }
}

fn process_seed() -> u64 {
    static SEED: OnceLock<u64> = OnceLock::new();
    *SEED.get_or_init(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x5EED_1234_ABCD_EF01)
    })
}

/// A starting population supplied from outside the core.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pattern {
    pub width: usize,
    pub height: usize,
    /// Row-major, one byte per cell, non-zero is alive.
    pub cells: Vec<u8>,
}

impl Pattern {
    pub fn new(width: usize, height: usize, cells: Vec<u8>) -> Self {
        Self {
            width,
            height,
            cells,
        }
    }

    /// Build a pattern from live coordinates relative to its top-left corner.
    pub fn from_live_cells(width: usize, height: usize, live: &[(usize, usize)]) -> Self {
        let mut cells = vec![DEAD; width * height];
        for &(x, y) in live {
            if x < width && y < height {
                cells[y * width + x] = crate::board::ALIVE;
            }
        }
        Self::new(width, height, cells)
    }
}

#[derive(Clone, Debug)]
pub struct Spawner {
    source: SeedSource,
    seed: u64,
    rng: StdRng,
}

impl Spawner {
    pub fn new(source: SeedSource) -> Self {
        let seed = source.resolve();
        Self {
            source,
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Fill the front buffer at random; each cell is alive iff a sample in
    /// `[0, 100)` divided by 100 is at most `density`.
    pub fn spawn_random(&mut self, board: &mut Board, density: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&density) {
            return Err(LifeError::InvalidConfig(format!(
                "density must be within [0, 1], got {density}"
            )));
        }
        if let SeedSource::Fixed(_) = self.source {
            self.rng = StdRng::seed_from_u64(self.seed);
        }
        let (width, height) = (board.width(), board.height());
        for y in 0..height {
            for x in 0..width {
                let sample: u32 = self.rng.random_range(0..100);
                board.set_cell(x, y, sample as f32 / 100.0 <= density);
            }
        }
        board.mirror_front();
        Ok(())
    }

    /// Copy `pattern` into the centre of the front buffer, everything else dead.
    pub fn spawn_from_pattern(&self, board: &mut Board, pattern: &Pattern) -> Result<()> {
        let fits = pattern.width <= board.width() && pattern.height <= board.height();
        if !fits || pattern.cells.len() != pattern.width * pattern.height {
            return Err(LifeError::PatternSizeMismatch {
                pattern_width: pattern.width,
                pattern_height: pattern.height,
                cells: pattern.cells.len(),
                board_width: board.width(),
                board_height: board.height(),
            });
        }

        board.clear();
        let off_x = (board.width() - pattern.width) / 2;
        let off_y = (board.height() - pattern.height) / 2;
        if pattern.width > 0 {
            for (py, row) in pattern.cells.chunks_exact(pattern.width).enumerate() {
                for (px, &state) in row.iter().enumerate() {
                    if state != DEAD {
                        board.set_cell(off_x + px, off_y + py, true);
                    }
                }
            }
        }
        board.mirror_front();
        Ok(())
    }
}
