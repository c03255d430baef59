//! Execution paths that advance a [`Board`] by one step.

pub mod parallel;
pub mod sequential;

use serde::{Deserialize, Serialize};

use crate::board::{Board, CHANNELS, read_cell};
use crate::error::Result;
use crate::rules::RuleTable;

pub use parallel::{ParallelConfig, ParallelEngine, ReadHandle, ReadMode};
pub use sequential::SequentialEngine;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Sequential,
    Parallel,
}

impl ExecutionMode {
    pub fn other(self) -> Self {
        match self {
            Self::Sequential => Self::Parallel,
            Self::Parallel => Self::Sequential,
        }
    }
}

/// Result of handing one step to an engine.
#[derive(Debug)]
pub enum StepOutcome {
    /// The back buffer holds the next generation.
    Ready,
    /// The next generation is still being copied back; the back buffer must
    /// not be read until the handle completes.
    Pending(ReadHandle),
}

/// One step of the automaton: read the front buffer, write the back buffer.
///
/// Implementations never swap buffers and keep no reference to the board
/// after returning.
pub trait Engine {
    fn mode(&self) -> ExecutionMode;

    fn step(&mut self, board: &mut Board, rules: &RuleTable) -> Result<StepOutcome>;

    /// Generations computed by a single `step` call.
    fn generations_per_step(&self) -> u64 {
        1
    }
}

/// Live neighbors of the interior cell `(x, y)`.
///
/// Only interior neighbors, those within `[1, width-2] x [1, height-2]`, are
/// counted; border cells never contribute.
#[inline(always)]
pub fn interior_neighbors(front: &[u8], width: usize, height: usize, x: usize, y: usize) -> u8 {
    let x_lo = x.saturating_sub(1).max(1);
    let x_hi = (x + 1).min(width - 2);
    let y_lo = y.saturating_sub(1).max(1);
    let y_hi = (y + 1).min(height - 2);

    let mut count = 0u8;
    for ny in y_lo..=y_hi {
        let row = ny * width;
        for nx in x_lo..=x_hi {
            if nx == x && ny == y {
                continue;
            }
            count += read_cell(front, (row + nx) * CHANNELS) as u8;
        }
    }
    count
}

/// Copy the outer ring of cells from `src` to `dst`.
pub fn copy_border(src: &[u8], dst: &mut [u8], width: usize, height: usize) {
    let row_bytes = width * CHANNELS;
    let last_row = (height - 1) * row_bytes;
    dst[..row_bytes].copy_from_slice(&src[..row_bytes]);
    dst[last_row..last_row + row_bytes].copy_from_slice(&src[last_row..last_row + row_bytes]);
    for y in 1..height.saturating_sub(1) {
        let west = y * row_bytes;
        let east = west + row_bytes - CHANNELS;
        dst[west..west + CHANNELS].copy_from_slice(&src[west..west + CHANNELS]);
        dst[east..east + CHANNELS].copy_from_slice(&src[east..east + CHANNELS]);
    }
}

/// True when the board has no interior cells to evolve.
#[inline]
pub fn all_border(width: usize, height: usize) -> bool {
    width < 3 || height < 3
}
