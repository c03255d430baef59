//! Double-buffered board of 4-byte cells.
//!
//! Each cell is stored as `[state, state, state, marker]` so the front buffer
//! can be handed to a display as RGBA pixels without conversion.

use crate::error::{LifeError, Result};

pub const ALIVE: u8 = 255;
pub const DEAD: u8 = 0;
/// Value written to the fourth channel of every cell.
pub const MARKER: u8 = 1;
/// Bytes per cell.
pub const CHANNELS: usize = 4;

const DEAD_CELL: [u8; CHANNELS] = [DEAD, DEAD, DEAD, MARKER];

/// Encode a cell into its 4-byte slot.
#[inline(always)]
pub fn write_cell(slot: &mut [u8], alive: bool) {
    let state = if alive { ALIVE } else { DEAD };
    slot[..CHANNELS].copy_from_slice(&[state, state, state, MARKER]);
}

/// State of the cell at byte offset `offset`.
#[inline(always)]
pub fn read_cell(buf: &[u8], offset: usize) -> bool {
    buf[offset] != DEAD
}

/// Read-only view of the current generation.
#[derive(Clone, Copy, Debug)]
pub struct Snapshot<'a> {
    pub pixels: &'a [u8],
    pub width: usize,
    pub height: usize,
}

impl Snapshot<'_> {
    pub fn is_alive(&self, x: usize, y: usize) -> bool {
        read_cell(self.pixels, (y * self.width + x) * CHANNELS)
    }
}

#[derive(Clone, Debug)]
pub struct Board {
    width: usize,
    height: usize,
    buffers: [Vec<u8>; 2],
    front: usize,
}

impl Board {
    /// Allocate both buffers with every cell dead. Callers spawn before use.
    pub fn allocate(width: usize, height: usize) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(LifeError::InvalidConfig(format!(
                "board dimensions must be positive, got {width}x{height}"
            )));
        }
        let oom = |bytes| LifeError::OutOfMemory {
            width,
            height,
            bytes,
        };
        let cells = width.checked_mul(height).ok_or_else(|| oom(usize::MAX))?;
        let bytes = cells
            .checked_mul(CHANNELS)
            .ok_or_else(|| oom(usize::MAX))?;

        let mut buffers = [Vec::new(), Vec::new()];
        for buf in &mut buffers {
            buf.try_reserve_exact(bytes).map_err(|_| oom(bytes))?;
            for _ in 0..cells {
                buf.extend_from_slice(&DEAD_CELL);
            }
        }

        Ok(Self {
            width,
            height,
            buffers,
            front: 0,
        })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Bytes per buffer.
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.buffers[0].len()
    }

    #[inline]
    pub fn front(&self) -> &[u8] {
        &self.buffers[self.front]
    }

    #[inline]
    pub fn front_mut(&mut self) -> &mut [u8] {
        &mut self.buffers[self.front]
    }

    #[inline]
    pub fn back(&self) -> &[u8] {
        &self.buffers[1 - self.front]
    }

    #[inline]
    pub fn back_mut(&mut self) -> &mut [u8] {
        &mut self.buffers[1 - self.front]
    }

    /// Split borrow: front for reading, back for writing.
    pub fn split_mut(&mut self) -> (&[u8], &mut [u8]) {
        let (first, second) = self.buffers.split_at_mut(1);
        if self.front == 0 {
            (first[0].as_slice(), second[0].as_mut_slice())
        } else {
            (second[0].as_slice(), first[0].as_mut_slice())
        }
    }

    /// Toggle the front/back designation without copying.
    #[inline]
    pub fn swap_buffers(&mut self) {
        self.front = 1 - self.front;
    }

    /// Make the back buffer a copy of the front buffer.
    pub fn mirror_front(&mut self) {
        let (front, back) = self.split_mut();
        back.copy_from_slice(front);
    }

    #[inline]
    pub fn offset(&self, x: usize, y: usize) -> usize {
        debug_assert!(
            x < self.width && y < self.height,
            "cell ({x}, {y}) outside {}x{} board",
            self.width,
            self.height
        );
        (y * self.width + x) * CHANNELS
    }

    pub fn is_alive(&self, x: usize, y: usize) -> bool {
        read_cell(self.front(), self.offset(x, y))
    }

    /// Set a cell in the front buffer.
    pub fn set_cell(&mut self, x: usize, y: usize, alive: bool) {
        let offset = self.offset(x, y);
        write_cell(&mut self.front_mut()[offset..], alive);
    }

    /// Mark every front cell dead.
    pub fn clear(&mut self) {
        for slot in self.front_mut().chunks_exact_mut(CHANNELS) {
            slot.copy_from_slice(&DEAD_CELL);
        }
    }

    pub fn population(&self) -> u64 {
        self.front()
            .chunks_exact(CHANNELS)
            .filter(|cell| cell[0] != DEAD)
            .count() as u64
    }

    pub fn snapshot(&self) -> Snapshot<'_> {
        Snapshot {
            pixels: self.front(),
            width: self.width,
            height: self.height,
        }
    }
}
