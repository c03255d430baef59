//! Compute program run by each work-item.

use std::fmt;

use crate::board::{CHANNELS, read_cell};
use crate::engine::interior_neighbors;
use crate::rules::{RULE_SLOTS, slot};

/// Arguments shared by every work-item of one dispatch.
#[derive(Clone, Copy)]
pub struct KernelInput<'a> {
    pub front: &'a [u8],
    pub width: usize,
    pub height: usize,
    pub rules: &'a [u8; RULE_SLOTS],
}

/// What one work-item produced for its cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkItemResult {
    pub alive: bool,
    /// Neighbor count seen by the work-item, written to the debug buffer.
    pub neighbors: u8,
}

pub type KernelEntry = fn(&KernelInput<'_>, usize, usize) -> WorkItemResult;

/// A loadable kernel: a named entry point plus its work-group limit.
#[derive(Clone, Copy)]
pub struct Program {
    name: &'static str,
    entry: KernelEntry,
    max_work_group_size: usize,
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("name", &self.name)
            .field("max_work_group_size", &self.max_work_group_size)
            .finish()
    }
}

impl Program {
    pub const LIFE_MAX_WORK_GROUP: usize = 1024;

    pub fn new(name: &'static str, entry: KernelEntry, max_work_group_size: usize) -> Self {
        Self {
            name,
            entry,
            max_work_group_size,
        }
    }

    /// Next-generation kernel for any rule table.
    pub fn life() -> Self {
        Self::new("next_generation", next_generation, Self::LIFE_MAX_WORK_GROUP)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn max_work_group_size(&self) -> usize {
        self.max_work_group_size
    }

    #[inline(always)]
    pub fn run(&self, input: &KernelInput<'_>, x: usize, y: usize) -> WorkItemResult {
        (self.entry)(input, x, y)
    }
}

fn next_generation(input: &KernelInput<'_>, x: usize, y: usize) -> WorkItemResult {
    let neighbors = interior_neighbors(input.front, input.width, input.height, x, y);
    let alive = read_cell(input.front, (y * input.width + x) * CHANNELS);
    WorkItemResult {
        alive: input.rules[slot(alive, neighbors)] != 0,
        neighbors,
    }
}

#[cfg(test)]
mod tests {
    use super::{KernelInput, Program};
    use crate::board::Board;
    use crate::rules::RuleTable;

    #[test]
    fn life_kernel_births_on_three() {
        let mut board = Board::allocate(5, 5).unwrap();
        board.set_cell(1, 1, true);
        board.set_cell(2, 1, true);
        board.set_cell(3, 1, true);
        let rules = RuleTable::life();
        let input = KernelInput {
            front: board.front(),
            width: 5,
            height: 5,
            rules: rules.as_bytes(),
        };
        let out = Program::life().run(&input, 2, 2);
        assert!(out.alive);
        assert_eq!(out.neighbors, 3);
        let out = Program::life().run(&input, 1, 1);
        assert!(!out.alive);
        assert_eq!(out.neighbors, 1);
    }
}
