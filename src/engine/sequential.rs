//! Single-threaded host engine.

use super::{Engine, ExecutionMode, StepOutcome, all_border, copy_border, interior_neighbors};
use crate::board::{Board, CHANNELS, read_cell, write_cell};
use crate::error::Result;
use crate::rules::RuleTable;

#[derive(Clone, Copy, Debug, Default)]
pub struct SequentialEngine;

impl SequentialEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Engine for SequentialEngine {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Sequential
    }

    fn step(&mut self, board: &mut Board, rules: &RuleTable) -> Result<StepOutcome> {
        let (width, height) = (board.width(), board.height());
        let (front, back) = board.split_mut();
        copy_border(front, back, width, height);
        if all_border(width, height) {
            return Ok(StepOutcome::Ready);
        }

        for y in 1..height - 1 {
            for x in 1..width - 1 {
                let offset = (y * width + x) * CHANNELS;
                let neighbors = interior_neighbors(front, width, height, x, y);
                let next = rules.next_state(read_cell(front, offset), neighbors);
                write_cell(&mut back[offset..], next);
            }
        }
        Ok(StepOutcome::Ready)
    }
}

#[cfg(test)]
mod tests {
    use super::SequentialEngine;
    use crate::board::Board;
    use crate::engine::Engine;
    use crate::rules::RuleTable;

    fn advance(engine: &mut SequentialEngine, board: &mut Board, rules: &RuleTable) {
        engine.step(board, rules).unwrap();
        board.swap_buffers();
    }

    #[test]
    fn lone_cell_dies() {
        let mut board = Board::allocate(5, 5).unwrap();
        board.set_cell(2, 2, true);
        let mut engine = SequentialEngine::new();
        advance(&mut engine, &mut board, &RuleTable::life());
        assert_eq!(board.population(), 0);
    }

    #[test]
    fn dead_cell_with_three_neighbors_is_born() {
        let mut board = Board::allocate(6, 6).unwrap();
        board.set_cell(1, 1, true);
        board.set_cell(2, 1, true);
        board.set_cell(3, 1, true);
        let mut engine = SequentialEngine::new();
        advance(&mut engine, &mut board, &RuleTable::life());
        assert!(board.is_alive(2, 2));
    }

    #[test]
    fn block_is_stable() {
        let mut board = Board::allocate(6, 6).unwrap();
        let block = [(2, 2), (3, 2), (2, 3), (3, 3)];
        for (x, y) in block {
            board.set_cell(x, y, true);
        }
        board.mirror_front();
        let before = board.front().to_vec();
        let mut engine = SequentialEngine::new();
        advance(&mut engine, &mut board, &RuleTable::life());
        assert_eq!(board.front(), &before[..]);
    }

    #[test]
    fn tiny_board_is_all_border() {
        let mut board = Board::allocate(2, 2).unwrap();
        board.set_cell(0, 0, true);
        let mut engine = SequentialEngine::new();
        advance(&mut engine, &mut board, &RuleTable::life());
        assert!(board.is_alive(0, 0));
        assert_eq!(board.population(), 1);
    }
}
