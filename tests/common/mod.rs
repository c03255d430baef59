#![allow(dead_code)]

use dual_life::{Board, Engine, RuleTable, StepOutcome};
use rand::{Rng, SeedableRng};

/// Row-major liveness grid, the simplest possible model of a board.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Grid {
    pub width: usize,
    pub height: usize,
    pub cells: Vec<bool>,
}

impl Grid {
    pub fn from_board(board: &Board) -> Self {
        let (width, height) = (board.width(), board.height());
        let mut cells = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                cells.push(board.is_alive(x, y));
            }
        }
        Self {
            width,
            height,
            cells,
        }
    }

    pub fn get(&self, x: usize, y: usize) -> bool {
        self.cells[y * self.width + x]
    }

    /// One generation: border frozen, only interior neighbors counted.
    pub fn step(&self, rules: &RuleTable) -> Self {
        let mut next = self.clone();
        if self.width < 3 || self.height < 3 {
            return next;
        }
        let interior = |x: isize, y: isize| {
            x >= 1 && y >= 1 && x <= self.width as isize - 2 && y <= self.height as isize - 2
        };
        for y in 1..self.height - 1 {
            for x in 1..self.width - 1 {
                let mut n = 0u8;
                for dy in -1isize..=1 {
                    for dx in -1isize..=1 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let (nx, ny) = (x as isize + dx, y as isize + dy);
                        if interior(nx, ny) && self.get(nx as usize, ny as usize) {
                            n += 1;
                        }
                    }
                }
                next.cells[y * self.width + x] = rules.next_state(self.get(x, y), n);
            }
        }
        next
    }

    pub fn border(&self) -> Vec<bool> {
        let mut out = Vec::new();
        for y in 0..self.height {
            for x in 0..self.width {
                if x == 0 || y == 0 || x + 1 == self.width || y + 1 == self.height {
                    out.push(self.get(x, y));
                }
            }
        }
        out
    }
}

/// Board filled from a seeded `StdRng`, front mirrored into back.
pub fn random_board(width: usize, height: usize, density: f64, seed: u64) -> Board {
    let mut board = Board::allocate(width, height).unwrap();
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    for y in 0..height {
        for x in 0..width {
            board.set_cell(x, y, rng.random_bool(density));
        }
    }
    board.mirror_front();
    board
}

pub fn board_with(width: usize, height: usize, live: &[(usize, usize)]) -> Board {
    let mut board = Board::allocate(width, height).unwrap();
    for &(x, y) in live {
        board.set_cell(x, y, true);
    }
    board.mirror_front();
    board
}

/// Run one engine step to completion and swap it in.
pub fn advance(engine: &mut dyn Engine, board: &mut Board, rules: &RuleTable) {
    match engine.step(board, rules).unwrap() {
        StepOutcome::Ready => {}
        StepOutcome::Pending(handle) => {
            let data = handle.wait().unwrap();
            board.back_mut().copy_from_slice(&data);
        }
    }
    board.swap_buffers();
}

pub fn live_cells(board: &Board) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    for y in 0..board.height() {
        for x in 0..board.width() {
            if board.is_alive(x, y) {
                out.push((x, y));
            }
        }
    }
    out
}
