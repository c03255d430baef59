//! Life-like cellular automaton with interchangeable sequential and
//! data-parallel engines that produce bit-identical generations.

pub mod board;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod rules;
pub mod spawn;

pub use board::{Board, Snapshot};
pub use config::{CapabilityPolicy, PopulationConfig, SimConfig};
pub use controller::{Advance, ControllerState, Simulation};
pub use engine::{
    Engine, ExecutionMode, ParallelConfig, ParallelEngine, ReadMode, SequentialEngine, StepOutcome,
};
pub use error::{LifeError, Result};
pub use rules::{RuleParseError, RuleTable};
pub use spawn::{Pattern, SeedSource, Spawner};
