//! Simulation controller: owns the board, the engines and the rule table.
//!
//! State machine:
//!
//! ```text
//! Idle ──setup──▶ Paused ◀──toggle_pause──▶ Running
//!                   │  ▲                       │
//!           step_once  └── advance (once) ── SteppingOnce
//! any ──teardown──▶ Stopped ──setup──▶ Paused
//! ```
//!
//! The controller issues at most one step at a time. A deferred read-back is
//! completed before the next step, an engine switch, or a read-mode change.

use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::board::{Board, Snapshot};
use crate::config::{CapabilityPolicy, PopulationConfig, SimConfig};
use crate::engine::parallel::{Device, DeviceError, Program};
use crate::engine::{
    Engine, ExecutionMode, ParallelEngine, ReadHandle, ReadMode, SequentialEngine, StepOutcome,
};
use crate::error::{LifeError, Result};
use crate::rules::RuleTable;
use crate::spawn::{SeedSource, Spawner};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Paused,
    Running,
    SteppingOnce,
    Stopped,
}

/// What a call to [`Simulation::advance`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Advance {
    /// Paused with nothing in flight.
    Skipped,
    /// A step was issued; its result is still being copied back.
    Pending,
    /// The front buffer now holds `generation`.
    Completed { generation: u64 },
}

struct PendingStep {
    handle: ReadHandle,
    generations: u64,
    started: Instant,
}

struct Session {
    board: Board,
    rules: RuleTable,
    spawner: Spawner,
    population: PopulationConfig,
    sequential: SequentialEngine,
    parallel: Option<ParallelEngine>,
    mode: ExecutionMode,
    generation: u64,
    pending: Option<PendingStep>,
    last_step_time: Duration,
}

impl Session {
    fn open(config: &SimConfig, device: Option<Box<dyn Device>>) -> Result<Self> {
        let rules = RuleTable::from_name_or_spec(&config.rule)?;
        let mut board = Board::allocate(config.width, config.height)?;
        let mut spawner = Spawner::new(SeedSource::from(config.seed));
        spawn(&mut spawner, &mut board, &config.population)?;

        let parallel = if config.enable_parallel {
            let engine = match device {
                Some(device) => ParallelEngine::with_device(
                    device,
                    Program::life(),
                    &config.parallel,
                    config.width,
                    config.height,
                ),
                None => ParallelEngine::new(&config.parallel, config.width, config.height),
            };
            match engine {
                Ok(engine) => Some(engine),
                Err(err @ LifeError::EngineCapability { .. })
                    if config.capability_policy == CapabilityPolicy::FallbackToSequential =>
                {
                    warn!(%err, "falling back to the sequential engine");
                    None
                }
                Err(err) => return Err(err),
            }
        } else {
            None
        };

        let mode = match (config.mode, &parallel) {
            (ExecutionMode::Parallel, None) if config.enable_parallel => ExecutionMode::Sequential,
            (ExecutionMode::Parallel, None) => return Err(LifeError::EngineUnavailable),
            (mode, _) => mode,
        };

        info!(
            width = config.width,
            height = config.height,
            rule = %rules,
            seed = spawner.seed(),
            ?mode,
            parallel = parallel.is_some(),
            population = board.population(),
            "simulation ready"
        );

        Ok(Self {
            board,
            rules,
            spawner,
            population: config.population.clone(),
            sequential: SequentialEngine::new(),
            parallel,
            mode,
            generation: 0,
            pending: None,
            last_step_time: Duration::ZERO,
        })
    }

    fn parallel_mut(&mut self) -> Result<&mut ParallelEngine> {
        self.parallel.as_mut().ok_or(LifeError::EngineUnavailable)
    }

    fn generations_per_step(&self) -> u64 {
        match (self.mode, &self.parallel) {
            (ExecutionMode::Parallel, Some(engine)) => engine.generations_per_step(),
            _ => self.sequential.generations_per_step(),
        }
    }

    /// Issue one step on the active engine.
    fn step(&mut self) -> Result<Advance> {
        let started = Instant::now();
        let generations = self.generations_per_step();
        let outcome = match self.mode {
            ExecutionMode::Sequential => self.sequential.step(&mut self.board, &self.rules)?,
            ExecutionMode::Parallel => {
                let engine = self.parallel.as_mut().ok_or(LifeError::EngineUnavailable)?;
                engine.step(&mut self.board, &self.rules)?
            }
        };
        match outcome {
            StepOutcome::Ready => Ok(self.commit(generations, started)),
            StepOutcome::Pending(handle) => {
                self.pending = Some(PendingStep {
                    handle,
                    generations,
                    started,
                });
                Ok(Advance::Pending)
            }
        }
    }

    /// Swap the freshly written back buffer in.
    fn commit(&mut self, generations: u64, started: Instant) -> Advance {
        self.board.swap_buffers();
        self.generation += generations;
        self.last_step_time = started.elapsed();
        debug!(
            generation = self.generation,
            elapsed_us = self.last_step_time.as_micros() as u64,
            mode = ?self.mode,
            "advanced"
        );
        Advance::Completed {
            generation: self.generation,
        }
    }

    /// Finish an in-flight read-back. Returns `None` if nothing completed.
    fn complete_pending(&mut self, block: bool) -> Result<Option<u64>> {
        let Some(pending) = self.pending.take() else {
            return Ok(None);
        };
        let data = if block {
            pending.handle.wait()?
        } else {
            match pending.handle.try_wait()? {
                Some(data) => data,
                None => {
                    self.pending = Some(pending);
                    return Ok(None);
                }
            }
        };
        if data.len() != self.board.byte_len() {
            return Err(DeviceError::SizeMismatch {
                device: data.len(),
                host: self.board.byte_len(),
            }
            .into());
        }
        self.board.back_mut().copy_from_slice(&data);
        self.commit(pending.generations, pending.started);
        Ok(Some(self.generation))
    }

    /// Drop in-flight work; the device may be ahead of the host afterwards.
    fn discard_pending(&mut self) {
        self.pending = None;
        if let Some(engine) = self.parallel.as_mut() {
            engine.invalidate();
        }
    }

    fn respawn(&mut self) -> Result<()> {
        spawn(&mut self.spawner, &mut self.board, &self.population)
    }
}

fn spawn(spawner: &mut Spawner, board: &mut Board, population: &PopulationConfig) -> Result<()> {
    match population {
        PopulationConfig::Random { density } => spawner.spawn_random(board, *density),
        PopulationConfig::Pattern(pattern) => spawner.spawn_from_pattern(board, pattern),
    }
}

/// Drives a board through generations on either engine.
pub struct Simulation {
    state: ControllerState,
    session: Option<Session>,
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulation {
    pub fn new() -> Self {
        Self {
            state: ControllerState::Idle,
            session: None,
        }
    }

    /// Convenience for `new` followed by `setup`.
    pub fn with_config(config: &SimConfig) -> Result<Self> {
        let mut sim = Self::new();
        sim.setup(config)?;
        Ok(sim)
    }

    pub fn setup(&mut self, config: &SimConfig) -> Result<()> {
        self.open(config, None)
    }

    /// Like [`setup`](Self::setup), but the parallel engine runs on `device`.
    pub fn setup_with_device(&mut self, config: &SimConfig, device: Box<dyn Device>) -> Result<()> {
        self.open(config, Some(device))
    }

    fn open(&mut self, config: &SimConfig, device: Option<Box<dyn Device>>) -> Result<()> {
        if !matches!(self.state, ControllerState::Idle | ControllerState::Stopped) {
            return Err(self.invalid("set up"));
        }
        match Session::open(config, device) {
            Ok(session) => {
                self.session = Some(session);
                self.state = ControllerState::Paused;
                Ok(())
            }
            Err(err) => {
                error!(%err, "setup failed");
                self.session = None;
                self.state = ControllerState::Idle;
                Err(err)
            }
        }
    }

    pub fn toggle_pause(&mut self) -> Result<()> {
        self.state = match self.state {
            ControllerState::Paused | ControllerState::SteppingOnce => ControllerState::Running,
            ControllerState::Running => ControllerState::Paused,
            _ => return Err(self.invalid("toggle pause")),
        };
        Ok(())
    }

    /// Arrange for the next `advance` to compute exactly one step and pause.
    pub fn step_once(&mut self) -> Result<()> {
        match self.state {
            ControllerState::Paused | ControllerState::Running | ControllerState::SteppingOnce => {
                self.state = ControllerState::SteppingOnce;
                Ok(())
            }
            _ => Err(self.invalid("single-step")),
        }
    }

    /// Advance the simulation if running; see [`Advance`].
    ///
    /// A call either lands an in-flight read-back or issues a new step, never
    /// both. On error the front buffer and generation counter are unchanged
    /// and the controller pauses.
    pub fn advance(&mut self) -> Result<Advance> {
        let state = self.state;
        if !self.is_active() {
            return Err(self.invalid("advance"));
        }
        let session = self.session_mut("advance")?;
        let result = match session.complete_pending(true) {
            Ok(Some(generation)) => Ok((Advance::Completed { generation }, false)),
            Ok(None) if state == ControllerState::Paused => Ok((Advance::Skipped, false)),
            Ok(None) => session.step().map(|advance| (advance, true)),
            Err(err) => Err(err),
        };

        match result {
            Ok((advance, stepped)) => {
                if stepped && state == ControllerState::SteppingOnce {
                    self.state = ControllerState::Paused;
                }
                Ok(advance)
            }
            Err(err) => {
                error!(%err, "advance failed; pausing");
                if let Some(session) = self.session.as_mut() {
                    session.discard_pending();
                }
                self.state = ControllerState::Paused;
                Err(err)
            }
        }
    }

    /// Non-blocking check on an in-flight read-back.
    pub fn poll(&mut self) -> Result<Option<u64>> {
        let session = self.session_mut("poll")?;
        let result = session.complete_pending(false);
        if result.is_err() {
            session.discard_pending();
            self.state = ControllerState::Paused;
        }
        result
    }

    /// Block until any in-flight read-back has landed in the front buffer.
    pub fn sync(&mut self) -> Result<Option<u64>> {
        let session = self.session_mut("sync")?;
        let result = session.complete_pending(true);
        if result.is_err() {
            session.discard_pending();
            self.state = ControllerState::Paused;
        }
        result
    }

    pub fn switch_engine(&mut self) -> Result<ExecutionMode> {
        let target = self.mode().other();
        self.set_mode(target)?;
        Ok(target)
    }

    /// Hand control to `target`, carrying the visible board across unchanged.
    pub fn set_mode(&mut self, target: ExecutionMode) -> Result<()> {
        if !self.is_active() {
            return Err(self.invalid("switch engine"));
        }
        let session = self.session_mut("switch engine")?;
        if session.mode == target {
            return Ok(());
        }
        if target == ExecutionMode::Parallel && session.parallel.is_none() {
            return Err(LifeError::EngineUnavailable);
        }

        let result = session.complete_pending(true).and_then(|_| {
            let Session { board, parallel, .. } = &mut *session;
            let engine = parallel.as_mut().ok_or(LifeError::EngineUnavailable)?;
            match target {
                ExecutionMode::Sequential => engine.pull_front(board),
                ExecutionMode::Parallel => engine.push_front(board),
            }
        });
        match result {
            Ok(()) => {
                info!(
                    from = ?session.mode,
                    to = ?target,
                    generation = session.generation,
                    "switched engine"
                );
                session.mode = target;
                Ok(())
            }
            Err(err) => {
                error!(%err, "engine switch failed; pausing");
                session.discard_pending();
                self.state = ControllerState::Paused;
                Err(err)
            }
        }
    }

    pub fn toggle_read_mode(&mut self) -> Result<ReadMode> {
        if !self.is_active() {
            return Err(self.invalid("toggle read mode"));
        }
        let session = self.session_mut("toggle read mode")?;
        if session.parallel.is_none() {
            return Err(LifeError::EngineUnavailable);
        }
        if let Err(err) = session.complete_pending(true) {
            session.discard_pending();
            self.state = ControllerState::Paused;
            return Err(err);
        }
        let engine = session.parallel_mut()?;
        let mode = engine.read_mode().toggled();
        engine.set_read_mode(mode);
        info!(?mode, "read mode changed");
        Ok(mode)
    }

    /// Re-spawn the starting population and zero the generation counter.
    pub fn reset(&mut self) -> Result<()> {
        if !self.is_active() {
            return Err(self.invalid("reset"));
        }
        let session = self.session_mut("reset")?;
        session.discard_pending();
        session.respawn()?;
        session.generation = 0;
        session.last_step_time = Duration::ZERO;
        info!(population = session.board.population(), "simulation reset");
        self.state = ControllerState::Paused;
        Ok(())
    }

    /// Release device and host resources. Safe to call repeatedly.
    pub fn teardown(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.pending = None;
            if let Some(engine) = session.parallel.as_mut() {
                engine.release();
            }
            info!(generation = session.generation, "simulation stopped");
        }
        self.state = ControllerState::Stopped;
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn is_paused(&self) -> bool {
        self.state == ControllerState::Paused
    }

    pub fn is_single_generation(&self) -> bool {
        self.state == ControllerState::SteppingOnce
    }

    pub fn has_pending(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.pending.is_some())
    }

    pub fn mode(&self) -> ExecutionMode {
        self.session
            .as_ref()
            .map_or(ExecutionMode::Sequential, |s| s.mode)
    }

    pub fn generation(&self) -> u64 {
        self.session.as_ref().map_or(0, |s| s.generation)
    }

    pub fn rule(&self) -> Option<&RuleTable> {
        self.session.as_ref().map(|s| &s.rules)
    }

    pub fn board(&self) -> Option<&Board> {
        self.session.as_ref().map(|s| &s.board)
    }

    /// The current generation; stays valid until the next mutating call.
    pub fn snapshot(&self) -> Option<Snapshot<'_>> {
        self.board().map(Board::snapshot)
    }

    pub fn population(&self) -> u64 {
        self.board().map_or(0, Board::population)
    }

    pub fn width(&self) -> usize {
        self.board().map_or(0, Board::width)
    }

    pub fn height(&self) -> usize {
        self.board().map_or(0, Board::height)
    }

    pub fn is_pattern_mode(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| matches!(s.population, PopulationConfig::Pattern(_)))
    }

    pub fn has_parallel(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.parallel.is_some())
    }

    /// Wall time of the last completed step.
    pub fn last_step_time(&self) -> Duration {
        self.session
            .as_ref()
            .map_or(Duration::ZERO, |s| s.last_step_time)
    }

    /// Generations the host observes per advance in the active mode.
    pub fn generations_per_copy_event(&self) -> u64 {
        self.session.as_ref().map_or(1, Session::generations_per_step)
    }

    pub fn kernel_info(&self) -> Option<String> {
        self.session
            .as_ref()
            .and_then(|s| s.parallel.as_ref())
            .map(ParallelEngine::kernel_info)
    }

    /// Neighbor counts recorded by the parallel kernel, if enabled.
    pub fn debug_output(&self) -> Option<&[u8]> {
        self.session
            .as_ref()
            .and_then(|s| s.parallel.as_ref())
            .and_then(ParallelEngine::debug_output)
    }

    fn is_active(&self) -> bool {
        matches!(
            self.state,
            ControllerState::Paused | ControllerState::Running | ControllerState::SteppingOnce
        )
    }

    fn session_mut(&mut self, action: &'static str) -> Result<&mut Session> {
        let state = self.state;
        self.session
            .as_mut()
            .ok_or(LifeError::InvalidState { action, state })
    }

    fn invalid(&self, action: &'static str) -> LifeError {
        LifeError::InvalidState {
            action,
            state: self.state,
        }
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        self.teardown();
    }
}
