//! Data-parallel engine: one work-item per interior cell on an accelerator.
//!
//! The engine owns its device context, the loaded program and the device-side
//! copies of both buffers. The host front buffer is authoritative whenever the
//! device copy is marked stale; otherwise the device's current buffer equals it.

mod device;
mod kernel;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub use device::{Device, DeviceError, DeviceInfo, HostDevice, Launch, ReadHandle};
pub use kernel::{KernelEntry, KernelInput, Program, WorkItemResult};

use super::{Engine, ExecutionMode, StepOutcome};
use crate::board::{Board, CHANNELS};
use crate::error::{LifeError, Result};
use crate::rules::RuleTable;

/// How results come back from the device.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadMode {
    /// The step returns once the host back buffer is filled.
    #[default]
    Blocking,
    /// The step returns a [`ReadHandle`]; the copy finishes in the background.
    Deferred,
}

impl ReadMode {
    pub fn toggled(self) -> Self {
        match self {
            Self::Blocking => Self::Deferred,
            Self::Deferred => Self::Blocking,
        }
    }
}

/// Configuration for a [`ParallelEngine`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    /// Work-items per work-group along x and y.
    pub work_group: [usize; 2],
    /// Kernel dispatches per device-to-host copy.
    pub generations_per_copy: u32,
    pub read_mode: ReadMode,
    /// Device worker threads; `None` lets rayon decide.
    pub threads: Option<usize>,
    /// Work-group limit reported by the host device.
    pub max_work_group_size: usize,
    /// Keep a per-cell buffer of the neighbor counts seen by the last dispatch.
    pub debug_output: bool,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            work_group: [16, 16],
            generations_per_copy: 1,
            read_mode: ReadMode::Blocking,
            threads: None,
            max_work_group_size: HostDevice::DEFAULT_MAX_WORK_GROUP,
            debug_output: false,
        }
    }
}

impl ParallelConfig {
    pub fn work_group(mut self, x: usize, y: usize) -> Self {
        self.work_group = [x, y];
        self
    }

    pub fn generations_per_copy(mut self, n: u32) -> Self {
        self.generations_per_copy = n;
        self
    }

    pub fn read_mode(mut self, mode: ReadMode) -> Self {
        self.read_mode = mode;
        self
    }

    pub fn thread_count(mut self, n: usize) -> Self {
        self.threads = Some(n.max(1));
        self
    }

    pub fn max_work_group_size(mut self, n: usize) -> Self {
        self.max_work_group_size = n;
        self
    }

    pub fn debug_output(mut self, enabled: bool) -> Self {
        self.debug_output = enabled;
        self
    }
}

pub struct ParallelEngine {
    device: Box<dyn Device>,
    program: Program,
    launch: Launch,
    generations_per_copy: u32,
    read_mode: ReadMode,
    /// Device's current buffer equals the host front buffer.
    synced: bool,
    debug: Option<Vec<u8>>,
}

impl ParallelEngine {
    /// Build an engine on the rayon host device running [`Program::life`].
    pub fn new(config: &ParallelConfig, width: usize, height: usize) -> Result<Self> {
        let device = HostDevice::new(config.threads, config.max_work_group_size)?;
        Self::with_device(Box::new(device), Program::life(), config, width, height)
    }

    /// Build an engine on an explicit device and program.
    ///
    /// Fails with [`LifeError::EngineCapability`] if the work-group does not fit.
    pub fn with_device(
        mut device: Box<dyn Device>,
        program: Program,
        config: &ParallelConfig,
        width: usize,
        height: usize,
    ) -> Result<Self> {
        let [group_x, group_y] = config.work_group;
        if group_x == 0 || group_y == 0 {
            return Err(LifeError::InvalidConfig(format!(
                "work-group dimensions must be positive, got {group_x}x{group_y}"
            )));
        }
        if config.generations_per_copy == 0 {
            return Err(LifeError::InvalidConfig(
                "generations per copy event must be at least 1".to_owned(),
            ));
        }

        let max = device
            .info()
            .max_work_group_size
            .min(program.max_work_group_size());
        if group_x.saturating_mul(group_y) > max {
            return Err(LifeError::EngineCapability {
                device: device.info().name.clone(),
                requested_x: group_x,
                requested_y: group_y,
                max,
            });
        }

        let oom = |bytes| LifeError::OutOfMemory {
            width,
            height,
            bytes,
        };
        let bytes = width
            .checked_mul(height)
            .and_then(|cells| cells.checked_mul(CHANNELS))
            .ok_or_else(|| oom(usize::MAX))?;
        device.allocate(bytes).map_err(|err| match err {
            DeviceError::OutOfMemory { bytes } => oom(bytes),
            other => other.into(),
        })?;
        info!(
            device = %device.info().name,
            compute_units = device.info().compute_units,
            program = program.name(),
            group_x,
            group_y,
            max_work_group = max,
            generations_per_copy = config.generations_per_copy,
            "parallel engine ready"
        );

        Ok(Self {
            device,
            program,
            launch: Launch {
                width,
                height,
                work_group: config.work_group,
            },
            generations_per_copy: config.generations_per_copy,
            read_mode: config.read_mode,
            synced: false,
            debug: config.debug_output.then(|| vec![0; width * height]),
        })
    }

    pub fn device_info(&self) -> &DeviceInfo {
        self.device.info()
    }

    pub fn read_mode(&self) -> ReadMode {
        self.read_mode
    }

    pub fn set_read_mode(&mut self, mode: ReadMode) {
        self.read_mode = mode;
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Neighbor counts from the last dispatch, one byte per cell.
    pub fn debug_output(&self) -> Option<&[u8]> {
        self.debug.as_deref()
    }

    pub fn kernel_info(&self) -> String {
        let [x, y] = self.launch.work_group;
        let max = self
            .device
            .info()
            .max_work_group_size
            .min(self.program.max_work_group_size());
        format!(
            "{} on {}: work-group {x}x{y} (max {max}), {} generation(s) per copy, {:?} read",
            self.program.name(),
            self.device.info().name,
            self.generations_per_copy,
            self.read_mode,
        )
    }

    /// Blocking host-to-device copy of the front buffer.
    pub fn push_front(&mut self, board: &Board) -> Result<()> {
        self.synced = false;
        self.device.upload(board.front())?;
        self.synced = true;
        debug!(bytes = board.byte_len(), "pushed front buffer to device");
        Ok(())
    }

    /// Blocking device-to-host copy into the front buffer.
    ///
    /// A stale device holds nothing newer than the host, so nothing is copied.
    pub fn pull_front(&mut self, board: &mut Board) -> Result<()> {
        if !self.synced {
            return Ok(());
        }
        if let Err(err) = self.device.download(board.front_mut()) {
            self.synced = false;
            return Err(err.into());
        }
        debug!(bytes = board.byte_len(), "pulled front buffer from device");
        Ok(())
    }

    /// Forget the device copy; the next step uploads the host front buffer.
    pub fn invalidate(&mut self) {
        self.synced = false;
    }

    pub fn release(&mut self) {
        self.synced = false;
        self.device.release();
    }

    fn run(&mut self, board: &mut Board, rules: &RuleTable) -> Result<StepOutcome> {
        if !self.synced {
            self.push_front(board)?;
        }
        for _ in 0..self.generations_per_copy {
            self.device
                .dispatch(&self.program, &self.launch, rules, self.debug.as_deref_mut())?;
        }
        match self.read_mode {
            ReadMode::Blocking => {
                self.device.download(board.back_mut())?;
                Ok(StepOutcome::Ready)
            }
            ReadMode::Deferred => Ok(StepOutcome::Pending(self.device.download_deferred()?)),
        }
    }
}

impl Engine for ParallelEngine {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Parallel
    }

    fn step(&mut self, board: &mut Board, rules: &RuleTable) -> Result<StepOutcome> {
        let result = self.run(board, rules);
        if result.is_err() {
            self.synced = false;
        }
        result
    }

    fn generations_per_step(&self) -> u64 {
        u64::from(self.generations_per_copy)
    }
}

#[cfg(test)]
mod tests {
    use super::{ParallelConfig, ParallelEngine, ReadMode};
    use crate::board::Board;
    use crate::engine::{Engine, StepOutcome};
    use crate::error::LifeError;
    use crate::rules::RuleTable;

    fn glider_board() -> Board {
        let mut board = Board::allocate(12, 12).unwrap();
        for (x, y) in [(2, 1), (3, 2), (1, 3), (2, 3), (3, 3)] {
            board.set_cell(x, y, true);
        }
        board.mirror_front();
        board
    }

    #[test]
    fn oversized_work_group_is_rejected_up_front() {
        let config = ParallelConfig::default()
            .work_group(32, 32)
            .max_work_group_size(256)
            .thread_count(1);
        let err = ParallelEngine::new(&config, 8, 8).err().unwrap();
        assert!(matches!(
            err,
            LifeError::EngineCapability {
                requested_x: 32,
                requested_y: 32,
                max: 256,
                ..
            }
        ));
    }

    #[test]
    fn unallocatable_board_reports_out_of_memory() {
        let config = ParallelConfig::default().work_group(4, 4).thread_count(1);
        assert!(matches!(
            ParallelEngine::new(&config, usize::MAX, 2),
            Err(LifeError::OutOfMemory { bytes: usize::MAX, .. })
        ));
        #[cfg(target_pointer_width = "64")]
        {
            let (width, height) = (1usize << 40, 1usize << 20);
            assert!(matches!(
                ParallelEngine::new(&config, width, height),
                Err(LifeError::OutOfMemory { bytes, .. }) if bytes == width * height * 4
            ));
        }
    }

    #[test]
    fn zero_batch_is_invalid() {
        let config = ParallelConfig::default().generations_per_copy(0);
        assert!(matches!(
            ParallelEngine::new(&config, 8, 8),
            Err(LifeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn first_step_uploads_front() {
        let mut board = glider_board();
        let config = ParallelConfig::default().work_group(4, 4).thread_count(2);
        let mut engine = ParallelEngine::new(&config, 12, 12).unwrap();
        assert!(!engine.is_synced());
        let outcome = engine.step(&mut board, &RuleTable::life()).unwrap();
        assert!(matches!(outcome, StepOutcome::Ready));
        assert!(engine.is_synced());
        assert_eq!(engine.generations_per_step(), 1);
    }

    #[test]
    fn deferred_step_returns_handle() {
        let mut board = glider_board();
        let config = ParallelConfig::default()
            .work_group(3, 5)
            .read_mode(ReadMode::Deferred)
            .thread_count(2);
        let mut engine = ParallelEngine::new(&config, 12, 12).unwrap();
        let StepOutcome::Pending(handle) = engine.step(&mut board, &RuleTable::life()).unwrap()
        else {
            panic!("expected a pending read");
        };
        let data = handle.wait().unwrap();
        assert_eq!(data.len(), board.byte_len());
    }

    #[test]
    fn debug_output_tracks_neighbor_counts() {
        let mut board = glider_board();
        let config = ParallelConfig::default()
            .work_group(4, 4)
            .debug_output(true)
            .thread_count(1);
        let mut engine = ParallelEngine::new(&config, 12, 12).unwrap();
        engine.step(&mut board, &RuleTable::life()).unwrap();
        let debug = engine.debug_output().unwrap();
        assert_eq!(debug.len(), 144);
        assert_eq!(debug[2 * 12 + 2], 5);
    }

    #[test]
    fn kernel_info_mentions_geometry() {
        let config = ParallelConfig::default()
            .work_group(8, 4)
            .generations_per_copy(3)
            .thread_count(1);
        let engine = ParallelEngine::new(&config, 16, 16).unwrap();
        let info = engine.kernel_info();
        assert!(info.contains("8x4"), "{info}");
        assert!(info.contains("3 generation"), "{info}");
    }
}
