//! Accelerator abstraction and the rayon-backed host device.
//!
//! A device owns two buffers of board size. `upload` seeds both from the host,
//! each `dispatch` computes one generation from the current buffer into the
//! other and makes it current, and `download` copies the current buffer back.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, TryRecvError};

use rayon::prelude::*;
use thiserror::Error;

use super::kernel::{KernelInput, Program};
use crate::board::{CHANNELS, write_cell};
use crate::engine::{all_border, copy_border};
use crate::rules::RuleTable;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("failed to build device thread pool: {0}")]
    PoolBuild(#[from] rayon::ThreadPoolBuildError),
    #[error("unable to allocate {bytes} bytes of device memory")]
    OutOfMemory { bytes: usize },
    #[error("device buffers hold {device} bytes but the transfer needs {host}")]
    SizeMismatch { device: usize, host: usize },
    #[error("device resources have been released")]
    Released,
    #[error("device to host transfer was aborted")]
    TransferAborted,
    #[error("kernel dispatch failed: {0}")]
    Dispatch(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub compute_units: usize,
    /// Largest work-group (items per group) the device accepts.
    pub max_work_group_size: usize,
}

/// Geometry of one kernel dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Launch {
    pub width: usize,
    pub height: usize,
    pub work_group: [usize; 2],
}

/// Completion handle for a deferred device-to-host copy.
#[derive(Debug)]
pub struct ReadHandle {
    rx: Receiver<Vec<u8>>,
}

impl ReadHandle {
    /// Non-blocking poll; `Ok(None)` while the copy is in flight.
    pub fn try_wait(&self) -> Result<Option<Vec<u8>>, DeviceError> {
        match self.rx.try_recv() {
            Ok(data) => Ok(Some(data)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(DeviceError::TransferAborted),
        }
    }

    /// Block until the copy completes.
    pub fn wait(self) -> Result<Vec<u8>, DeviceError> {
        self.rx.recv().map_err(|_| DeviceError::TransferAborted)
    }
}

pub trait Device: Send {
    fn info(&self) -> &DeviceInfo;

    /// (Re)allocate both device buffers at `bytes` each.
    fn allocate(&mut self, bytes: usize) -> Result<(), DeviceError>;

    /// Blocking host-to-device copy into both buffers.
    fn upload(&mut self, host: &[u8]) -> Result<(), DeviceError>;

    /// Blocking device-to-host copy of the current buffer.
    fn download(&self, host: &mut [u8]) -> Result<(), DeviceError>;

    /// Start a device-to-host copy of the current buffer.
    fn download_deferred(&self) -> Result<ReadHandle, DeviceError>;

    /// Run `program` over the interior once and flip the current buffer.
    fn dispatch(
        &mut self,
        program: &Program,
        launch: &Launch,
        rules: &RuleTable,
        debug: Option<&mut [u8]>,
    ) -> Result<(), DeviceError>;

    fn release(&mut self);
}

/// Software accelerator: a dedicated rayon pool plays the command queue.
pub struct HostDevice {
    info: DeviceInfo,
    pool: rayon::ThreadPool,
    buffers: [Arc<Vec<u8>>; 2],
    current: usize,
    released: bool,
}

impl HostDevice {
    pub const DEFAULT_MAX_WORK_GROUP: usize = 256;

    pub fn new(threads: Option<usize>, max_work_group_size: usize) -> Result<Self, DeviceError> {
        let mut builder = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("device-{i}"));
        if let Some(n) = threads {
            builder = builder.num_threads(n.max(1));
        }
        let pool = builder.build()?;
        let info = DeviceInfo {
            name: "host-rayon".to_owned(),
            compute_units: pool.current_num_threads(),
            max_work_group_size,
        };
        Ok(Self {
            info,
            pool,
            buffers: [Arc::new(Vec::new()), Arc::new(Vec::new())],
            current: 0,
            released: false,
        })
    }

    fn live(&self) -> Result<(), DeviceError> {
        if self.released {
            return Err(DeviceError::Released);
        }
        Ok(())
    }

    fn check_len(&self, host: usize) -> Result<(), DeviceError> {
        let device = self.buffers[0].len();
        if device != host {
            return Err(DeviceError::SizeMismatch { device, host });
        }
        Ok(())
    }
}

fn zeroed(bytes: usize) -> Result<Arc<Vec<u8>>, DeviceError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(bytes).map_err(|_| DeviceError::OutOfMemory { bytes })?;
    buf.resize(bytes, 0);
    Ok(Arc::new(buf))
}

impl Device for HostDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn allocate(&mut self, bytes: usize) -> Result<(), DeviceError> {
        self.live()?;
        // Drop the old pair first so it does not count against the new one.
        self.buffers = [Arc::new(Vec::new()), Arc::new(Vec::new())];
        self.buffers = [zeroed(bytes)?, zeroed(bytes)?];
        self.current = 0;
        Ok(())
    }

    fn upload(&mut self, host: &[u8]) -> Result<(), DeviceError> {
        self.live()?;
        self.check_len(host.len())?;
        for buf in &mut self.buffers {
            Arc::make_mut(buf).copy_from_slice(host);
        }
        self.current = 0;
        Ok(())
    }

    fn download(&self, host: &mut [u8]) -> Result<(), DeviceError> {
        self.live()?;
        self.check_len(host.len())?;
        host.copy_from_slice(&self.buffers[self.current]);
        Ok(())
    }

    fn download_deferred(&self) -> Result<ReadHandle, DeviceError> {
        self.live()?;
        // Later dispatches copy-on-write, so the snapshot stays intact.
        let source = Arc::clone(&self.buffers[self.current]);
        let (tx, rx) = mpsc::sync_channel(1);
        self.pool.spawn(move || {
            let _ = tx.send(source.as_ref().clone());
        });
        Ok(ReadHandle { rx })
    }

    fn dispatch(
        &mut self,
        program: &Program,
        launch: &Launch,
        rules: &RuleTable,
        debug: Option<&mut [u8]>,
    ) -> Result<(), DeviceError> {
        self.live()?;
        let Launch {
            width,
            height,
            work_group: [group_x, group_y],
        } = *launch;
        self.check_len(width * height * CHANNELS)?;
        if group_x == 0 || group_y == 0 {
            return Err(DeviceError::Dispatch("empty work-group".to_owned()));
        }

        let [first, second] = &mut self.buffers;
        let (src, dst) = if self.current == 0 {
            (first, second)
        } else {
            (second, first)
        };
        let src: &[u8] = src.as_slice();
        let dst: &mut [u8] = Arc::make_mut(dst).as_mut_slice();

        // The destination may hold an older generation; its border must match.
        copy_border(src, dst, width, height);
        if !all_border(width, height) {
            let input = KernelInput {
                front: src,
                width,
                height,
                rules: rules.as_bytes(),
            };
            let band_rows = group_y;
            let band_bytes = band_rows * width * CHANNELS;
            let run_band = |band_index: usize, band: &mut [u8], mut debug: Option<&mut [u8]>| {
                let first_row = band_index * band_rows;
                let rows = band.len() / (width * CHANNELS);
                for local_y in 0..rows {
                    let y = first_row + local_y;
                    if y == 0 || y == height - 1 {
                        continue;
                    }
                    for group_start in (1..width - 1).step_by(group_x) {
                        for x in group_start..(group_start + group_x).min(width - 1) {
                            let result = program.run(&input, x, y);
                            let local = local_y * width + x;
                            write_cell(&mut band[local * CHANNELS..], result.alive);
                            if let Some(debug) = debug.as_deref_mut() {
                                debug[local] = result.neighbors;
                            }
                        }
                    }
                }
            };

            self.pool.install(|| match debug {
                Some(debug) if debug.len() == width * height => dst
                    .par_chunks_mut(band_bytes)
                    .zip(debug.par_chunks_mut(band_rows * width))
                    .enumerate()
                    .for_each(|(i, (band, dbg))| run_band(i, band, Some(dbg))),
                _ => dst
                    .par_chunks_mut(band_bytes)
                    .enumerate()
                    .for_each(|(i, band)| run_band(i, band, None)),
            });
        }

        self.current = 1 - self.current;
        Ok(())
    }

    fn release(&mut self) {
        self.buffers = [Arc::new(Vec::new()), Arc::new(Vec::new())];
        self.released = true;
    }
}
