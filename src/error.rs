//! Error kinds surfaced by the simulation core.

use thiserror::Error;

use crate::engine::parallel::DeviceError;
use crate::rules::RuleParseError;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, LifeError>;

/// All kinds of errors in this crate.
#[derive(Debug, Error)]
pub enum LifeError {
    /// Malformed rule string.
    #[error("invalid rule: {0}")]
    RuleParse(#[from] RuleParseError),

    /// Board buffers could not be allocated.
    #[error("unable to allocate {bytes} bytes for a {width}x{height} board")]
    OutOfMemory {
        width: usize,
        height: usize,
        bytes: usize,
    },

    /// Pattern does not fit the board, or its data disagrees with its dimensions.
    #[error(
        "pattern {pattern_width}x{pattern_height} ({cells} cells) does not fit board {board_width}x{board_height}"
    )]
    PatternSizeMismatch {
        pattern_width: usize,
        pattern_height: usize,
        cells: usize,
        board_width: usize,
        board_height: usize,
    },

    /// Requested work-group exceeds what the device supports for the kernel.
    #[error(
        "work-group {requested_x}x{requested_y} exceeds the maximum of {max} work-items supported by {device}"
    )]
    EngineCapability {
        device: String,
        requested_x: usize,
        requested_y: usize,
        max: usize,
    },

    /// Kernel dispatch or buffer transfer failed at runtime.
    #[error("device compute failure: {0}")]
    DeviceCompute(#[from] DeviceError),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The controller cannot perform the request in its current state.
    #[error("cannot {action} while {state:?}")]
    InvalidState {
        action: &'static str,
        state: crate::controller::ControllerState,
    },

    /// The parallel engine was not created during setup.
    #[error("parallel engine is not available")]
    EngineUnavailable,
}
