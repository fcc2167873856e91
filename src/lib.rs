mod cell;
mod config;
mod calibration;
mod channel;
mod optimise;
mod correction;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },
    #[error("unknown detector {0}")]
    UnknownDetector(i32),
    #[error("no calibration curve for detector {detector} row {row} column {column}")]
    MissingCalibration { detector: i32, row: i32, column: i32 },
    #[error("calibration curve for detector {detector} row {row} column {column} \
             cannot be evaluated at voltage {voltage}")]
    Calibration { detector: i32, row: i32, column: i32, voltage: i32 },
}

pub type Result<T> =
    core::result::Result<T, Error>;

pub use cell::{Category, VoltageDisplay};

pub use config::OptimiserConfiguration;

pub use calibration::{
    CalibrationCurve,
    CalibrationTable,
};

pub use channel::{
    Channel,
    ChannelKey,
};

pub use optimise::{
    optimise,
    Optimiser,
    Optimised,
    Outcome,
};

pub use correction::{
    Correction,
    ChannelSet,
};
