use std::path::PathBuf;

use thiserror::Error;

use crate::env::EnvStatus;

/// Faults raised while loading or validating market tables
#[derive(Error, Debug)]
pub enum DataError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse csv {path:?}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("table cache error: {0}")]
    Cache(#[from] postcard::Error),

    #[error("table `{table}` is empty")]
    EmptyTable { table: String },

    #[error("table `{table}` has no feature columns besides the time column")]
    NoFeatures { table: String },

    #[error("table `{table}` is missing required column `{column}`")]
    MissingColumn { table: String, column: String },

    #[error("table `{table}` row {row} has {found} values, expected {expected}")]
    RowWidth {
        table: String,
        row: usize,
        found: usize,
        expected: usize,
    },

    #[error("table `{table}` row {row} column `{column}`: invalid number `{value}`")]
    InvalidNumber {
        table: String,
        row: usize,
        column: String,
        value: String,
    },

    #[error("table `{table}` row {row}: invalid timestamp `{value}`")]
    InvalidTimestamp {
        table: String,
        row: usize,
        value: String,
    },

    #[error("table `{table}` is not sorted by time: row {row} ({time}) precedes row {previous_row} ({previous_time})")]
    NonMonotonicTime {
        table: String,
        row: usize,
        time: String,
        previous_row: usize,
        previous_time: String,
    },

    #[error("no {timeframe} bar `{key}` for minute `{minute_time}` (nearest: {before:?} / {after:?})")]
    Alignment {
        timeframe: &'static str,
        minute_time: String,
        key: String,
        before: Option<String>,
        after: Option<String>,
    },
}

/// Faults raised by the trading environment
#[derive(Error, Debug)]
pub enum EnvError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("cannot step while {0:?}, call reset first")]
    InvalidState(EnvStatus),

    #[error("action must have {expected} values, got {found}")]
    ActionShape { expected: usize, found: usize },

    #[error("action[{index}] = {value} is outside [-1, 1]")]
    ActionOutOfBounds { index: usize, value: f64 },

    #[error("expected one action per environment ({expected}), got {found}")]
    BatchSize { expected: usize, found: usize },

    #[error("minute index {index} ran past the table (len {len})")]
    WindowOverrun { index: usize, len: usize },

    #[error("non-finite value in observation at position {position}")]
    NonFiniteObservation { position: usize },

    #[error("non-finite reward component {component}")]
    NonFiniteReward { component: String },
}
