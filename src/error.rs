use std::path::PathBuf;

use thiserror::Error;

use crate::data::Channel;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed csv in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("malformed session metadata in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path}: column `{column}` is required")]
    MissingColumn { path: PathBuf, column: String },
    #[error("{path}: row {row}, column `{column}`: cannot parse `{value}`")]
    BadValue {
        path: PathBuf,
        row: usize,
        column: String,
        value: String,
    },
    #[error("no laps recorded for driver {0}")]
    UnknownDriver(String),
    #[error("driver {0} has no timed lap")]
    NoTimedLap(String),
    #[error("driver {driver} has no lap {lap}")]
    UnknownLap { driver: String, lap: u32 },
    #[error("lap {lap} of {driver} has no `{channel}` values")]
    NoChannel {
        driver: String,
        lap: u32,
        channel: Channel,
    },
    #[error("telemetry unusable: {0}")]
    Unusable(#[from] NoData),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("config value `{field}` must be {expected}")]
    Invalid {
        field: &'static str,
        expected: &'static str,
    },
}

/// Why a lap could not be put on a common clock. Callers skip the lap.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NoData {
    #[error("{0} table is empty")]
    EmptySource(&'static str),
    #[error("{table} table has no `{channel}` values")]
    MissingChannel {
        table: &'static str,
        channel: Channel,
    },
    #[error("resample step must be non-zero")]
    ZeroStep,
    #[error("grid of {rows} rows exceeds the limit of {limit}")]
    GridTooLarge { rows: u128, limit: usize },
}

/// Regression failures, kept apart from the "not enough laps" case so the
/// two are logged differently.
#[derive(Debug, Error)]
pub enum FitError {
    #[error("only {found} representative laps, {required} required")]
    Insufficient { found: usize, required: usize },
    #[error("lap {0} is not part of the driver's laps")]
    TargetMissing(u32),
    #[error("regression failed: {0}")]
    Regression(String),
    #[error("regression produced a non-finite slope")]
    NonFinite,
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Data(#[from] DataError),
    #[error("telemetry unavailable: {0}")]
    NoData(#[from] NoData),
    #[error("resampled lap has no `{0}` column")]
    MissingChannel(Channel),
    #[error("failed to encode export: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to write export: {0}")]
    Io(#[from] std::io::Error),
}
