//! Error taxonomy for configuration, runs and batches.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for single runs
pub type Result<T> = std::result::Result<T, SimError>;

/// Malformed or unrecognised configuration input.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown option `{key}` for the {model} model")]
    UnknownKey { key: String, model: &'static str },

    #[error("invalid value {value} for `{key}`: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("`{key}` is set by the runner ({owner}) and cannot be swept or fixed")]
    RunnerOwned { key: String, owner: String },

    #[error("malformed configuration: {0}")]
    Malformed(String),

    #[error("unsupported configuration format for {}: expected .toml or .json", .path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("failed to read {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Well-formed configuration that cannot describe a meaningful run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("`{param}` must be positive, got {value}")]
    NonPositive { param: &'static str, value: String },

    #[error("`{param}` = {value} is outside {expected}")]
    OutOfRange {
        param: &'static str,
        value: f64,
        expected: &'static str,
    },

    #[error("{statistic} is undefined: {reason}")]
    Undefined {
        statistic: &'static str,
        reason: String,
    },
}

/// Failure of a single run. Fatal: a partially-advanced run is never retried.
#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("time series rejected a row: {0}")]
    Table(#[from] instrument::TableError),

    #[error("export failed: {0}")]
    Export(#[from] instrument::PolarsError),

    #[error("interchange error: {0}")]
    Interchange(#[from] serde_json::Error),

    #[error("failed to access {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Worker(Box<WorkerError>),
}

/// Failure of one job in a batch. Siblings are unaffected.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("job {job} failed: {source}")]
    Failed {
        job: usize,
        #[source]
        source: SimError,
    },

    #[error("job {job} panicked: {message}")]
    Panicked { job: usize, message: String },

    #[error("job {job} was abandoned before it started")]
    Abandoned { job: usize },

    #[error("job {job} finished without reporting a result")]
    Lost { job: usize },
}

impl WorkerError {
    pub fn job(&self) -> usize {
        match self {
            WorkerError::Failed { job, .. }
            | WorkerError::Panicked { job, .. }
            | WorkerError::Abandoned { job }
            | WorkerError::Lost { job } => *job,
        }
    }
}

/// Reject NaN and infinities with the parameter name attached.
pub(crate) fn require_finite(
    param: &'static str,
    value: f64,
) -> std::result::Result<(), ValidationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange {
            param,
            value,
            expected: "the finite numbers",
        })
    }
}

pub(crate) fn require_non_negative(
    param: &'static str,
    value: f64,
) -> std::result::Result<(), ValidationError> {
    require_finite(param, value)?;
    if value < 0.0 {
        return Err(ValidationError::OutOfRange {
            param,
            value,
            expected: "[0, inf)",
        });
    }
    Ok(())
}

pub(crate) fn require_unit_interval(
    param: &'static str,
    value: f64,
) -> std::result::Result<(), ValidationError> {
    require_finite(param, value)?;
    if !(0.0..=1.0).contains(&value) {
        return Err(ValidationError::OutOfRange {
            param,
            value,
            expected: "[0, 1]",
        });
    }
    Ok(())
}

pub(crate) fn require_positive_count(
    param: &'static str,
    value: usize,
) -> std::result::Result<(), ValidationError> {
    if value == 0 {
        return Err(ValidationError::NonPositive {
            param,
            value: value.to_string(),
        });
    }
    Ok(())
}
