use std::path::PathBuf;

use thiserror::Error;

/// The source file could not be read, or does not carry a requested column.
/// Fatal to the request: no partial window is returned.
#[derive(Debug, Error)]
pub enum FileAccessError {
    #[error("cannot read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("column `{column}` not found in {path}")]
    MissingColumn { path: PathBuf, column: String },
    #[error("cannot write window: {0}")]
    Export(#[from] csv::Error),
}

/// The requested filter cannot be realised for the given sampling rate.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FilterDesignError {
    #[error("sampling rate must be positive and finite, got {0}")]
    SamplingRate(f64),
    #[error("filter order {order} outside supported range 1..={max}")]
    Order { order: usize, max: usize },
    #[error("invalid ripple: {0}")]
    Ripple(String),
    #[error("notch at {hz} Hz with Q {q} is not realisable: {reason}")]
    Notch { hz: f64, q: f64, reason: String },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    FileAccess(#[from] FileAccessError),
    #[error(transparent)]
    FilterDesign(#[from] FilterDesignError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
