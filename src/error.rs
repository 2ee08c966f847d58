//! Error types for the scoring and selection pipeline
//!
//! Structural and configuration problems (missing files, failed external
//! processes, parallel streams of unequal length, degenerate baselines) are
//! fatal and surface as [`QeError`]. A single unparseable line is a
//! [`MalformedLine`], which callers log and recover from.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors raised by the pipeline components
#[derive(Error, Debug)]
pub enum QeError {
    #[error("`{program}` exited with {status}. Check {inputs}")]
    ProcessFailed {
        program: String,
        status: String,
        inputs: String,
    },

    #[error("Failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("File `{0}` does not exist")]
    MissingFile(PathBuf),

    #[error("Parallel streams differ in length: {0}")]
    LengthMismatch(String),

    #[error("Baseline standard deviation is zero for feature `{feature}`; deviations undefined")]
    ZeroStdev { feature: &'static str },

    #[error("Invalid baseline {statistic} `{value}` for feature `{feature}`")]
    InvalidBaseline {
        feature: &'static str,
        statistic: &'static str,
        value: f64,
    },

    #[error("Specify exactly one of a statistics input or a statistics output")]
    BaselineMode,

    #[error("Reference set `{0}` is empty; cannot estimate baseline statistics")]
    EmptyReference(PathBuf),

    #[error("Malformed statistics file `{path}`: {reason}")]
    StatsFormat { path: PathBuf, reason: String },

    #[error("I/O error on `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl QeError {
    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        QeError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type QeResult<T> = Result<T, QeError>;

/// A single line that could not be parsed into the expected shape
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct MalformedLine(pub String);

impl MalformedLine {
    pub fn new(reason: impl Into<String>) -> Self {
        MalformedLine(reason.into())
    }
}
