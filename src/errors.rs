//! Error types for trace-driven shaping sessions

use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

/// Failure to turn a trace file into events.
#[derive(Error, Debug)]
pub enum TraceError {
    #[error("Cannot read trace file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed trace line {line}: {reason}")]
    Format { line: usize, reason: String },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Trace(#[from] TraceError),

    #[error("Cannot read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to spawn schedule process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Schedule process exited with {0}")]
    ChildFailed(ExitStatus),
}

pub type Result<T> = std::result::Result<T, Error>;
