//! WaterMill command-line runner
//!
//! Runs join jobs over JSON-lines files: every stream of a job is read from a
//! file into an in-memory broker, a mill is driven over them and its results
//! are written back out as JSON lines.

pub mod commands;
pub mod job;

pub use job::{JobSpec, JoinSpec, WindowSpec};

use std::path::PathBuf;
use thiserror::Error;

/// CLI error type
#[derive(Debug, Error)]
pub enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Job file error: {0}")]
    JobFile(#[from] figment::Error),

    #[error("{}:{}: invalid JSON: {}", .path.display(), .line, .source)]
    InvalidInput {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Mill(#[from] watermill::MillError),
}

/// CLI result type
pub type CliResult<T> = std::result::Result<T, CliError>;
