//! RDS contract error types

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RdsError {
    #[error("Log line '{line}' did not appear within {timeout:?}")]
    LogLineTimeout { line: String, timeout: Duration },

    #[error("Expected log line '{0}' was not emitted")]
    MissingLogLine(String),

    #[error("Unexpected log line '{0}'")]
    UnexpectedLogLine(String),

    #[error("{script} exited with {exit_code}: {output}")]
    ExecFailed {
        script: String,
        exit_code: i64,
        output: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RdsError>;
