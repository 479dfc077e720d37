//! Error types for process execution

use std::io;
use thiserror::Error;

use crate::result::ExecResult;
use crate::sink::{SinkError, Stream};

/// Coarse classification of an [`ExecError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The executable could not be located or started
    ExecutableNotFound,
    /// The deadline elapsed first
    Timeout,
    /// An output line exceeded the byte bound
    BufferOverflow,
    /// Non-zero exit under strict checking
    NonZeroExit,
    /// Failure outside the process's own lifecycle
    Runtime,
}

/// Process execution errors
///
/// Every variant carries the invocation's [`ExecResult`] as it stood when
/// the failure was raised, so partial output is never lost.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The executable could not be located or started
    #[error("command '{command}' failed, executable not found")]
    ExecutableNotFound {
        /// Command as invoked
        command: String,
        /// Error from process creation
        source: io::Error,
        /// Result with exit code 127
        result: Box<ExecResult>,
    },

    /// The deadline elapsed before the process and its streams finished
    #[error("command '{command}' timed out after {seconds} seconds")]
    Timeout {
        /// File name of the command
        command: String,
        /// Configured deadline
        seconds: f64,
        /// Partial result
        result: Box<ExecResult>,
    },

    /// An output line had no delimiter within the byte bound
    #[error("command '{command}' output exceeded maximum buffer size ({limit} bytes on {stream})")]
    BufferOverflow {
        /// Command as invoked
        command: String,
        /// Stream that overflowed
        stream: Stream,
        /// Configured per-line byte bound
        limit: usize,
        /// Partial result
        result: Box<ExecResult>,
    },

    /// The process exited non-zero and strict checking was on
    #[error("command '{command}' exited with non-zero ({exit_code}) exit status")]
    NonZeroExit {
        /// Command line with arguments
        command: String,
        /// Real exit code
        exit_code: i32,
        /// Finalized result
        result: Box<ExecResult>,
    },

    /// Piping, waiting or a caller sink failed
    #[error("command '{command}' failed: {source}")]
    Runtime {
        /// Command as invoked
        command: String,
        /// Underlying failure
        source: RuntimeFailure,
        /// Partial result
        result: Box<ExecResult>,
    },
}

impl ExecError {
    /// Classification tag
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecError::ExecutableNotFound { .. } => ErrorKind::ExecutableNotFound,
            ExecError::Timeout { .. } => ErrorKind::Timeout,
            ExecError::BufferOverflow { .. } => ErrorKind::BufferOverflow,
            ExecError::NonZeroExit { .. } => ErrorKind::NonZeroExit,
            ExecError::Runtime { .. } => ErrorKind::Runtime,
        }
    }

    /// Result attached to the failure
    pub fn result(&self) -> &ExecResult {
        match self {
            ExecError::ExecutableNotFound { result, .. }
            | ExecError::Timeout { result, .. }
            | ExecError::BufferOverflow { result, .. }
            | ExecError::NonZeroExit { result, .. }
            | ExecError::Runtime { result, .. } => result,
        }
    }

    /// Mutable access to the attached result
    pub fn result_mut(&mut self) -> &mut ExecResult {
        match self {
            ExecError::ExecutableNotFound { result, .. }
            | ExecError::Timeout { result, .. }
            | ExecError::BufferOverflow { result, .. }
            | ExecError::NonZeroExit { result, .. }
            | ExecError::Runtime { result, .. } => result,
        }
    }

    /// Take the attached result
    pub fn into_result(self) -> ExecResult {
        match self {
            ExecError::ExecutableNotFound { result, .. }
            | ExecError::Timeout { result, .. }
            | ExecError::BufferOverflow { result, .. }
            | ExecError::NonZeroExit { result, .. }
            | ExecError::Runtime { result, .. } => *result,
        }
    }
}

/// Cause of an [`ExecError::Runtime`]
#[derive(Debug, Error)]
pub enum RuntimeFailure {
    /// A caller-supplied sink rejected a line
    #[error("{stream} sink failed: {source}")]
    Sink {
        /// Stream whose sink failed
        stream: Stream,
        /// Error returned by the sink
        source: SinkError,
    },

    /// Reading a child stream failed
    #[error("reading {stream} failed: {source}")]
    Read {
        /// Stream being read
        stream: Stream,
        /// Underlying I/O error
        source: io::Error,
    },

    /// Writing to the child's stdin failed
    #[error("writing stdin failed: {0}")]
    Write(#[source] io::Error),

    /// Waiting for the child failed
    #[error("waiting for process failed: {0}")]
    Wait(#[source] io::Error),
}

/// Result type for process execution
pub type Result<T> = std::result::Result<T, ExecError>;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Settings document could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// A setting had an invalid value
    #[error("Validation error: {0}")]
    Validation(String),

    /// An environment override could not be parsed
    #[error("Environment error: {0}")]
    Env(String),
}

/// Configuration result type
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
