//! Maps a session's terminal state to a result or a classified error

use std::io;
use std::path::Path;
use std::time::Duration;

use crate::error::{ExecError, RuntimeFailure};
use crate::result::{ExecResult, NOT_FOUND_EXIT_CODE};
use crate::sink::Stream;

/// Terminal state of a process session
#[derive(Debug)]
pub enum Termination {
    /// All activities finished before the deadline
    Completed,
    /// The deadline elapsed first
    TimedOut {
        /// Configured deadline
        deadline: Duration,
    },
    /// Process creation failed
    SpawnFailed {
        /// Error from process creation
        source: io::Error,
    },
    /// A line had no delimiter within the bound
    BufferExceeded {
        /// Stream that overflowed
        stream: Stream,
        /// Configured bound
        limit: usize,
    },
    /// A sink or pipe failed while running
    Interrupted(RuntimeFailure),
}

/// Turn a terminal state and its finalized result into the call's outcome
///
/// `result.exit_code` must already hold the reaped code for every state
/// except `SpawnFailed`, whose sentinel code is assigned here.
pub fn classify(
    termination: Termination,
    mut result: ExecResult,
    check: bool,
) -> Result<ExecResult, ExecError> {
    match termination {
        Termination::Completed => {
            if check && result.exit_code != 0 {
                Err(ExecError::NonZeroExit {
                    command: result.command_line(),
                    exit_code: result.exit_code,
                    result: Box::new(result),
                })
            } else {
                Ok(result)
            }
        }
        Termination::TimedOut { deadline } => Err(ExecError::Timeout {
            command: display_name(&result.command),
            seconds: deadline.as_secs_f64(),
            result: Box::new(result),
        }),
        Termination::SpawnFailed { source } => {
            result.exit_code = NOT_FOUND_EXIT_CODE;
            Err(ExecError::ExecutableNotFound {
                command: result.command.clone(),
                source,
                result: Box::new(result),
            })
        }
        Termination::BufferExceeded { stream, limit } => Err(ExecError::BufferOverflow {
            command: result.command.clone(),
            stream,
            limit,
            result: Box::new(result),
        }),
        Termination::Interrupted(source) => Err(ExecError::Runtime {
            command: result.command.clone(),
            source,
            result: Box::new(result),
        }),
    }
}

/// File name component of a command path
fn display_name(command: &str) -> String {
    Path::new(command)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| command.to_string())
}
