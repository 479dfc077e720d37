//! Execution result record

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exit code held by a result whose invocation has not concluded yet
pub const PENDING_EXIT_CODE: i32 = -1;

/// Exit code recorded when the executable could not be located or started
pub const NOT_FOUND_EXIT_CODE: i32 = 127;

/// Exit code recorded for a forcibly terminated child whose status was lost
pub const KILLED_EXIT_CODE: i32 = 137;

/// Record of a single process invocation
///
/// Created with [`PENDING_EXIT_CODE`] and empty line sequences, appended to
/// while the output pumps run, and finalized exactly once when the
/// invocation concludes. A finalized result is either returned to the caller
/// or attached to the raised [`ExecError`](crate::ExecError).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecResult {
    /// Command as it was invoked
    pub command: String,
    /// Argument vector (without the command itself)
    pub args: Vec<String>,
    /// Exit code, or one of the documented sentinels
    pub exit_code: i32,
    /// Lines captured from standard output, in emission order
    pub stdout: Vec<String>,
    /// Lines captured from standard error, in emission order
    pub stderr: Vec<String>,
    /// Process ID of the spawned child
    pub pid: Option<u32>,
    /// Wall-clock time from spawn attempt to finalization
    pub duration: Duration,
}

impl ExecResult {
    /// Create an unresolved result for `command args...`
    pub fn pending<S: AsRef<str>>(command: impl Into<String>, args: &[S]) -> Self {
        Self {
            command: command.into(),
            args: args.iter().map(|a| a.as_ref().to_string()).collect(),
            exit_code: PENDING_EXIT_CODE,
            stdout: Vec::new(),
            stderr: Vec::new(),
            pid: None,
            duration: Duration::ZERO,
        }
    }

    /// Whether the exit code has been finalized
    pub fn is_resolved(&self) -> bool {
        self.exit_code != PENDING_EXIT_CODE
    }

    /// Whether the process exited with code 0
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Command and arguments joined by spaces
    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }

    /// Captured standard output joined with newlines
    pub fn stdout_text(&self) -> String {
        self.stdout.join("\n")
    }

    /// Captured standard error joined with newlines
    pub fn stderr_text(&self) -> String {
        self.stderr.join("\n")
    }
}
