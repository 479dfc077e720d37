//! Managed child process wrapper

use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};

use crate::config::ProcessOptions;
use crate::result::KILLED_EXIT_CODE;

/// How long to wait for a killed child to be reaped
const REAP_TIMEOUT: Duration = Duration::from_secs(5);

/// Wrapper around tokio::process::Child with termination handling
#[derive(Debug)]
pub(crate) struct ManagedChild {
    /// Underlying tokio child process
    child: Child,
    /// Process ID at spawn time
    pid: Option<u32>,
    /// Whether the child leads its own process group
    process_group: bool,
}

impl ManagedChild {
    /// Spawn `command args...` with stdout/stderr piped and stdin piped only
    /// when `with_stdin` is set
    pub(crate) fn spawn(
        command: &str,
        args: &[String],
        options: &ProcessOptions,
        with_stdin: bool,
    ) -> std::io::Result<Self> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(if with_stdin {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        options.apply(&mut cmd);

        let child = cmd.spawn()?;
        let pid = child.id();
        debug!(pid = ?pid, command = %command, "Process spawned");

        Ok(Self {
            child,
            pid,
            process_group: options.process_group,
        })
    }

    /// Process ID at spawn time
    pub(crate) fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Take stdin handle
    pub(crate) fn stdin(&mut self) -> Option<ChildStdin> {
        self.child.stdin.take()
    }

    /// Take stdout handle
    pub(crate) fn stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Take stderr handle
    pub(crate) fn stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Wait for process to exit
    pub(crate) async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Force the child to stop and reap it
    ///
    /// Signal failures (typically because the process already exited) are
    /// ignored. Returns the exit code, or [`KILLED_EXIT_CODE`] when the
    /// status could not be collected.
    pub(crate) async fn terminate(&mut self) -> i32 {
        debug!(pid = ?self.pid, "Terminating process");

        #[cfg(unix)]
        if self.process_group {
            self.kill_group();
        }

        if let Err(e) = self.child.start_kill() {
            debug!(pid = ?self.pid, error = %e, "Kill failed, process already exited");
        }

        match tokio::time::timeout(REAP_TIMEOUT, self.child.wait()).await {
            Ok(Ok(status)) => exit_code(status),
            Ok(Err(e)) => {
                warn!(pid = ?self.pid, error = %e, "Error waiting for terminated process");
                KILLED_EXIT_CODE
            }
            Err(_) => {
                warn!(pid = ?self.pid, "Timeout waiting for terminated process");
                KILLED_EXIT_CODE
            }
        }
    }

    /// SIGKILL the whole process group led by the child
    #[cfg(unix)]
    fn kill_group(&self) {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.pid.and_then(|pid| i32::try_from(pid).ok()) else {
            return;
        };
        match killpg(Pid::from_raw(pid), Signal::SIGKILL) {
            Ok(()) => debug!(pid, "Sent SIGKILL to process group"),
            Err(e) => debug!(pid, error = %e, "Failed to signal process group"),
        }
    }
}

/// Exit code of a finished process; `128 + signal` when killed by a signal
pub(crate) fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    KILLED_EXIT_CODE
}
