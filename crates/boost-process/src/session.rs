//! Process session - spawn, stream, feed and race against the deadline

use async_trait::async_trait;
use std::fmt;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncRead;
use tracing::debug;

use crate::child::{exit_code, ManagedChild};
use crate::classifier::{classify, Termination};
use crate::config::ExecConfig;
use crate::error::{Result, RuntimeFailure};
use crate::feeder::{feed_lines, InputLines};
use crate::pump::{pump_lines, LineReader, Normalizer, PumpError};
use crate::result::ExecResult;
use crate::sink::{LineObserver, LineSink, SinkError, Stream, TracingObserver, COMMAND_TARGET};

/// Lifecycle state of a process session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Creating the OS process
    Spawning,
    /// Pumps, feeder and exit-wait in flight
    Running,
    /// Finished before the deadline
    Completed,
    /// Deadline elapsed
    TimedOut,
    /// Process creation failed
    SpawnFailed,
    /// An output line exceeded the byte bound
    BufferExceeded,
    /// A sink or pipe failed
    Interrupted,
}

impl SessionState {
    /// Whether the session has concluded
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionState::Spawning | SessionState::Running)
    }
}

impl From<&Termination> for SessionState {
    fn from(termination: &Termination) -> Self {
        match termination {
            Termination::Completed => SessionState::Completed,
            Termination::TimedOut { .. } => SessionState::TimedOut,
            Termination::SpawnFailed { .. } => SessionState::SpawnFailed,
            Termination::BufferExceeded { .. } => SessionState::BufferExceeded,
            Termination::Interrupted(_) => SessionState::Interrupted,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Spawning => "spawning",
            SessionState::Running => "running",
            SessionState::Completed => "completed",
            SessionState::TimedOut => "timed_out",
            SessionState::SpawnFailed => "spawn_failed",
            SessionState::BufferExceeded => "buffer_exceeded",
            SessionState::Interrupted => "interrupted",
        };
        f.write_str(name)
    }
}

/// One invocation of an external command
///
/// # Examples
/// ```no_run
/// use boost_process::{ExecConfig, ProcessSession};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let result = ProcessSession::new("git")
///     .args(["status", "--short"])
///     .config(ExecConfig::new().timeout_secs(30))
///     .run()
///     .await?;
/// println!("{}", result.stdout_text());
/// # Ok(())
/// # }
/// ```
pub struct ProcessSession {
    command: String,
    args: Vec<String>,
    config: ExecConfig,
    stdout_sink: Option<Box<dyn LineSink>>,
    stderr_sink: Option<Box<dyn LineSink>>,
    input: Option<InputLines>,
    observer: Option<Arc<dyn LineObserver>>,
}

impl ProcessSession {
    /// New session for `command` with default configuration
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            config: ExecConfig::default(),
            stdout_sink: None,
            stderr_sink: None,
            input: None,
            observer: None,
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Replace the configuration
    pub fn config(mut self, config: ExecConfig) -> Self {
        self.config = config;
        self
    }

    /// Enable/disable recording lines on the result
    pub fn capture(mut self, capture: bool) -> Self {
        self.config.capture = capture;
        self
    }

    /// Sink for standard output lines
    pub fn on_stdout(mut self, sink: impl LineSink + 'static) -> Self {
        self.stdout_sink = Some(Box::new(sink));
        self
    }

    /// Sink for standard error lines
    pub fn on_stderr(mut self, sink: impl LineSink + 'static) -> Self {
        self.stderr_sink = Some(Box::new(sink));
        self
    }

    /// Lines to feed to standard input
    pub fn input(mut self, input: impl Into<InputLines>) -> Self {
        self.input = Some(input.into());
        self
    }

    /// Observer used when echoing is enabled, instead of [`TracingObserver`]
    pub fn observer(mut self, observer: Arc<dyn LineObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Command as it will be invoked
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Arguments as they will be passed
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Remove the stdout and stderr sinks set so far
    pub(crate) fn take_sinks(&mut self) -> (Option<Box<dyn LineSink>>, Option<Box<dyn LineSink>>) {
        (self.stdout_sink.take(), self.stderr_sink.take())
    }

    /// Run the command to completion, deadline, or failure
    pub async fn run(mut self) -> Result<ExecResult> {
        let started = Instant::now();
        let mut result = ExecResult::pending(&self.command, &self.args);
        let check = self.config.check;

        debug!(
            target: COMMAND_TARGET,
            state = %SessionState::Spawning,
            "{}",
            result.command_line()
        );

        let mut child = match ManagedChild::spawn(
            &self.command,
            &self.args,
            &self.config.process,
            self.input.is_some(),
        ) {
            Ok(child) => child,
            Err(source) => {
                let termination = Termination::SpawnFailed { source };
                debug!(
                    target: COMMAND_TARGET,
                    state = %SessionState::from(&termination),
                    command = %self.command,
                    "Process could not be started"
                );
                result.duration = started.elapsed();
                return classify(termination, result, check);
            }
        };
        result.pid = child.pid();

        let verbose = self
            .config
            .verbose
            .unwrap_or_else(TracingObserver::enabled);
        let observer: Option<Arc<dyn LineObserver>> = if verbose {
            Some(
                self.observer
                    .take()
                    .unwrap_or_else(|| Arc::new(TracingObserver) as Arc<dyn LineObserver>),
            )
        } else {
            None
        };

        debug!(
            target: COMMAND_TARGET,
            state = %SessionState::Running,
            pid = ?result.pid,
            "Process running"
        );

        let (termination, status) = {
            let ExecResult { stdout, stderr, .. } = &mut result;
            let capture = self.config.capture;
            let mut stdout_tap = StreamTap {
                stream: Stream::Stdout,
                captured: capture.then_some(stdout),
                observer: observer.as_deref(),
                sink: self.stdout_sink.as_mut(),
            };
            let mut stderr_tap = StreamTap {
                stream: Stream::Stderr,
                captured: capture.then_some(stderr),
                observer: observer.as_deref(),
                sink: self.stderr_sink.as_mut(),
            };

            race(
                &mut child,
                self.input.take(),
                &self.config,
                &mut stdout_tap,
                &mut stderr_tap,
            )
            .await
        };

        result.exit_code = match status {
            Some(status) => exit_code(status),
            None => child.terminate().await,
        };
        result.duration = started.elapsed();

        debug!(
            target: COMMAND_TARGET,
            state = %SessionState::from(&termination),
            exit_code = result.exit_code,
            elapsed_ms = result.duration.as_millis() as u64,
            "Process finished"
        );

        classify(termination, result, check)
    }
}

impl fmt::Debug for ProcessSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessSession")
            .field("command", &self.command)
            .field("args", &self.args)
            .field("config", &self.config)
            .field("stdout_sink", &self.stdout_sink.is_some())
            .field("stderr_sink", &self.stderr_sink.is_some())
            .field("input", &self.input)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

/// Run `command args...` with `config`
///
/// Shorthand for [`ProcessSession`] without sinks or input.
pub async fn execute<I, S>(command: &str, args: I, config: &ExecConfig) -> Result<ExecResult>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    ProcessSession::new(command)
        .args(args)
        .config(config.clone())
        .run()
        .await
}

/// Per-stream fan-out: observer, result capture, then the caller's sink
struct StreamTap<'a> {
    stream: Stream,
    captured: Option<&'a mut Vec<String>>,
    observer: Option<&'a dyn LineObserver>,
    sink: Option<&'a mut Box<dyn LineSink>>,
}

#[async_trait]
impl LineSink for StreamTap<'_> {
    async fn on_line(&mut self, line: String) -> std::result::Result<(), SinkError> {
        if let Some(observer) = self.observer {
            observer.observe(self.stream, &line);
        }
        match self.sink.as_deref_mut() {
            Some(sink) => {
                if let Some(captured) = self.captured.as_deref_mut() {
                    captured.push(line.clone());
                }
                sink.on_line(line).await
            }
            None => {
                if let Some(captured) = self.captured.as_deref_mut() {
                    captured.push(line);
                }
                Ok(())
            }
        }
    }
}

/// Run both pumps, the feeder and the exit-wait concurrently against the
/// deadline
///
/// The exit status is returned only when everything completed; any other
/// outcome leaves the child to be terminated by the caller.
async fn race(
    child: &mut ManagedChild,
    input: Option<InputLines>,
    config: &ExecConfig,
    stdout_tap: &mut StreamTap<'_>,
    stderr_tap: &mut StreamTap<'_>,
) -> (Termination, Option<ExitStatus>) {
    let stdout = child.stdout();
    let stderr = child.stderr();
    let stdin = child.stdin();
    let limit = config.max_line_bytes;
    let normalize = &config.normalize;

    let activities = async {
        tokio::try_join!(
            drain(stdout, limit, normalize, stdout_tap),
            drain(stderr, limit, normalize, stderr_tap),
            async {
                feed_lines(stdin, input)
                    .await
                    .map_err(|e| Termination::Interrupted(RuntimeFailure::Write(e)))
            },
            async {
                child
                    .wait()
                    .await
                    .map_err(|e| Termination::Interrupted(RuntimeFailure::Wait(e)))
            },
        )
    };

    let outcome = match config.timeout {
        Some(deadline) => match tokio::time::timeout(deadline, activities).await {
            Ok(outcome) => outcome,
            Err(_) => Err(Termination::TimedOut { deadline }),
        },
        None => activities.await,
    };

    match outcome {
        Ok((_, _, _, status)) => (Termination::Completed, Some(status)),
        Err(termination) => (termination, None),
    }
}

/// Pump one child stream to end-of-stream
async fn drain<R>(
    reader: Option<R>,
    limit: usize,
    normalize: &Normalizer,
    tap: &mut StreamTap<'_>,
) -> std::result::Result<usize, Termination>
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return Ok(0);
    };
    let stream = tap.stream;
    let mut reader = LineReader::new(reader, limit);

    pump_lines(&mut reader, normalize, tap)
        .await
        .map_err(|e| match e {
            PumpError::Overflow { limit } => Termination::BufferExceeded { stream, limit },
            PumpError::Io(source) => Termination::Interrupted(RuntimeFailure::Read { stream, source }),
            PumpError::Sink(source) => {
                Termination::Interrupted(RuntimeFailure::Sink { stream, source })
            }
        })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, ExecError};
    use crate::result::NOT_FOUND_EXIT_CODE;
    use crate::sink::sink_fn;
    use parking_lot::Mutex;
    use std::time::Duration;

    fn sh(script: &str) -> ProcessSession {
        ProcessSession::new("sh").args(["-c", script])
    }

    #[tokio::test]
    async fn test_success_captures_both_streams() {
        let result = sh("echo out; echo err >&2").run().await.unwrap();
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, vec!["out"]);
        assert_eq!(result.stderr, vec!["err"]);
        assert!(result.pid.is_some());
        assert_eq!(result.command, "sh");
        assert_eq!(result.args, vec!["-c", "echo out; echo err >&2"]);
    }

    #[tokio::test]
    async fn test_non_zero_strict() {
        let err = sh("echo partial; exit 3").run().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NonZeroExit);
        assert_eq!(err.result().exit_code, 3);
        assert_eq!(err.result().stdout, vec!["partial"]);
    }

    #[tokio::test]
    async fn test_non_zero_lenient() {
        let result = sh("exit 4")
            .config(ExecConfig::new().check(false))
            .run()
            .await
            .unwrap();
        assert_eq!(result.exit_code, 4);
    }

    #[tokio::test]
    async fn test_sinks_receive_lines_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let result = sh("for i in 1 2 3 4 5; do echo $i; done")
            .on_stdout(sink_fn(move |line| {
                sink_seen.lock().push(line);
                Ok(())
            }))
            .run()
            .await
            .unwrap();

        assert_eq!(*seen.lock(), vec!["1", "2", "3", "4", "5"]);
        assert_eq!(result.stdout, vec!["1", "2", "3", "4", "5"]);
    }

    #[tokio::test]
    async fn test_capture_disabled() {
        let result = sh("echo hidden").capture(false).run().await.unwrap();
        assert!(result.stdout.is_empty());
    }

    #[tokio::test]
    async fn test_input_lines_echoed() {
        let result = ProcessSession::new("cat")
            .input(InputLines::new(["a", "b", "c"]))
            .run()
            .await
            .unwrap();
        assert_eq!(result.stdout, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let started = Instant::now();
        let err = sh("echo started; sleep 30")
            .config(ExecConfig::new().timeout(Duration::from_millis(500)))
            .run()
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(err.result().stdout, vec!["started"]);
        assert_eq!(err.result().exit_code, 128 + 9);
    }

    #[tokio::test]
    async fn test_buffer_overflow() {
        let err = sh("printf '%0200d' 0")
            .config(ExecConfig::new().max_line_bytes(64))
            .run()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExecError::BufferOverflow {
                stream: Stream::Stdout,
                limit: 64,
                ..
            }
        ));
        assert!(err.result().is_resolved());
    }

    #[tokio::test]
    async fn test_executable_not_found() {
        let err = ProcessSession::new("no-such-command-9f3a1")
            .run()
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExecutableNotFound);
        assert_eq!(err.result().exit_code, NOT_FOUND_EXIT_CODE);
        assert!(err.result().stdout.is_empty());
        assert!(err.result().stderr.is_empty());
    }

    #[tokio::test]
    async fn test_non_executable_file_is_not_found() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("script");
        std::fs::write(&script, "#!/bin/sh\necho unreachable\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o644)).unwrap();

        let err = ProcessSession::new(script.to_string_lossy())
            .run()
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExecutableNotFound);
        assert_eq!(err.result().exit_code, NOT_FOUND_EXIT_CODE);
        assert!(err.result().stdout.is_empty());

        let source = std::error::Error::source(&err).unwrap();
        let source = source.downcast_ref::<std::io::Error>().unwrap();
        assert_eq!(source.kind(), std::io::ErrorKind::PermissionDenied);
    }

    #[tokio::test]
    async fn test_sink_error_cancels_invocation() {
        let started = Instant::now();
        let err = sh("echo first; sleep 30")
            .on_stdout(sink_fn(|_| Err("stop".into())))
            .run()
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Runtime);
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(matches!(
            err,
            ExecError::Runtime {
                source: RuntimeFailure::Sink {
                    stream: Stream::Stdout,
                    ..
                },
                ..
            }
        ));
        assert_eq!(err.result().stdout, vec!["first"]);
    }

    #[tokio::test]
    async fn test_custom_observer_when_verbose() {
        #[derive(Default)]
        struct Recorder(Mutex<Vec<(Stream, String)>>);

        impl LineObserver for Recorder {
            fn observe(&self, stream: Stream, line: &str) {
                self.0.lock().push((stream, line.to_string()));
            }
        }

        let recorder = Arc::new(Recorder::default());
        sh("echo seen")
            .config(ExecConfig::new().verbose(true))
            .observer(recorder.clone())
            .run()
            .await
            .unwrap();
        assert_eq!(
            *recorder.0.lock(),
            vec![(Stream::Stdout, "seen".to_string())]
        );

        let quiet = Arc::new(Recorder::default());
        sh("echo unseen")
            .config(ExecConfig::new().verbose(false))
            .observer(quiet.clone())
            .run()
            .await
            .unwrap();
        assert!(quiet.0.lock().is_empty());
    }

    #[tokio::test]
    async fn test_execute_shorthand() {
        let result = execute("echo", ["hello", "world"], &ExecConfig::default())
            .await
            .unwrap();
        assert_eq!(result.stdout, vec!["hello world"]);
    }

    #[test]
    fn test_session_state() {
        assert!(!SessionState::Spawning.is_terminal());
        assert!(!SessionState::Running.is_terminal());
        assert!(SessionState::Completed.is_terminal());
        assert!(SessionState::TimedOut.is_terminal());
        assert_eq!(SessionState::BufferExceeded.to_string(), "buffer_exceeded");
        assert_eq!(
            SessionState::from(&Termination::TimedOut {
                deadline: Duration::from_secs(1)
            }),
            SessionState::TimedOut
        );
    }
}
