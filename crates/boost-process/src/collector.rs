//! Output collector - capture lines in memory around a session

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::config::ExecConfig;
use crate::error::{ExecError, Result};
use crate::result::ExecResult;
use crate::session::ProcessSession;
use crate::sink::{LineSink, SinkError};

/// Line buffer shared between a sink and its collector
#[derive(Debug, Clone, Default)]
struct SharedLines(Arc<Mutex<Vec<String>>>);

impl SharedLines {
    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock())
    }
}

#[async_trait]
impl LineSink for SharedLines {
    async fn on_line(&mut self, line: String) -> std::result::Result<(), SinkError> {
        self.0.lock().push(line);
        Ok(())
    }
}

/// Records each line, then hands it to the sink the caller had installed
struct Tee {
    lines: SharedLines,
    next: Option<Box<dyn LineSink>>,
}

#[async_trait]
impl LineSink for Tee {
    async fn on_line(&mut self, line: String) -> std::result::Result<(), SinkError> {
        match self.next.as_mut() {
            Some(next) => {
                self.lines.0.lock().push(line.clone());
                next.on_line(line).await
            }
            None => self.lines.on_line(line).await,
        }
    }
}

/// Accumulates a session's output into in-memory line sequences
///
/// In combined mode standard error lines are appended to the same sequence
/// as standard output, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct OutputCollector {
    stdout: SharedLines,
    stderr: SharedLines,
    combined: bool,
}

impl OutputCollector {
    /// Keep stdout and stderr separate
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge stderr into stdout
    pub fn combined() -> Self {
        let stdout = SharedLines::default();
        Self {
            stderr: stdout.clone(),
            stdout,
            combined: true,
        }
    }

    /// Whether stderr is merged into stdout
    pub fn is_combined(&self) -> bool {
        self.combined
    }

    /// Run `session` with the collector's sinks installed
    ///
    /// Sinks already set on the session still receive every line, after the
    /// collector has recorded it.
    pub async fn collect(self, mut session: ProcessSession) -> Result<ExecResult> {
        let (stdout_sink, stderr_sink) = session.take_sinks();
        let session = session
            .capture(false)
            .on_stdout(Tee {
                lines: self.stdout.clone(),
                next: stdout_sink,
            })
            .on_stderr(Tee {
                lines: self.stderr.clone(),
                next: stderr_sink,
            });

        match session.run().await {
            Ok(mut result) => {
                self.attach(&mut result);
                Ok(result)
            }
            Err(mut error) => {
                self.attach_partial(&mut error);
                Err(error)
            }
        }
    }

    fn attach(&self, result: &mut ExecResult) {
        result.stdout = self.stdout.take();
        result.stderr = if self.combined {
            Vec::new()
        } else {
            self.stderr.take()
        };
    }

    /// Empty local buffers never replace lines already on the error's result
    fn attach_partial(&self, error: &mut ExecError) {
        let stdout = self.stdout.take();
        let stderr = if self.combined {
            Vec::new()
        } else {
            self.stderr.take()
        };

        let result = error.result_mut();
        if !stdout.is_empty() {
            result.stdout = stdout;
        }
        if !stderr.is_empty() {
            result.stderr = stderr;
        }
    }
}

impl ProcessSession {
    /// Run and collect output in memory; see [`OutputCollector`]
    pub async fn output(self, combined: bool) -> Result<ExecResult> {
        let collector = if combined {
            OutputCollector::combined()
        } else {
            OutputCollector::new()
        };
        collector.collect(self).await
    }
}

/// Run `command args...` and collect its output
pub async fn output<I, S>(
    command: &str,
    args: I,
    config: &ExecConfig,
    combined: bool,
) -> Result<ExecResult>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    ProcessSession::new(command)
        .args(args)
        .config(config.clone())
        .output(combined)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RuntimeFailure;

    fn failed_with(stdout: &[&str], stderr: &[&str]) -> ExecError {
        let mut result = ExecResult::pending::<&str>("tool", &[]);
        result.exit_code = 1;
        result.stdout = stdout.iter().map(|s| s.to_string()).collect();
        result.stderr = stderr.iter().map(|s| s.to_string()).collect();
        ExecError::Runtime {
            command: "tool".into(),
            source: RuntimeFailure::Wait(std::io::Error::other("lost")),
            result: Box::new(result),
        }
    }

    #[tokio::test]
    async fn test_combined_shares_one_buffer() {
        let collector = OutputCollector::combined();
        assert!(collector.is_combined());

        let mut out = collector.stdout.clone();
        let mut err = collector.stderr.clone();
        out.on_line("x".into()).await.unwrap();
        err.on_line("y".into()).await.unwrap();

        let mut result = ExecResult::pending::<&str>("tool", &[]);
        collector.attach(&mut result);
        assert_eq!(result.stdout, vec!["x", "y"]);
        assert!(result.stderr.is_empty());
    }

    #[tokio::test]
    async fn test_partial_does_not_clobber_with_empty_buffers() {
        let collector = OutputCollector::new();
        let mut error = failed_with(&["from snapshot"], &["snapshot err"]);

        collector.attach_partial(&mut error);
        assert_eq!(error.result().stdout, vec!["from snapshot"]);
        assert_eq!(error.result().stderr, vec!["snapshot err"]);
    }

    #[tokio::test]
    async fn test_partial_replaces_with_collected_lines() {
        let collector = OutputCollector::new();
        let mut out = collector.stdout.clone();
        out.on_line("collected".into()).await.unwrap();

        let mut error = failed_with(&[], &["snapshot err"]);
        collector.attach_partial(&mut error);
        assert_eq!(error.result().stdout, vec!["collected"]);
        assert_eq!(error.result().stderr, vec!["snapshot err"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_separate_streams() {
        let result = output(
            "sh",
            ["-c", "echo x; echo y >&2"],
            &ExecConfig::default(),
            false,
        )
        .await
        .unwrap();
        assert_eq!(result.stdout, vec!["x"]);
        assert_eq!(result.stderr, vec!["y"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_combined() {
        let result = output(
            "sh",
            ["-c", "echo x; echo y >&2"],
            &ExecConfig::default(),
            true,
        )
        .await
        .unwrap();

        let mut lines = result.stdout.clone();
        lines.sort();
        assert_eq!(lines, vec!["x", "y"]);
        assert!(result.stderr.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_keeps_caller_sinks() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let out_seen = seen.clone();
        let err_seen = seen.clone();

        let result = ProcessSession::new("sh")
            .args(["-c", "echo x; echo y >&2"])
            .on_stdout(crate::sink::sink_fn(move |line| {
                out_seen.lock().push(format!("out:{line}"));
                Ok(())
            }))
            .on_stderr(crate::sink::sink_fn(move |line| {
                err_seen.lock().push(format!("err:{line}"));
                Ok(())
            }))
            .output(false)
            .await
            .unwrap();

        assert_eq!(result.stdout, vec!["x"]);
        assert_eq!(result.stderr, vec!["y"]);
        let mut seen = seen.lock().clone();
        seen.sort();
        assert_eq!(seen, vec!["err:y", "out:x"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_caller_sink_error_keeps_collected_lines() {
        let err = ProcessSession::new("sh")
            .args(["-c", "echo first; echo second; sleep 30"])
            .on_stdout(crate::sink::sink_fn(|line| {
                if line == "second" {
                    Err("rejected".into())
                } else {
                    Ok(())
                }
            }))
            .output(false)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), crate::error::ErrorKind::Runtime);
        assert_eq!(err.result().stdout, vec!["first", "second"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_attaches_on_non_zero() {
        let err = ProcessSession::new("sh")
            .args(["-c", "echo out; echo err >&2; exit 2"])
            .output(false)
            .await
            .unwrap_err();
        assert_eq!(err.result().exit_code, 2);
        assert_eq!(err.result().stdout, vec!["out"]);
        assert_eq!(err.result().stderr, vec!["err"]);
    }
}
