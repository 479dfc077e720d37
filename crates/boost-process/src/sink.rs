//! Line sinks and diagnostic observers

use async_trait::async_trait;
use std::fmt;
use tokio::sync::mpsc;
use tracing::debug;

/// Tracing target for invocation diagnostics
pub const COMMAND_TARGET: &str = "boost::command";

/// Tracing target for echoed standard output lines
pub const STDOUT_TARGET: &str = "boost::command::stdout";

/// Tracing target for echoed standard error lines
pub const STDERR_TARGET: &str = "boost::command::stderr";

/// Echoed lines longer than this many characters are truncated
const ECHO_MAX_CHARS: usize = 1024;

/// Error returned by a sink to abort the invocation
pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

/// Which child stream a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    /// Standard output
    Stdout,
    /// Standard error
    Stderr,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Stdout => f.write_str("stdout"),
            Stream::Stderr => f.write_str("stderr"),
        }
    }
}

/// Consumer of normalized lines from one child stream
///
/// An error returned from [`on_line`](LineSink::on_line) is not absorbed: it
/// cancels every other activity of the invocation and surfaces as
/// [`ExecError::Runtime`](crate::ExecError::Runtime).
#[async_trait]
pub trait LineSink: Send {
    /// Handle one line
    async fn on_line(&mut self, line: String) -> Result<(), SinkError>;
}

#[async_trait]
impl<S: LineSink + ?Sized> LineSink for Box<S> {
    async fn on_line(&mut self, line: String) -> Result<(), SinkError> {
        (**self).on_line(line).await
    }
}

#[async_trait]
impl<S: LineSink + ?Sized> LineSink for &mut S {
    async fn on_line(&mut self, line: String) -> Result<(), SinkError> {
        (**self).on_line(line).await
    }
}

/// Sink backed by a synchronous closure
pub struct FnSink<F>(F);

impl<F> fmt::Debug for FnSink<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnSink").finish_non_exhaustive()
    }
}

/// Wrap a closure as a [`LineSink`]
pub fn sink_fn<F>(f: F) -> FnSink<F>
where
    F: FnMut(String) -> Result<(), SinkError> + Send,
{
    FnSink(f)
}

#[async_trait]
impl<F> LineSink for FnSink<F>
where
    F: FnMut(String) -> Result<(), SinkError> + Send,
{
    async fn on_line(&mut self, line: String) -> Result<(), SinkError> {
        (self.0)(line)
    }
}

/// Bounded channel sink; a full channel suspends the pump until it drains
#[async_trait]
impl LineSink for mpsc::Sender<String> {
    async fn on_line(&mut self, line: String) -> Result<(), SinkError> {
        self.send(line).await.map_err(|_| "line receiver dropped".into())
    }
}

#[async_trait]
impl LineSink for mpsc::UnboundedSender<String> {
    async fn on_line(&mut self, line: String) -> Result<(), SinkError> {
        self.send(line).map_err(|_| "line receiver dropped".into())
    }
}

/// Observer notified of every line for diagnostic echoing
pub trait LineObserver: Send + Sync {
    /// Called before the line is handed to the stream's sink
    fn observe(&self, stream: Stream, line: &str);
}

/// Echoes lines as `tracing` debug events on the per-stream targets
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl TracingObserver {
    /// Whether either echo target is enabled at debug level
    pub fn enabled() -> bool {
        tracing::enabled!(target: STDOUT_TARGET, tracing::Level::DEBUG)
            || tracing::enabled!(target: STDERR_TARGET, tracing::Level::DEBUG)
    }
}

impl LineObserver for TracingObserver {
    fn observe(&self, stream: Stream, line: &str) {
        let line = truncate_for_echo(line);
        match stream {
            Stream::Stdout => debug!(target: STDOUT_TARGET, "{}", line),
            Stream::Stderr => debug!(target: STDERR_TARGET, "{}", line),
        }
    }
}

fn truncate_for_echo(line: &str) -> std::borrow::Cow<'_, str> {
    if line.chars().count() <= ECHO_MAX_CHARS {
        return line.into();
    }
    let head: String = line.chars().take(ECHO_MAX_CHARS - 3).collect();
    format!("{head}...").into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fn_sink_collects() {
        let mut seen = Vec::new();
        {
            let mut sink = sink_fn(|line| {
                seen.push(line);
                Ok(())
            });
            sink.on_line("one".into()).await.unwrap();
            sink.on_line("two".into()).await.unwrap();
        }
        assert_eq!(seen, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_fn_sink_error_propagates() {
        let mut sink = sink_fn(|_| Err("nope".into()));
        let err = sink.on_line("x".into()).await.unwrap_err();
        assert_eq!(err.to_string(), "nope");
    }

    #[tokio::test]
    async fn test_channel_sink() {
        let (mut tx, mut rx) = mpsc::channel::<String>(4);
        tx.on_line("hello".into()).await.unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some("hello"));

        drop(rx);
        assert!(tx.on_line("lost".into()).await.is_err());
    }

    #[tokio::test]
    async fn test_unbounded_channel_sink() {
        let (mut tx, mut rx) = mpsc::unbounded_channel::<String>();
        tx.on_line("one".into()).await.unwrap();
        tx.on_line("two".into()).await.unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some("one"));
        assert_eq!(rx.recv().await.as_deref(), Some("two"));

        drop(rx);
        let err = tx.on_line("lost".into()).await.unwrap_err();
        assert_eq!(err.to_string(), "line receiver dropped");
    }

    #[test]
    fn test_truncate_for_echo() {
        assert_eq!(truncate_for_echo("short"), "short");

        let long = "x".repeat(2000);
        let echoed = truncate_for_echo(&long);
        assert_eq!(echoed.chars().count(), ECHO_MAX_CHARS);
        assert!(echoed.ends_with("..."));
    }

    #[test]
    fn test_stream_display() {
        assert_eq!(Stream::Stdout.to_string(), "stdout");
        assert_eq!(Stream::Stderr.to_string(), "stderr");
    }
}
