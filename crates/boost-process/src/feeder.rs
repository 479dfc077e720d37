//! Line feeder: writes input lines to a child's stdin

use std::fmt;
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::debug;

/// Ordered source of lines for a child's standard input
pub struct InputLines {
    source: Source,
}

enum Source {
    Buffered(std::vec::IntoIter<String>),
    Channel(mpsc::Receiver<String>),
}

impl InputLines {
    /// Lines known up front
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        lines.into_iter().collect()
    }

    /// Lines produced while the process runs; input closes when every
    /// sender is dropped
    pub fn from_channel(rx: mpsc::Receiver<String>) -> Self {
        Self {
            source: Source::Channel(rx),
        }
    }

    /// Next line, or `None` when the source is exhausted
    pub async fn next_line(&mut self) -> Option<String> {
        match &mut self.source {
            Source::Buffered(lines) => lines.next(),
            Source::Channel(rx) => rx.recv().await,
        }
    }
}

impl<S: Into<String>> FromIterator<S> for InputLines {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let lines: Vec<String> = iter.into_iter().map(Into::into).collect();
        Self {
            source: Source::Buffered(lines.into_iter()),
        }
    }
}

impl From<Vec<String>> for InputLines {
    fn from(lines: Vec<String>) -> Self {
        Self {
            source: Source::Buffered(lines.into_iter()),
        }
    }
}

impl From<mpsc::Receiver<String>> for InputLines {
    fn from(rx: mpsc::Receiver<String>) -> Self {
        Self::from_channel(rx)
    }
}

impl fmt::Debug for InputLines {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Source::Buffered(lines) => f
                .debug_struct("InputLines")
                .field("remaining", &lines.len())
                .finish(),
            Source::Channel(_) => f.debug_struct("InputLines").field("channel", &true).finish(),
        }
    }
}

/// Write every line from `input` to `writer`, then close it
///
/// A no-op when either side is absent. Each line is terminated with `\n` if
/// it is not already, and flushed before the next one is taken. A broken
/// pipe (the child stopped reading) ends feeding without error.
///
/// Returns the number of lines written.
pub async fn feed_lines<W>(writer: Option<W>, input: Option<InputLines>) -> io::Result<usize>
where
    W: AsyncWrite + Unpin,
{
    let (Some(mut writer), Some(mut input)) = (writer, input) else {
        return Ok(0);
    };

    let mut written = 0;
    while let Some(mut line) = input.next_line().await {
        if !line.ends_with('\n') {
            line.push('\n');
        }

        let sent = async {
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await
        };
        match sent.await {
            Ok(()) => written += 1,
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                debug!(written, "Child closed stdin early, stopping input");
                return Ok(written);
            }
            Err(e) => return Err(e),
        }
    }

    match writer.shutdown().await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {}
        Err(e) => return Err(e),
    }
    Ok(written)
}
