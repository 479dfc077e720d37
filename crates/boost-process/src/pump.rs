//! Line pump: bounded line reading, normalization and dispatch

use std::fmt;
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use crate::sink::{LineSink, SinkError};

/// Failure reading a single line
#[derive(Debug, Error)]
pub enum LineError {
    /// No delimiter appeared within the byte bound
    #[error("line exceeded {limit} bytes without a delimiter")]
    TooLong {
        /// Configured per-line byte bound
        limit: usize,
    },

    /// Underlying read failed
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Failure while pumping a stream
#[derive(Debug, Error)]
pub enum PumpError {
    /// A line was longer than the reader's bound
    #[error("line exceeded {limit} bytes without a delimiter")]
    Overflow {
        /// Configured per-line byte bound
        limit: usize,
    },

    /// Reading from the stream failed
    #[error("read failed: {0}")]
    Io(#[source] io::Error),

    /// The sink rejected a line
    #[error("line sink failed: {0}")]
    Sink(#[source] SinkError),
}

impl From<LineError> for PumpError {
    fn from(err: LineError) -> Self {
        match err {
            LineError::TooLong { limit } => PumpError::Overflow { limit },
            LineError::Io(e) => PumpError::Io(e),
        }
    }
}

/// Reads `\n`-delimited lines, refusing any line longer than `max_line_bytes`
///
/// The bound applies to line content, excluding the delimiter. A final line
/// without a delimiter is returned at end-of-stream.
#[derive(Debug)]
pub struct LineReader<R> {
    inner: BufReader<R>,
    max_line_bytes: usize,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    /// Wrap `reader` with the given per-line bound
    pub fn new(reader: R, max_line_bytes: usize) -> Self {
        Self {
            inner: BufReader::new(reader),
            max_line_bytes,
        }
    }

    /// Per-line byte bound
    pub fn max_line_bytes(&self) -> usize {
        self.max_line_bytes
    }

    /// Read the next raw line, delimiter included
    ///
    /// Returns `Ok(None)` at end-of-stream.
    pub async fn next_line(&mut self) -> Result<Option<Vec<u8>>, LineError> {
        let limit = self.max_line_bytes;
        let mut line = Vec::new();

        loop {
            let (used, done) = {
                let available = self.inner.fill_buf().await?;
                if available.is_empty() {
                    return Ok(if line.is_empty() { None } else { Some(line) });
                }

                match available.iter().position(|b| *b == b'\n') {
                    Some(pos) => {
                        if line.len() + pos > limit {
                            return Err(LineError::TooLong { limit });
                        }
                        line.extend_from_slice(&available[..=pos]);
                        (pos + 1, true)
                    }
                    None => {
                        if line.len() + available.len() > limit {
                            return Err(LineError::TooLong { limit });
                        }
                        line.extend_from_slice(available);
                        (available.len(), false)
                    }
                }
            };

            self.inner.consume(used);
            if done {
                return Ok(Some(line));
            }
        }
    }
}

/// Text transform applied to each decoded line before dispatch
#[derive(Clone)]
pub struct Normalizer(Arc<dyn Fn(&str) -> String + Send + Sync>);

impl Normalizer {
    /// Custom normalizer
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Strip surrounding whitespace, delimiter included
    pub fn trim() -> Self {
        Self::new(|line| line.trim().to_string())
    }

    /// Strip only the trailing `\n` or `\r\n`
    pub fn trim_newline() -> Self {
        Self::new(|line| {
            let line = line.strip_suffix('\n').unwrap_or(line);
            line.strip_suffix('\r').unwrap_or(line).to_string()
        })
    }

    /// Pass lines through untouched, delimiter included
    pub fn identity() -> Self {
        Self::new(str::to_string)
    }

    /// Apply to one line
    pub fn apply(&self, line: &str) -> String {
        (self.0)(line)
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::trim()
    }
}

impl fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Normalizer(..)")
    }
}

/// Drain `reader` to end-of-stream, dispatching every normalized line
///
/// Returns the number of lines dispatched. Lines are decoded as UTF-8 with
/// invalid sequences replaced.
pub async fn pump_lines<R, S>(
    reader: &mut LineReader<R>,
    normalize: &Normalizer,
    sink: &mut S,
) -> Result<usize, PumpError>
where
    R: AsyncRead + Unpin,
    S: LineSink + ?Sized,
{
    let mut count = 0;
    while let Some(raw) = reader.next_line().await? {
        let text = String::from_utf8_lossy(&raw);
        sink.on_line(normalize.apply(&text))
            .await
            .map_err(PumpError::Sink)?;
        count += 1;
    }
    Ok(count)
}
