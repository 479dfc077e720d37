//! # boost-process
//!
//! **Purpose**: Managed subprocess execution with streamed, bounded output
//!
//! Spawns an external command, streams its stdout and stderr line by line to
//! caller sinks while optionally feeding lines to its stdin, enforces a
//! wall-clock deadline and a per-line byte bound, and reports failures as a
//! small set of error kinds that always carry the partial result.
//!
//! ## Features
//!
//! - **Line Streaming**: stdout and stderr drained concurrently, order kept per stream
//! - **Input Feeding**: buffered or channel-backed stdin lines with backpressure
//! - **Deadlines**: the whole invocation races one timer; the child is killed on expiry
//! - **Bounded Lines**: overlong lines fail fast instead of growing memory
//! - **Classified Errors**: `ExecutableNotFound`, `Timeout`, `BufferOverflow`, `NonZeroExit`
//! - **Output Collection**: in-memory capture, optionally merging stderr into stdout
//!
//! ## Usage
//!
//! ```rust,no_run
//! use boost_process::{ExecConfig, ExecError, InputLines, ProcessSession};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ExecConfig::new().timeout_secs(30).max_line_bytes(64 * 1024);
//!
//! match ProcessSession::new("sort")
//!     .config(config)
//!     .input(InputLines::new(["pear", "apple"]))
//!     .output(false)
//!     .await
//! {
//!     Ok(result) => println!("{:?}", result.stdout),
//!     Err(ExecError::NonZeroExit { result, .. }) => eprintln!("{:?}", result.stderr),
//!     Err(e) => return Err(e.into()),
//! }
//! # Ok(())
//! # }
//! ```

mod child;
pub mod classifier;
pub mod collector;
pub mod config;
pub mod error;
pub mod feeder;
pub mod pump;
pub mod result;
pub mod session;
pub mod sink;

pub use classifier::{classify, Termination};
pub use collector::{output, OutputCollector};
pub use config::{ExecConfig, ExecSettings, ProcessOptions, DEFAULT_MAX_LINE_BYTES, DEFAULT_TIMEOUT};
pub use error::{ConfigError, ErrorKind, ExecError, Result, RuntimeFailure};
pub use feeder::{feed_lines, InputLines};
pub use pump::{pump_lines, LineError, LineReader, Normalizer, PumpError};
pub use result::{ExecResult, KILLED_EXIT_CODE, NOT_FOUND_EXIT_CODE, PENDING_EXIT_CODE};
pub use session::{execute, ProcessSession, SessionState};
pub use sink::{sink_fn, FnSink, LineObserver, LineSink, SinkError, Stream, TracingObserver};
