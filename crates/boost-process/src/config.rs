//! Execution configuration

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;

use crate::error::{ConfigError, ConfigResult};
use crate::pump::Normalizer;

/// Default per-line byte bound (1 MiB)
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Default wall-clock deadline for one invocation
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Environment variable overriding the deadline, in seconds
pub const TIMEOUT_ENV: &str = "BOOST_EXEC_DEFAULT_TIMEOUT";

/// Environment variable overriding the per-line byte bound
pub const BUFFER_ENV: &str = "BOOST_EXEC_SUBPROCESS_BUFFER";

/// Options passed through to process creation
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    /// Working directory (None = current dir)
    pub working_dir: Option<PathBuf>,
    /// Environment variables (added to parent env)
    pub env: HashMap<String, String>,
    /// Environment variables removed from the inherited env
    pub env_remove: Vec<String>,
    /// Start from an empty environment
    pub env_clear: bool,
    /// Run the child in its own process group and signal the whole group on
    /// termination (Unix only)
    pub process_group: bool,
}

impl ProcessOptions {
    /// Apply to a command about to be spawned
    pub(crate) fn apply(&self, cmd: &mut Command) {
        if self.env_clear {
            cmd.env_clear();
        }
        for key in &self.env_remove {
            cmd.env_remove(key);
        }
        cmd.envs(&self.env);

        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }

        #[cfg(unix)]
        if self.process_group {
            cmd.process_group(0);
        }
    }
}

/// Configuration for one or more invocations
///
/// Built once by the caller and handed to every session that should share
/// it; nothing here is process-wide state.
#[derive(Debug, Clone)]
pub struct ExecConfig {
    /// Longest accepted output line, in bytes, excluding the delimiter
    pub max_line_bytes: usize,
    /// Fail with `NonZeroExit` when the process exits non-zero
    pub check: bool,
    /// Wall-clock deadline (None = wait forever)
    pub timeout: Option<Duration>,
    /// Echo lines to the observer; `None` follows the tracing filter for the
    /// echo targets
    pub verbose: Option<bool>,
    /// Record lines on the returned result
    pub capture: bool,
    /// Transform applied to each line before dispatch
    pub normalize: Normalizer,
    /// Pass-through process creation options
    pub process: ProcessOptions,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            check: true,
            timeout: Some(DEFAULT_TIMEOUT),
            verbose: None,
            capture: true,
            normalize: Normalizer::default(),
            process: ProcessOptions::default(),
        }
    }
}

impl ExecConfig {
    /// Default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration derived from serialized settings
    pub fn from_settings(settings: &ExecSettings) -> Self {
        Self {
            max_line_bytes: settings.max_line_bytes,
            check: settings.check,
            timeout: settings.timeout(),
            verbose: settings.verbose,
            ..Self::default()
        }
    }

    /// Set the per-line byte bound
    pub fn max_line_bytes(mut self, bytes: usize) -> Self {
        self.max_line_bytes = bytes;
        self
    }

    /// Enable/disable strict exit code checking
    pub fn check(mut self, check: bool) -> Self {
        self.check = check;
        self
    }

    /// Set timeout duration
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Set timeout in seconds
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = Some(Duration::from_secs(secs));
        self
    }

    /// Remove the deadline
    pub fn no_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Force diagnostic echoing on or off
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = Some(verbose);
        self
    }

    /// Enable/disable recording lines on the result
    pub fn capture(mut self, capture: bool) -> Self {
        self.capture = capture;
        self
    }

    /// Set the line normalizer
    pub fn normalize(mut self, normalize: Normalizer) -> Self {
        self.normalize = normalize;
        self
    }

    /// Set working directory
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.process.working_dir = Some(dir.into());
        self
    }

    /// Add environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.process.env.insert(key.into(), value.into());
        self
    }

    /// Remove an inherited environment variable
    pub fn env_remove(mut self, key: impl Into<String>) -> Self {
        self.process.env_remove.push(key.into());
        self
    }

    /// Start the child with an empty environment
    pub fn env_clear(mut self) -> Self {
        self.process.env_clear = true;
        self
    }

    /// Run the child in its own process group
    pub fn process_group(mut self, enabled: bool) -> Self {
        self.process.process_group = enabled;
        self
    }
}

/// Serializable subset of [`ExecConfig`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecSettings {
    /// Per-line byte bound
    pub max_line_bytes: usize,
    /// Strict exit code checking
    pub check: bool,
    /// Deadline in seconds; `0` means no deadline
    pub timeout_secs: Option<f64>,
    /// Diagnostic echoing override
    pub verbose: Option<bool>,
}

impl Default for ExecSettings {
    fn default() -> Self {
        Self {
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            check: true,
            timeout_secs: Some(DEFAULT_TIMEOUT.as_secs_f64()),
            verbose: None,
        }
    }
}

impl ExecSettings {
    /// Parse settings from a TOML document
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let mut settings: Self =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        settings.validate()?;
        settings.timeout_secs = settings.timeout_secs.filter(|secs| *secs > 0.0);
        Ok(settings)
    }

    /// Defaults with environment variable overrides applied
    pub fn load_from_env() -> ConfigResult<Self> {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides looked up through `lookup`
    pub fn with_env_overrides<F>(mut self, lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(TIMEOUT_ENV) {
            let secs: f64 = value.trim().parse().map_err(|_| {
                ConfigError::Env(format!("{TIMEOUT_ENV} must be a number of seconds, got '{value}'"))
            })?;
            self.timeout_secs = (secs > 0.0).then_some(secs);
        }

        if let Some(value) = lookup(BUFFER_ENV) {
            self.max_line_bytes = value.trim().parse().map_err(|_| {
                ConfigError::Env(format!("{BUFFER_ENV} must be a byte count, got '{value}'"))
            })?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Merge two settings (self takes precedence over other)
    pub fn merge(mut self, other: Self) -> Self {
        let defaults = Self::default();

        if self.max_line_bytes == defaults.max_line_bytes {
            self.max_line_bytes = other.max_line_bytes;
        }
        if self.check == defaults.check {
            self.check = other.check;
        }
        if self.timeout_secs == defaults.timeout_secs {
            self.timeout_secs = other.timeout_secs;
        }
        if self.verbose.is_none() {
            self.verbose = other.verbose;
        }

        self
    }

    /// Deadline as a duration; values too large to represent saturate
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs
            .filter(|secs| *secs > 0.0)
            .map(|secs| Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.max_line_bytes == 0 {
            return Err(ConfigError::Validation(
                "max_line_bytes must be greater than zero".to_string(),
            ));
        }
        if let Some(secs) = self.timeout_secs {
            if Duration::try_from_secs_f64(secs).is_err() {
                return Err(ConfigError::Validation(format!(
                    "timeout_secs must be a non-negative number of seconds, got {secs}"
                )));
            }
        }
        Ok(())
    }
}
