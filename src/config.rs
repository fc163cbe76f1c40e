//! Pipeline configuration.
//!
//! [`DownloadConfig`] is an explicit value handed to the
//! [`Pipeline`](crate::pipeline::Pipeline) at construction. It can be built
//! in code, loaded from a TOML file with [`DownloadConfig::from_file`], and
//! checked with [`DownloadConfig::validate`] before a run starts.
//!
//! # Example
//!
//! ```
//! use replay_core::config::DownloadConfig;
//!
//! let config: DownloadConfig = toml::from_str(
//!     r#"
//!     max_retries = 5
//!     request_delay_ms = 2000
//!     use_relational_sink = false
//!     "#,
//! )
//! .unwrap();
//! assert_eq!(config.max_retries, 5);
//! assert!(config.validate().is_ok());
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Default replay endpoint.
pub const DEFAULT_BASE_URL: &str = "https://wank.wavu.wiki/api/replays";

/// Default retry count after the first failed attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default minimum interval between API calls, in milliseconds.
pub const DEFAULT_REQUEST_DELAY_MS: u64 = 1005;

/// Time span one API call covers, in seconds.
pub const DEFAULT_WINDOW_SECONDS: u32 = 700;

/// Buffered record count above which the buffer is flushed.
pub const DEFAULT_MAX_REPLAY_THRESHOLD: usize = 1_000_000;

/// Default directory for stores.
pub const DEFAULT_DATA_DIR: &str = "downloaded_replays";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default capacity of the cooperative batch queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 4;

/// Default total attempts for persisting one batch.
pub const DEFAULT_FLUSH_ATTEMPTS: u32 = 3;

/// Configuration and date-range errors, reported before any network activity.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The range end precedes its start.
    #[error("end date {end} is before start date {start}")]
    EndBeforeStart {
        /// Requested start date.
        start: String,
        /// Requested end date.
        end: String,
    },

    /// The range starts after the current time, so there is nothing to fetch.
    #[error("start date {start} is in the future")]
    StartInFuture {
        /// Requested start date.
        start: String,
    },

    /// A date string could not be parsed.
    #[error("invalid date '{value}': expected YYYY-MM-DD")]
    InvalidDate {
        /// The rejected input.
        value: String,
    },

    /// A resume step points past the end of the plan.
    #[error("resume step {step} is outside the plan (1..={total_steps})")]
    ResumeOutOfRange {
        /// Requested resume step.
        step: usize,
        /// Steps in the plan.
        total_steps: usize,
    },

    /// A numeric option is outside its accepted range.
    #[error("invalid value for `{field}`: {value}. Expected range: {expected}")]
    OutOfRange {
        /// Option name.
        field: &'static str,
        /// The rejected value.
        value: String,
        /// Human-readable accepted range.
        expected: &'static str,
    },

    /// The base URL is not an http(s) URL.
    #[error("invalid base_url '{url}': {reason}")]
    InvalidBaseUrl {
        /// The rejected URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The config file could not be read.
    #[error("failed to read config file '{path}': {message}")]
    Read {
        /// Config file path.
        path: PathBuf,
        /// Underlying IO error text.
        message: String,
    },

    /// The config file is not valid TOML for [`DownloadConfig`].
    #[error("failed to parse config file '{path}': {message}")]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// Underlying TOML error text.
        message: String,
    },
}

/// Delay growth between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    /// The same delay before every retry.
    #[default]
    Constant,
    /// `delay * attempt_number`.
    Linear,
}

/// How the controller schedules fetching and persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStrategy {
    /// One sequential loop: fetch, buffer, flush inline.
    #[default]
    Blocking,
    /// Producer and consumer tasks joined by a bounded queue.
    Cooperative,
}

impl ExecutionStrategy {
    /// Returns the stable label used in logs and config files.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blocking => "blocking",
            Self::Cooperative => "cooperative",
        }
    }
}

/// Configuration for one download run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DownloadConfig {
    /// Replay endpoint; queried as `{base_url}?before={cursor}`.
    pub base_url: String,
    /// Retries after the first failed attempt of a window.
    pub max_retries: u32,
    /// Minimum interval between API calls, also the base retry delay.
    pub request_delay_ms: u64,
    /// Retry delay growth.
    pub retry_backoff: Backoff,
    /// Seconds covered by one cursor step.
    pub batch_window_seconds: u32,
    /// Buffered record count above which a flush is triggered.
    pub max_replay_threshold: usize,
    /// `true` for the SQLite sink, `false` for the CSV sink.
    pub use_relational_sink: bool,
    /// Directory holding the store files.
    pub data_dir: PathBuf,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Scheduling model.
    pub strategy: ExecutionStrategy,
    /// Batches the cooperative queue holds before the producer waits.
    pub queue_capacity: usize,
    /// Total attempts to persist one batch before it is dropped.
    pub flush_attempts: u32,
    /// 1-based step to resume a previous run from.
    pub resume_from_step: Option<usize>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            request_delay_ms: DEFAULT_REQUEST_DELAY_MS,
            retry_backoff: Backoff::default(),
            batch_window_seconds: DEFAULT_WINDOW_SECONDS,
            max_replay_threshold: DEFAULT_MAX_REPLAY_THRESHOLD,
            use_relational_sink: true,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            strategy: ExecutionStrategy::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            flush_attempts: DEFAULT_FLUSH_ATTEMPTS,
            resume_from_step: None,
        }
    }
}

impl DownloadConfig {
    /// Loads a config from a TOML file. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let config: Self = toml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Checks option ranges.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match url::Url::parse(&self.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => {
                return Err(ConfigError::InvalidBaseUrl {
                    url: self.base_url.clone(),
                    reason: format!("unsupported scheme '{}'", url.scheme()),
                });
            }
            Err(e) => {
                return Err(ConfigError::InvalidBaseUrl {
                    url: self.base_url.clone(),
                    reason: e.to_string(),
                });
            }
        }

        if self.batch_window_seconds == 0 {
            return Err(out_of_range("batch_window_seconds", 0, "1..=86400"));
        }
        if self.batch_window_seconds > 86_400 {
            return Err(out_of_range(
                "batch_window_seconds",
                self.batch_window_seconds,
                "1..=86400",
            ));
        }
        if !(1..=3600).contains(&self.timeout_secs) {
            return Err(out_of_range("timeout_secs", self.timeout_secs, "1..=3600"));
        }
        if self.request_delay_ms > 60_000 {
            return Err(out_of_range(
                "request_delay_ms",
                self.request_delay_ms,
                "0..=60000",
            ));
        }
        if self.queue_capacity == 0 {
            return Err(out_of_range("queue_capacity", 0, "1.."));
        }
        if self.flush_attempts == 0 {
            return Err(out_of_range("flush_attempts", 0, "1.."));
        }
        if self.resume_from_step == Some(0) {
            return Err(out_of_range("resume_from_step", 0, "1.."));
        }
        Ok(())
    }

    /// Minimum interval between API calls.
    #[must_use]
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    /// Per-request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn out_of_range(field: &'static str, value: impl ToString, expected: &'static str) -> ConfigError {
    ConfigError::OutOfRange {
        field,
        value: value.to_string(),
        expected,
    }
}
