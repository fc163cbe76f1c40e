//! Replay Downloader Core Library
//!
//! Downloads match replays for a date range from a cursor-paginated HTTP
//! endpoint and persists them to SQLite or CSV, tolerating transient
//! failures over runs that may span months of data.
//!
//! # Architecture
//!
//! Leaves first:
//! - [`planner`] - Date range to deterministic cursor sequence
//! - [`fetch`] - Paced HTTP fetch with bounded retry
//! - [`buffer`] - In-memory batch between fetch and flush
//! - [`sink`] - SQLite and CSV persistence
//! - [`pipeline`] - Controller with blocking and cooperative strategies
//!
//! Supporting modules:
//! - [`config`] - Run configuration and TOML loading
//! - [`replay`] - Record type and column order
//! - [`lookup`] - Static code tables
//! - [`events`] - Progress/log channel to front ends
//! - [`db`] - SQLite connection management

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod buffer;
pub mod config;
pub mod db;
pub mod events;
pub mod fetch;
pub mod lookup;
pub mod pipeline;
pub mod planner;
pub mod replay;
pub mod sink;

// Re-export commonly used types
pub use buffer::IngestBuffer;
pub use config::{Backoff, ConfigError, DownloadConfig, ExecutionStrategy};
pub use db::{Database, DbError};
pub use events::{EventLevel, PipelineEvent, Reporter};
pub use fetch::{
    AbandonedWindow, FetchError, FetchOutcome, Fetcher, Pacer, ReplayClient, ReplaySource,
    RetryPolicy,
};
pub use pipeline::{
    Pipeline, PipelineError, PipelineState, RunSummary, StopHandle, WorkerHandle,
    download_replay_data, spawn_worker,
};
pub use planner::{Cursor, DateRange, WindowPlan};
pub use replay::{ReplayRecord, Winner};
pub use sink::{CsvSink, ReplaySink, SinkError, SinkKind, SqliteSink, WriteReport, store_path};
