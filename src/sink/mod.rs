//! Persistence backends for fetched replays.
//!
//! Two interchangeable sinks share the [`ReplaySink`] contract:
//!
//! - [`SqliteSink`]: fact table plus five lookup tables with foreign keys,
//!   duplicate `battle_id`s ignored, secondary indexes built in
//!   [`ReplaySink::finalize`]
//! - [`CsvSink`]: append-only file in [`COLUMNS`](crate::replay::COLUMNS)
//!   order with a single header row
//!
//! Each store is scoped to one date range, see [`store_path`].

mod csv;
mod sqlite;

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

pub use self::csv::CsvSink;
pub use self::sqlite::{INDEXES, REPLAY_TABLE, SqliteSink};
use crate::config::DownloadConfig;
use crate::db::DbError;
use crate::planner::DateRange;
use crate::replay::ReplayRecord;

/// File name prefix shared by both store kinds.
const STORE_PREFIX: &str = "replay_data";

/// Errors raised while persisting.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error(transparent)]
    Open(#[from] DbError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("CSV encoding error: {0}")]
    Csv(#[from] ::csv::Error),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `write_batch` or `finalize` called before `bootstrap`.
    #[error("store {path} has not been bootstrapped")]
    NotBootstrapped { path: PathBuf },
}

impl SinkError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Which backend a run persists to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    Sqlite,
    Csv,
}

impl SinkKind {
    #[must_use]
    pub fn from_config(config: &DownloadConfig) -> Self {
        if config.use_relational_sink {
            Self::Sqlite
        } else {
            Self::Csv
        }
    }

    /// File extension of the store.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Sqlite => "db",
            Self::Csv => "csv",
        }
    }
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite => f.write_str("sqlite"),
            Self::Csv => f.write_str("csv"),
        }
    }
}

/// Store location for a date range: `{data_dir}/replay_data_{start}_{end}.{db|csv}`.
#[must_use]
pub fn store_path(data_dir: &Path, range: &DateRange, kind: SinkKind) -> PathBuf {
    data_dir.join(format!("{STORE_PREFIX}_{range}.{}", kind.extension()))
}

/// Outcome of one [`ReplaySink::write_batch`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteReport {
    /// Rows that are now persisted and were not before.
    pub written: usize,
    /// Lookup rows added with placeholder names for unlisted codes.
    pub placeholders: usize,
}

impl WriteReport {
    /// Records that were not written because the store already had them.
    #[must_use]
    pub fn duplicates(&self, batch_len: usize) -> usize {
        batch_len.saturating_sub(self.written)
    }
}

/// A persistence backend bound to one store.
#[async_trait]
pub trait ReplaySink: Send {
    fn kind(&self) -> SinkKind;

    /// Path of the store this sink writes to.
    fn store_path(&self) -> &Path;

    /// Creates the store if absent. Safe to call more than once.
    async fn bootstrap(&mut self) -> Result<(), SinkError>;

    /// Appends a batch. A failed call leaves previously written data intact.
    async fn write_batch(&mut self, records: &[ReplayRecord]) -> Result<WriteReport, SinkError>;

    /// Post-load work after the last batch.
    async fn finalize(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Builds the sink selected by `use_relational_sink` for a date range.
#[must_use]
pub fn sink_for(config: &DownloadConfig, range: &DateRange) -> Box<dyn ReplaySink> {
    let kind = SinkKind::from_config(config);
    let path = store_path(&config.data_dir, range, kind);
    match kind {
        SinkKind::Sqlite => Box::new(SqliteSink::new(path)),
        SinkKind::Csv => Box::new(CsvSink::new(path)),
    }
}
