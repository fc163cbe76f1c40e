//! Shared fakes for pipeline integration tests.
//!
//! `ScriptedSource` stands in for the HTTP endpoint and `RecordingSink` wraps
//! a real sink to observe flushes or inject write failures.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use replay_core::fetch::{FetchError, ReplaySource};
use replay_core::pipeline::StopHandle;
use replay_core::replay::ReplayRecord;
use replay_core::sink::{ReplaySink, SinkError, SinkKind, WriteReport};

/// A valid record whose codes exist in every lookup table.
pub fn record(battle_id: &str) -> ReplayRecord {
    ReplayRecord {
        battle_at: 1_756_684_800,
        battle_id: battle_id.to_string(),
        battle_type: 2,
        game_version: 20_301,
        p1_area_id: Some(1),
        p1_chara_id: 8,
        p1_lang: Some("en".to_string()),
        p1_name: "Alpha".to_string(),
        p1_polaris_id: "3a4b5c".to_string(),
        p1_power: 150_000,
        p1_rank: 21,
        p1_rating_before: Some(1_500),
        p1_rating_change: Some(12),
        p1_region_id: Some(4),
        p1_rounds: 3,
        p1_user_id: 1001,
        p2_area_id: None,
        p2_chara_id: 14,
        p2_lang: None,
        p2_name: "Beta".to_string(),
        p2_polaris_id: "6d7e8f".to_string(),
        p2_power: 140_000,
        p2_rank: 20,
        p2_rating_before: None,
        p2_rating_change: None,
        p2_region_id: None,
        p2_rounds: 1,
        p2_user_id: 1002,
        stage_id: 100,
        winner: 1,
    }
}

/// `n` records with ids unique to `before`.
pub fn records_for(before: i64, n: usize) -> Vec<ReplayRecord> {
    (0..n).map(|i| record(&format!("{before}-{i}"))).collect()
}

type Script = dyn Fn(i64) -> Result<Vec<ReplayRecord>, FetchError> + Send + Sync;

/// In-memory [`ReplaySource`] driven by a closure over the cursor.
pub struct ScriptedSource {
    script: Box<Script>,
    calls: AtomicUsize,
    cursors: Mutex<Vec<i64>>,
    stop_after: Option<(usize, StopHandle)>,
}

impl ScriptedSource {
    pub fn new(
        script: impl Fn(i64) -> Result<Vec<ReplayRecord>, FetchError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
            cursors: Mutex::new(Vec::new()),
            stop_after: None,
        }
    }

    /// Returns `n` fresh records for every cursor.
    pub fn uniform(n: usize) -> Self {
        Self::new(move |before| Ok(records_for(before, n)))
    }

    /// Requests a stop once `calls` requests have been served.
    pub fn stop_after(mut self, calls: usize, stop: StopHandle) -> Self {
        self.stop_after = Some((calls, stop));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Distinct cursors requested, in first-request order.
    pub fn cursors(&self) -> Vec<i64> {
        let mut seen = self.cursors.lock().unwrap().clone();
        seen.dedup();
        seen
    }
}

#[async_trait]
impl ReplaySource for ScriptedSource {
    async fn fetch(&self, before: i64) -> Result<Vec<ReplayRecord>, FetchError> {
        let served = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.cursors.lock().unwrap().push(before);
        let result = (self.script)(before);
        if let Some((limit, stop)) = &self.stop_after {
            if served >= *limit {
                stop.request_stop();
            }
        }
        result
    }
}

/// Wraps a sink, recording batch sizes and failing the first `failures`
/// writes.
pub struct RecordingSink {
    inner: Box<dyn ReplaySink>,
    failures: usize,
    fail_bootstrap: bool,
    write_delay: Duration,
    watched: Option<Arc<ScriptedSource>>,
    fetched_at_write: Arc<Mutex<Vec<usize>>>,
    pub batches: Arc<Mutex<Vec<usize>>>,
}

impl RecordingSink {
    pub fn new(inner: impl ReplaySink + 'static) -> Self {
        Self {
            inner: Box::new(inner),
            failures: 0,
            fail_bootstrap: false,
            write_delay: Duration::ZERO,
            watched: None,
            fetched_at_write: Arc::new(Mutex::new(Vec::new())),
            batches: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing_writes(mut self, failures: usize) -> Self {
        self.failures = failures;
        self
    }

    pub fn failing_bootstrap(mut self) -> Self {
        self.fail_bootstrap = true;
        self
    }

    /// Sleeps `delay` in every write and notes how many requests `source`
    /// had served when the write finished.
    pub fn slow_writes(mut self, delay: Duration, source: Arc<ScriptedSource>) -> Self {
        self.write_delay = delay;
        self.watched = Some(source);
        self
    }

    /// Requests served by the watched source at the end of each write.
    pub fn fetched_at_write(&self) -> Arc<Mutex<Vec<usize>>> {
        Arc::clone(&self.fetched_at_write)
    }

    /// Sizes of batches the inner sink accepted, shared with the test.
    pub fn batches(&self) -> Arc<Mutex<Vec<usize>>> {
        Arc::clone(&self.batches)
    }
}

fn injected(path: &Path) -> SinkError {
    SinkError::Io {
        path: path.to_path_buf(),
        source: std::io::Error::other("injected failure"),
    }
}

#[async_trait]
impl ReplaySink for RecordingSink {
    fn kind(&self) -> SinkKind {
        self.inner.kind()
    }

    fn store_path(&self) -> &Path {
        self.inner.store_path()
    }

    async fn bootstrap(&mut self) -> Result<(), SinkError> {
        if self.fail_bootstrap {
            return Err(injected(self.inner.store_path()));
        }
        self.inner.bootstrap().await
    }

    async fn write_batch(&mut self, records: &[ReplayRecord]) -> Result<WriteReport, SinkError> {
        if self.failures > 0 {
            self.failures -= 1;
            return Err(injected(self.inner.store_path()));
        }
        if !self.write_delay.is_zero() {
            tokio::time::sleep(self.write_delay).await;
        }
        if let Some(source) = &self.watched {
            self.fetched_at_write.lock().unwrap().push(source.calls());
        }
        let report = self.inner.write_batch(records).await?;
        self.batches.lock().unwrap().push(records.len());
        Ok(report)
    }

    async fn finalize(&mut self) -> Result<(), SinkError> {
        self.inner.finalize().await
    }
}

/// Rows in the SQLite fact table at `path`.
pub async fn count_rows(path: &Path) -> (i64, i64) {
    let db = replay_core::Database::open(path).await.unwrap();
    let row: (i64, i64) = sqlx::query_as("SELECT COUNT(*), COUNT(DISTINCT battle_id) FROM ReplayData")
        .fetch_one(db.pool())
        .await
        .unwrap();
    db.close().await;
    row
}
