//! Batch persistence with bounded re-queue on failure.
//!
//! Both execution strategies hand drained batches to a [`BatchWriter`]. A
//! batch whose write fails goes to the back of the pending queue, behind any
//! newer batch, and is tried again on the next flush. After
//! `flush_attempts` failed writes it is dropped and logged, and its records
//! count as lost. Duplicate writes are harmless: the relational store
//! ignores `battle_id`s it already has.

use std::collections::VecDeque;

use tracing::debug;

use crate::events::Reporter;
use crate::replay::ReplayRecord;
use crate::sink::ReplaySink;

/// Running totals of what reached the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    /// Batches handed to the writer.
    pub batches: usize,
    /// Rows newly persisted.
    pub persisted: usize,
    /// Lookup codes stored under placeholder names.
    pub placeholders: usize,
    /// Records the store already had.
    pub duplicates: usize,
    /// Batches given up on.
    pub dropped_batches: usize,
    /// Records in dropped batches.
    pub lost_records: usize,
}

#[derive(Debug)]
struct PendingBatch {
    records: Vec<ReplayRecord>,
    attempts: u32,
}

/// Writes batches to a sink, re-queueing failures.
#[derive(Debug)]
pub(crate) struct BatchWriter<'a> {
    reporter: &'a Reporter,
    max_attempts: u32,
    pending: VecDeque<PendingBatch>,
    stats: WriteStats,
}

impl<'a> BatchWriter<'a> {
    pub(crate) fn new(reporter: &'a Reporter, max_attempts: u32) -> Self {
        Self {
            reporter,
            max_attempts: max_attempts.max(1),
            pending: VecDeque::new(),
            stats: WriteStats::default(),
        }
    }

    pub(crate) fn stats(&self) -> WriteStats {
        self.stats
    }

    /// Queues `records` and gives every pending batch one write attempt.
    pub(crate) async fn submit(&mut self, sink: &mut dyn ReplaySink, records: Vec<ReplayRecord>) {
        if records.is_empty() {
            return;
        }
        self.stats.batches += 1;
        self.pending.push_back(PendingBatch {
            records,
            attempts: 0,
        });
        self.write_pending(sink).await;
    }

    /// Retries pending batches until each is written or dropped.
    pub(crate) async fn drain(&mut self, sink: &mut dyn ReplaySink) {
        while !self.pending.is_empty() {
            self.write_pending(sink).await;
        }
    }

    async fn write_pending(&mut self, sink: &mut dyn ReplaySink) {
        let store = sink.store_path().display().to_string();

        for _ in 0..self.pending.len() {
            let Some(mut batch) = self.pending.pop_front() else {
                break;
            };
            batch.attempts += 1;
            let size = batch.records.len();

            match sink.write_batch(&batch.records).await {
                Ok(report) => {
                    self.stats.persisted += report.written;
                    self.stats.placeholders += report.placeholders;
                    self.stats.duplicates += report.duplicates(size);
                    debug!(batch_size = size, written = report.written, "batch persisted");
                    self.reporter.info(format!(
                        "Saved {} of {size} replays to {store}",
                        report.written
                    ));
                    if report.placeholders > 0 {
                        self.reporter.warn(format!(
                            "{} unlisted lookup codes were stored as Unknown_<id>",
                            report.placeholders
                        ));
                    }
                }
                Err(e) if batch.attempts >= self.max_attempts => {
                    self.stats.dropped_batches += 1;
                    self.stats.lost_records += size;
                    self.reporter.error(format!(
                        "Dropping batch of {size} replays for {store} after {} failed writes: {e}",
                        batch.attempts
                    ));
                }
                Err(e) => {
                    self.reporter.warn(format!(
                        "Failed to write batch of {size} replays to {store} (attempt {}/{}): {e}; re-queued",
                        batch.attempts, self.max_attempts
                    ));
                    self.pending.push_back(batch);
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::{Path, PathBuf};

    use async_trait::async_trait;

    use super::*;
    use crate::replay::tests::sample;
    use crate::sink::{SinkError, SinkKind, WriteReport};

    /// Fails the first `failures` writes, then records batch ids.
    struct Flaky {
        path: PathBuf,
        failures: usize,
        written: Vec<Vec<String>>,
    }

    impl Flaky {
        fn new(failures: usize) -> Self {
            Self {
                path: PathBuf::from("flaky.db"),
                failures,
                written: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl ReplaySink for Flaky {
        fn kind(&self) -> SinkKind {
            SinkKind::Sqlite
        }

        fn store_path(&self) -> &Path {
            &self.path
        }

        async fn bootstrap(&mut self) -> Result<(), SinkError> {
            Ok(())
        }

        async fn write_batch(&mut self, records: &[ReplayRecord]) -> Result<WriteReport, SinkError> {
            if self.failures > 0 {
                self.failures -= 1;
                return Err(SinkError::NotBootstrapped {
                    path: self.path.clone(),
                });
            }
            self.written
                .push(records.iter().map(|r| r.battle_id.clone()).collect());
            Ok(WriteReport {
                written: records.len(),
                placeholders: 0,
            })
        }
    }

    fn batch(prefix: &str, n: usize) -> Vec<ReplayRecord> {
        (0..n).map(|i| sample(&format!("{prefix}{i}"))).collect()
    }

    #[tokio::test]
    async fn test_successful_batch_counts_persisted() {
        let reporter = Reporter::silent();
        let mut sink = Flaky::new(0);
        let mut writer = BatchWriter::new(&reporter, 3);

        writer.submit(&mut sink, batch("a", 4)).await;

        assert_eq!(writer.stats().persisted, 4);
        assert_eq!(writer.stats().batches, 1);
        assert_eq!(sink.written.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_batch_is_not_written() {
        let reporter = Reporter::silent();
        let mut sink = Flaky::new(0);
        let mut writer = BatchWriter::new(&reporter, 3);

        writer.submit(&mut sink, Vec::new()).await;

        assert_eq!(writer.stats(), WriteStats::default());
        assert!(sink.written.is_empty());
    }

    #[tokio::test]
    async fn test_failed_batch_is_requeued_behind_newer_batch() {
        let reporter = Reporter::silent();
        let mut sink = Flaky::new(1);
        let mut writer = BatchWriter::new(&reporter, 3);

        writer.submit(&mut sink, batch("a", 1)).await;
        assert!(sink.written.is_empty());

        writer.submit(&mut sink, batch("b", 1)).await;
        assert_eq!(sink.written, vec![vec!["a0".to_string()], vec!["b0".to_string()]]);
        assert_eq!(writer.stats().persisted, 2);
        assert_eq!(writer.stats().lost_records, 0);
    }

    #[tokio::test]
    async fn test_batch_dropped_after_max_attempts() {
        let reporter = Reporter::silent();
        let mut sink = Flaky::new(10);
        let mut writer = BatchWriter::new(&reporter, 2);

        writer.submit(&mut sink, batch("a", 5)).await;
        writer.drain(&mut sink).await;

        let stats = writer.stats();
        assert_eq!(stats.persisted, 0);
        assert_eq!(stats.dropped_batches, 1);
        assert_eq!(stats.lost_records, 5);
        // one attempt on submit, one more while draining
        assert_eq!(sink.failures, 8);
    }

    #[tokio::test]
    async fn test_drain_retries_until_written() {
        let reporter = Reporter::silent();
        let mut sink = Flaky::new(2);
        let mut writer = BatchWriter::new(&reporter, 3);

        writer.submit(&mut sink, batch("a", 2)).await;
        writer.drain(&mut sink).await;

        assert_eq!(writer.stats().persisted, 2);
        assert_eq!(writer.stats().dropped_batches, 0);
    }
}
