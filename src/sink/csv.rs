//! Append-only CSV store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};

use super::{ReplaySink, SinkError, SinkKind, WriteReport};
use crate::replay::{COLUMNS, ReplayRecord};

/// Flat-file [`ReplaySink`].
///
/// The header decision is made once, on the first non-empty flush: it is
/// written only if the file is missing or empty at that moment. Later
/// flushes of the same sink append rows without looking at the file again.
///
/// A failed append is truncated back to the previous file length, so a
/// retried batch never lands after a torn row.
#[derive(Debug)]
pub struct CsvSink {
    path: PathBuf,
    header_decided: bool,
    /// Cuts the next append short after this many bytes.
    #[cfg(test)]
    fail_next_append_after: Option<usize>,
}

impl CsvSink {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            header_decided: false,
            #[cfg(test)]
            fail_next_append_after: None,
        }
    }

    #[cfg(test)]
    fn take_short_write(&mut self) -> Option<usize> {
        self.fail_next_append_after.take()
    }

    #[cfg(not(test))]
    #[allow(clippy::unused_self)]
    fn take_short_write(&mut self) -> Option<usize> {
        None
    }

    async fn append(&mut self, file: &mut File, bytes: &[u8]) -> std::io::Result<()> {
        if let Some(limit) = self.take_short_write() {
            file.write_all(&bytes[..limit.min(bytes.len())]).await?;
            file.flush().await?;
            return Err(std::io::Error::other("short write"));
        }
        file.write_all(bytes).await?;
        file.flush().await
    }

    async fn needs_header(&self) -> Result<bool, SinkError> {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) => Ok(meta.len() == 0),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(SinkError::io(&self.path, e)),
        }
    }

    fn encode(records: &[ReplayRecord], header: bool) -> Result<Vec<u8>, SinkError> {
        let mut writer = ::csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        if header {
            writer.write_record(COLUMNS)?;
        }
        for record in records {
            writer.serialize(record)?;
        }
        writer
            .into_inner()
            .map_err(|e| SinkError::io(Path::new("<buffer>"), e.into_error()))
    }
}

#[async_trait]
impl ReplaySink for CsvSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Csv
    }

    fn store_path(&self) -> &Path {
        &self.path
    }

    /// Creates the parent directory; the file itself appears on first write.
    async fn bootstrap(&mut self) -> Result<(), SinkError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SinkError::io(parent, e))?;
        }
        Ok(())
    }

    #[instrument(skip(self, records), fields(store = %self.path.display(), batch_size = records.len()))]
    async fn write_batch(&mut self, records: &[ReplayRecord]) -> Result<WriteReport, SinkError> {
        if records.is_empty() {
            return Ok(WriteReport::default());
        }

        let header = !self.header_decided && self.needs_header().await?;
        let bytes = Self::encode(records, header)?;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| SinkError::io(&self.path, e))?;
        let previous_len = file
            .metadata()
            .await
            .map_err(|e| SinkError::io(&self.path, e))?
            .len();

        if let Err(e) = self.append(&mut file, &bytes).await {
            if let Err(truncate) = file.set_len(previous_len).await {
                warn!(previous_len, error = %truncate, "failed to roll back partial append");
            }
            return Err(SinkError::io(&self.path, e));
        }

        self.header_decided = true;
        debug!(header, rows = records.len(), "appended rows");
        Ok(WriteReport {
            written: records.len(),
            placeholders: 0,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::replay::tests::sample;

    fn lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn test_header_written_once_across_flushes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replays.csv");
        let mut sink = CsvSink::new(&path);
        sink.bootstrap().await.unwrap();

        sink.write_batch(&[sample("a"), sample("b")]).await.unwrap();
        sink.write_batch(&[sample("c")]).await.unwrap();

        let lines = lines(&path);
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], COLUMNS.join(","));
        assert_eq!(lines.iter().filter(|l| l.starts_with("battle_at")).count(), 1);
    }

    #[tokio::test]
    async fn test_second_run_on_existing_file_skips_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replays.csv");

        let mut first = CsvSink::new(&path);
        first.write_batch(&[sample("a")]).await.unwrap();

        let mut second = CsvSink::new(&path);
        second.write_batch(&[sample("b")]).await.unwrap();

        let lines = lines(&path);
        assert_eq!(lines.len(), 3);
        assert!(lines[2].contains(",b,"));
    }

    #[tokio::test]
    async fn test_empty_batch_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replays.csv");
        let mut sink = CsvSink::new(&path);

        let report = sink.write_batch(&[]).await.unwrap();
        assert_eq!(report, WriteReport::default());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_rows_follow_column_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replays.csv");
        let mut sink = CsvSink::new(&path);
        sink.write_batch(&[sample("a")]).await.unwrap();

        let mut reader = ::csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.iter().collect::<Vec<_>>(), COLUMNS.to_vec());

        let decoded: Vec<ReplayRecord> = reader.deserialize().map(Result::unwrap).collect();
        assert_eq!(decoded, vec![sample("a")]);
    }

    #[tokio::test]
    async fn test_failed_append_is_rolled_back_before_retry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replays.csv");
        let mut sink = CsvSink::new(&path);
        sink.write_batch(&[sample("a")]).await.unwrap();
        let after_first = std::fs::read(&path).unwrap();

        sink.fail_next_append_after = Some(40);
        let batch = [sample("b"), sample("c")];
        assert!(matches!(
            sink.write_batch(&batch).await,
            Err(SinkError::Io { .. })
        ));
        assert_eq!(std::fs::read(&path).unwrap(), after_first);

        sink.write_batch(&batch).await.unwrap();

        let mut reader = ::csv::Reader::from_path(&path).unwrap();
        let ids: Vec<String> = reader
            .deserialize::<ReplayRecord>()
            .map(|r| r.unwrap().battle_id)
            .collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_failed_first_append_still_writes_header_on_retry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replays.csv");
        let mut sink = CsvSink::new(&path);

        sink.fail_next_append_after = Some(5);
        assert!(sink.write_batch(&[sample("a")]).await.is_err());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);

        sink.write_batch(&[sample("a")]).await.unwrap();

        let lines = lines(&path);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], COLUMNS.join(","));
    }

    #[tokio::test]
    async fn test_bootstrap_creates_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("replays.csv");
        let mut sink = CsvSink::new(&path);
        sink.bootstrap().await.unwrap();
        assert!(path.parent().unwrap().is_dir());
    }
}
