//! In-memory record buffer between fetch and persistence.

use crate::replay::ReplayRecord;

/// Ordered buffer of fetched records awaiting a flush.
///
/// Owned by exactly one task; the controller appends after each fetch and
/// drains when [`IngestBuffer::should_flush`] says so, or at run end.
#[derive(Debug, Default)]
pub struct IngestBuffer {
    records: Vec<ReplayRecord>,
}

impl IngestBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a fetched batch, keeping fetch order.
    pub fn append(&mut self, records: Vec<ReplayRecord>) {
        if self.records.is_empty() {
            self.records = records;
        } else {
            self.records.extend(records);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether the buffer holds strictly more than `threshold` records.
    #[must_use]
    pub fn should_flush(&self, threshold: usize) -> bool {
        self.records.len() > threshold
    }

    /// Takes every buffered record, leaving the buffer empty.
    pub fn drain(&mut self) -> Vec<ReplayRecord> {
        std::mem::take(&mut self.records)
    }
}
