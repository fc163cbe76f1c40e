//! Progress and log messages from a running pipeline.
//!
//! A pipeline may run on a worker thread while a front end owns the
//! terminal or window. Instead of calling back into front-end code, the
//! pipeline sends [`PipelineEvent`]s over an unbounded channel; the front end
//! drains the receiver on its own schedule (for example on a timer tick).
//!
//! Every event is also emitted through `tracing`, so headless runs keep the
//! same log.

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{error, info, warn};

/// Severity of a log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

/// A message from the pipeline to its front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// Step `current` of `total` has been handled.
    Progress {
        current: usize,
        total: usize,
        message: String,
    },
    /// A human-readable log line.
    Log { level: EventLevel, message: String },
}

/// Creates a connected event channel.
#[must_use]
pub fn channel() -> (UnboundedSender<PipelineEvent>, UnboundedReceiver<PipelineEvent>) {
    mpsc::unbounded_channel()
}

/// Sending half used inside the pipeline.
///
/// Sending never blocks; a dropped receiver is ignored so a closed front end
/// cannot stall ingestion.
#[derive(Debug, Clone, Default)]
pub struct Reporter {
    tx: Option<UnboundedSender<PipelineEvent>>,
}

impl Reporter {
    /// Reporter that forwards to `tx`.
    #[must_use]
    pub fn new(tx: UnboundedSender<PipelineEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Reporter that only logs through `tracing`.
    #[must_use]
    pub fn silent() -> Self {
        Self { tx: None }
    }

    /// Reports progress.
    pub fn progress(&self, current: usize, total: usize, message: impl Into<String>) {
        self.send(PipelineEvent::Progress {
            current,
            total,
            message: message.into(),
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{message}");
        self.log(EventLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        warn!("{message}");
        self.log(EventLevel::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        error!("{message}");
        self.log(EventLevel::Error, message);
    }

    fn log(&self, level: EventLevel, message: String) {
        self.send(PipelineEvent::Log { level, message });
    }

    fn send(&self, event: PipelineEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}
