//! Progress UI (bar) for download runs.
//!
//! The pipeline runs on its own thread and sends [`PipelineEvent`]s; this
//! side drains them on a timer and never touches pipeline state directly.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use replay_core::events::{EventLevel, PipelineEvent};
use replay_core::pipeline::{RunSummary, WorkerHandle};
use tokio::sync::mpsc::UnboundedReceiver;

/// How often queued events are drained.
const DRAIN_INTERVAL: Duration = Duration::from_millis(120);

/// Renders pipeline events as a progress bar.
pub(crate) struct ProgressUi {
    bar: ProgressBar,
}

impl ProgressUi {
    /// A bar over `total` steps, hidden when `quiet`.
    pub(crate) fn new(total: usize, quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new(u64::try_from(total).unwrap_or(u64::MAX));
            bar.set_style(
                ProgressStyle::with_template("{bar:40} {pos}/{len} [{elapsed_precise}<{eta}] {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            bar
        };
        Self { bar }
    }

    /// Applies one event to the bar.
    fn apply(&self, event: PipelineEvent) {
        match event {
            PipelineEvent::Progress {
                current, message, ..
            } => {
                self.bar.set_position(u64::try_from(current).unwrap_or(u64::MAX));
                self.bar.set_message(message);
            }
            // Log lines already go through tracing; surface only problems here.
            PipelineEvent::Log {
                level: EventLevel::Warn | EventLevel::Error,
                message,
            } => self.bar.set_message(message),
            PipelineEvent::Log { .. } => {}
        }
    }

    /// Drains events until the worker finishes, then returns its result.
    pub(crate) async fn drive(
        self,
        mut rx: UnboundedReceiver<PipelineEvent>,
        worker: WorkerHandle,
    ) -> anyhow::Result<RunSummary> {
        let mut ticker = tokio::time::interval(DRAIN_INTERVAL);

        while !worker.is_finished() {
            ticker.tick().await;
            while let Ok(event) = rx.try_recv() {
                self.apply(event);
            }
        }
        while let Ok(event) = rx.try_recv() {
            self.apply(event);
        }
        self.bar.finish_and_clear();

        let summary = tokio::task::spawn_blocking(move || worker.join()).await??;
        Ok(summary)
    }
}
