//! Hosting a run on a background thread.
//!
//! The run gets its own current-thread runtime so the caller's event loop
//! (a terminal UI, or a GUI toolkit's) stays responsive. The caller talks to
//! it only through the event channel and the [`StopHandle`].

use std::thread::{self, JoinHandle};

use tracing::debug;

use super::{Pipeline, PipelineError, RunSummary, StopHandle};
use crate::planner::DateRange;

/// A pipeline running on its own thread.
#[derive(Debug)]
pub struct WorkerHandle {
    join: JoinHandle<Result<RunSummary, PipelineError>>,
    stop: StopHandle,
}

impl WorkerHandle {
    /// Asks the run to stop at the next step boundary.
    pub fn request_stop(&self) {
        self.stop.request_stop();
    }

    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Blocks until the run ends.
    ///
    /// # Errors
    ///
    /// Returns the run's error, or [`PipelineError::Worker`] if the thread
    /// panicked.
    pub fn join(self) -> Result<RunSummary, PipelineError> {
        self.join.join().map_err(|panic| {
            let message = panic
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "worker thread panicked".to_string());
            PipelineError::Worker { message }
        })?
    }
}

/// Starts `pipeline` for `range` on a new thread.
///
/// # Errors
///
/// Returns [`PipelineError::Worker`] if the thread cannot be spawned.
pub fn spawn_worker(pipeline: Pipeline, range: DateRange) -> Result<WorkerHandle, PipelineError> {
    let stop = pipeline.stop_handle();

    let join = thread::Builder::new()
        .name("replay-pipeline".to_string())
        .spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| PipelineError::Worker {
                    message: format!("failed to build runtime: {e}"),
                })?;
            debug!(%range, "worker started");
            runtime.block_on(pipeline.start_range(&range))
        })
        .map_err(|e| PipelineError::Worker {
            message: format!("failed to spawn worker thread: {e}"),
        })?;

    Ok(WorkerHandle { join, stop })
}
