//! The ingestion controller.
//!
//! A [`Pipeline`] walks a [`WindowPlan`], fetches each window through the
//! paced, retrying [`Fetcher`], buffers records and persists them through a
//! [`ReplaySink`]. Scheduling is pluggable via [`ExecutionStrategy`]:
//!
//! - **Blocking**: one loop that fetches, buffers and flushes in turn
//! - **Cooperative**: a producer and a consumer task on one event loop,
//!   joined by a bounded queue so a slow store applies backpressure
//!
//! Both strategies share the fetch step, the flush threshold and the
//! failed-batch policy of [`BatchWriter`](writer::BatchWriter).
//!
//! Stopping is cooperative: [`StopHandle::request_stop`] takes effect at the
//! next cursor boundary. Buffered records are flushed and the log names the
//! step to resume from.
//!
//! # Example
//!
//! ```no_run
//! use replay_core::config::DownloadConfig;
//! use replay_core::pipeline::Pipeline;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = Pipeline::from_config(DownloadConfig::default())?;
//! let summary = pipeline.start("2025-09-01", "2025-09-02").await?;
//! println!("{} replays saved", summary.total_records());
//! # Ok(())
//! # }
//! ```

mod blocking;
mod cooperative;
mod state;
mod worker;
mod writer;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use thiserror::Error;
use tracing::instrument;

pub use state::PipelineState;
pub use worker::{WorkerHandle, spawn_worker};
pub use writer::WriteStats;

use crate::buffer::IngestBuffer;
use crate::config::{ConfigError, DownloadConfig, ExecutionStrategy};
use crate::events::Reporter;
use crate::fetch::{
    AbandonedWindow, FetchError, FetchOutcome, Fetcher, Pacer, ReplayClient, ReplaySource,
    RetryPolicy, fetch_with_retry,
};
use crate::planner::{Cursor, DateRange, WindowPlan};
use crate::sink::{ReplaySink, SinkError, sink_for};
use state::StateMachine;
use writer::BatchWriter;

/// Errors that end a run before or outside the fetch loop.
///
/// Fetch and write failures inside the loop are logged and tallied in the
/// [`RunSummary`] instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Client(#[from] FetchError),

    #[error("failed to prepare store {store}: {source}")]
    Bootstrap {
        store: PathBuf,
        #[source]
        source: SinkError,
    },

    #[error("pipeline worker failed: {message}")]
    Worker { message: String },
}

/// Shared stop flag, checked once per cursor step.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks the run to stop at the next step boundary.
    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_stop_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// What a finished run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub store_path: PathBuf,
    pub total_steps: usize,
    /// First step this run fetched (1 unless resumed).
    pub first_step: usize,
    /// Steps fetched or abandoned by this run.
    pub steps_completed: usize,
    /// Records received from the API.
    pub fetched: usize,
    /// Write totals; `writes.persisted` is the confirmed record count.
    pub writes: WriteStats,
    /// Windows skipped after exhausting retries.
    pub abandoned: Vec<AbandonedWindow>,
    /// Step to resume from if the run was stopped early.
    pub resume_step: Option<usize>,
    pub clamped_to_now: bool,
}

impl RunSummary {
    /// Records confirmed persisted.
    #[must_use]
    pub fn total_records(&self) -> usize {
        self.writes.persisted
    }

    #[must_use]
    pub fn cancelled(&self) -> bool {
        self.resume_step.is_some()
    }
}

/// Everything a strategy needs for one run.
pub(crate) struct RunContext<'a> {
    pub(crate) fetcher: &'a Fetcher,
    pub(crate) retry: &'a RetryPolicy,
    pub(crate) reporter: &'a Reporter,
    pub(crate) stop: &'a StopHandle,
    pub(crate) plan: &'a WindowPlan,
    pub(crate) first_step: usize,
    pub(crate) threshold: usize,
    pub(crate) queue_capacity: usize,
}

/// Fetch-side totals of a run.
#[derive(Debug, Default)]
pub(crate) struct FetchTally {
    pub(crate) steps_completed: usize,
    pub(crate) fetched: usize,
    pub(crate) abandoned: Vec<AbandonedWindow>,
    /// First step not fetched because a stop was requested.
    pub(crate) stopped_at: Option<usize>,
}

impl FetchTally {
    /// Fetches one window into `buffer` and reports progress.
    pub(crate) async fn fetch_step(
        &mut self,
        ctx: &RunContext<'_>,
        cursor: Cursor,
        buffer: &mut IngestBuffer,
    ) {
        let total = ctx.plan.total_steps();
        let outcome =
            fetch_with_retry(ctx.fetcher, ctx.retry, cursor, total, ctx.reporter).await;

        let message = match outcome {
            FetchOutcome::Fetched { records, .. } => {
                let count = records.len();
                self.fetched += count;
                buffer.append(records);
                format!("Processed set {}/{total}: {count} replays", cursor.step)
            }
            FetchOutcome::Abandoned(window) => {
                self.abandoned.push(window);
                format!("Skipped set {}/{total}", cursor.step)
            }
        };
        self.steps_completed += 1;
        ctx.reporter.progress(cursor.step, total, message);
    }

    /// Records a stop before `cursor` and logs the resume point.
    pub(crate) fn stop_before(&mut self, ctx: &RunContext<'_>, cursor: Cursor) {
        self.stopped_at = Some(cursor.step);
        ctx.reporter.warn(format!(
            "Stop requested. Set {}/{} (before={}) and later sets were not fetched; \
             buffered replays will be saved. Resume from step {}.",
            cursor.step,
            ctx.plan.total_steps(),
            cursor.before,
            cursor.step
        ));
    }
}

/// Runs the ingestion loop for a configuration.
pub struct Pipeline {
    config: DownloadConfig,
    fetcher: Fetcher,
    reporter: Reporter,
    stop: StopHandle,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("stop", &self.stop)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Creates a pipeline over `source`, paced by `request_delay_ms`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if the configuration is invalid.
    pub fn new(config: DownloadConfig, source: Arc<dyn ReplaySource>) -> Result<Self, PipelineError> {
        config.validate()?;
        let fetcher = Fetcher::new(source, Pacer::new(config.request_delay()));
        Ok(Self {
            config,
            fetcher,
            reporter: Reporter::silent(),
            stop: StopHandle::new(),
        })
    }

    /// Creates a pipeline against the HTTP endpoint in `config.base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] or [`PipelineError::Client`].
    pub fn from_config(config: DownloadConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let client = ReplayClient::from_config(&config)?;
        Self::new(config, Arc::new(client))
    }

    /// Sends progress and log events through `reporter`.
    #[must_use]
    pub fn with_events(mut self, reporter: Reporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Uses an existing stop flag, for front ends that create it up front.
    #[must_use]
    pub fn with_stop(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    #[must_use]
    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Handle that stops this pipeline from another task or thread.
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn request_stop(&self) {
        self.stop.request_stop();
    }

    /// The window plan for a range, for showing the step count up front.
    ///
    /// # Errors
    ///
    /// See [`WindowPlan::new`].
    pub fn plan(&self, range: &DateRange, now: i64) -> Result<WindowPlan, ConfigError> {
        WindowPlan::new(range, self.config.batch_window_seconds, now)
    }

    /// Downloads `start_date..=end_date` (`YYYY-MM-DD`, UTC) into the
    /// configured store.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::run`].
    pub async fn start(&self, start_date: &str, end_date: &str) -> Result<RunSummary, PipelineError> {
        let range = DateRange::parse(start_date, end_date)?;
        self.start_range(&range).await
    }

    /// Like [`Pipeline::start`] with an already parsed range.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::run`].
    pub async fn start_range(&self, range: &DateRange) -> Result<RunSummary, PipelineError> {
        let sink = sink_for(&self.config, range);
        self.run(range, Utc::now().timestamp(), sink).await
    }

    /// Runs the pipeline for `range` as of `now` into `sink`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] for an unusable range or resume
    /// step, and [`PipelineError::Bootstrap`] if the store cannot be
    /// prepared. Both happen before any request is made.
    #[instrument(skip(self, range, sink), fields(range = %range, strategy = self.config.strategy.as_str()))]
    pub async fn run(
        &self,
        range: &DateRange,
        now: i64,
        mut sink: Box<dyn ReplaySink>,
    ) -> Result<RunSummary, PipelineError> {
        let mut machine = StateMachine::new();

        let plan = self.plan(range, now)?;
        let total_steps = plan.total_steps();
        let first_step = match self.config.resume_from_step {
            Some(step) if step > total_steps => {
                return Err(ConfigError::ResumeOutOfRange { step, total_steps }.into());
            }
            Some(step) => step,
            None => 1,
        };

        if plan.clamped_to_now() {
            self.reporter.warn(format!(
                "End date {} is not over yet; downloading up to the current time",
                range.end()
            ));
        }
        self.reporter.info(format!(
            "Downloading {range} in {total_steps} sets into {}",
            sink.store_path().display()
        ));
        if first_step > 1 {
            self.reporter
                .info(format!("Resuming from set {first_step}/{total_steps}"));
        }

        machine.advance(PipelineState::Bootstrapping);
        sink.bootstrap()
            .await
            .map_err(|source| PipelineError::Bootstrap {
                store: sink.store_path().to_path_buf(),
                source,
            })?;

        let retry = RetryPolicy::from_config(&self.config);
        let ctx = RunContext {
            fetcher: &self.fetcher,
            retry: &retry,
            reporter: &self.reporter,
            stop: &self.stop,
            plan: &plan,
            first_step,
            threshold: self.config.max_replay_threshold,
            queue_capacity: self.config.queue_capacity,
        };
        let mut writer = BatchWriter::new(&self.reporter, self.config.flush_attempts);

        machine.advance(PipelineState::Fetching);
        let tally = match self.config.strategy {
            ExecutionStrategy::Blocking => {
                blocking::run(&ctx, &mut machine, sink.as_mut(), &mut writer).await
            }
            ExecutionStrategy::Cooperative => {
                cooperative::run(&ctx, &mut machine, sink.as_mut(), &mut writer).await
            }
        };

        if tally.stopped_at.is_none() {
            machine.advance(PipelineState::Finalizing);
            if let Err(e) = sink.finalize().await {
                self.reporter
                    .error(format!("Failed to finalize {}: {e}", sink.store_path().display()));
            }
        }
        machine.advance(PipelineState::Done);

        let summary = RunSummary {
            store_path: sink.store_path().to_path_buf(),
            total_steps,
            first_step,
            steps_completed: tally.steps_completed,
            fetched: tally.fetched,
            writes: writer.stats(),
            abandoned: tally.abandoned,
            resume_step: tally.stopped_at,
            clamped_to_now: plan.clamped_to_now(),
        };

        self.reporter.info(format!(
            "Finished: {} replays saved, {} fetched, {} sets skipped",
            summary.total_records(),
            summary.fetched,
            summary.abandoned.len()
        ));
        Ok(summary)
    }
}

/// One-call download for front ends: builds an HTTP pipeline from `config`
/// and runs it for `start_date..=end_date`.
///
/// # Errors
///
/// See [`Pipeline::from_config`] and [`Pipeline::run`].
pub async fn download_replay_data(
    config: DownloadConfig,
    start_date: &str,
    end_date: &str,
    reporter: Reporter,
) -> Result<RunSummary, PipelineError> {
    Pipeline::from_config(config)?
        .with_events(reporter)
        .start(start_date, end_date)
        .await
}
