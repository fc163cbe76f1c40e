//! CLI entry point for the replay downloader.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use replay_core::config::DownloadConfig;
use replay_core::events::{self, Reporter};
use replay_core::pipeline::{Pipeline, RunSummary, StopHandle, spawn_worker};
use replay_core::planner::DateRange;
use tracing::{debug, info, warn};

mod cli;
mod progress;

use cli::Args;
use progress::ProgressUi;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let mut config = match &args.config {
        Some(path) => DownloadConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => DownloadConfig::default(),
    };
    args.apply_to(&mut config);

    let range = DateRange::parse(&args.start_date, &args.end_date)?;

    let (tx, rx) = events::channel();
    let pipeline = Pipeline::from_config(config)
        .context("invalid configuration")?
        .with_events(Reporter::new(tx));

    // Surface range problems before the worker starts
    let plan = pipeline.plan(&range, Utc::now().timestamp())?;
    info!(
        range = %range,
        total_steps = plan.total_steps(),
        strategy = pipeline.config().strategy.as_str(),
        "Replay downloader starting"
    );

    let worker = spawn_worker(pipeline, range)?;

    tokio::spawn(forward_interrupts(worker.stop_handle()));

    let summary = ProgressUi::new(plan.total_steps(), args.quiet)
        .drive(rx, worker)
        .await?;

    report(&summary);
    Ok(())
}

/// Exit code after a second interrupt (128 + SIGINT).
const FORCED_EXIT_CODE: i32 = 130;

/// First Ctrl-C stops after the current set; a second one exits at once.
async fn forward_interrupts(stop: StopHandle) {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    warn!("Interrupt received, stopping after the current set (Ctrl-C again to quit now)");
    stop.request_stop();

    if tokio::signal::ctrl_c().await.is_ok() {
        warn!("Second interrupt received, exiting without saving buffered replays");
        std::process::exit(FORCED_EXIT_CODE);
    }
}

fn report(summary: &RunSummary) {
    info!(
        persisted = summary.total_records(),
        fetched = summary.fetched,
        placeholders = summary.writes.placeholders,
        duplicates = summary.writes.duplicates,
        lost = summary.writes.lost_records,
        abandoned = summary.abandoned.len(),
        store = %summary.store_path.display(),
        "Download complete"
    );

    for window in &summary.abandoned {
        warn!(
            step = window.step,
            before = window.cursor,
            attempts = window.attempts,
            error = %window.last_error,
            "Window not downloaded; backfill needed"
        );
    }

    if let Some(step) = summary.resume_step {
        warn!(
            step,
            total_steps = summary.total_steps,
            "Run stopped early; continue with --resume-from-step {step}"
        );
    }
}
