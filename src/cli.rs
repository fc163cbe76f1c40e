//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use replay_core::config::{DownloadConfig, ExecutionStrategy};

/// Download fighting game replays for a date range.
///
/// Replays are fetched in 700-second windows, paced to respect the API's
/// rate limit, and saved to one SQLite database (or CSV file) per range.
#[derive(Parser, Debug)]
#[command(name = "replay-downloader")]
#[command(author, version, about)]
pub struct Args {
    /// First day to download (YYYY-MM-DD, UTC)
    #[arg(short = 's', long)]
    pub start_date: String,

    /// Last day to download, inclusive (YYYY-MM-DD, UTC)
    #[arg(short = 'e', long)]
    pub end_date: String,

    /// TOML config file; flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Write a CSV file instead of a SQLite database
    #[arg(long)]
    pub csv: bool,

    /// Directory for store files
    #[arg(short = 'o', long)]
    pub data_dir: Option<PathBuf>,

    /// Retries per window after the first failed attempt (0-10)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub max_retries: Option<u8>,

    /// Minimum delay between API calls in milliseconds (0 to disable, max 60000)
    #[arg(short = 'l', long, value_parser = clap::value_parser!(u64).range(0..=60000))]
    pub delay_ms: Option<u64>,

    /// Buffered replays above which a batch is written
    #[arg(short = 't', long, value_parser = clap::value_parser!(u64).range(1..))]
    pub threshold: Option<u64>,

    /// Scheduling model
    #[arg(long, value_enum)]
    pub strategy: Option<StrategyArg>,

    /// Resume a stopped run from this 1-based step
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub resume_from_step: Option<u64>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    Blocking,
    Cooperative,
}

impl From<StrategyArg> for ExecutionStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Blocking => Self::Blocking,
            StrategyArg::Cooperative => Self::Cooperative,
        }
    }
}

impl Args {
    /// Applies flag values on top of `config`.
    pub fn apply_to(&self, config: &mut DownloadConfig) {
        if self.csv {
            config.use_relational_sink = false;
        }
        if let Some(dir) = &self.data_dir {
            config.data_dir.clone_from(dir);
        }
        if let Some(retries) = self.max_retries {
            config.max_retries = u32::from(retries);
        }
        if let Some(delay) = self.delay_ms {
            config.request_delay_ms = delay;
        }
        if let Some(threshold) = self.threshold {
            config.max_replay_threshold = usize::try_from(threshold).unwrap_or(usize::MAX);
        }
        if let Some(strategy) = self.strategy {
            config.strategy = strategy.into();
        }
        if let Some(step) = self.resume_from_step {
            config.resume_from_step = Some(usize::try_from(step).unwrap_or(usize::MAX));
        }
    }
}
