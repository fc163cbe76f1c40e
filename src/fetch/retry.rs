//! Bounded retry for window fetches.
//!
//! A run may cover months of windows, so one unreachable window must not
//! abort it. [`fetch_with_retry`] makes the first attempt plus up to
//! `max_retries` retries. When all of them fail the window is *abandoned*:
//! it contributes zero records, is logged with its step and cursor for later
//! backfill, and the run continues.
//!
//! # Delay Calculation
//!
//! ```text
//! Constant: delay(n) = base_delay
//! Linear:   delay(n) = base_delay * n        n = 1 for the first retry
//! ```
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use replay_core::config::Backoff;
//! use replay_core::fetch::{RetryDecision, RetryPolicy};
//!
//! let policy = RetryPolicy::new(3, Duration::from_secs(1), Backoff::Linear);
//! match policy.should_retry(2) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         assert_eq!(delay, Duration::from_secs(2));
//!         assert_eq!(attempt, 3);
//!     }
//!     RetryDecision::DoNotRetry { .. } => unreachable!(),
//! }
//! ```

use std::time::Duration;

use tracing::{debug, instrument};

use super::Fetcher;
use crate::config::{Backoff, DownloadConfig};
use crate::events::Reporter;
use crate::planner::Cursor;
use crate::replay::ReplayRecord;

/// Decision on whether to retry a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after `delay`; `attempt` is the 1-based number of the next attempt.
    Retry { delay: Duration, attempt: u32 },
    /// Give up on the window.
    DoNotRetry { reason: String },
}

/// Retry configuration for window fetches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&DownloadConfig::default())
    }
}

impl RetryPolicy {
    /// Creates a policy allowing `max_retries` retries after the first attempt.
    #[must_use]
    pub fn new(max_retries: u32, base_delay: Duration, backoff: Backoff) -> Self {
        Self {
            max_retries,
            base_delay,
            backoff,
        }
    }

    /// Builds the policy from `max_retries`, `request_delay_ms` and `retry_backoff`.
    #[must_use]
    pub fn from_config(config: &DownloadConfig) -> Self {
        Self::new(config.max_retries, config.request_delay(), config.retry_backoff)
    }

    /// Retries allowed after the first attempt.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Total attempts including the first.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Decides what to do after `attempt` (1-based) failed.
    #[must_use]
    pub fn should_retry(&self, attempt: u32) -> RetryDecision {
        if attempt >= self.max_attempts() {
            return RetryDecision::DoNotRetry {
                reason: format!("all {} attempts failed", self.max_attempts()),
            };
        }
        RetryDecision::Retry {
            delay: self.delay_for_retry(attempt),
            attempt: attempt + 1,
        }
    }

    /// Delay before retry number `retry` (1 for the first retry).
    #[must_use]
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        match self.backoff {
            Backoff::Constant => self.base_delay,
            Backoff::Linear => self.base_delay.saturating_mul(retry.max(1)),
        }
    }
}

/// A window that could not be fetched and was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbandonedWindow {
    /// 1-based position in the plan.
    pub step: usize,
    /// The `before` cursor of the window.
    pub cursor: i64,
    /// Attempts made.
    pub attempts: u32,
    /// Error text of the final attempt.
    pub last_error: String,
}

/// Result of fetching one window through [`fetch_with_retry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The window was fetched, possibly after retries.
    Fetched {
        records: Vec<ReplayRecord>,
        attempts: u32,
    },
    /// Every attempt failed; the window contributes nothing.
    Abandoned(AbandonedWindow),
}

impl FetchOutcome {
    /// Number of attempts made.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Fetched { attempts, .. } => *attempts,
            Self::Abandoned(window) => window.attempts,
        }
    }
}

/// Fetches one window, retrying per `policy`. Never fails: exhaustion yields
/// [`FetchOutcome::Abandoned`].
#[instrument(level = "debug", skip(fetcher, policy, reporter), fields(step = cursor.step, before = cursor.before))]
pub async fn fetch_with_retry(
    fetcher: &Fetcher,
    policy: &RetryPolicy,
    cursor: Cursor,
    total_steps: usize,
    reporter: &Reporter,
) -> FetchOutcome {
    let mut attempt: u32 = 1;

    loop {
        match fetcher.fetch(cursor.before).await {
            Ok(records) => {
                if attempt > 1 {
                    reporter.info(format!(
                        "Retry {} succeeded for set {}/{}",
                        attempt - 1,
                        cursor.step,
                        total_steps
                    ));
                }
                return FetchOutcome::Fetched {
                    records,
                    attempts: attempt,
                };
            }
            Err(error) => match policy.should_retry(attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next,
                } => {
                    reporter.warn(format!(
                        "Attempt {attempt} failed for set {}/{} (before={}): {error}; retrying in {}ms",
                        cursor.step,
                        total_steps,
                        cursor.before,
                        delay.as_millis()
                    ));
                    tokio::time::sleep(delay).await;
                    attempt = next;
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(%reason, "giving up on window");
                    reporter.error(format!(
                        "Abandoned set {}/{} (before={}) after {attempt} attempts: {error}. \
                         It will not be included in the output.",
                        cursor.step, total_steps, cursor.before
                    ));
                    return FetchOutcome::Abandoned(AbandonedWindow {
                        step: cursor.step,
                        cursor: cursor.before,
                        attempts: attempt,
                        last_error: error.to_string(),
                    });
                }
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::*;
    use crate::events;
    use crate::fetch::{FetchError, Pacer, ReplaySource};
    use crate::replay::tests::sample;

    /// Returns scripted results in order, then empty successes.
    struct Scripted {
        results: Mutex<VecDeque<Result<Vec<ReplayRecord>, u16>>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(results: Vec<Result<Vec<ReplayRecord>, u16>>) -> Self {
            Self {
                results: Mutex::new(results.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl ReplaySource for Scripted {
        async fn fetch(&self, before: i64) -> Result<Vec<ReplayRecord>, FetchError> {
            *self.calls.lock().unwrap() += 1;
            match self.results.lock().unwrap().pop_front() {
                Some(Ok(records)) => Ok(records),
                Some(Err(status)) => Err(FetchError::http_status(before, status)),
                None => Ok(Vec::new()),
            }
        }
    }

    fn fetcher(source: Arc<Scripted>) -> Fetcher {
        Fetcher::new(source, Pacer::disabled())
    }

    const CURSOR: Cursor = Cursor {
        step: 4,
        before: 1_756_687_600,
    };

    #[test]
    fn test_constant_backoff_delay_is_flat() {
        let policy = RetryPolicy::new(3, Duration::from_millis(500), Backoff::Constant);
        assert_eq!(policy.delay_for_retry(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for_retry(3), Duration::from_millis(500));
    }

    #[test]
    fn test_linear_backoff_delay_grows_per_attempt() {
        let policy = RetryPolicy::new(3, Duration::from_millis(500), Backoff::Linear);
        assert_eq!(policy.delay_for_retry(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for_retry(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_retry(3), Duration::from_millis(1500));
    }

    #[test]
    fn test_should_retry_respects_max_retries() {
        let policy = RetryPolicy::new(2, Duration::ZERO, Backoff::Constant);
        assert_eq!(policy.max_attempts(), 3);
        assert!(matches!(
            policy.should_retry(1),
            RetryDecision::Retry { attempt: 2, .. }
        ));
        assert!(matches!(
            policy.should_retry(2),
            RetryDecision::Retry { attempt: 3, .. }
        ));
        assert!(matches!(
            policy.should_retry(3),
            RetryDecision::DoNotRetry { .. }
        ));
    }

    #[test]
    fn test_zero_retries_gives_single_attempt() {
        let policy = RetryPolicy::new(0, Duration::ZERO, Backoff::Constant);
        assert!(matches!(
            policy.should_retry(1),
            RetryDecision::DoNotRetry { .. }
        ));
    }

    #[test]
    fn test_policy_from_config() {
        let config = DownloadConfig {
            max_retries: 5,
            request_delay_ms: 250,
            retry_backoff: Backoff::Linear,
            ..DownloadConfig::default()
        };
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.max_retries(), 5);
        assert_eq!(policy.delay_for_retry(2), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_first_attempt_success_needs_no_retry() {
        let source = Arc::new(Scripted::new(vec![Ok(vec![sample("a"), sample("b")])]));
        let policy = RetryPolicy::new(3, Duration::ZERO, Backoff::Constant);

        let outcome =
            fetch_with_retry(&fetcher(source.clone()), &policy, CURSOR, 10, &Reporter::silent())
                .await;

        assert!(matches!(&outcome, FetchOutcome::Fetched { records, attempts: 1 } if records.len() == 2));
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let source = Arc::new(Scripted::new(vec![Err(503), Err(500), Ok(vec![sample("a")])]));
        let policy = RetryPolicy::new(3, Duration::ZERO, Backoff::Constant);

        let outcome =
            fetch_with_retry(&fetcher(source.clone()), &policy, CURSOR, 10, &Reporter::silent())
                .await;

        assert_eq!(outcome.attempts(), 3);
        assert!(matches!(outcome, FetchOutcome::Fetched { .. }));
    }

    #[tokio::test]
    async fn test_exhaustion_abandons_window_with_context() {
        let source = Arc::new(Scripted::new(vec![Err(500); 4]));
        let policy = RetryPolicy::new(3, Duration::ZERO, Backoff::Constant);
        let (tx, mut rx) = events::channel();

        let outcome =
            fetch_with_retry(&fetcher(source.clone()), &policy, CURSOR, 10, &Reporter::new(tx))
                .await;

        let FetchOutcome::Abandoned(window) = outcome else {
            panic!("expected abandoned window");
        };
        assert_eq!(window.step, 4);
        assert_eq!(window.cursor, CURSOR.before);
        assert_eq!(window.attempts, 4);
        assert!(window.last_error.contains("500"));
        assert_eq!(source.calls(), 4);

        let mut logs = Vec::new();
        while let Ok(event) = rx.try_recv() {
            logs.push(event);
        }
        // three retry warnings and one abandon error
        assert_eq!(logs.len(), 4);
        assert!(matches!(
            logs.last(),
            Some(events::PipelineEvent::Log { level: events::EventLevel::Error, message })
                if message.contains("Abandoned set 4/10") && message.contains("1756687600")
        ));
    }

    #[tokio::test]
    async fn test_empty_response_is_success() {
        let source = Arc::new(Scripted::new(vec![Ok(Vec::new())]));
        let policy = RetryPolicy::new(3, Duration::ZERO, Backoff::Constant);

        let outcome =
            fetch_with_retry(&fetcher(source), &policy, CURSOR, 10, &Reporter::silent()).await;

        assert_eq!(
            outcome,
            FetchOutcome::Fetched {
                records: Vec::new(),
                attempts: 1
            }
        );
    }

    #[tokio::test]
    async fn test_linear_backoff_waits_between_attempts() {
        tokio::time::pause();

        let source = Arc::new(Scripted::new(vec![Err(500), Err(500), Ok(Vec::new())]));
        let policy = RetryPolicy::new(3, Duration::from_secs(1), Backoff::Linear);
        let start = tokio::time::Instant::now();

        let outcome =
            fetch_with_retry(&fetcher(source), &policy, CURSOR, 10, &Reporter::silent()).await;

        assert_eq!(outcome.attempts(), 3);
        // 1s before the first retry, 2s before the second
        assert!(start.elapsed() >= Duration::from_secs(3));
    }
}
