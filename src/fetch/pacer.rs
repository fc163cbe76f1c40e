//! Minimum-interval pacing for API calls.
//!
//! The replay endpoint enforces an undocumented rate limit. [`Pacer`] keeps
//! consecutive calls at least `min_interval` apart, measured from the start
//! of one call to the start of the next: before each call it sleeps for
//! `max(0, min_interval - elapsed)`.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use replay_core::fetch::Pacer;
//!
//! # async fn example() {
//! let pacer = Pacer::new(Duration::from_secs(1));
//! pacer.acquire().await; // immediate
//! pacer.acquire().await; // waits until one second after the first call
//! # }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// Cumulative pacing delay after which a warning is logged once per hour of waiting.
const CUMULATIVE_DELAY_WARNING_THRESHOLD: Duration = Duration::from_secs(3600);

/// Spaces API calls at least `min_interval` apart.
#[derive(Debug)]
pub struct Pacer {
    min_interval: Duration,
    disabled: bool,
    /// Start of the previous call; `None` before the first call.
    last_call: Mutex<Option<Instant>>,
    cumulative_delay_ms: AtomicU64,
}

impl Pacer {
    /// Creates a pacer. A zero interval disables pacing.
    #[must_use]
    #[instrument(skip_all, fields(interval_ms = min_interval.as_millis()))]
    pub fn new(min_interval: Duration) -> Self {
        debug!("creating pacer");
        Self {
            min_interval,
            disabled: min_interval.is_zero(),
            last_call: Mutex::new(None),
            cumulative_delay_ms: AtomicU64::new(0),
        }
    }

    /// Creates a pacer that never waits.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Whether pacing is disabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Total time spent waiting so far.
    #[must_use]
    pub fn cumulative_delay(&self) -> Duration {
        Duration::from_millis(self.cumulative_delay_ms.load(Ordering::SeqCst))
    }

    /// Waits until a call may start, then records the call start.
    ///
    /// The first call never waits.
    pub async fn acquire(&self) {
        if self.disabled {
            return;
        }

        let mut last_call = self.last_call.lock().await;

        if let Some(previous) = *last_call {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                let delay = self.min_interval - elapsed;
                let cumulative = self.add_cumulative_delay(delay);

                debug!(
                    delay_ms = delay.as_millis(),
                    cumulative_ms = cumulative.as_millis(),
                    "pacing API call"
                );

                if cumulative.as_secs() / CUMULATIVE_DELAY_WARNING_THRESHOLD.as_secs()
                    > (cumulative - delay).as_secs() / CUMULATIVE_DELAY_WARNING_THRESHOLD.as_secs()
                {
                    warn!(
                        cumulative_delay_secs = cumulative.as_secs(),
                        "pacing has added another hour of waiting"
                    );
                }

                tokio::time::sleep(delay).await;
            }
        }

        *last_call = Some(Instant::now());
    }

    #[allow(clippy::cast_possible_truncation)]
    fn add_cumulative_delay(&self, delay: Duration) -> Duration {
        let delay_ms = delay.as_millis() as u64;
        let total = self
            .cumulative_delay_ms
            .fetch_add(delay_ms, Ordering::SeqCst)
            + delay_ms;
        Duration::from_millis(total)
    }
}
