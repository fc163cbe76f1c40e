//! Rate-limited, retrying fetch of replay windows.
//!
//! The fetch path is layered:
//!
//! - [`ReplaySource`] performs one request per cursor ([`ReplayClient`] over
//!   HTTP, or a test double)
//! - [`Fetcher`] adds [`Pacer`] spacing in front of every request
//! - [`fetch_with_retry`] adds bounded retry and turns exhaustion into an
//!   [`AbandonedWindow`] instead of an error
//!
//! Pacing and retry are separate so their cadences can differ.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use replay_core::events::Reporter;
//! use replay_core::fetch::{Fetcher, Pacer, ReplayClient, RetryPolicy, fetch_with_retry};
//! use replay_core::planner::Cursor;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ReplayClient::new("https://wank.wavu.wiki/api/replays", Duration::from_secs(30))?;
//! let fetcher = Fetcher::new(Arc::new(client), Pacer::new(Duration::from_millis(1005)));
//! let cursor = Cursor { step: 1, before: 1_756_685_500 };
//! let outcome = fetch_with_retry(&fetcher, &RetryPolicy::default(), cursor, 1, &Reporter::silent()).await;
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod pacer;
mod retry;

use std::sync::Arc;

pub use client::{ReplayClient, ReplaySource};
pub use error::FetchError;
pub use pacer::Pacer;
pub use retry::{AbandonedWindow, FetchOutcome, RetryDecision, RetryPolicy, fetch_with_retry};

use crate::replay::ReplayRecord;

/// A [`ReplaySource`] behind a [`Pacer`].
#[derive(Clone)]
pub struct Fetcher {
    source: Arc<dyn ReplaySource>,
    pacer: Arc<Pacer>,
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("pacer", &self.pacer)
            .finish_non_exhaustive()
    }
}

impl Fetcher {
    #[must_use]
    pub fn new(source: Arc<dyn ReplaySource>, pacer: Pacer) -> Self {
        Self {
            source,
            pacer: Arc::new(pacer),
        }
    }

    /// The pacer in front of the source.
    #[must_use]
    pub fn pacer(&self) -> &Pacer {
        &self.pacer
    }

    /// Waits for the pacer, then issues one request. No retry.
    ///
    /// # Errors
    ///
    /// Propagates the source's [`FetchError`].
    pub async fn fetch(&self, before: i64) -> Result<Vec<ReplayRecord>, FetchError> {
        self.pacer.acquire().await;
        self.source.fetch(before).await
    }
}
