//! HTTP client for the replay endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument, warn};
use url::Url;

use super::FetchError;
use crate::config::DownloadConfig;
use crate::replay::{ReplayRecord, decode_window};

/// Connect timeout applied regardless of the request timeout.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// A source of replay records keyed by `before` cursor.
///
/// Implementations perform exactly one request per call; pacing and retry
/// are layered on top by [`Fetcher`](super::Fetcher) and
/// [`fetch_with_retry`](super::fetch_with_retry).
#[async_trait]
pub trait ReplaySource: Send + Sync {
    /// Fetches the replays recorded in the window ending at `before`.
    ///
    /// An empty list is a successful fetch.
    async fn fetch(&self, before: i64) -> Result<Vec<ReplayRecord>, FetchError>;
}

/// User-Agent sent with every request.
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("replay-downloader/{version}")
}

/// reqwest-backed [`ReplaySource`] for `GET {base_url}?before={cursor}`.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct ReplayClient {
    client: Client,
    base_url: Url,
}

impl ReplayClient {
    /// Creates a client for `base_url` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Client`] if the URL is invalid or the client
    /// cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let base_url = Url::parse(base_url).map_err(|e| FetchError::Client {
            message: format!("invalid base URL '{base_url}': {e}"),
        })?;
        let client = Client::builder()
            .user_agent(default_user_agent())
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS).min(timeout))
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Client {
                message: e.to_string(),
            })?;
        Ok(Self { client, base_url })
    }

    /// Creates a client from the run configuration.
    ///
    /// # Errors
    ///
    /// See [`ReplayClient::new`].
    pub fn from_config(config: &DownloadConfig) -> Result<Self, FetchError> {
        Self::new(&config.base_url, config.timeout())
    }

    /// The request URL for a cursor.
    #[must_use]
    pub fn url_for(&self, before: i64) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("before", &before.to_string());
        url
    }
}

#[async_trait]
impl ReplaySource for ReplayClient {
    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, before: i64) -> Result<Vec<ReplayRecord>, FetchError> {
        let response = self
            .client
            .get(self.url_for(before))
            .send()
            .await
            .map_err(|e| FetchError::network(before, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::http_status(before, status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::network(before, e))?;
        let window =
            decode_window(&body).map_err(|e| FetchError::decode(before, e.to_string()))?;

        if let Some((index, error)) = window.malformed.first() {
            warn!(
                before,
                skipped = window.malformed.len(),
                kept = window.records.len(),
                first_index = index,
                first_error = %error,
                "skipping malformed replays in window"
            );
        }
        debug!(count = window.records.len(), "fetched replays");
        Ok(window.records)
    }
}
