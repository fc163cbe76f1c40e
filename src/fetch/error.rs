//! Error types for the fetch module.

use thiserror::Error;

/// Errors from a single fetch of one cursor window.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure (DNS, connection refused, reset, TLS).
    #[error("network error fetching before={cursor}: {source}")]
    Network {
        /// The cursor being fetched.
        cursor: i64,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// The request exceeded the configured timeout.
    #[error("timeout fetching before={cursor}")]
    Timeout {
        /// The cursor being fetched.
        cursor: i64,
    },

    /// The server answered with a non-success status.
    #[error("HTTP {status} fetching before={cursor}")]
    HttpStatus {
        /// The cursor being fetched.
        cursor: i64,
        /// The HTTP status code.
        status: u16,
    },

    /// The body was not a JSON array of replay objects.
    #[error("malformed response for before={cursor}: {message}")]
    Decode {
        /// The cursor being fetched.
        cursor: i64,
        /// Decoder error text.
        message: String,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {message}")]
    Client {
        /// Builder error text.
        message: String,
    },
}

impl FetchError {
    /// Creates a network error from a reqwest error, mapping timeouts to
    /// [`FetchError::Timeout`].
    pub fn network(cursor: i64, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout { cursor }
        } else {
            Self::Network { cursor, source }
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(cursor: i64, status: u16) -> Self {
        Self::HttpStatus { cursor, status }
    }

    /// Creates a decode error.
    pub fn decode(cursor: i64, message: impl Into<String>) -> Self {
        Self::Decode {
            cursor,
            message: message.into(),
        }
    }
}
