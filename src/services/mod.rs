// External service clients

pub mod plex;
pub mod tmdb;
pub mod tvdb;

use std::time::Duration;
use thiserror::Error;

/// Failure classes shared by the catalog adapters. The retry policy and
/// the gap engines both dispatch on these: rate limits and timeouts are
/// retried, lookup failures are skipped per item, and a rejected
/// credential aborts the scan.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("rate limited by the catalog")]
    RateLimited { retry_after: Option<Duration> },

    #[error("catalog rejected the credentials")]
    Unauthorized,

    #[error("not found in the catalog")]
    NotFound,

    #[error("request timed out")]
    Timeout,

    #[error("http error: {0}")]
    Http(reqwest::Error),

    #[error("unexpected status {0}")]
    Status(reqwest::StatusCode),

    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for CatalogError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CatalogError::Timeout
        } else {
            CatalogError::Http(e)
        }
    }
}

impl CatalogError {
    /// Worth another attempt under the backoff policy.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CatalogError::RateLimited { .. } | CatalogError::Timeout | CatalogError::Http(_)
        )
    }

    /// Cannot be recovered by skipping the current item; the scan stops.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CatalogError::Unauthorized)
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            CatalogError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Map a non-success response to the matching error class.
pub(crate) fn status_error(response: &reqwest::Response) -> CatalogError {
    let status = response.status();
    match status {
        reqwest::StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            CatalogError::RateLimited { retry_after }
        }
        reqwest::StatusCode::UNAUTHORIZED => CatalogError::Unauthorized,
        reqwest::StatusCode::NOT_FOUND => CatalogError::NotFound,
        _ => CatalogError::Status(status),
    }
}
