//! Error types for feed operations.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while talking to the gas price feed.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("WebSocket connection failed: {0}")]
    ConnectionFailed(String),

    #[error("WebSocket disconnected: {0}")]
    Disconnected(String),

    #[error("Failed to parse message: {0}")]
    ParseError(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Unexpected HTTP status: {0}")]
    HttpStatus(u16),

    #[error("Subscription denied (code {code}): {message}")]
    SubscriptionDenied { code: i64, message: String },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Invalid feed URL: {0}")]
    InvalidUrl(String),

    #[error("Feed cancelled")]
    Cancelled,
}

impl From<tokio_tungstenite::tungstenite::Error> for FeedError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        FeedError::ConnectionFailed(err.to_string())
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::ParseError(err.to_string())
    }
}

impl From<url::ParseError> for FeedError {
    fn from(err: url::ParseError) -> Self {
        FeedError::InvalidUrl(err.to_string())
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FeedError::Timeout(err.to_string())
        } else if err.is_decode() {
            FeedError::ParseError(err.to_string())
        } else {
            FeedError::Http(err.to_string())
        }
    }
}

impl FeedError {
    /// Returns true if this error is transient and likely to succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FeedError::ConnectionFailed(_)
                | FeedError::Disconnected(_)
                | FeedError::Timeout(_)
                | FeedError::Http(_)
        )
    }

    /// Suggested wait before retrying, or None when retrying is pointless.
    pub fn suggested_retry_delay(&self) -> Option<Duration> {
        match self {
            FeedError::ConnectionFailed(_) => Some(Duration::from_secs(5)),
            FeedError::Http(_) => Some(Duration::from_secs(5)),
            FeedError::Disconnected(_) => Some(Duration::from_secs(2)),
            FeedError::Timeout(_) => Some(Duration::from_secs(2)),
            FeedError::ParseError(_)
            | FeedError::HttpStatus(_)
            | FeedError::SubscriptionDenied { .. }
            | FeedError::InvalidUrl(_)
            | FeedError::Cancelled => None,
        }
    }
}
