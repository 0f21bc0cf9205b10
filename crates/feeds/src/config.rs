//! Feed connection settings.

use std::time::Duration;

/// Default pull endpoint of the gasz service.
pub const DEFAULT_QUERY_URL: &str = "https://gasz.in/v1/latest";
/// Default push endpoint of the gasz service.
pub const DEFAULT_SUBSCRIBE_URL: &str = "wss://gasz.in/v1/subscribe";

/// Configuration for the pull and push feed clients.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// HTTP endpoint returning the current recommendation
    pub query_url: String,
    /// WebSocket endpoint streaming recommendations
    pub subscribe_url: String,
    /// Base delay before reconnecting (ms), doubled per attempt
    pub reconnect_delay_ms: u64,
    /// Consecutive failed connections tolerated before giving up
    pub max_reconnect_attempts: u32,
    /// Ping interval to keep the stream alive (ms)
    pub ping_interval_ms: u64,
    /// Dial and subscription handshake bound (ms)
    pub connect_timeout_ms: u64,
    /// Read deadline, extended by every received frame (ms)
    pub stale_timeout_ms: u64,
    /// TCP dial bound for the pull query (ms)
    pub request_connect_timeout_ms: u64,
    /// Whole-request bound for the pull query (ms)
    pub request_timeout_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            query_url: DEFAULT_QUERY_URL.to_string(),
            subscribe_url: DEFAULT_SUBSCRIBE_URL.to_string(),
            reconnect_delay_ms: 1000,
            max_reconnect_attempts: 5,
            ping_interval_ms: 30_000,
            connect_timeout_ms: 5000,
            stale_timeout_ms: 120_000,
            request_connect_timeout_ms: 1000,
            request_timeout_ms: 3000,
        }
    }
}

impl FeedConfig {
    pub fn new(query_url: impl Into<String>, subscribe_url: impl Into<String>) -> Self {
        Self {
            query_url: query_url.into(),
            subscribe_url: subscribe_url.into(),
            ..Default::default()
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn stale_timeout(&self) -> Duration {
        Duration::from_millis(self.stale_timeout_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    /// Backoff before reconnect attempt `attempt` (1-based), capped at 5 minutes.
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let backoff_power = attempt.saturating_sub(1).min(8);
        let delay_ms = self
            .reconnect_delay_ms
            .saturating_mul(1 << backoff_power)
            .min(300_000);
        Duration::from_millis(delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_config_default() {
        let config = FeedConfig::default();
        assert!(config.query_url.starts_with("https://"));
        assert!(config.subscribe_url.starts_with("wss://"));
        assert!(config.reconnect_delay_ms > 0);
        assert!(config.ping_interval_ms > 0);
        assert_eq!(config.request_timeout_ms, 3000);
    }

    #[test]
    fn test_reconnect_delay_backoff() {
        let config = FeedConfig::default();
        assert_eq!(config.reconnect_delay(1), Duration::from_secs(1));
        assert_eq!(config.reconnect_delay(2), Duration::from_secs(2));
        assert_eq!(config.reconnect_delay(4), Duration::from_secs(8));
        assert_eq!(config.reconnect_delay(100), Duration::from_secs(256));
    }

    #[test]
    fn test_reconnect_delay_cap() {
        let config = FeedConfig {
            reconnect_delay_ms: 10_000,
            ..Default::default()
        };
        assert_eq!(config.reconnect_delay(20), Duration::from_secs(300));
    }
}
