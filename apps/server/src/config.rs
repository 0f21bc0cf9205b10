//! Application configuration.
//!
//! Every setting comes from a command-line flag or the matching environment
//! variable (a `.env` file is loaded first when present).

use clap::Parser;
use gasbot_alerts::{NotifierConfig, TriggerMode};
use gasbot_feeds::{FeedConfig, DEFAULT_QUERY_URL, DEFAULT_SUBSCRIBE_URL};
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("TOKEN must not be empty")]
    EmptyToken,
    #[error("{key} is not a valid URL ({value}): {reason}")]
    InvalidUrl {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("{key} must use one of {expected:?}, got '{scheme}'")]
    UnsupportedScheme {
        key: &'static str,
        scheme: String,
        expected: &'static [&'static str],
    },
    #[error("{key} must be greater than zero")]
    Zero { key: &'static str },
}

/// Gas price alert bot CLI
#[derive(Parser, Debug, Clone)]
#[command(name = "gasbot")]
#[command(about = "Telegram bot for Ethereum gas price alerts", long_about = None)]
pub struct Args {
    /// Telegram bot token
    #[arg(long, env = "TOKEN", hide_env_values = true)]
    pub token: String,

    /// Pull endpoint returning the latest gas price
    #[arg(long, env = "GASZ_QUERY_URL", default_value = DEFAULT_QUERY_URL)]
    pub query_url: String,

    /// Push endpoint streaming gas price updates
    #[arg(long, env = "GASZ_SUBSCRIBE_URL", default_value = DEFAULT_SUBSCRIBE_URL)]
    pub subscribe_url: String,

    /// Public webhook URL; long polling is used when unset
    #[arg(long, env = "URL")]
    pub public_url: Option<String>,

    /// Port the webhook server listens on
    #[arg(short, long, env = "PORT", default_value_t = 7000)]
    pub port: u16,

    /// Log level: trace, debug, info, warn, error
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Timeout for a single alert delivery in milliseconds
    #[arg(long, env = "SEND_TIMEOUT_MS", default_value_t = 3000)]
    pub send_timeout_ms: u64,

    /// Alert deliveries in flight at once
    #[arg(long, env = "MAX_CONCURRENT_SENDS", default_value_t = 8)]
    pub max_concurrent_sends: usize,

    /// level: alert on every matching update, edge: once per crossing
    #[arg(long, env = "TRIGGER_MODE", default_value = "level")]
    pub trigger_mode: TriggerMode,

    /// Consecutive feed reconnect attempts before giving up
    #[arg(long, env = "MAX_RECONNECT_ATTEMPTS", default_value_t = 5)]
    pub max_reconnect_attempts: u32,
}

/// Where Telegram should deliver updates.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookSettings {
    pub public_url: Url,
    pub port: u16,
}

/// Validated application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub token: String,
    pub feed: FeedConfig,
    pub notifier: NotifierConfig,
    /// `None` means long polling.
    pub webhook: Option<WebhookSettings>,
    pub log_level: String,
}

impl AppConfig {
    /// Build and validate the configuration from parsed arguments.
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        let mut feed = FeedConfig::new(args.query_url, args.subscribe_url);
        feed.max_reconnect_attempts = args.max_reconnect_attempts;

        let webhook = match args.public_url.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(WebhookSettings {
                public_url: parse_url("URL", raw, &["https", "http"])?,
                port: args.port,
            }),
        };

        let config = Self {
            token: args.token.trim().to_string(),
            feed,
            notifier: NotifierConfig {
                send_timeout: Duration::from_millis(args.send_timeout_ms),
                max_concurrent_sends: args.max_concurrent_sends,
                trigger_mode: args.trigger_mode,
            },
            webhook,
            log_level: args.log_level,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token.is_empty() {
            return Err(ConfigError::EmptyToken);
        }
        parse_url("GASZ_QUERY_URL", &self.feed.query_url, &["https", "http"])?;
        parse_url("GASZ_SUBSCRIBE_URL", &self.feed.subscribe_url, &["wss", "ws"])?;
        if self.notifier.send_timeout.is_zero() {
            return Err(ConfigError::Zero { key: "SEND_TIMEOUT_MS" });
        }
        if self.notifier.max_concurrent_sends == 0 {
            return Err(ConfigError::Zero { key: "MAX_CONCURRENT_SENDS" });
        }
        Ok(())
    }

    /// Human-readable delivery mode for the startup banner.
    pub fn update_mode(&self) -> String {
        match &self.webhook {
            Some(webhook) => format!("webhook {} (port {})", webhook.public_url, webhook.port),
            None => "long polling".to_string(),
        }
    }
}

fn parse_url(
    key: &'static str,
    value: &str,
    expected: &'static [&'static str],
) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::InvalidUrl {
        key,
        value: value.to_string(),
        reason: e.to_string(),
    })?;
    if !expected.contains(&url.scheme()) {
        return Err(ConfigError::UnsupportedScheme {
            key,
            scheme: url.scheme().to_string(),
            expected,
        });
    }
    Ok(url)
}
