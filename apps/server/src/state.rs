//! Application state management.

use chrono::{DateTime, Utc};
use gasbot_alerts::{PassReport, SubscriberRegistry};
use gasbot_core::LatestGasPrice;
use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

/// Statistics for the bot.
#[derive(Debug)]
pub struct BotStats {
    /// Snapshots received from the push feed.
    pub snapshots_received: AtomicU64,
    /// Notification passes run.
    pub passes_run: AtomicU64,
    pub alerts_delivered: AtomicU64,
    pub alerts_failed: AtomicU64,
    /// Matches held back in edge-triggered mode.
    pub alerts_suppressed: AtomicU64,
    /// Feed reconnects after a lost connection.
    pub reconnects: AtomicU64,
    /// Receipt time of the last snapshot in Unix milliseconds, 0 if none yet.
    last_snapshot_ms: AtomicI64,
    started_at: DateTime<Utc>,
}

impl Default for BotStats {
    fn default() -> Self {
        Self::new()
    }
}

impl BotStats {
    pub fn new() -> Self {
        Self {
            snapshots_received: AtomicU64::new(0),
            passes_run: AtomicU64::new(0),
            alerts_delivered: AtomicU64::new(0),
            alerts_failed: AtomicU64::new(0),
            alerts_suppressed: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            last_snapshot_ms: AtomicI64::new(0),
            started_at: Utc::now(),
        }
    }

    pub fn record_snapshot(&self) {
        self.snapshots_received.fetch_add(1, Ordering::Relaxed);
        self.last_snapshot_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn record_pass(&self, report: &PassReport) {
        self.passes_run.fetch_add(1, Ordering::Relaxed);
        self.alerts_delivered
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.alerts_failed
            .fetch_add(report.failed as u64, Ordering::Relaxed);
        self.alerts_suppressed
            .fetch_add(report.suppressed as u64, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn last_snapshot_at(&self) -> Option<DateTime<Utc>> {
        match self.last_snapshot_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => DateTime::from_timestamp_millis(ms),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        (Utc::now() - self.started_at).num_seconds().max(0) as u64
    }

    pub fn summary(&self) -> StatsSummary {
        StatsSummary {
            snapshots_received: self.snapshots_received.load(Ordering::Relaxed),
            passes_run: self.passes_run.load(Ordering::Relaxed),
            alerts_delivered: self.alerts_delivered.load(Ordering::Relaxed),
            alerts_failed: self.alerts_failed.load(Ordering::Relaxed),
            alerts_suppressed: self.alerts_suppressed.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            last_snapshot_at: self.last_snapshot_at(),
            uptime_secs: self.uptime_secs(),
        }
    }
}

/// Summary of statistics.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSummary {
    pub snapshots_received: u64,
    pub passes_run: u64,
    pub alerts_delivered: u64,
    pub alerts_failed: u64,
    pub alerts_suppressed: u64,
    pub reconnects: u64,
    pub last_snapshot_at: Option<DateTime<Utc>>,
    pub uptime_secs: u64,
}

/// Application state shared across components.
pub struct AppState {
    pub registry: Arc<SubscriberRegistry>,
    pub latest: Arc<LatestGasPrice>,
    pub stats: BotStats,
}

impl AppState {
    pub fn new(registry: Arc<SubscriberRegistry>, latest: Arc<LatestGasPrice>) -> Self {
        Self {
            registry,
            latest,
            stats: BotStats::new(),
        }
    }

    pub fn stats_summary(&self) -> StatsSummary {
        self.stats.summary()
    }
}

/// Shared state handle.
pub type SharedState = Arc<AppState>;
